//! Post-game maintenance of the values the engine reads: per-team player
//! ratings and character strengths. Nothing here touches a store; callers
//! persist the returned values.

use crate::error::{EngineError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// New rating for the team a player was on in one game
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub player_id: u64,
    pub team: Alignment,
    pub old_rating: f64,
    pub new_rating: f64,
}

/// Elo step for one finished game.
///
/// Each player is scored against the average pre-game rating of the other
/// team. An empty team counts as `rating_baseline`. New ratings are truncated
/// to whole points.
pub fn update_ratings(game: &[GameRecord], players: &[Player], config: &EngineConfig) -> Result<Vec<RatingUpdate>> {
    let mut rows = Vec::with_capacity(game.len());
    for record in game {
        let player = players
            .iter()
            .find(|p| p.id == record.player_id)
            .ok_or_else(|| EngineError::DataNotFound(format!("player id {}", record.player_id)))?;
        rows.push((record, player.rating_for(record.team)));
    }

    let team_average = |good: bool| {
        let ratings: Vec<f64> = rows
            .iter()
            .filter(|(r, _)| r.team.is_good() == good)
            .map(|(_, rating)| *rating)
            .collect();
        if ratings.is_empty() {
            config.rating_baseline
        } else {
            ratings.iter().sum::<f64>() / ratings.len() as f64
        }
    };
    let good_average = team_average(true);
    let evil_average = team_average(false);

    let updates = rows
        .into_iter()
        .map(|(record, rating)| {
            let opponents = if record.team.is_good() { evil_average } else { good_average };
            let expected = 1.0 / (1.0 + 10f64.powf((opponents - rating) / 400.0));
            let score = if record.won { 1.0 } else { 0.0 };
            let new_rating = (rating + config.elo_k * (score - expected)).trunc();
            log::debug!("player {} ({}): {} -> {}", record.player_id, record.team, rating, new_rating);
            RatingUpdate {
                player_id: record.player_id,
                team: record.team,
                old_rating: rating,
                new_rating,
            }
        })
        .collect();
    Ok(updates)
}

impl Player {
    /// Apply an update produced for this player
    pub fn apply_rating(&mut self, update: &RatingUpdate) {
        if update.player_id != self.id {
            return;
        }
        if update.team.is_good() {
            self.rating_good = update.new_rating;
        } else {
            self.rating_evil = update.new_rating;
        }
    }
}

/// Blend the character's recent win rate into its stored strength.
///
/// `records` are newest first; only rows for this character count, up to
/// `recent_games_window` of them. A win rate of 0.5 maps to the strength
/// baseline and the full range spans twice the strength spread. Without any
/// games the stored strength is returned unchanged.
pub fn adjusted_strength(character: &Character, records: &[GameRecord], config: &EngineConfig) -> f64 {
    let recent: Vec<&GameRecord> = records
        .iter()
        .filter(|r| r.character_id == character.id)
        .take(config.recent_games_window)
        .collect();
    if recent.is_empty() {
        return character.base_strength;
    }

    let wins = recent.iter().filter(|r| r.won).count() as f64;
    let win_rate = wins / recent.len() as f64;
    let recent_strength = config.strength_baseline + (win_rate - 0.5) * 2.0 * config.strength_spread;
    let blended = config.strength_decay * recent_strength + (1.0 - config.strength_decay) * character.base_strength;
    (blended * 100.0).round() / 100.0
}

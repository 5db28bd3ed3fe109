use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Team membership of a character or of a player in a role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Alignment {
    Good,
    Evil,
    Neutral,
}

impl Alignment {
    /// Neutral characters balance against the Good team, like Evil ones
    pub fn is_good(&self) -> bool {
        matches!(self, Alignment::Good)
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Alignment::Good => "Good",
            Alignment::Evil => "Evil",
            Alignment::Neutral => "Neutral",
        };
        f.write_str(name)
    }
}

/// Character categories on a script
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoleType {
    #[serde(alias = "townsfolk", alias = "tf")]
    Townsfolk,
    #[serde(alias = "outsider", alias = "os")]
    Outsider,
    #[serde(alias = "minion", alias = "mn")]
    Minion,
    #[serde(alias = "demon", alias = "dm")]
    Demon,
}

impl RoleType {
    pub const ALL: [RoleType; 4] = [
        RoleType::Townsfolk,
        RoleType::Outsider,
        RoleType::Minion,
        RoleType::Demon,
    ];
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleType::Townsfolk => "Townsfolk",
            RoleType::Outsider => "Outsider",
            RoleType::Minion => "Minion",
            RoleType::Demon => "Demon",
        };
        f.write_str(name)
    }
}

/// Number of characters required per role type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub townsfolk: u32,
    pub outsider: u32,
    pub minion: u32,
    pub demon: u32,
}

impl RoleCounts {
    pub fn new(townsfolk: u32, outsider: u32, minion: u32, demon: u32) -> Self {
        Self {
            townsfolk,
            outsider,
            minion,
            demon,
        }
    }

    /// Standard distribution for 5 to 15 players
    pub fn standard(num_players: usize) -> Option<RoleCounts> {
        let counts = match num_players {
            5 => (3, 0, 1, 1),
            6 => (3, 1, 1, 1),
            7 => (5, 0, 1, 1),
            8 => (5, 1, 1, 1),
            9 => (5, 2, 1, 1),
            10 => (7, 0, 2, 1),
            11 => (7, 1, 2, 1),
            12 => (7, 2, 2, 1),
            13 => (9, 0, 3, 1),
            14 => (9, 1, 3, 1),
            15 => (9, 2, 3, 1),
            _ => return None,
        };
        Some(RoleCounts::new(counts.0, counts.1, counts.2, counts.3))
    }

    pub fn get(&self, role: RoleType) -> u32 {
        match role {
            RoleType::Townsfolk => self.townsfolk,
            RoleType::Outsider => self.outsider,
            RoleType::Minion => self.minion,
            RoleType::Demon => self.demon,
        }
    }

    pub fn set(&mut self, role: RoleType, value: u32) {
        match role {
            RoleType::Townsfolk => self.townsfolk = value,
            RoleType::Outsider => self.outsider = value,
            RoleType::Minion => self.minion = value,
            RoleType::Demon => self.demon = value,
        }
    }

    pub fn total(&self) -> u32 {
        self.townsfolk + self.outsider + self.minion + self.demon
    }

    /// Slots filled by Good characters under this distribution
    pub fn good_slots(&self) -> u32 {
        self.townsfolk + self.outsider
    }

    pub fn evil_slots(&self) -> u32 {
        self.minion + self.demon
    }
}

/// A participant, as loaded from the store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: u64,
    pub name: String,
    /// Rating used when playing a Good character
    pub rating_good: f64,
    /// Rating used when playing an Evil character
    pub rating_evil: f64,
    /// Recent team alignments, newest first
    #[serde(default)]
    pub history: Vec<Alignment>,
}

impl Player {
    pub fn new(id: u64, name: &str, rating_good: f64, rating_evil: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            rating_good,
            rating_evil,
            history: Vec::new(),
        }
    }

    pub fn rating_for(&self, alignment: Alignment) -> f64 {
        if alignment.is_good() {
            self.rating_good
        } else {
            self.rating_evil
        }
    }
}

/// A script character row
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Character {
    pub id: u64,
    pub name: String,
    pub alignment: Alignment,
    pub role_type: RoleType,
    /// Centred around `EngineConfig::strength_baseline`
    pub base_strength: f64,
}

impl Character {
    pub fn new(id: u64, name: &str, alignment: Alignment, role_type: RoleType, base_strength: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            alignment,
            role_type,
            base_strength,
        }
    }
}

/// One historical (player, character, team, outcome) row
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRecord {
    pub player_id: u64,
    pub character_id: u64,
    pub team: Alignment,
    pub won: bool,
}

/// Normal prior on one estimator parameter
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mean: f64,
    pub std_dev: f64,
}

/// Engine configuration parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rating normalisation: (rating - baseline) / spread
    pub rating_baseline: f64,
    pub rating_spread: f64,
    /// Strength normalisation: (strength - baseline) / spread
    pub strength_baseline: f64,
    pub strength_spread: f64,

    /// Priors for the rating weight, strength weight and intercept
    pub prior_rating_weight: NormalPrior,
    pub prior_strength_weight: NormalPrior,
    pub prior_intercept: NormalPrior,
    /// Newton iteration cap for the MAP fit
    pub fit_max_iterations: usize,
    /// Step norm below which the fit counts as converged
    pub fit_tolerance: f64,

    /// Uniform jitter half-width on every win probability
    pub jitter: f64,
    /// Additional jitter half-width for Minion columns
    pub minion_jitter: f64,
    /// Uniform half-width of the per-variable objective noise
    pub objective_noise: f64,
    /// Allowed gap between Good and Evil average win probability before slack
    pub balance_tolerance: f64,

    /// Length of the alignment history window
    pub history_window: usize,

    /// Maximum number of Village Idiots in play
    pub village_idiot_copies: usize,
    /// Effective strength of a drunk Village Idiot
    pub drunk_strength: f64,
    /// Strength boost applied to Minions while one babysits Lil' Monsta
    pub babysitter_boost: f64,
    /// Inclusive range for the Xaan outsider count
    pub xaan_outsiders_min: u32,
    pub xaan_outsiders_max: u32,

    /// Elo update factor applied after each game
    pub elo_k: f64,
    /// Games per character that feed its adjusted strength
    pub recent_games_window: usize,
    /// Weight of the recent win rate against the stored strength
    pub strength_decay: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rating_baseline: 1500.0,
            rating_spread: 400.0,
            strength_baseline: 50.0,
            strength_spread: 25.0,
            prior_rating_weight: NormalPrior { mean: 1.0, std_dev: 3.0 },
            prior_strength_weight: NormalPrior { mean: 1.0, std_dev: 3.0 },
            prior_intercept: NormalPrior { mean: 0.0, std_dev: 1.0 },
            fit_max_iterations: 50,
            fit_tolerance: 1e-8,
            jitter: 0.02,
            minion_jitter: 0.05,
            objective_noise: 0.05,
            balance_tolerance: 0.1,
            history_window: 10,
            village_idiot_copies: 3,
            drunk_strength: 15.0,
            babysitter_boost: 20.0,
            xaan_outsiders_min: 1,
            xaan_outsiders_max: 4,
            elo_k: 24.0,
            recent_games_window: 10,
            strength_decay: 0.3,
        }
    }
}

impl EngineConfig {
    pub fn normalise_rating(&self, rating: f64) -> f64 {
        (rating - self.rating_baseline) / self.rating_spread
    }

    pub fn normalise_strength(&self, strength: f64) -> f64 {
        (strength - self.strength_baseline) / self.strength_spread
    }

    /// Multiplier applied to jitter, noise and bias variance
    pub fn randomness_scale(&self, extra_randomness: f64) -> f64 {
        1.0 + extra_randomness.max(0.0)
    }
}

/// Optional per-run parameters, all independently toggleable
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Player name -> team they must play on
    pub fixed_team: BTreeMap<String, Alignment>,
    /// Player name -> character they must receive
    pub fixed_character: BTreeMap<String, String>,
    /// Player name -> role type they must receive
    pub fixed_role: BTreeMap<String, RoleType>,
    /// Characters that must be in play
    pub include: Vec<String>,
    /// Characters that must not be in play
    pub exclude: Vec<String>,
    /// Non-negative amplification of jitter, noise and bias variance
    pub extra_randomness: f64,
    /// Seed for reproducible sessions; fresh entropy when absent
    pub seed: Option<u64>,
}

/// One resolved (player, character) pair
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub player: String,
    pub character: String,
    pub role_type: RoleType,
    pub win_probability: f64,
    /// Final team after any forced alignment
    pub team: Alignment,
    pub drunk: bool,
}

/// Team balance achieved by a solution
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Balance {
    pub good_average: f64,
    pub evil_average: f64,
    pub tolerance: f64,
    pub slack: f64,
}

impl Balance {
    pub fn gap(&self) -> f64 {
        (self.good_average - self.evil_average).abs()
    }
}

/// Category of a run log line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    /// A registered rule fired while building the program
    Rule,
    /// A post-solve hook changed something
    Adjustment,
    /// A non-fatal problem, such as an unknown name in the run options
    Warning,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
}

/// Human-readable record of everything that fired during one attempt
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunLog {
    pub entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn rule(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("[Constraint Applied] {}", message);
        self.entries.push(LogEntry { kind: LogKind::Rule, message });
    }

    pub fn adjustment(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("[Post-Solve Adjustment] {}", message);
        self.entries.push(LogEntry { kind: LogKind::Adjustment, message });
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.entries.push(LogEntry { kind: LogKind::Warning, message });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.kind == LogKind::Warning)
    }

    pub fn extend(&mut self, other: RunLog) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_distribution_sums_to_player_count() {
        for n in 5..=15 {
            let counts = RoleCounts::standard(n).unwrap();
            assert_eq!(counts.total() as usize, n);
            assert_eq!(counts.demon, 1);
        }
        assert!(RoleCounts::standard(4).is_none());
        assert!(RoleCounts::standard(16).is_none());
    }

    #[test]
    fn test_normalisation() {
        let config = EngineConfig::default();
        assert_eq!(config.normalise_rating(1500.0), 0.0);
        assert_eq!(config.normalise_rating(1900.0), 1.0);
        assert_eq!(config.normalise_strength(25.0), -1.0);
    }

    #[test]
    fn test_role_shorthand_in_options() {
        let options: RunOptions = serde_json::from_str(r#"{"fixed_role": {"Jed": "os", "Oli": "Demon"}}"#).unwrap();
        assert_eq!(options.fixed_role["Jed"], RoleType::Outsider);
        assert_eq!(options.fixed_role["Oli"], RoleType::Demon);
        assert!(serde_json::from_str::<RoleType>(r#""traveller""#).is_err());
    }

    #[test]
    fn test_run_options_defaults_from_partial_json() {
        let options: RunOptions = serde_json::from_str(r#"{"include": ["Baron"]}"#).unwrap();
        assert_eq!(options.include, vec!["Baron".to_string()]);
        assert!(options.fixed_team.is_empty());
        assert_eq!(options.extra_randomness, 0.0);
        assert!(options.seed.is_none());
    }

    #[test]
    fn test_rating_for_neutral_uses_evil_rating() {
        let player = Player::new(1, "Liza", 1600.0, 1400.0);
        assert_eq!(player.rating_for(Alignment::Good), 1600.0);
        assert_eq!(player.rating_for(Alignment::Neutral), 1400.0);
    }
}

//! Propose / reject / accept loop around single attempts.

use crate::engine::{run_attempt, AttemptInput, Proposal};
use crate::error::{EngineError, Result};
use crate::estimator::{self, Coefficients};
use crate::rules::VILLAGE_IDIOT;
use crate::store::DataStore;
use crate::types::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Inputs loaded, no proposal on the table
    Build,
    /// A proposal is waiting for accept or reject
    Present,
    /// Terminal
    Accepted,
}

/// The setup the group agreed to play
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcceptedSetup {
    pub proposal: Proposal,
    /// Attempts made before this one was accepted, including it
    pub attempts: u32,
}

pub struct Session {
    players: Vec<Player>,
    characters: Vec<Character>,
    base: RoleCounts,
    coefficients: Coefficients,
    config: EngineConfig,
    options: RunOptions,
    /// Warnings raised while loading, repeated at the top of every proposal log
    setup_log: RunLog,
    rng: StdRng,
    phase: Phase,
    attempts: u32,
    current: Option<Proposal>,
}

impl Session {
    /// Load everything one session needs and fit the strength model once
    pub fn new(
        store: &impl DataStore,
        script: &str,
        player_names: &[String],
        config: EngineConfig,
        options: RunOptions,
    ) -> Result<Self> {
        let mut players = store.players(player_names)?;
        for player in &mut players {
            player.history = store.history(player.id, config.history_window)?;
        }

        let characters = store.script_characters(script)?;
        if characters.is_empty() {
            return Err(EngineError::DataNotFound(format!("characters for script '{}'", script)));
        }
        let characters = expand_copies(characters, config.village_idiot_copies);
        let base = store.role_counts(players.len())?;

        let mut setup_log = RunLog::default();
        let coefficients = fit_coefficients(store, &players, &characters, &config, &mut setup_log)?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        log::info!(
            "session ready: {} players, {} characters on '{}', base {:?}",
            players.len(),
            characters.len(),
            script,
            base
        );

        Ok(Self {
            players,
            characters,
            base,
            coefficients,
            config,
            options,
            setup_log,
            rng,
            phase: Phase::Build,
            attempts: 0,
            current: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn base(&self) -> RoleCounts {
        self.base
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    pub fn current(&self) -> Option<&Proposal> {
        self.current.as_ref()
    }

    /// Build, solve and post-process a new proposal
    pub fn propose(&mut self) -> Result<&Proposal> {
        if self.phase == Phase::Accepted {
            return Err(EngineError::InvalidInput("session already accepted".to_string()));
        }
        self.phase = Phase::Build;
        self.current = None;
        self.attempts += 1;
        log::debug!("attempt {}", self.attempts);

        let input = AttemptInput {
            players: &self.players,
            characters: &self.characters,
            base: self.base,
            coefficients: &self.coefficients,
            config: &self.config,
            options: &self.options,
        };
        let attempt = run_attempt(&input, &mut self.rng)?;

        let mut log = self.setup_log.clone();
        log.extend(attempt.log);
        let proposal = Proposal { log, ..attempt };

        self.phase = Phase::Present;
        Ok(&*self.current.insert(proposal))
    }

    /// Discard the proposal on the table and roll a fresh one
    pub fn reject(&mut self) -> Result<&Proposal> {
        if self.phase != Phase::Present {
            return Err(EngineError::InvalidInput("no proposal to reject".to_string()));
        }
        log::info!("proposal {} rejected", self.attempts);
        self.propose()
    }

    pub fn accept(&mut self) -> Result<AcceptedSetup> {
        let proposal = match (self.phase, &self.current) {
            (Phase::Present, Some(proposal)) => proposal.clone(),
            _ => return Err(EngineError::InvalidInput("no proposal to accept".to_string())),
        };
        self.phase = Phase::Accepted;
        log::info!("proposal {} accepted", self.attempts);
        Ok(AcceptedSetup {
            proposal,
            attempts: self.attempts,
        })
    }
}

/// Add numbered copies of characters that may appear several times
fn expand_copies(mut characters: Vec<Character>, village_idiot_copies: usize) -> Vec<Character> {
    if let Some(village_idiot) = characters.iter().find(|c| c.name == VILLAGE_IDIOT).cloned() {
        for copy in 2..=village_idiot_copies {
            let mut extra = village_idiot.clone();
            extra.name = format!("{} {}", VILLAGE_IDIOT, copy);
            characters.push(extra);
        }
    }
    characters
}

/// MAP fit over the stored games, falling back to the prior means with a warning
fn fit_coefficients(
    store: &impl DataStore,
    players: &[Player],
    characters: &[Character],
    config: &EngineConfig,
    setup_log: &mut RunLog,
) -> Result<Coefficients> {
    let player_ids: Vec<u64> = players.iter().map(|p| p.id).collect();
    let character_ids: Vec<u64> = characters.iter().map(|c| c.id).collect();
    let records = store.game_records(&player_ids, &character_ids)?;
    let observations = estimator::observations(&records, players, characters, config);

    match estimator::fit_map(&observations, config) {
        Ok(coefficients) => {
            log::info!("fitted strength model from {} games: {:?}", observations.len(), coefficients);
            Ok(coefficients)
        }
        Err(e) => {
            setup_log.warning(format!("strength model fit failed ({}); using prior means", e));
            Ok(Coefficients::from_priors(config))
        }
    }
}

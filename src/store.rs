//! Read-only access to players, scripts and game history.

use crate::error::{EngineError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Source of everything one session reads before building a setup
pub trait DataStore {
    /// Players in the order requested; any unknown name is an error
    fn players(&self, names: &[String]) -> Result<Vec<Player>>;

    /// Most recent team alignments for a player, newest first, at most `window` long
    fn history(&self, player_id: u64, window: usize) -> Result<Vec<Alignment>>;

    fn script_characters(&self, script: &str) -> Result<Vec<Character>>;

    /// Past games restricted to the given players and characters
    fn game_records(&self, player_ids: &[u64], character_ids: &[u64]) -> Result<Vec<GameRecord>>;

    fn role_counts(&self, num_players: usize) -> Result<RoleCounts>;
}

/// In-memory store, loadable from JSON
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    pub players: Vec<Player>,
    pub characters: Vec<Character>,
    /// Script name -> character ids
    pub scripts: BTreeMap<String, Vec<u64>>,
    pub game_records: Vec<GameRecord>,
    /// Player count -> role distribution; the standard table when empty
    pub role_table: BTreeMap<usize, RoleCounts>,
}

impl MemoryStore {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidInput(format!("store: {}", e)))
    }

    pub fn add_script(&mut self, name: &str, characters: Vec<Character>) {
        let ids = characters.iter().map(|c| c.id).collect();
        for character in characters {
            if !self.characters.iter().any(|c| c.id == character.id) {
                self.characters.push(character);
            }
        }
        self.scripts.insert(name.to_string(), ids);
    }
}

impl DataStore for MemoryStore {
    fn players(&self, names: &[String]) -> Result<Vec<Player>> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.players.iter().find(|p| &p.name == name) {
                Some(player) => found.push(player.clone()),
                None => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::DataNotFound(format!("players: {}", missing.join(", "))));
        }
        Ok(found)
    }

    fn history(&self, player_id: u64, window: usize) -> Result<Vec<Alignment>> {
        let player = self
            .players
            .iter()
            .find(|p| p.id == player_id)
            .ok_or_else(|| EngineError::DataNotFound(format!("player id {}", player_id)))?;

        if player.history.is_empty() {
            return Ok(vec![Alignment::Good; window]);
        }
        Ok(player.history.iter().take(window).copied().collect())
    }

    fn script_characters(&self, script: &str) -> Result<Vec<Character>> {
        let ids = self
            .scripts
            .get(script)
            .ok_or_else(|| EngineError::DataNotFound(format!("script '{}'", script)))?;

        ids.iter()
            .map(|id| {
                self.characters
                    .iter()
                    .find(|c| c.id == *id)
                    .cloned()
                    .ok_or_else(|| EngineError::DataNotFound(format!("character id {} in script '{}'", id, script)))
            })
            .collect()
    }

    fn game_records(&self, player_ids: &[u64], character_ids: &[u64]) -> Result<Vec<GameRecord>> {
        let players: HashSet<u64> = player_ids.iter().copied().collect();
        let characters: HashSet<u64> = character_ids.iter().copied().collect();
        Ok(self
            .game_records
            .iter()
            .filter(|r| players.contains(&r.player_id) && characters.contains(&r.character_id))
            .cloned()
            .collect())
    }

    fn role_counts(&self, num_players: usize) -> Result<RoleCounts> {
        let counts = if self.role_table.is_empty() {
            RoleCounts::standard(num_players)
        } else {
            self.role_table.get(&num_players).copied()
        };
        counts.ok_or_else(|| EngineError::DataNotFound(format!("role distribution for {} players", num_players)))
    }
}

/// Small Trouble Brewing store shared by tests across modules
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    pub const PLAYERS: [&str; 9] = ["Liza", "Madi", "Rita", "Pedro", "Jed", "Oli", "Rowan", "Gana", "Elia"];

    pub fn trouble_brewing() -> Vec<Character> {
        use Alignment::*;
        use RoleType::*;
        let rows = [
            ("Washerwoman", Good, Townsfolk, 45.0),
            ("Librarian", Good, Townsfolk, 45.0),
            ("Investigator", Good, Townsfolk, 50.0),
            ("Chef", Good, Townsfolk, 50.0),
            ("Empath", Good, Townsfolk, 60.0),
            ("Fortune Teller", Good, Townsfolk, 55.0),
            ("Undertaker", Good, Townsfolk, 45.0),
            ("Monk", Good, Townsfolk, 50.0),
            ("Ravenkeeper", Good, Townsfolk, 50.0),
            ("Virgin", Good, Townsfolk, 40.0),
            ("Slayer", Good, Townsfolk, 55.0),
            ("Soldier", Good, Townsfolk, 45.0),
            ("Mayor", Good, Townsfolk, 50.0),
            ("Butler", Good, Outsider, 30.0),
            ("Drunk", Good, Outsider, 25.0),
            ("Recluse", Good, Outsider, 35.0),
            ("Saint", Good, Outsider, 30.0),
            ("Poisoner", Evil, Minion, 65.0),
            ("Spy", Evil, Minion, 55.0),
            ("Scarlet Woman", Evil, Minion, 60.0),
            ("Baron", Evil, Minion, 45.0),
            ("Imp", Evil, Demon, 70.0),
        ];
        rows.iter()
            .enumerate()
            .map(|(i, (name, alignment, role, strength))| {
                Character::new(i as u64 + 1, name, *alignment, *role, *strength)
            })
            .collect()
    }

    pub fn store() -> MemoryStore {
        let mut store = MemoryStore::default();
        for (i, name) in PLAYERS.iter().enumerate() {
            let offset = (i as f64 - 4.0) * 40.0;
            store.players.push(Player::new(i as u64 + 1, name, 1500.0 + offset, 1500.0 - offset));
        }
        store.players[0].history = vec![Alignment::Evil, Alignment::Evil, Alignment::Good];
        store.add_script("Trouble Brewing", trouble_brewing());

        for (k, player) in store.players.clone().iter().enumerate() {
            for character in store.characters.iter().take(22).skip(k % 5) {
                store.game_records.push(GameRecord {
                    player_id: player.id,
                    character_id: character.id,
                    team: character.alignment,
                    won: (character.id + player.id) % 3 != 0,
                });
            }
        }
        store
    }

    pub fn names(n: usize) -> Vec<String> {
        PLAYERS.iter().take(n).map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;

    #[test]
    fn test_players_keep_requested_order() {
        let store = store();
        let names = vec!["Oli".to_string(), "Liza".to_string()];
        let players = store.players(&names).unwrap();
        assert_eq!(players[0].name, "Oli");
        assert_eq!(players[1].name, "Liza");
    }

    #[test]
    fn test_unknown_player_is_data_not_found() {
        let store = store();
        let names = vec!["Liza".to_string(), "Nobody".to_string()];
        match store.players(&names) {
            Err(EngineError::DataNotFound(message)) => assert!(message.contains("Nobody")),
            other => panic!("unexpected result {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_empty_history_defaults_to_good() {
        let store = store();
        assert_eq!(store.history(2, 10).unwrap(), vec![Alignment::Good; 10]);
        assert_eq!(store.history(1, 2).unwrap(), vec![Alignment::Evil, Alignment::Evil]);
    }

    #[test]
    fn test_role_table_falls_back_to_standard() {
        let mut store = store();
        assert_eq!(store.role_counts(9).unwrap(), RoleCounts::new(5, 2, 1, 1));

        store.role_table.insert(9, RoleCounts::new(5, 1, 2, 1));
        assert_eq!(store.role_counts(9).unwrap(), RoleCounts::new(5, 1, 2, 1));
        assert!(matches!(store.role_counts(10), Err(EngineError::DataNotFound(_))));
    }

    #[test]
    fn test_missing_script_is_data_not_found() {
        let store = store();
        assert!(matches!(
            store.script_characters("Bad Moon Rising"),
            Err(EngineError::DataNotFound(_))
        ));
        assert_eq!(store.script_characters("Trouble Brewing").unwrap().len(), 22);
    }

    #[test]
    fn test_game_records_are_filtered() {
        let store = store();
        let records = store.game_records(&[1], &[1, 2, 3]).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.player_id == 1 && r.character_id <= 3));
    }

    #[test]
    fn test_store_from_partial_json() {
        let json = r#"{
            "players": [{"id": 1, "name": "Liza", "rating_good": 1500, "rating_evil": 1450}],
            "scripts": {"Tiny": []}
        }"#;
        let store = MemoryStore::from_json(json).unwrap();
        assert_eq!(store.players.len(), 1);
        assert!(store.players[0].history.is_empty());
        assert!(store.script_characters("Tiny").unwrap().is_empty());
    }
}

mod engine;
mod error;
mod estimator;
mod hooks;
mod program;
mod ratings;
mod rules;
mod scoring;
mod seating;
mod session;
mod store;
mod types;

pub use engine::Proposal;
pub use error::{EngineError, FitError};
pub use estimator::Coefficients;
pub use ratings::{adjusted_strength, update_ratings, RatingUpdate};
pub use session::{AcceptedSetup, Phase, Session};
pub use store::{DataStore, MemoryStore};
pub use types::*;

use wasm_bindgen::prelude::*;

/// Forwards `log` records to the browser console
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    if log::set_logger(&LOGGER).is_ok() {
        let level = if cfg!(feature = "debug") {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        log::set_max_level(level);
    }
}

fn to_js(e: EngineError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed setup session
#[wasm_bindgen]
pub struct SetupEngine {
    session: Session,
}

#[wasm_bindgen]
impl SetupEngine {
    /// Create a session with the default config
    #[wasm_bindgen(constructor)]
    pub fn new(store_json: &str, script: &str, players_json: &str, options_json: &str) -> Result<SetupEngine, JsValue> {
        Self::new_with_config(store_json, script, players_json, options_json, "{}")
    }

    /// Create with custom config; missing config fields keep their defaults
    pub fn new_with_config(
        store_json: &str,
        script: &str,
        players_json: &str,
        options_json: &str,
        config_json: &str,
    ) -> Result<SetupEngine, JsValue> {
        let store = MemoryStore::from_json(store_json).map_err(to_js)?;
        let players: Vec<String> = serde_json::from_str(players_json)
            .map_err(|e| JsValue::from_str(&format!("Players parse error: {}", e)))?;
        let options: RunOptions = serde_json::from_str(options_json)
            .map_err(|e| JsValue::from_str(&format!("Options parse error: {}", e)))?;
        let config = parse_config(config_json)?;

        let session = Session::new(&store, script, &players, config, options).map_err(to_js)?;
        Ok(SetupEngine { session })
    }

    /// Roll a proposal; JSON
    pub fn propose(&mut self) -> Result<String, JsValue> {
        let proposal = self.session.propose().map_err(to_js)?;
        serde_json::to_string(proposal)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Reject the current proposal and roll another; JSON
    pub fn reject(&mut self) -> Result<String, JsValue> {
        let proposal = self.session.reject().map_err(to_js)?;
        serde_json::to_string(proposal)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Accept the current proposal; JSON
    pub fn accept(&mut self) -> Result<String, JsValue> {
        let accepted = self.session.accept().map_err(to_js)?;
        serde_json::to_string(&accepted)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Human-readable table of the current proposal
    pub fn get_table(&self) -> String {
        self.session.current().map(|p| p.to_table()).unwrap_or_default()
    }

    pub fn get_phase(&self) -> String {
        format!("{:?}", self.session.phase())
    }

    pub fn get_attempts(&self) -> u32 {
        self.session.attempts()
    }

    /// Get default config as JSON
    pub fn get_default_config() -> String {
        serde_json::to_string(&EngineConfig::default()).unwrap_or_default()
    }

    /// Get default run options as JSON
    pub fn get_default_options() -> String {
        serde_json::to_string(&RunOptions::default()).unwrap_or_default()
    }
}

/// Elo updates for one finished game; JSON list of `RatingUpdate`
#[wasm_bindgen]
pub fn rate_game(players_json: &str, game_json: &str) -> Result<String, JsValue> {
    let players: Vec<Player> = serde_json::from_str(players_json)
        .map_err(|e| JsValue::from_str(&format!("Players parse error: {}", e)))?;
    let game: Vec<GameRecord> = serde_json::from_str(game_json)
        .map_err(|e| JsValue::from_str(&format!("Game parse error: {}", e)))?;
    let updates = update_ratings(&game, &players, &EngineConfig::default()).map_err(to_js)?;
    serde_json::to_string(&updates).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Overlay a partial JSON object onto the default config
fn parse_config(config_json: &str) -> Result<EngineConfig, JsValue> {
    let parse_error = |e: serde_json::Error| JsValue::from_str(&format!("Config parse error: {}", e));
    let mut merged = serde_json::to_value(EngineConfig::default()).map_err(parse_error)?;
    let patch: serde_json::Value = serde_json::from_str(config_json).map_err(parse_error)?;
    if let (Some(target), serde_json::Value::Object(fields)) = (merged.as_object_mut(), patch) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
    serde_json::from_value(merged).map_err(parse_error)
}

//! Automated opponent registry configuration

use serde::Deserialize;
use std::collections::HashMap;

use super::error::ValidationError;

/// Named engines available as automated opponents.
///
/// `CHESS_SYNC__BOTS__ENGINES__STOCKFISH__COMMAND=/usr/bin/stockfish`
/// registers an engine called `stockfish`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotsConfig {
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,
}

/// One UCI engine executable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Executable path or name on `PATH`
    pub command: String,

    /// Whitespace-separated arguments
    #[serde(default)]
    pub args: String,

    /// Thinking time requested per move
    #[serde(default = "default_movetime")]
    pub movetime_ms: u64,
}

impl EngineConfig {
    pub fn args_list(&self) -> Vec<String> {
        self.args.split_whitespace().map(str::to_string).collect()
    }
}

impl BotsConfig {
    /// Validate bot configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, engine) in &self.engines {
            if engine.command.trim().is_empty() {
                return Err(ValidationError::MissingEngineCommand(name.clone()));
            }
        }
        Ok(())
    }
}

fn default_movetime() -> u64 {
    1_000
}

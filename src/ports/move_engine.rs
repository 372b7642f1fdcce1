//! MoveEngine port - Out-of-process move computation.
//!
//! A move engine is asked for a single move in a position. It may be slow,
//! crash, or answer garbage; callers bound the wait and treat every error
//! as one "engine failure" condition.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chess::{MoveIntent, Position};

/// Failures of a move engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("failed to start engine: {0}")]
    Spawn(String),

    /// The engine exited or closed its output before answering.
    #[error("engine crashed: {0}")]
    Crashed(String),

    /// The engine answered something that is not a move.
    #[error("malformed engine response: {0}")]
    Malformed(String),

    /// The engine reported there is no move to play.
    #[error("engine returned no move")]
    NoMove,

    /// No engine is registered under the requested name.
    #[error("unknown engine: {0}")]
    UnknownEngine(String),
}

/// Port for computing a move in a position.
#[async_trait]
pub trait MoveEngine: Send + Sync {
    /// Registry name of this engine.
    fn name(&self) -> &str;

    /// Compute a move for the side to move in `position`.
    async fn best_move(&self, position: &Position) -> Result<MoveIntent, EngineError>;
}

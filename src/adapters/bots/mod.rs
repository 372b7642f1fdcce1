//! Move engine adapters for automated opponents.

mod registry;
mod scripted;
mod uci_engine;

pub use registry::EngineRegistry;
pub use scripted::{ScriptedEngine, ScriptedReply};
pub use uci_engine::UciEngine;

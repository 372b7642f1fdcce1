//! Ports - Interfaces for external collaborators.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the session core and the outside world. Adapters implement these ports.
//!
//! - `RulesEngine` - Pure board legality and terminal classification
//! - `RealtimeChannel` - Per-participant broadcast groups
//! - `MoveEngine` - Out-of-process move computation for automated opponents
//! - `GameRecordStore` - External persistence of game records

mod game_record_store;
mod move_engine;
mod realtime_channel;
mod rules_engine;

pub use game_record_store::{GameRecordStore, NewGameRecord};
pub use move_engine::{EngineError, MoveEngine};
pub use realtime_channel::{ChannelError, RealtimeChannel};
pub use rules_engine::{RulesError, RulesEngine};

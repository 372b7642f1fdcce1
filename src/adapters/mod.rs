//! Adapters - Implementations of port interfaces.
//!
//! - `rules` - `RulesEngine` over shakmaty
//! - `channel` - In-process broadcast groups (`RealtimeChannel`)
//! - `websocket` - Axum relay fanning frames out to participant groups
//! - `bots` - UCI engine processes and scripted engines (`MoveEngine`)
//! - `persistence` - In-memory `GameRecordStore`

pub mod bots;
pub mod channel;
pub mod persistence;
pub mod rules;
pub mod websocket;

pub use bots::{EngineRegistry, ScriptedEngine, ScriptedReply, UciEngine};
pub use channel::{ConnectionId, InMemoryChannel, RoomManager};
pub use persistence::InMemoryGameRecordStore;
pub use rules::ShakmatyRules;
pub use websocket::{relay_router, RelayState};

//! Real-time channel adapters.

mod in_memory;
mod rooms;

pub use in_memory::InMemoryChannel;
pub use rooms::{ConnectionId, RoomManager};

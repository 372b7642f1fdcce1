//! WebSocket relay for the real-time channel.
//!
//! ```text
//! alice ──ws──┐                        ┌──ws── bob (tab 1)
//!             │  {to: bob, message}    │
//!             └──────► RoomManager ────┼──ws── bob (tab 2)
//!                      group: bob      │
//! ```
//!
//! - [`messages`] - Notices produced by the relay itself
//! - [`handler`] - Axum upgrade handler and router

pub mod handler;
pub mod messages;

pub use handler::{health_handler, relay_router, ws_handler, RelayState};
pub use messages::{ConnectedNotice, ErrorNotice, RelayNotice};

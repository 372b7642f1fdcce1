//! Domain layer containing game logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, status, errors)
//! - `chess` - Board vocabulary exchanged with the rules engine
//! - `game` - Session aggregate, move clock and takeback negotiation
//! - `protocol` - Peer-to-peer synchronization messages and dedup

pub mod chess;
pub mod foundation;
pub mod game;
pub mod protocol;

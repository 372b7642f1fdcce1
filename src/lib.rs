//! Chess Sync - Live game-session synchronizer
//!
//! Keeps two participants' copies of a chess game consistent over a
//! real-time message channel: move validation through a rules engine,
//! per-side clocks, tournament takebacks, administrative interrupts, and
//! automated opponents backed by external engines.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

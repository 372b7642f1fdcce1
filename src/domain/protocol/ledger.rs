//! Idempotency ledger for inbound moves.
//!
//! Redelivery after a reconnect is normal. A move message is identified by
//! its session, the takeback generation it was played in, and its sequence
//! index; a key seen once is never applied again.

use std::collections::HashSet;

use crate::domain::foundation::SessionId;

/// Identifies one applied move across redeliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub session_id: SessionId,
    pub generation: u32,
    pub sequence_index: u32,
}

impl IdempotencyKey {
    pub fn new(session_id: SessionId, generation: u32, sequence_index: u32) -> Self {
        Self {
            session_id,
            generation,
            sequence_index,
        }
    }
}

/// Set of keys already applied.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    seen: HashSet<IdempotencyKey>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` has already been recorded.
    pub fn contains(&self, key: &IdempotencyKey) -> bool {
        self.seen.contains(key)
    }

    /// Record `key`. Returns false if it was already present.
    pub fn record(&mut self, key: IdempotencyKey) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

//! In-memory game record store.
//!
//! Records live only as long as the process. Latency and failures can be
//! injected so callers' handling of a slow or broken store can be tested.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, GameRecordId, SessionId};
use crate::ports::{GameRecordStore, NewGameRecord};

/// [`GameRecordStore`] keeping records in a map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGameRecordStore {
    records: Arc<RwLock<HashMap<GameRecordId, NewGameRecord>>>,
    delay: Duration,
    fail: bool,
}

impl InMemoryGameRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated latency per create.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every create fail with a storage error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn get(&self, id: &GameRecordId) -> Option<NewGameRecord> {
        self.records.read().await.get(id).cloned()
    }
}

#[async_trait]
impl GameRecordStore for InMemoryGameRecordStore {
    async fn create(&self, record: NewGameRecord) -> Result<GameRecordId, DomainError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(DomainError::new(
                ErrorCode::StorageError,
                "game record store unavailable",
            )
            .with_detail("session_id", record.session_id.to_string()));
        }

        let id = GameRecordId::new();
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<GameRecordId>, DomainError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|(_, record)| &record.session_id == session_id)
            .map(|(id, _)| *id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ParticipantId, Timestamp};
    use crate::domain::game::TimeControl;

    fn record(session_id: SessionId) -> NewGameRecord {
        NewGameRecord {
            session_id,
            white: ParticipantId::new("alice").unwrap(),
            black: ParticipantId::new("bob").unwrap(),
            time_control: TimeControl::default(),
            tournament: false,
            created_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn create_then_find_by_session() {
        let store = InMemoryGameRecordStore::new();
        let session_id = SessionId::new();

        let id = store.create(record(session_id)).await.unwrap();

        assert_eq!(store.find_by_session(&session_id).await.unwrap(), Some(id));
        assert_eq!(store.get(&id).await.unwrap().session_id, session_id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_session_has_no_record() {
        let store = InMemoryGameRecordStore::new();
        assert_eq!(store.find_by_session(&SessionId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_store_reports_storage_error() {
        let store = InMemoryGameRecordStore::failing();
        let err = store.create(record(SessionId::new())).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StorageError);
        assert_eq!(store.len().await, 0);
    }
}

//! GameRecordStore port - External persistence of game records.
//!
//! Called once per session, asynchronously. Sessions start before this
//! resolves; the returned id is attached later.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, GameRecordId, ParticipantId, SessionId, Timestamp};
use crate::domain::game::TimeControl;

/// Data needed to create a game record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGameRecord {
    pub session_id: SessionId,
    pub white: ParticipantId,
    pub black: ParticipantId,
    pub time_control: TimeControl,
    pub tournament: bool,
    pub created_at: Timestamp,
}

/// Port for creating persisted game records.
#[async_trait]
pub trait GameRecordStore: Send + Sync {
    /// Persist a new record and return its id.
    async fn create(&self, record: NewGameRecord) -> Result<GameRecordId, DomainError>;

    /// Look up the record created for `session_id`, if any.
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<GameRecordId>, DomainError>;
}

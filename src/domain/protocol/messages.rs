//! Synchronization message vocabulary.
//!
//! One tagged union covers every kind exchanged between session owners.
//! Each variant carries exactly the fields its kind needs; frames are
//! decoded once, centrally, before dispatch.

use serde::{Deserialize, Serialize};

use crate::domain::chess::{Color, MoveIntent, Position};
use crate::domain::foundation::{GameRecordId, ParticipantId, SessionId, Timestamp};
use crate::domain::game::{ClockState, GameResult, TimeControl};

// ============================================
// Message Union
// ============================================

/// All message kinds carried over the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Propose a new session. The recipient may accept or ignore.
    Challenge(Challenge),

    /// Session created; both sides start it on receipt.
    ChallengeAccepted(ChallengeAccepted),

    /// Relay of one applied move.
    MovePlayed(MovePlayed),

    /// Forced teardown by an administrator.
    SessionTerminatedByAdmin(SessionTerminatedByAdmin),

    /// Forced teardown after a moderation action against one participant.
    OpponentBanned(OpponentBanned),

    /// Voluntary termination by the sender.
    OpponentResigned(OpponentResigned),

    TakebackRequested(TakebackMessage),
    TakebackAccepted(TakebackMessage),
    TakebackDeclined(TakebackMessage),

    /// The external game record for a session has been created.
    GameRecordAssigned(GameRecordAssigned),
}

/// Wire names of every kind, as they appear in the `type` field.
pub const MESSAGE_KINDS: &[&str] = &[
    "challenge",
    "challengeAccepted",
    "movePlayed",
    "sessionTerminatedByAdmin",
    "opponentBanned",
    "opponentResigned",
    "takebackRequested",
    "takebackAccepted",
    "takebackDeclined",
    "gameRecordAssigned",
];

impl SyncMessage {
    /// Wire name of this message's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Challenge(_) => "challenge",
            SyncMessage::ChallengeAccepted(_) => "challengeAccepted",
            SyncMessage::MovePlayed(_) => "movePlayed",
            SyncMessage::SessionTerminatedByAdmin(_) => "sessionTerminatedByAdmin",
            SyncMessage::OpponentBanned(_) => "opponentBanned",
            SyncMessage::OpponentResigned(_) => "opponentResigned",
            SyncMessage::TakebackRequested(_) => "takebackRequested",
            SyncMessage::TakebackAccepted(_) => "takebackAccepted",
            SyncMessage::TakebackDeclined(_) => "takebackDeclined",
            SyncMessage::GameRecordAssigned(_) => "gameRecordAssigned",
        }
    }

    /// Session this message concerns. `None` for challenges, which precede
    /// any session.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SyncMessage::Challenge(_) => None,
            SyncMessage::ChallengeAccepted(m) => Some(m.session_id),
            SyncMessage::MovePlayed(m) => Some(m.session_id),
            SyncMessage::SessionTerminatedByAdmin(m) => Some(m.session_id),
            SyncMessage::OpponentBanned(m) => Some(m.session_id),
            SyncMessage::OpponentResigned(m) => Some(m.session_id),
            SyncMessage::TakebackRequested(m)
            | SyncMessage::TakebackAccepted(m)
            | SyncMessage::TakebackDeclined(m) => Some(m.session_id),
            SyncMessage::GameRecordAssigned(m) => Some(m.session_id),
        }
    }
}

// ============================================
// Payloads
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub time_control: TimeControl,
    #[serde(default)]
    pub tournament: bool,
}

/// Which participant plays which color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAssignment {
    pub white: ParticipantId,
    pub black: ParticipantId,
}

impl ColorAssignment {
    /// Color assigned to `participant`, if named.
    pub fn color_of(&self, participant: &ParticipantId) -> Option<Color> {
        if participant == &self.white {
            Some(Color::White)
        } else if participant == &self.black {
            Some(Color::Black)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeAccepted {
    pub session_id: SessionId,
    /// Usually absent: persistence resolves later via `gameRecordAssigned`.
    #[serde(default)]
    pub persisted_game_id: Option<GameRecordId>,
    /// The accepting participant, i.e. the recipient's opponent.
    pub opponent_id: ParticipantId,
    pub opponent_name: String,
    pub time_control: TimeControl,
    pub colors: ColorAssignment,
    #[serde(default)]
    pub tournament: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePlayed {
    pub session_id: SessionId,
    #[serde(rename = "move")]
    pub intent: MoveIntent,
    pub resulting_position: Position,
    pub mover_participant_id: ParticipantId,
    /// 1-based ply number of this move.
    pub sequence_index: u32,
    /// Number of takebacks accepted before this move was played.
    #[serde(default)]
    pub generation: u32,
    pub applied_at: Timestamp,
    /// Mover's view of both clocks right after applying the move.
    pub clock: ClockState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTerminatedByAdmin {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentBanned {
    pub session_id: SessionId,
    pub banned_participant_id: ParticipantId,
    pub remaining_participant_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentResigned {
    pub session_id: SessionId,
    pub result: GameResult,
}

/// Payload shared by the three takeback kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakebackMessage {
    pub session_id: SessionId,
    pub sender_id: ParticipantId,
    /// Generation the negotiation refers to.
    #[serde(default)]
    pub generation: u32,
    /// Sequence index of the move to be taken back.
    pub sequence_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecordAssigned {
    pub session_id: SessionId,
    /// Participant whose persistence call produced the record.
    pub sender_id: ParticipantId,
    pub persisted_game_id: GameRecordId,
}

// ============================================
// Relay Envelope
// ============================================

/// Frame exchanged with the relay server: a message addressed to one
/// participant's broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub to: ParticipantId,
    pub message: SyncMessage,
}

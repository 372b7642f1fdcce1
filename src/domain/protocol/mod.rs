//! Synchronization protocol between session owners.

mod codec;
mod ledger;
mod messages;

pub use codec::{decode, decode_envelope, decode_value, encode, encode_envelope, ProtocolError};
pub use ledger::{DeliveryLedger, IdempotencyKey};
pub use messages::{
    Challenge, ChallengeAccepted, ColorAssignment, Envelope, GameRecordAssigned, MovePlayed,
    OpponentBanned, OpponentResigned, SessionTerminatedByAdmin, SyncMessage, TakebackMessage,
    MESSAGE_KINDS,
};

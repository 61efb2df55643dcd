//! Error taxonomy shared by the coordinator and its participants.
//!
//! Both enums travel on the wire (`session-error`, `negotiation-error`), so
//! they carry plain data only.

use crate::{ParticipantId, Phase, SessionCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session already exists")]
    AlreadyExists,

    #[error("session is full")]
    Full,

    #[error("participant is not in the session")]
    NotInSession,

    #[error("session code must be 4 to 8 letters or digits")]
    InvalidCode,

    #[error("display name must not be empty")]
    InvalidName,

    /// Intake is halted after an internal invariant violation.
    #[error("coordinator is not accepting sessions")]
    Unavailable,
}

#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum NegotiationError {
    #[error("{message} is not acceptable while {phase:?}")]
    ProtocolViolation { phase: Phase, message: String },

    #[error("negotiation phase timed out")]
    NegotiationTimeout,

    #[error("negotiation retry budget exhausted")]
    NegotiationFailed,

    #[error("media layer error: {0}")]
    Media(String),

    #[error("participant {0} is not reachable")]
    Undeliverable(ParticipantId),
}

/// Internal consistency failure of the session table. Never sent to clients.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("session {code} has {owners} owners")]
    OwnerCount { code: SessionCode, owners: usize },

    #[error("session {code} holds {members} members over capacity {capacity}")]
    OverCapacity {
        code: SessionCode,
        members: usize,
        capacity: usize,
    },

    #[error("session {code} lists participant {id} twice")]
    DuplicateMember { code: SessionCode, id: ParticipantId },

    #[error("session {code} is filed under {key}")]
    MisfiledSession { code: SessionCode, key: SessionCode },
}

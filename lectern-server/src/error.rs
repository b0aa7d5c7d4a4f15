use lectern_core::{LinkId, RoomId};
use thiserror::Error;

/// Signaling-level error taxonomy. `InvalidMessage` and `RoomNotFound` are
/// reported only to the offending client; `NegotiationTimeout` and
/// `TransportFailure` feed the retry-then-demote path; `RoleConflict` is
/// rejected at join time with no room-wide effect.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("room {0} already has a broadcaster")]
    RoleConflict(RoomId),

    #[error("unknown room: {0}")]
    RoomNotFound(RoomId),

    #[error("negotiation deadline exceeded for link {0}")]
    NegotiationTimeout(LinkId),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

pub type SignalResult<T> = Result<T, SignalError>;

impl From<webrtc::Error> for SignalError {
    fn from(e: webrtc::Error) -> Self {
        Self::TransportFailure(e.to_string())
    }
}

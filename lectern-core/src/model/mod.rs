mod link;
mod participant;
mod room;
mod signaling;
mod tier;

pub use link::{LinkId, NegotiationState};
pub use participant::{ParticipantId, Role};
pub use room::RoomId;
pub use signaling::SignalMessage;
pub use tier::{AudioConstraints, QualityTier};

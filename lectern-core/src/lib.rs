pub mod model;

pub use model::{
    AudioConstraints, LinkId, NegotiationState, ParticipantId, QualityTier, Role, RoomId,
    SignalMessage,
};

use lectern_core::{ParticipantId, QualityTier, Role};

/// Registry sub-state of a listener. `Waiting` means admitted but with no
/// negotiation in flight (room not live, or the single retry is exhausted).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ListenerPhase {
    Waiting,
    Negotiating,
    Connected,
}

/// One admitted room member. The signaling-channel handle lives in the
/// `SignalingService` peer table, keyed by the same id.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: Role,
    pub tier: QualityTier,
    pub phase: ListenerPhase,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: String, role: Role, tier: QualityTier) -> Self {
        Self {
            id,
            display_name,
            role,
            tier,
            phase: ListenerPhase::Waiting,
        }
    }
}

use lectern_core::{LinkId, NegotiationState, ParticipantId, QualityTier, Role};

/// Commands entering a room's event loop: client signaling mapped by the
/// WebSocket handler, plus the internal timers (negotiation watchdogs and
/// retry backoffs) posting back into the same serialized loop.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        user: ParticipantId,
        display_name: String,
        role: Role,
        tier: QualityTier,
    },
    Leave {
        user: ParticipantId,
    },
    BroadcastStart {
        user: ParticipantId,
    },
    BroadcastStop {
        user: ParticipantId,
    },
    Offer {
        from: ParticipantId,
        to: ParticipantId,
        sdp: String,
        seq: u64,
    },
    Answer {
        from: ParticipantId,
        to: ParticipantId,
        sdp: String,
        seq: u64,
    },
    Candidate {
        from: ParticipantId,
        to: ParticipantId,
        candidate: String,
    },
    /// Client-side transport status report.
    LinkReport {
        from: ParticipantId,
        link_id: LinkId,
        state: NegotiationState,
    },
    /// Answer/connectivity watchdog fired.
    Deadline {
        link: LinkId,
    },
    /// Retry backoff elapsed for a failed listener link.
    Retry {
        listener: ParticipantId,
    },
}

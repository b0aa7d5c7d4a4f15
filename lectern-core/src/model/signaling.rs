use crate::model::link::{LinkId, NegotiationState};
use crate::model::participant::{ParticipantId, Role};
use crate::model::room::RoomId;
use crate::model::tier::QualityTier;
use serde::{Deserialize, Serialize};

/// The complete signaling protocol. Every control message on the WebSocket
/// is one of these kinds; anything else is answered with `Error` rather
/// than silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "op",
    content = "d",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum SignalMessage {
    /// Client -> server: enter a room. Rooms are created on first join.
    Join {
        room_id: RoomId,
        user_id: ParticipantId,
        #[serde(default)]
        display_name: String,
        role: Role,
        #[serde(default)]
        tier: QualityTier,
    },
    /// Server -> client: join acknowledgment with the room's current state.
    Joined {
        room_id: RoomId,
        live: bool,
        listeners: usize,
    },
    /// The room went live; listeners should expect an offer.
    BroadcastStart {
        room_id: RoomId,
        broadcaster_id: ParticipantId,
    },
    /// Tears down every link in the room.
    BroadcastStop { room_id: RoomId },
    /// Server -> broadcaster: this listener needs an offer (new join into a
    /// live room, or the single post-failure retry).
    ListenerReady {
        room_id: RoomId,
        listener_id: ParticipantId,
        tier: QualityTier,
    },
    Offer {
        to: ParticipantId,
        from: ParticipantId,
        sdp: String,
        /// Monotonic negotiation sequence; the higher seq wins a glare race.
        seq: u64,
    },
    Answer {
        to: ParticipantId,
        from: ParticipantId,
        sdp: String,
        seq: u64,
    },
    IceCandidate {
        to: ParticipantId,
        from: ParticipantId,
        candidate: String,
    },
    /// Connection-status echo, both directions: clients report their local
    /// transport outcome (`connected`/`failed`); the supervisor echoes every
    /// transition it performs. `permanent: true` on `failed` means the retry
    /// is exhausted and the client should show "broadcast unavailable".
    LinkState {
        link_id: LinkId,
        peer_id: ParticipantId,
        state: NegotiationState,
        #[serde(default)]
        permanent: bool,
    },
    Leave {
        room_id: RoomId,
        user_id: ParticipantId,
    },
    Error { message: String },
}

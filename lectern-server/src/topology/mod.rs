mod mesh;
mod relay;
mod selector;

pub use mesh::*;
pub use relay::*;
pub use selector::*;

use crate::error::SignalResult;
use async_trait::async_trait;
use lectern_core::{AudioConstraints, ParticipantId, QualityTier};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Reserved peer id the relay answers under in forwarding topology.
/// Broadcasters address their upstream offer to it; listeners answer the
/// relay's downstream offers to it.
pub fn relay_peer() -> ParticipantId {
    ParticipantId::from("relay")
}

/// Media routing mode, fixed per deployment rather than per room so behavior
/// stays predictable.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Topology {
    /// Broadcaster opens one peer connection per listener; the server only
    /// relays signaling. Upload bandwidth scales with listener count.
    Mesh,
    /// Broadcaster sends once to a relay that fans out independent
    /// downstream connections per listener.
    Forwarding,
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mesh" => Ok(Self::Mesh),
            "forwarding" | "sfu" => Ok(Self::Forwarding),
            other => Err(format!("unknown topology: {other}")),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh => write!(f, "mesh"),
            Self::Forwarding => write!(f, "forwarding"),
        }
    }
}

/// The seam that keeps the negotiation state machine topology-agnostic: the
/// room event loop drives one `MediaLink` per listener either way and calls
/// into the driver for the media-side work. The mesh driver moves SDP and
/// candidates between clients verbatim; the relay driver terminates them.
#[async_trait]
pub trait TopologyDriver: Send + Sync {
    /// Kick off negotiation toward a listener. Returns `true` when the
    /// driver itself emitted the offer (forwarding); `false` when the
    /// broadcaster was solicited and the offer will arrive over signaling.
    async fn solicit_offer(
        &mut self,
        broadcaster: &ParticipantId,
        listener: &ParticipantId,
        tier: QualityTier,
        seq: u64,
    ) -> SignalResult<bool>;

    async fn handle_offer(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        sdp: String,
        seq: u64,
        constraints: &AudioConstraints,
    ) -> SignalResult<()>;

    async fn handle_answer(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        sdp: String,
        seq: u64,
    ) -> SignalResult<()>;

    async fn deliver_candidate(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        candidate: String,
    ) -> SignalResult<()>;

    /// Last observed media activity on a listener's leg. Mesh has no media
    /// visibility and returns `None`; the supervisor then falls back to
    /// signaling keepalives.
    fn activity(&self, listener: &ParticipantId) -> Option<Instant>;

    async fn drop_listener(&mut self, listener: &ParticipantId);

    /// Tear down all media-side state. The driver stays usable for a later
    /// broadcast-start in the same room.
    async fn shutdown(&mut self);
}

use async_trait::async_trait;
use lectern_core::{ParticipantId, SignalMessage};

/// Outbound half of the signaling channel: everything the room loops and
/// the supervisor emit toward clients goes through this seam, which is what
/// the integration tests mock.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send(&self, to: &ParticipantId, msg: SignalMessage);
}

use crate::error::SignalResult;
use crate::signaling::SignalingOutput;
use crate::topology::TopologyDriver;
use async_trait::async_trait;
use lectern_core::{AudioConstraints, ParticipantId, QualityTier, RoomId, SignalMessage};
use std::sync::Arc;
use std::time::Instant;

/// Mesh routing: the server never touches media. SDP and candidates pass
/// between broadcaster and listener verbatim; `solicit_offer` asks the
/// broadcaster's client for a fresh offer via `listener-ready`.
pub struct MeshDriver {
    room: RoomId,
    signaling: Arc<dyn SignalingOutput>,
}

impl MeshDriver {
    pub fn new(room: RoomId, signaling: Arc<dyn SignalingOutput>) -> Self {
        Self { room, signaling }
    }
}

#[async_trait]
impl TopologyDriver for MeshDriver {
    async fn solicit_offer(
        &mut self,
        broadcaster: &ParticipantId,
        listener: &ParticipantId,
        tier: QualityTier,
        _seq: u64,
    ) -> SignalResult<bool> {
        self.signaling
            .send(
                broadcaster,
                SignalMessage::ListenerReady {
                    room_id: self.room.clone(),
                    listener_id: listener.clone(),
                    tier,
                },
            )
            .await;
        Ok(false)
    }

    async fn handle_offer(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        sdp: String,
        seq: u64,
        _constraints: &AudioConstraints,
    ) -> SignalResult<()> {
        self.signaling
            .send(
                to,
                SignalMessage::Offer {
                    to: to.clone(),
                    from: from.clone(),
                    sdp,
                    seq,
                },
            )
            .await;
        Ok(())
    }

    async fn handle_answer(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        sdp: String,
        seq: u64,
    ) -> SignalResult<()> {
        self.signaling
            .send(
                to,
                SignalMessage::Answer {
                    to: to.clone(),
                    from: from.clone(),
                    sdp,
                    seq,
                },
            )
            .await;
        Ok(())
    }

    async fn deliver_candidate(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        candidate: String,
    ) -> SignalResult<()> {
        self.signaling
            .send(
                to,
                SignalMessage::IceCandidate {
                    to: to.clone(),
                    from: from.clone(),
                    candidate,
                },
            )
            .await;
        Ok(())
    }

    fn activity(&self, _listener: &ParticipantId) -> Option<Instant> {
        None
    }

    async fn drop_listener(&mut self, _listener: &ParticipantId) {}

    async fn shutdown(&mut self) {}
}

use crate::error::{SignalError, SignalResult};
use crate::signaling::SignalingOutput;
use crate::topology::{TopologyDriver, relay_peer};
use crate::transport::{AudioTransport, TransportConfig, TransportEvent, opus_capability};
use async_trait::async_trait;
use lectern_core::{AudioConstraints, ParticipantId, QualityTier, RoomId, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::rtp::packet::Packet;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

const FANOUT_CAPACITY: usize = 512;

/// Millisecond-resolution last-activity stamp a forwarder task can update
/// from inside its packet loop without locking.
#[derive(Clone)]
pub struct ActivityStamp {
    epoch: Instant,
    millis: Arc<AtomicU64>,
}

impl ActivityStamp {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            millis: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.millis.store(elapsed, Ordering::Relaxed);
    }

    pub fn last(&self) -> Instant {
        self.epoch + Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }
}

impl Default for ActivityStamp {
    fn default() -> Self {
        Self::new()
    }
}

struct Downstream {
    transport: AudioTransport,
    activity: ActivityStamp,
    forwarder: JoinHandle<()>,
}

/// Forwarding routing: the relay owns exactly one upstream leg from the
/// broadcaster and N independent downstream legs, one per listener. Incoming
/// RTP fans out over a broadcast channel; each downstream forwarder writes
/// its own copy, so one slow or dead listener never stalls its siblings.
pub struct RelayDriver {
    room: RoomId,
    signaling: Arc<dyn SignalingOutput>,
    config: TransportConfig,
    events: mpsc::Sender<TransportEvent>,
    rtp_tx: broadcast::Sender<Packet>,
    upstream: Option<AudioTransport>,
    downstreams: HashMap<ParticipantId, Downstream>,
    // Broadcaster candidates that beat the upstream offer.
    pending_upstream: Vec<String>,
}

impl RelayDriver {
    pub fn new(
        room: RoomId,
        signaling: Arc<dyn SignalingOutput>,
        config: TransportConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let (rtp_tx, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            room,
            signaling,
            config,
            events,
            rtp_tx,
            upstream: None,
            downstreams: HashMap::new(),
            pending_upstream: Vec::new(),
        }
    }

    async fn remove_downstream(&mut self, listener: &ParticipantId) {
        if let Some(down) = self.downstreams.remove(listener) {
            down.forwarder.abort();
            if let Err(e) = down.transport.close().await {
                debug!(room = %self.room, %listener, "downstream close: {e}");
            }
        }
    }
}

#[async_trait]
impl TopologyDriver for RelayDriver {
    async fn solicit_offer(
        &mut self,
        _broadcaster: &ParticipantId,
        listener: &ParticipantId,
        tier: QualityTier,
        seq: u64,
    ) -> SignalResult<bool> {
        // One-link-per-pair: a re-solicit replaces the previous leg.
        self.remove_downstream(listener).await;

        let constraints = tier.constraints();
        let transport = AudioTransport::new(
            listener.clone(),
            false,
            &self.config,
            &constraints,
            None,
            self.events.clone(),
        )
        .await
        .map_err(|e| SignalError::TransportFailure(e.to_string()))?;

        let track = Arc::new(TrackLocalStaticRTP::new(
            opus_capability(&constraints),
            "audio".to_owned(),
            "lectern".to_owned(),
        ));
        transport
            .add_output_track(track.clone())
            .await
            .map_err(|e| SignalError::TransportFailure(e.to_string()))?;

        let offer = transport
            .create_offer()
            .await
            .map_err(|e| SignalError::TransportFailure(e.to_string()))?;

        let activity = ActivityStamp::new();
        let stamp = activity.clone();
        let mut rtp_rx = self.rtp_tx.subscribe();
        let forwarder = tokio::spawn(async move {
            loop {
                match rtp_rx.recv().await {
                    Ok(packet) => {
                        stamp.touch();
                        if track.write_rtp(&packet).await.is_err() {
                            break;
                        }
                    }
                    // A lagged receiver skips packets; audio is lossy-tolerant.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.downstreams.insert(
            listener.clone(),
            Downstream {
                transport,
                activity,
                forwarder,
            },
        );

        self.signaling
            .send(
                listener,
                SignalMessage::Offer {
                    to: listener.clone(),
                    from: relay_peer(),
                    sdp: offer,
                    seq,
                },
            )
            .await;
        Ok(true)
    }

    async fn handle_offer(
        &mut self,
        from: &ParticipantId,
        _to: &ParticipantId,
        sdp: String,
        seq: u64,
        constraints: &AudioConstraints,
    ) -> SignalResult<()> {
        // The broadcaster's offer (re)creates the upstream leg.
        if let Some(old) = self.upstream.take() {
            let _ = old.close().await;
        }

        let transport = AudioTransport::new(
            from.clone(),
            true,
            &self.config,
            constraints,
            Some(self.rtp_tx.clone()),
            self.events.clone(),
        )
        .await
        .map_err(|e| SignalError::TransportFailure(e.to_string()))?;

        let answer = transport
            .accept_offer(sdp)
            .await
            .map_err(|e| SignalError::TransportFailure(e.to_string()))?;

        for candidate in self.pending_upstream.drain(..) {
            if let Err(e) = transport.add_ice_candidate(candidate).await {
                warn!(room = %self.room, "buffered upstream candidate: {e}");
            }
        }
        self.upstream = Some(transport);
        info!(room = %self.room, broadcaster = %from, "upstream leg negotiated");

        self.signaling
            .send(
                from,
                SignalMessage::Answer {
                    to: from.clone(),
                    from: relay_peer(),
                    sdp: answer,
                    seq,
                },
            )
            .await;
        Ok(())
    }

    async fn handle_answer(
        &mut self,
        from: &ParticipantId,
        _to: &ParticipantId,
        sdp: String,
        _seq: u64,
    ) -> SignalResult<()> {
        let down = self.downstreams.get(from).ok_or_else(|| {
            SignalError::InvalidMessage(format!("no downstream leg for {from}"))
        })?;
        down.transport
            .apply_answer(sdp)
            .await
            .map_err(|e| SignalError::TransportFailure(e.to_string()))
    }

    async fn deliver_candidate(
        &mut self,
        from: &ParticipantId,
        _to: &ParticipantId,
        candidate: String,
    ) -> SignalResult<()> {
        // Route by origin: listeners feed their downstream leg, the
        // broadcaster feeds the upstream leg.
        if let Some(down) = self.downstreams.get(from) {
            return down
                .transport
                .add_ice_candidate(candidate)
                .await
                .map_err(|e| SignalError::TransportFailure(e.to_string()));
        }
        match &self.upstream {
            Some(up) => up
                .add_ice_candidate(candidate)
                .await
                .map_err(|e| SignalError::TransportFailure(e.to_string())),
            None => {
                self.pending_upstream.push(candidate);
                Ok(())
            }
        }
    }

    fn activity(&self, listener: &ParticipantId) -> Option<Instant> {
        self.downstreams.get(listener).map(|d| d.activity.last())
    }

    async fn drop_listener(&mut self, listener: &ParticipantId) {
        self.remove_downstream(listener).await;
    }

    async fn shutdown(&mut self) {
        let listeners: Vec<_> = self.downstreams.keys().cloned().collect();
        for listener in listeners {
            self.remove_downstream(&listener).await;
        }
        if let Some(up) = self.upstream.take() {
            let _ = up.close().await;
        }
        self.pending_upstream.clear();
    }
}

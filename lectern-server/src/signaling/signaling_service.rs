use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use lectern_core::{ParticipantId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Maps connected participants to their WebSocket send halves. One persistent
/// duplex channel per client; no signaling state survives a disconnect.
#[derive(Clone)]
pub struct SignalingService {
    peers: Arc<DashMap<ParticipantId, mpsc::UnboundedSender<Message>>>,
}

impl SignalingService {
    pub fn new() -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
        }
    }

    pub fn add_peer(&self, peer_id: ParticipantId, tx: mpsc::UnboundedSender<Message>) {
        self.peers.insert(peer_id, tx);
    }

    pub fn remove_peer(&self, peer_id: &ParticipantId) {
        self.peers.remove(peer_id);
    }

    pub fn send_signal(&self, peer_id: &ParticipantId, msg: &SignalMessage) {
        if let Some(peer) = self.peers.get(peer_id) {
            match serde_json::to_string(msg) {
                Ok(json) => {
                    if let Err(e) = peer.send(Message::Text(json.into())) {
                        error!("failed to send WS message to {peer_id}: {e:?}");
                    }
                }
                Err(e) => error!("failed to serialize signal message: {e}"),
            }
        } else {
            warn!("attempted to send signal to disconnected participant {peer_id}");
        }
    }
}

impl Default for SignalingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn send(&self, to: &ParticipantId, msg: SignalMessage) {
        self.send_signal(to, &msg);
    }
}

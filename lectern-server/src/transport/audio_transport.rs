use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::TransportEvent;
use anyhow::{Context, Result};
use lectern_core::{AudioConstraints, ParticipantId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_remote::TrackRemote;

/// Opus codec capability shaped by the bandwidth policy. Opus on the wire is
/// always 48 kHz / 2 channels at the RTP layer; the tier lives in the fmtp
/// parameters the policy engine renders.
pub fn opus_capability(constraints: &AudioConstraints) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: 48_000,
        channels: 2,
        sdp_fmtp_line: constraints.fmtp_line(),
        rtcp_feedback: vec![],
    }
}

/// One relay leg: either the single upstream connection from the broadcaster
/// or one of the independent downstream connections toward a listener.
/// Adapted per-leg events are pushed into the room loop over `event_tx`.
pub struct AudioTransport {
    pub peer: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
}

impl AudioTransport {
    /// `inbound`: for the upstream leg, the fanout channel incoming RTP is
    /// published to. Downstream legs pass `None` and attach an output track.
    pub async fn new(
        peer: ParticipantId,
        upstream: bool,
        config: &TransportConfig,
        constraints: &AudioConstraints,
        inbound: Option<broadcast::Sender<Packet>>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_codec(
            RTCRtpCodecParameters {
                capability: opus_capability(constraints),
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let mut setting = SettingEngine::default();
        if let Some(ip) = &config.public_ip {
            // Advertise the externally reachable address instead of the
            // container/host-internal one.
            setting.set_nat_1to1_ips(vec![ip.clone()], RTCIceCandidateType::Host);
        }

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.stun_urls.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = event_tx.clone();
        let state_peer = peer.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let peer = state_peer.clone();
                Box::pin(async move {
                    info!(%peer, state = ?s, upstream, "relay leg state change");
                    let event = match s {
                        RTCPeerConnectionState::Connected => {
                            if upstream {
                                Some(TransportEvent::UpstreamEstablished)
                            } else {
                                Some(TransportEvent::DownstreamEstablished(peer))
                            }
                        }
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => {
                            if upstream {
                                Some(TransportEvent::UpstreamLost)
                            } else {
                                Some(TransportEvent::DownstreamLost(peer))
                            }
                        }
                        _ => None,
                    };
                    if let Some(event) = event {
                        let _ = tx.send(event).await;
                    }
                })
            },
        ));

        // Trickle ICE: hand locally gathered candidates to the room loop,
        // which signals them to the remote peer.
        let ice_tx = event_tx.clone();
        let ice_peer = peer.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let target = ice_peer.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(json_candidate) = candidate.to_json() else {
                    return;
                };
                let Ok(candidate) = serde_json::to_string(&json_candidate) else {
                    return;
                };
                let _ = tx
                    .send(TransportEvent::CandidateReady { target, candidate })
                    .await;
            })
        }));

        if let Some(rtp_tx) = inbound {
            let track_peer = peer.clone();
            peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
                let rtp_tx = rtp_tx.clone();
                let peer = track_peer.clone();
                Box::pin(async move {
                    debug!(%peer, codec = ?track.codec().capability.mime_type, "upstream track arrived");
                    // send() only fails with no subscribers; fine during the
                    // window before the first downstream attaches.
                    while let Ok((packet, _)) = track.read_rtp().await {
                        let _ = rtp_tx.send(packet);
                    }
                    debug!(%peer, "upstream track ended");
                })
            }));
        }

        Ok(Self {
            peer,
            peer_connection,
        })
    }

    /// Attach the outgoing copy of the broadcast audio (downstream legs).
    /// Must happen before `create_offer` so the track lands in the SDP.
    pub async fn add_output_track(&self, track: Arc<TrackLocalStaticRTP>) -> Result<()> {
        let sender = self
            .peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // Drain RTCP so the interceptors keep processing reports.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while let Ok((_, _)) = sender.read(&mut buf).await {}
        });
        Ok(())
    }

    /// Apply the broadcaster's offer and produce the relay answer (upstream).
    pub async fn accept_offer(&self, sdp: String) -> Result<String> {
        let desc = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(desc).await?;
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    /// Create the relay's offer toward a listener (downstream).
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    pub async fn apply_answer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    pub async fn add_ice_candidate(&self, candidate_json: String) -> Result<()> {
        let candidate: webrtc::ice_transport::ice_candidate::RTCIceCandidateInit =
            serde_json::from_str(&candidate_json).context("failed to parse ICE candidate JSON")?;
        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

pub mod membership_tests;
pub mod negotiation_tests;
pub mod supervision_tests;

use lectern_core::{LinkId, ParticipantId, QualityTier, Role, RoomId, SignalMessage};
use lectern_server::{Room, RoomCommand, ServerConfig, SessionRegistry, Timings, Topology};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Level;

use crate::utils::MockSignalingOutput;

pub const TEACHER: &str = "teacher-1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One room task running over mock signaling, mesh topology. All tests talk
/// to it through room commands, exactly as the WebSocket handler would.
pub struct TestRoom {
    pub tx: mpsc::Sender<RoomCommand>,
    pub signals: MockSignalingOutput,
    pub registry: SessionRegistry,
    pub room_id: RoomId,
}

pub fn create_test_room(timings: Timings) -> TestRoom {
    let cfg = ServerConfig {
        timings,
        ..ServerConfig::default()
    };
    let room_id = RoomId::from("classroom-1");
    let registry = SessionRegistry::new();
    let signals = MockSignalingOutput::new();
    let (tx, rx) = mpsc::channel(100);

    let room = Room::new(
        room_id.clone(),
        &cfg,
        Topology::Mesh,
        registry.clone(),
        Arc::new(signals.clone()),
        rx,
        tx.clone(),
    );
    tokio::spawn(room.run());

    TestRoom {
        tx,
        signals,
        registry,
        room_id,
    }
}

impl TestRoom {
    pub async fn send(&self, cmd: RoomCommand) {
        self.tx.send(cmd).await.expect("room task should be alive");
    }

    pub async fn join_broadcaster(&self, id: &str) {
        self.send(RoomCommand::Join {
            user: ParticipantId::from(id),
            display_name: id.to_owned(),
            role: Role::Broadcaster,
            tier: QualityTier::Normal,
        })
        .await;
    }

    pub async fn join_listener(&self, id: &str) {
        self.send(RoomCommand::Join {
            user: ParticipantId::from(id),
            display_name: id.to_owned(),
            role: Role::Listener,
            tier: QualityTier::Normal,
        })
        .await;
    }

    pub async fn go_live(&self) {
        self.send(RoomCommand::BroadcastStart {
            user: ParticipantId::from(TEACHER),
        })
        .await;
    }

    /// Drives one listener through the whole mesh negotiation: solicitation,
    /// offer, answer, connected report. Returns the link id.
    pub async fn connect_listener(&self, listener: &str, seq: u64) -> LinkId {
        let listener_id = ParticipantId::from(listener);
        let broadcaster = ParticipantId::from(TEACHER);

        self.signals
            .wait_for(2000, |p, m| {
                p == &broadcaster
                    && matches!(m, SignalMessage::ListenerReady { listener_id: l, .. } if l == &listener_id)
            })
            .await
            .expect("broadcaster should be solicited for an offer");

        let link_id = match self
            .signals
            .wait_for(2000, |p, m| {
                p == &listener_id && matches!(m, SignalMessage::LinkState { .. })
            })
            .await
        {
            Some(SignalMessage::LinkState { link_id, .. }) => link_id,
            other => panic!("expected link announcement, got {other:?}"),
        };

        self.send(RoomCommand::Offer {
            from: broadcaster.clone(),
            to: listener_id.clone(),
            sdp: format!("offer-for-{listener}"),
            seq,
        })
        .await;
        self.signals
            .wait_for(2000, |p, m| {
                p == &listener_id && matches!(m, SignalMessage::Offer { seq: s, .. } if *s == seq)
            })
            .await
            .expect("listener should receive the offer");

        self.send(RoomCommand::Answer {
            from: listener_id.clone(),
            to: broadcaster.clone(),
            sdp: format!("answer-from-{listener}"),
            seq,
        })
        .await;
        self.signals
            .wait_for(2000, |p, m| {
                p == &broadcaster
                    && matches!(m, SignalMessage::Answer { from, .. } if from == &listener_id)
            })
            .await
            .expect("broadcaster should receive the answer");

        self.send(RoomCommand::LinkReport {
            from: listener_id.clone(),
            link_id,
            state: lectern_core::NegotiationState::Connected,
        })
        .await;
        self.signals
            .wait_for(2000, |p, m| {
                p == &listener_id
                    && matches!(
                        m,
                        SignalMessage::LinkState {
                            state: lectern_core::NegotiationState::Connected,
                            ..
                        }
                    )
            })
            .await
            .expect("connected transition should be echoed to the listener");

        link_id
    }
}

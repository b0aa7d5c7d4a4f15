use lectern_core::{NegotiationState, ParticipantId, SignalMessage};
use lectern_server::{RoomCommand, Timings};
use lectern_server::registry::ListenerPhase;
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

/// One listener's transport failure never disturbs the others.
#[tokio::test]
async fn test_failed_listener_leaves_others_connected() {
    init_tracing();
    let room = create_test_room(Timings {
        // Keep the automatic retry out of the way.
        retry_backoff: Duration::from_secs(30),
        ..Timings::default()
    });
    let s2 = ParticipantId::from("student-2");

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;
    let mut links = Vec::new();
    for (i, name) in ["student-1", "student-2", "student-3"].iter().enumerate() {
        room.join_listener(name).await;
        links.push(room.connect_listener(name, (i + 1) as u64).await);
    }

    room.send(RoomCommand::LinkReport {
        from: s2.clone(),
        link_id: links[1],
        state: NegotiationState::Failed,
    })
    .await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &s2
                && matches!(
                    m,
                    SignalMessage::LinkState {
                        state: NegotiationState::Failed,
                        ..
                    }
                )
        })
        .await
        .expect("failure echoed to the affected listener");

    // The bystanders saw nothing.
    for name in ["student-1", "student-3"] {
        let peer = ParticipantId::from(name);
        let failures = room
            .signals
            .count_matching(|p, m| {
                p == &peer
                    && matches!(
                        m,
                        SignalMessage::LinkState {
                            state: NegotiationState::Failed,
                            ..
                        }
                    )
            })
            .await;
        assert_eq!(failures, 0, "{name} must not observe the failure");
        assert_eq!(
            room.registry.listener_phase(&room.room_id, &peer),
            Some(ListenerPhase::Connected)
        );
    }

    assert!(room.registry.is_live(&room.room_id));
    assert_eq!(room.registry.list_listeners(&room.room_id).len(), 3);
}

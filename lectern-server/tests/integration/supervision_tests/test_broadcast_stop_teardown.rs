use lectern_core::{NegotiationState, ParticipantId, SignalMessage};
use lectern_server::{RoomCommand, Timings};
use lectern_server::registry::ListenerPhase;
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

/// `broadcast-stop` closes every link atomically, notifies every listener
/// and resets their phases. A duplicate stop changes nothing.
#[tokio::test]
async fn test_stop_closes_all_links_and_is_idempotent() {
    init_tracing();
    let room = create_test_room(Timings::default());

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;
    for (i, name) in ["student-1", "student-2"].iter().enumerate() {
        room.join_listener(name).await;
        room.connect_listener(name, (i + 1) as u64).await;
    }

    room.send(RoomCommand::BroadcastStop {
        user: ParticipantId::from(TEACHER),
    })
    .await;

    for name in ["student-1", "student-2"] {
        let peer = ParticipantId::from(name);
        room.signals
            .wait_for(2000, |p, m| {
                p == &peer && matches!(m, SignalMessage::BroadcastStop { .. })
            })
            .await
            .expect("every listener should be notified");
        room.signals
            .wait_for(2000, |p, m| {
                p == &peer
                    && matches!(
                        m,
                        SignalMessage::LinkState {
                            state: NegotiationState::Closed,
                            ..
                        }
                    )
            })
            .await
            .expect("every link should close");
        assert_eq!(
            room.registry.listener_phase(&room.room_id, &peer),
            Some(ListenerPhase::Waiting)
        );
    }
    assert!(!room.registry.is_live(&room.room_id));

    // Second stop: nothing left to tear down, no further notifications.
    room.send(RoomCommand::BroadcastStop {
        user: ParticipantId::from(TEACHER),
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stops = room
        .signals
        .count_matching(|_, m| matches!(m, SignalMessage::BroadcastStop { .. }))
        .await;
    assert_eq!(stops, 2, "one notification per listener, once");
}

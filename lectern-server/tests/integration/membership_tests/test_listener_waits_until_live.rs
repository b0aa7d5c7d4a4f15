use lectern_core::{ParticipantId, SignalMessage};
use lectern_server::Timings;
use lectern_server::registry::ListenerPhase;
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

#[tokio::test]
async fn test_listener_waits_until_broadcast_starts() {
    init_tracing();
    let room = create_test_room(Timings::default());
    let s1 = ParticipantId::from("student-1");

    room.join_broadcaster(TEACHER).await;
    room.join_listener("student-1").await;

    let ack = room
        .signals
        .wait_for(2000, |p, m| p == &s1 && matches!(m, SignalMessage::Joined { .. }))
        .await
        .expect("listener should be admitted");
    match ack {
        SignalMessage::Joined { live, .. } => assert!(!live, "room must not be live yet"),
        other => panic!("unexpected message: {other:?}"),
    }

    // No negotiation while the room is dormant.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let solicits = room
        .signals
        .count_matching(|_, m| matches!(m, SignalMessage::ListenerReady { .. }))
        .await;
    assert_eq!(solicits, 0, "no offer may be solicited before go-live");
    assert_eq!(
        room.registry.listener_phase(&room.room_id, &s1),
        Some(ListenerPhase::Waiting)
    );

    room.go_live().await;

    room.signals
        .wait_for(2000, |p, m| {
            p == &s1 && matches!(m, SignalMessage::BroadcastStart { .. })
        })
        .await
        .expect("waiting listener should be told the broadcast started");
    room.signals
        .wait_for(2000, |p, m| {
            p == &ParticipantId::from(TEACHER)
                && matches!(m, SignalMessage::ListenerReady { listener_id, .. } if listener_id == &s1)
        })
        .await
        .expect("broadcaster should be asked to offer to the waiting listener");
}

use lectern_core::{ParticipantId, SignalMessage};
use lectern_server::Timings;
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

#[tokio::test]
async fn test_rapid_rejoin_does_not_duplicate_negotiation() {
    init_tracing();
    let room = create_test_room(Timings::default());
    let s1 = ParticipantId::from("student-1");

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;
    room.join_listener("student-1").await;

    room.signals
        .wait_for(2000, |p, m| {
            p == &ParticipantId::from(TEACHER)
                && matches!(m, SignalMessage::ListenerReady { listener_id, .. } if listener_id == &s1)
        })
        .await
        .expect("first join should solicit an offer");

    // Reconnect race: the same listener joins again while negotiation is in
    // flight. The existing link must survive untouched.
    room.join_listener("student-1").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let acks = room
        .signals
        .count_matching(|p, m| p == &s1 && matches!(m, SignalMessage::Joined { .. }))
        .await;
    assert_eq!(acks, 2, "every join gets an acknowledgment");

    let solicits = room
        .signals
        .count_matching(|_, m| {
            matches!(m, SignalMessage::ListenerReady { listener_id, .. } if listener_id == &s1)
        })
        .await;
    assert_eq!(solicits, 1, "the in-flight link must not be replaced");
}

use lectern_core::{ParticipantId, SignalMessage};
use lectern_server::{RoomCommand, Timings};
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

/// Simultaneous renegotiation resolves deterministically: the higher
/// sequence number wins, the loser's offer is discarded.
#[tokio::test]
async fn test_lower_seq_offer_loses_glare() {
    init_tracing();
    let room = create_test_room(Timings::default());
    let teacher = ParticipantId::from(TEACHER);
    let s1 = ParticipantId::from("student-1");

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;
    room.join_listener("student-1").await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &teacher && matches!(m, SignalMessage::ListenerReady { .. })
        })
        .await
        .expect("solicitation");

    room.send(RoomCommand::Offer {
        from: teacher.clone(),
        to: s1.clone(),
        sdp: "offer-5".into(),
        seq: 5,
    })
    .await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &s1 && matches!(m, SignalMessage::Offer { seq: 5, .. })
        })
        .await
        .expect("first offer forwarded");

    // A stale concurrent offer with a lower seq must vanish.
    room.send(RoomCommand::Offer {
        from: teacher.clone(),
        to: s1.clone(),
        sdp: "offer-3".into(),
        seq: 3,
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        room.signals
            .count_matching(|p, m| p == &s1 && matches!(m, SignalMessage::Offer { .. }))
            .await,
        1,
        "losing offer must not reach the listener"
    );

    // A genuine renegotiation with a higher seq replaces the exchange.
    room.send(RoomCommand::Offer {
        from: teacher.clone(),
        to: s1.clone(),
        sdp: "offer-7".into(),
        seq: 7,
    })
    .await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &s1 && matches!(m, SignalMessage::Offer { seq: 7, .. })
        })
        .await
        .expect("higher seq offer wins");

    // An answer to the superseded offer is quietly dropped.
    room.send(RoomCommand::Answer {
        from: s1.clone(),
        to: teacher.clone(),
        sdp: "answer-5".into(),
        seq: 5,
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        room.signals
            .count_matching(|p, m| p == &teacher && matches!(m, SignalMessage::Answer { .. }))
            .await,
        0
    );

    // The answer matching the winning offer completes negotiation.
    room.send(RoomCommand::Answer {
        from: s1.clone(),
        to: teacher.clone(),
        sdp: "answer-7".into(),
        seq: 7,
    })
    .await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &teacher && matches!(m, SignalMessage::Answer { seq: 7, .. })
        })
        .await
        .expect("matching answer forwarded");
}

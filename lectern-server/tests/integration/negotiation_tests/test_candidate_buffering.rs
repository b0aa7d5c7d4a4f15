use lectern_core::{ParticipantId, SignalMessage};
use lectern_server::{RoomCommand, Timings};
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

/// Candidates that race ahead of the SDP they belong to are held and
/// replayed in order, never dropped and never forwarded early.
#[tokio::test]
async fn test_early_candidates_are_held_until_descriptions_exist() {
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

    // Broadcaster candidate before its own offer: the listener has no
    // remote description yet.
    room.send(RoomCommand::Candidate {
        from: teacher.clone(),
        to: s1.clone(),
        candidate: "cand-b1".into(),
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        room.signals
            .count_matching(|p, m| p == &s1 && matches!(m, SignalMessage::IceCandidate { .. }))
            .await,
        0,
        "candidate must wait for the offer"
    );

    room.send(RoomCommand::Offer {
        from: teacher.clone(),
        to: s1.clone(),
        sdp: "offer-sdp".into(),
        seq: 1,
    })
    .await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &s1
                && matches!(m, SignalMessage::IceCandidate { candidate, .. } if candidate == "cand-b1")
        })
        .await
        .expect("held candidate should be replayed after the offer");

    // Listener candidates before the answer: the broadcaster has no remote
    // description yet.
    for c in ["cand-l1", "cand-l2"] {
        room.send(RoomCommand::Candidate {
            from: s1.clone(),
            to: teacher.clone(),
            candidate: c.into(),
        })
        .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        room.signals
            .count_matching(|p, m| p == &teacher
                && matches!(m, SignalMessage::IceCandidate { .. }))
            .await,
        0,
        "candidates must wait for the answer"
    );

    room.send(RoomCommand::Answer {
        from: s1.clone(),
        to: teacher.clone(),
        sdp: "answer-sdp".into(),
        seq: 1,
    })
    .await;
    room.signals
        .wait_for(2000, |p, m| {
            p == &teacher
                && matches!(m, SignalMessage::IceCandidate { candidate, .. } if candidate == "cand-l2")
        })
        .await
        .expect("held candidates should be replayed after the answer");

    let replayed: Vec<String> = room
        .signals
        .messages_for(&teacher)
        .await
        .into_iter()
        .filter_map(|m| match m {
            SignalMessage::IceCandidate { candidate, .. } => Some(candidate),
            _ => None,
        })
        .collect();
    assert_eq!(replayed, vec!["cand-l1".to_string(), "cand-l2".to_string()]);
}

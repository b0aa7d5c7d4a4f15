use lectern_core::{NegotiationState, ParticipantId, SignalMessage};
use lectern_server::Timings;
use lectern_server::registry::ListenerPhase;
use std::time::Duration;

use crate::integration::{TEACHER, create_test_room, init_tracing};

fn fast_timings() -> Timings {
    Timings {
        answer_timeout: Duration::from_millis(150),
        retry_backoff: Duration::from_millis(50),
        idle_timeout: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(30),
    }
}

/// A negotiation that never completes gets exactly one retry, then the
/// listener is demoted to waiting with a permanent failure notice.
#[tokio::test]
async fn test_unanswered_offer_retries_once_then_demotes() {
    init_tracing();
    let room = create_test_room(fast_timings());
    let teacher = ParticipantId::from(TEACHER);
    let s1 = ParticipantId::from("student-1");

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;
    room.join_listener("student-1").await;

    // The broadcaster ignores both solicitations; the deadline does the rest.
    room.signals
        .wait_for(2000, |p, m| {
            p == &s1
                && matches!(
                    m,
                    SignalMessage::LinkState {
                        state: NegotiationState::Failed,
                        permanent: false,
                        ..
                    }
                )
        })
        .await
        .expect("first attempt should time out as retryable");

    room.signals
        .wait_for(2000, |p, m| {
            p == &s1
                && matches!(
                    m,
                    SignalMessage::LinkState {
                        state: NegotiationState::Failed,
                        permanent: true,
                        ..
                    }
                )
        })
        .await
        .expect("retry should time out as permanent");

    let solicits = room
        .signals
        .count_matching(|p, m| {
            p == &teacher
                && matches!(m, SignalMessage::ListenerReady { listener_id, .. } if listener_id == &s1)
        })
        .await;
    assert_eq!(solicits, 2, "one initial attempt plus exactly one retry");

    // Demoted, not evicted.
    assert_eq!(
        room.registry.listener_phase(&room.room_id, &s1),
        Some(ListenerPhase::Waiting)
    );
    assert!(room.registry.is_live(&room.room_id));
}

use lectern_core::{NegotiationState, ParticipantId, SignalMessage};
use lectern_server::Timings;
use lectern_server::registry::ListenerPhase;

use crate::integration::{TEACHER, create_test_room, init_tracing};

/// The whole happy path: one broadcaster, three listeners, every link
/// negotiated to `connected` over mesh signaling.
#[tokio::test]
async fn test_three_listeners_reach_connected() {
    init_tracing();
    let room = create_test_room(Timings::default());

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;

    for (i, name) in ["student-1", "student-2", "student-3"].iter().enumerate() {
        room.join_listener(name).await;
        room.connect_listener(name, (i + 1) as u64).await;
    }

    for name in ["student-1", "student-2", "student-3"] {
        assert_eq!(
            room.registry
                .listener_phase(&room.room_id, &ParticipantId::from(name)),
            Some(ListenerPhase::Connected),
            "{name} should be connected"
        );
    }

    // The broadcaster saw each connected transition exactly once.
    let announcements = room
        .signals
        .count_matching(|p, m| {
            p == &ParticipantId::from(TEACHER)
                && matches!(
                    m,
                    SignalMessage::LinkState {
                        state: NegotiationState::Connected,
                        ..
                    }
                )
        })
        .await;
    assert_eq!(announcements, 3);
}

use lectern_core::{ParticipantId, SignalMessage};
use lectern_server::{RoomCommand, Timings};

use crate::integration::{TEACHER, create_test_room, init_tracing};

#[tokio::test]
async fn test_broadcaster_leave_tears_the_room_down() {
    init_tracing();
    let room = create_test_room(Timings::default());
    let s1 = ParticipantId::from("student-1");

    room.join_broadcaster(TEACHER).await;
    room.go_live().await;
    room.join_listener("student-1").await;
    room.connect_listener("student-1", 1).await;

    room.send(RoomCommand::Leave {
        user: ParticipantId::from(TEACHER),
    })
    .await;

    room.signals
        .wait_for(2000, |p, m| {
            p == &s1 && matches!(m, SignalMessage::BroadcastStop { .. })
        })
        .await
        .expect("listeners should be told the broadcast ended");
    assert!(!room.registry.is_live(&room.room_id));
    assert_eq!(room.registry.broadcaster(&room.room_id), None);
    // The listener stays a member, waiting for a future broadcast.
    assert_eq!(room.registry.list_listeners(&room.room_id).len(), 1);
}

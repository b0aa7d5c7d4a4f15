use crate::config::ServerConfig;
use crate::registry::SessionRegistry;
use crate::room::{Room, RoomCommand};
use crate::signaling::SignalingOutput;
use crate::topology::MediaPathSelector;
use dashmap::DashMap;
use lectern_core::RoomId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Hands out the command sender for a room, creating the room task on first
/// use. Room tasks end themselves when their last participant leaves; the
/// map entry is dropped when the task finishes, so a later join recreates
/// the room from scratch.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
    config: Arc<ServerConfig>,
    selector: MediaPathSelector,
    registry: SessionRegistry,
    signaling: Arc<dyn SignalingOutput>,
}

impl RoomManager {
    pub fn new(
        config: Arc<ServerConfig>,
        selector: MediaPathSelector,
        registry: SessionRegistry,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            config,
            selector,
            registry,
            signaling,
        }
    }

    pub fn room_sender(&self, room_id: &RoomId) -> mpsc::Sender<RoomCommand> {
        if let Some(sender) = self.rooms.get(room_id) {
            return sender.clone();
        }

        let topology = self.selector.route_for_room(room_id);
        info!(room = %room_id, %topology, "creating room");

        let (tx, rx) = mpsc::channel(100);
        let room = Room::new(
            room_id.clone(),
            &self.config,
            topology,
            self.registry.clone(),
            self.signaling.clone(),
            rx,
            tx.clone(),
        );

        let rooms = self.rooms.clone();
        let room_id = room_id.clone();
        self.rooms.insert(room_id.clone(), tx.clone());
        tokio::spawn(async move {
            room.run().await;
            rooms.remove(&room_id);
        });

        tx
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

use crate::error::{SignalError, SignalResult};
use crate::registry::participant::{ListenerPhase, Participant};
use crate::registry::room_state::RoomState;
use dashmap::DashMap;
use lectern_core::{ParticipantId, RoomId};
use std::sync::Arc;
use tracing::info;

/// What a joiner sees of the room at admission time.
#[derive(Debug, Clone, Copy)]
pub struct JoinSnapshot {
    pub live: bool,
    pub listeners: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LeaveOutcome {
    pub was_broadcaster: bool,
    pub room_empty: bool,
}

/// Authoritative map of rooms to participants and roles. Knows nothing about
/// media. DashMap entry locking serializes operations per room; distinct
/// rooms proceed fully in parallel.
#[derive(Clone)]
pub struct SessionRegistry {
    rooms: Arc<DashMap<RoomId, RoomState>>,
    // Reverse index: a participant belongs to exactly one room at a time.
    index: Arc<DashMap<ParticipantId, RoomId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            index: Arc::new(DashMap::new()),
        }
    }

    /// Admits a participant, creating the room on first join. Fails with
    /// `RoleConflict` if a different broadcaster already holds the room, and
    /// with `InvalidMessage` if the participant is currently in another room.
    pub fn create_or_join_room(
        &self,
        room_id: &RoomId,
        participant: Participant,
    ) -> SignalResult<JoinSnapshot> {
        if let Some(current) = self.index.get(&participant.id)
            && current.value() != room_id
        {
            return Err(SignalError::InvalidMessage(format!(
                "participant {} is already in room {}",
                participant.id,
                current.value()
            )));
        }

        let pid = participant.id.clone();
        let mut room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!(room = %room_id, "creating room");
                RoomState::new(room_id.clone())
            });
        room.admit(participant)?;
        let snapshot = JoinSnapshot {
            live: room.live,
            listeners: room.listener_count(),
        };
        drop(room);

        self.index.insert(pid, room_id.clone());
        Ok(snapshot)
    }

    /// Removes a participant. Empty rooms are destroyed. The caller is
    /// responsible for the media-side teardown the outcome implies.
    pub fn leave_room(&self, room_id: &RoomId, id: &ParticipantId) -> SignalResult<LeaveOutcome> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;

        let was_broadcaster = room.broadcaster.as_ref() == Some(id);
        room.evict(id);
        if was_broadcaster {
            room.reset_listeners();
        }
        let room_empty = room.is_empty();
        drop(room);

        self.index.remove(id);
        if room_empty {
            info!(room = %room_id, "room empty, destroying");
            self.rooms.remove(room_id);
        }
        Ok(LeaveOutcome {
            was_broadcaster,
            room_empty,
        })
    }

    pub fn set_broadcaster(&self, room_id: &RoomId, id: &ParticipantId) -> SignalResult<()> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;
        room.claim_broadcaster(id)
    }

    pub fn broadcaster(&self, room_id: &RoomId) -> Option<ParticipantId> {
        self.rooms.get(room_id)?.broadcaster.clone()
    }

    pub fn set_live(&self, room_id: &RoomId, live: bool) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.live = live;
            if !live {
                room.reset_listeners();
            }
        }
    }

    pub fn is_live(&self, room_id: &RoomId) -> bool {
        self.rooms.get(room_id).map(|r| r.live).unwrap_or(false)
    }

    pub fn list_listeners(&self, room_id: &RoomId) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|r| r.listeners().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn participant_room(&self, id: &ParticipantId) -> Option<RoomId> {
        self.index.get(id).map(|r| r.value().clone())
    }

    pub fn participant(&self, room_id: &RoomId, id: &ParticipantId) -> Option<Participant> {
        self.rooms.get(room_id)?.get(id).cloned()
    }

    pub fn set_listener_phase(&self, room_id: &RoomId, id: &ParticipantId, phase: ListenerPhase) {
        if let Some(mut room) = self.rooms.get_mut(room_id)
            && let Some(p) = room.get_mut(id)
        {
            p.phase = phase;
        }
    }

    pub fn listener_phase(&self, room_id: &RoomId, id: &ParticipantId) -> Option<ListenerPhase> {
        Some(self.rooms.get(room_id)?.get(id)?.phase)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

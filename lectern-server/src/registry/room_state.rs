use crate::error::SignalError;
use crate::registry::participant::{ListenerPhase, Participant};
use lectern_core::{ParticipantId, Role, RoomId};
use std::collections::HashMap;

/// In-memory record of one room. Owned exclusively by the registry; all
/// mutation happens under the registry's per-room entry lock.
#[derive(Debug)]
pub struct RoomState {
    pub id: RoomId,
    pub broadcaster: Option<ParticipantId>,
    pub live: bool,
    participants: HashMap<ParticipantId, Participant>,
}

impl RoomState {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            broadcaster: None,
            live: false,
            participants: HashMap::new(),
        }
    }

    /// At most one broadcaster per room; reclaiming by the same id is fine.
    pub fn claim_broadcaster(&mut self, id: &ParticipantId) -> Result<(), SignalError> {
        match &self.broadcaster {
            Some(existing) if existing != id => Err(SignalError::RoleConflict(self.id.clone())),
            _ => {
                self.broadcaster = Some(id.clone());
                Ok(())
            }
        }
    }

    pub fn admit(&mut self, participant: Participant) -> Result<(), SignalError> {
        if participant.role == Role::Broadcaster {
            self.claim_broadcaster(&participant.id)?;
        }
        self.participants.insert(participant.id.clone(), participant);
        Ok(())
    }

    /// Removes the participant; returns it if it was present.
    pub fn evict(&mut self, id: &ParticipantId) -> Option<Participant> {
        let removed = self.participants.remove(id);
        if self.broadcaster.as_ref() == Some(id) {
            self.broadcaster = None;
            self.live = false;
        }
        removed
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn get_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .values()
            .filter(|p| p.role == Role::Listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().count()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Broadcaster gone: every listener drops back to `Waiting`.
    pub fn reset_listeners(&mut self) {
        for p in self.participants.values_mut() {
            if p.role == Role::Listener {
                p.phase = ListenerPhase::Waiting;
            }
        }
    }
}

use crate::config::Timings;
use crate::negotiation::MediaLink;
use lectern_core::{LinkId, NegotiationState, ParticipantId};
use std::collections::HashMap;
use std::time::Instant;

/// What a periodic sweep decided for one listener's link. The room event
/// loop executes the actions (it owns signaling and the registry).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SweepAction {
    /// Pre-connected link sat past its deadline.
    ExpirePending(ParticipantId),
    /// Connected link with no activity beyond the idle threshold.
    CloseIdle(ParticipantId),
}

/// Connection-supervisor state: every MediaLink of one room, keyed by
/// listener. The one-link-per-pair invariant is enforced here: inserting
/// for a listener closes and returns the predecessor.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: HashMap<ParticipantId, MediaLink>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_replacing(&mut self, link: MediaLink) -> Option<MediaLink> {
        let mut old = self.links.insert(link.listener.clone(), link)?;
        old.close();
        Some(old)
    }

    pub fn get(&self, listener: &ParticipantId) -> Option<&MediaLink> {
        self.links.get(listener)
    }

    pub fn get_mut(&mut self, listener: &ParticipantId) -> Option<&mut MediaLink> {
        self.links.get_mut(listener)
    }

    pub fn by_id_mut(&mut self, id: LinkId) -> Option<&mut MediaLink> {
        self.links.values_mut().find(|l| l.id == id)
    }

    pub fn remove(&mut self, listener: &ParticipantId) -> Option<MediaLink> {
        self.links.remove(listener)
    }

    pub fn listeners(&self) -> Vec<ParticipantId> {
        self.links.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.links
            .values()
            .filter(|l| l.state == NegotiationState::Connected)
            .count()
    }

    /// Tears down every link; returns the ones that were still open so the
    /// caller can notify their listeners. Used by `broadcast-stop` and
    /// broadcaster leave. All-or-nothing, no partial teardown observable.
    pub fn close_all(&mut self) -> Vec<MediaLink> {
        let mut closed = Vec::new();
        for (_, mut link) in self.links.drain() {
            if link.close() {
                closed.push(link);
            }
        }
        closed
    }

    /// The periodic sweep: expire stuck negotiations, close idle links.
    /// Registry reconciliation happens in the caller from these actions.
    pub fn sweep(&mut self, now: Instant, timings: &Timings) -> Vec<SweepAction> {
        let mut actions = Vec::new();
        for link in self.links.values() {
            match link.state {
                NegotiationState::Offering
                | NegotiationState::Answering
                | NegotiationState::Connecting
                | NegotiationState::Idle => {
                    if link.expired(now) {
                        actions.push(SweepAction::ExpirePending(link.listener.clone()));
                    }
                }
                NegotiationState::Connected => {
                    if now.duration_since(link.last_activity) >= timings.idle_timeout {
                        actions.push(SweepAction::CloseIdle(link.listener.clone()));
                    }
                }
                NegotiationState::Failed | NegotiationState::Closed => {}
            }
        }
        actions
    }
}

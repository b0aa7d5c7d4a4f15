use lectern_core::{LinkId, NegotiationState, ParticipantId};
use std::time::Instant;
use tracing::{debug, trace};

/// Which way a connectivity candidate is headed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CandidateFlow {
    ToListener,
    ToBroadcaster,
}

/// Whether a candidate can go out now or had to wait for the remote
/// description on the receiving side.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CandidateDisposition {
    Forward,
    Buffered,
}

/// One negotiated audio path between the broadcaster and one listener.
/// Exactly one exists per (broadcaster-session, listener) pair; a replacement
/// closes its predecessor. The struct holds the state machine; the room event
/// loop drives it and a watchdog task enforces the answer deadline.
#[derive(Debug)]
pub struct MediaLink {
    pub id: LinkId,
    pub listener: ParticipantId,
    pub state: NegotiationState,
    /// Highest negotiation sequence seen; a glare race is resolved in favor
    /// of the higher seq, the loser's offer is discarded.
    pub seq: u64,
    pub bitrate_bps: u32,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub deadline: Option<Instant>,
    /// True when this link is the single post-failure retry attempt.
    pub retry: bool,
    // Candidates held until the corresponding remote description exists.
    to_listener: Vec<String>,
    to_broadcaster: Vec<String>,
}

impl MediaLink {
    pub fn new(
        listener: ParticipantId,
        bitrate_bps: u32,
        retry: bool,
        now: Instant,
        answer_timeout: std::time::Duration,
    ) -> Self {
        Self {
            id: LinkId::new(),
            listener,
            state: NegotiationState::Idle,
            seq: 0,
            bitrate_bps,
            created_at: now,
            last_activity: now,
            deadline: Some(now + answer_timeout),
            retry,
            to_listener: Vec::new(),
            to_broadcaster: Vec::new(),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// An offer arrived for this link. Returns false when the offer loses
    /// the tie-break (its seq is not higher than the one in flight).
    pub fn accept_offer(&mut self, seq: u64, now: Instant) -> bool {
        let in_flight = matches!(
            self.state,
            NegotiationState::Offering | NegotiationState::Answering | NegotiationState::Connecting
        );
        if in_flight && seq <= self.seq {
            debug!(link = %self.id, seq, current = self.seq, "discarding offer that lost the glare race");
            return false;
        }
        if self.state.is_terminal() {
            return false;
        }

        trace!(link = %self.id, seq, "idle/renegotiation -> offering");
        self.seq = seq;
        self.state = NegotiationState::Offering;
        self.touch(now);
        true
    }

    /// The listener answered. On success returns the candidates that were
    /// waiting for the broadcaster's remote description, in arrival order.
    pub fn accept_answer(&mut self, seq: u64, now: Instant) -> Option<Vec<String>> {
        if self.state != NegotiationState::Offering {
            return None;
        }
        if seq != self.seq {
            debug!(link = %self.id, seq, current = self.seq, "discarding stale answer");
            return None;
        }

        trace!(link = %self.id, "offering -> answering");
        self.state = NegotiationState::Answering;
        trace!(link = %self.id, "answering -> connecting");
        self.state = NegotiationState::Connecting;
        self.touch(now);
        Some(std::mem::take(&mut self.to_broadcaster))
    }

    /// Route a candidate: forward if the receiving side already has the
    /// remote description this candidate belongs to, buffer otherwise.
    /// Buffered candidates are never dropped, only replayed.
    pub fn route_candidate(
        &mut self,
        flow: CandidateFlow,
        candidate: String,
        now: Instant,
    ) -> CandidateDisposition {
        self.touch(now);
        let ready = match flow {
            // The listener knows the offer from `offering` onwards.
            CandidateFlow::ToListener => matches!(
                self.state,
                NegotiationState::Offering
                    | NegotiationState::Answering
                    | NegotiationState::Connecting
                    | NegotiationState::Connected
            ),
            // The broadcaster side knows the answer from `connecting` onwards.
            CandidateFlow::ToBroadcaster => matches!(
                self.state,
                NegotiationState::Connecting | NegotiationState::Connected
            ),
        };
        if ready {
            return CandidateDisposition::Forward;
        }
        match flow {
            CandidateFlow::ToListener => self.to_listener.push(candidate),
            CandidateFlow::ToBroadcaster => self.to_broadcaster.push(candidate),
        }
        CandidateDisposition::Buffered
    }

    pub fn drain_to_listener(&mut self) -> Vec<String> {
        std::mem::take(&mut self.to_listener)
    }

    /// Transport reports an established path. Only `answering`/`connecting`
    /// links can connect; a connected link treats the report as a keepalive.
    pub fn mark_connected(&mut self, now: Instant) -> bool {
        match self.state {
            NegotiationState::Answering | NegotiationState::Connecting => {
                trace!(link = %self.id, "-> connected");
                self.state = NegotiationState::Connected;
                self.deadline = None;
                // A later failure of this link starts a fresh retry episode.
                self.retry = false;
                self.touch(now);
                true
            }
            NegotiationState::Connected => {
                self.touch(now);
                false
            }
            _ => false,
        }
    }

    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = NegotiationState::Failed;
        self.deadline = None;
        true
    }

    /// Idempotent: closing an already-terminal link is a no-op.
    pub fn close(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = NegotiationState::Closed;
        self.deadline = None;
        true
    }

    /// Past the answer/connectivity deadline without reaching `connected`.
    pub fn expired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(d) => now >= d && self.state != NegotiationState::Connected,
            None => false,
        }
    }
}

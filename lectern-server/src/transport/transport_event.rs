use lectern_core::ParticipantId;

/// Events the relay's peer connections feed back into the room event loop.
/// An upstream loss is fatal for the whole room; a downstream loss affects
/// only that listener.
#[derive(Debug)]
pub enum TransportEvent {
    UpstreamEstablished,
    UpstreamLost,
    DownstreamEstablished(ParticipantId),
    DownstreamLost(ParticipantId),
    /// Locally gathered connectivity candidate, to be signaled to `target`.
    CandidateReady {
        target: ParticipantId,
        candidate: String,
    },
}

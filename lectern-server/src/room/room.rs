use crate::config::{ServerConfig, Timings};
use crate::error::SignalError;
use crate::negotiation::{CandidateDisposition, CandidateFlow, MediaLink};
use crate::registry::{ListenerPhase, Participant, SessionRegistry};
use crate::room::room_command::RoomCommand;
use crate::signaling::SignalingOutput;
use crate::supervisor::{LinkTable, SweepAction};
use crate::topology::{MeshDriver, RelayDriver, Topology, TopologyDriver, relay_peer};
use crate::transport::{TransportConfig, TransportEvent};
use lectern_core::{
    LinkId, NegotiationState, ParticipantId, QualityTier, Role, RoomId, SignalMessage,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One room's event loop. All cross-connection coordination for a room is
/// serialized here; distinct rooms run as independent tasks. The loop owns
/// the link table (connection supervisor state) and the topology driver;
/// membership lives in the shared session registry.
pub struct Room {
    id: RoomId,
    topology: Topology,
    registry: SessionRegistry,
    signaling: Arc<dyn SignalingOutput>,
    links: LinkTable,
    driver: Box<dyn TopologyDriver>,
    timings: Timings,
    max_tier: QualityTier,
    next_seq: u64,
    command_rx: mpsc::Receiver<RoomCommand>,
    command_tx: mpsc::Sender<RoomCommand>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    // Keeps the transport channel open in mesh mode, where no driver holds
    // a sender.
    _transport_tx: mpsc::Sender<TransportEvent>,
    closing: bool,
}

impl Room {
    pub fn new(
        id: RoomId,
        cfg: &ServerConfig,
        topology: Topology,
        registry: SessionRegistry,
        signaling: Arc<dyn SignalingOutput>,
        command_rx: mpsc::Receiver<RoomCommand>,
        command_tx: mpsc::Sender<RoomCommand>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(256);

        let driver: Box<dyn TopologyDriver> = match topology {
            Topology::Mesh => Box::new(MeshDriver::new(id.clone(), signaling.clone())),
            Topology::Forwarding => Box::new(RelayDriver::new(
                id.clone(),
                signaling.clone(),
                TransportConfig::from(cfg),
                transport_tx.clone(),
            )),
        };

        Self {
            id,
            topology,
            registry,
            signaling,
            links: LinkTable::new(),
            driver,
            timings: cfg.timings,
            max_tier: cfg.max_tier,
            next_seq: 0,
            command_rx,
            command_tx,
            transport_rx,
            _transport_tx: transport_tx,
            closing: false,
        }
    }

    pub async fn run(mut self) {
        info!(room = %self.id, topology = %self.topology, "room event loop started");

        let mut sweep = tokio::time::interval(self.timings.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it.
        sweep.tick().await;

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => break,
                    }
                }
                evt = self.transport_rx.recv() => {
                    if let Some(e) = evt {
                        self.handle_transport_event(e).await;
                    }
                }
                _ = sweep.tick() => self.sweep().await,
            }

            if self.closing {
                break;
            }
        }

        self.driver.shutdown().await;
        info!(room = %self.id, "room event loop finished");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                user,
                display_name,
                role,
                tier,
            } => self.handle_join(user, display_name, role, tier).await,
            RoomCommand::Leave { user } => self.handle_leave(user).await,
            RoomCommand::BroadcastStart { user } => self.handle_broadcast_start(user).await,
            RoomCommand::BroadcastStop { user } => self.handle_broadcast_stop(user).await,
            RoomCommand::Offer { from, to, sdp, seq } => {
                self.handle_offer(from, to, sdp, seq).await
            }
            RoomCommand::Answer { from, to, sdp, seq } => {
                self.handle_answer(from, to, sdp, seq).await
            }
            RoomCommand::Candidate {
                from,
                to,
                candidate,
            } => self.handle_candidate(from, to, candidate).await,
            RoomCommand::LinkReport {
                from,
                link_id,
                state,
            } => self.handle_link_report(from, link_id, state).await,
            RoomCommand::Deadline { link } => self.handle_deadline(link).await,
            RoomCommand::Retry { listener } => self.handle_retry(listener).await,
        }
    }

    // ---- membership -----------------------------------------------------

    async fn handle_join(
        &mut self,
        user: ParticipantId,
        display_name: String,
        role: Role,
        tier: QualityTier,
    ) {
        let tier = tier.clamp_to(self.max_tier);

        // Idempotent rapid re-join: an in-flight link for this pair stays as
        // it is, the join is only acknowledged again.
        if role == Role::Listener
            && self.registry.participant(&self.id, &user).is_some()
            && self
                .links
                .get(&user)
                .is_some_and(|l| !l.state.is_terminal())
        {
            self.send_joined(&user).await;
            return;
        }

        let participant = Participant::new(user.clone(), display_name, role, tier);
        match self.registry.create_or_join_room(&self.id, participant) {
            Ok(snapshot) => {
                info!(room = %self.id, %user, ?role, "participant joined");
                self.send_joined(&user).await;

                if role == Role::Listener && snapshot.live {
                    if let Some(broadcaster) = self.registry.broadcaster(&self.id) {
                        self.signaling
                            .send(
                                &user,
                                SignalMessage::BroadcastStart {
                                    room_id: self.id.clone(),
                                    broadcaster_id: broadcaster,
                                },
                            )
                            .await;
                    }
                    self.start_link(&user, tier, false).await;
                }
            }
            Err(e) => {
                warn!(room = %self.id, %user, "join rejected: {e}");
                self.reject(&user, &e).await;
            }
        }
    }

    async fn send_joined(&self, user: &ParticipantId) {
        self.signaling
            .send(
                user,
                SignalMessage::Joined {
                    room_id: self.id.clone(),
                    live: self.registry.is_live(&self.id),
                    listeners: self.registry.list_listeners(&self.id).len(),
                },
            )
            .await;
    }

    async fn handle_leave(&mut self, user: ParticipantId) {
        let Ok(outcome) = self.registry.leave_room(&self.id, &user) else {
            // Second leave, or a leave racing room teardown: a no-op.
            return;
        };
        info!(room = %self.id, %user, "participant left");

        if outcome.was_broadcaster {
            self.teardown_all().await;
        } else if let Some(mut link) = self.links.remove(&user) {
            if link.close() {
                self.driver.drop_listener(&user).await;
                self.echo_link_state(&link, false).await;
            }
        }

        if outcome.room_empty {
            self.closing = true;
        }
    }

    // ---- broadcast lifecycle --------------------------------------------

    async fn handle_broadcast_start(&mut self, user: ParticipantId) {
        if self.registry.broadcaster(&self.id).as_ref() != Some(&user) {
            let e = SignalError::InvalidMessage("only the broadcaster can start".into());
            self.reject(&user, &e).await;
            return;
        }

        self.registry.set_live(&self.id, true);
        info!(room = %self.id, broadcaster = %user, "room is live");

        for listener in self.registry.list_listeners(&self.id) {
            self.signaling
                .send(
                    &listener.id,
                    SignalMessage::BroadcastStart {
                        room_id: self.id.clone(),
                        broadcaster_id: user.clone(),
                    },
                )
                .await;
            // Idempotent restart: listeners with an in-flight link keep it.
            if self
                .links
                .get(&listener.id)
                .is_none_or(|l| l.state.is_terminal())
            {
                self.start_link(&listener.id, listener.tier, false).await;
            }
        }
    }

    async fn handle_broadcast_stop(&mut self, user: ParticipantId) {
        if self.registry.broadcaster(&self.id).as_ref() != Some(&user) {
            let e = SignalError::InvalidMessage("only the broadcaster can stop".into());
            self.reject(&user, &e).await;
            return;
        }
        self.teardown_all().await;
    }

    /// Room-wide teardown: closes every link, resets the registry and sends
    /// `broadcast-stop` to each listener. Atomic from the point of view of
    /// the loop, since nothing else interleaves. Idempotent: a second stop finds
    /// nothing to do.
    async fn teardown_all(&mut self) {
        if !self.registry.is_live(&self.id) && self.links.is_empty() {
            return;
        }

        let closed = self.links.close_all();
        for link in &closed {
            self.echo_link_state(link, false).await;
        }
        self.driver.shutdown().await;
        self.registry.set_live(&self.id, false);

        for listener in self.registry.list_listeners(&self.id) {
            self.signaling
                .send(
                    &listener.id,
                    SignalMessage::BroadcastStop {
                        room_id: self.id.clone(),
                    },
                )
                .await;
        }
        info!(room = %self.id, links = closed.len(), "broadcast stopped");
    }

    // ---- negotiation ----------------------------------------------------

    fn alloc_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Creates (or replaces) the listener's MediaLink and kicks off
    /// negotiation through the topology driver.
    async fn start_link(&mut self, listener: &ParticipantId, tier: QualityTier, retry: bool) {
        let Some(broadcaster) = self.registry.broadcaster(&self.id) else {
            return;
        };
        let now = Instant::now();
        let constraints = tier.constraints();
        let mut link = MediaLink::new(
            listener.clone(),
            constraints.bitrate_bps,
            retry,
            now,
            self.timings.answer_timeout,
        );
        let link_id = link.id;
        let seq = self.alloc_seq();

        match self
            .driver
            .solicit_offer(&broadcaster, listener, tier, seq)
            .await
        {
            Ok(true) => {
                // Forwarding: the relay already emitted the offer.
                link.accept_offer(seq, now);
            }
            Ok(false) => {
                // Mesh: the broadcaster was solicited; the offer arrives
                // over signaling and moves the link to `offering`.
            }
            Err(e) => {
                warn!(room = %self.id, %listener, "solicit failed: {e}");
                self.links.insert_replacing(link);
                self.fail_link(listener).await;
                return;
            }
        }

        debug!(room = %self.id, %listener, link = %link_id, retry, "link created");
        let state = link.state;
        self.links.insert_replacing(link);
        self.registry
            .set_listener_phase(&self.id, listener, ListenerPhase::Negotiating);
        // Both ends learn the link id here; their later status reports
        // reference it.
        self.announce_link_state(link_id, listener, state, false).await;
        self.arm_deadline(link_id, self.timings.answer_timeout);
    }

    fn arm_deadline(&self, link: LinkId, after: Duration) {
        let tx = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(RoomCommand::Deadline { link }).await;
        });
    }

    async fn handle_offer(&mut self, from: ParticipantId, to: ParticipantId, sdp: String, seq: u64) {
        let broadcaster = self.registry.broadcaster(&self.id);
        if broadcaster.as_ref() != Some(&from) {
            let e = SignalError::InvalidMessage("offers come from the broadcaster".into());
            self.reject(&from, &e).await;
            return;
        }

        // Forwarding: the broadcaster's upstream offer targets the relay.
        if self.topology == Topology::Forwarding && to == relay_peer() {
            let tier = self
                .registry
                .participant(&self.id, &from)
                .map(|p| p.tier)
                .unwrap_or_default()
                .clamp_to(self.max_tier);
            if let Err(e) = self
                .driver
                .handle_offer(&from, &to, sdp, seq, &tier.constraints())
                .await
            {
                warn!(room = %self.id, "upstream offer failed: {e}");
                self.reject(&from, &e).await;
            }
            return;
        }

        let now = Instant::now();
        let tier = self
            .registry
            .participant(&self.id, &to)
            .map(|p| p.tier)
            .unwrap_or_default()
            .clamp_to(self.max_tier);
        let constraints = tier.constraints();

        let link_id;
        let buffered;
        {
            let Some(link) = self.links.get_mut(&to) else {
                let e = SignalError::InvalidMessage(format!("no active link for listener {to}"));
                self.reject(&from, &e).await;
                return;
            };
            if !link.accept_offer(seq, now) {
                // Glare loser or terminal link; discarded by the tie-break.
                return;
            }
            link.deadline = Some(now + self.timings.answer_timeout);
            link_id = link.id;
            buffered = link.drain_to_listener();
        }
        self.arm_deadline(link_id, self.timings.answer_timeout);

        if let Err(e) = self
            .driver
            .handle_offer(&from, &to, sdp, seq, &constraints)
            .await
        {
            self.reject(&from, &e).await;
            return;
        }
        // Replay candidates that arrived before the listener had the offer.
        for candidate in buffered {
            let _ = self.driver.deliver_candidate(&from, &to, candidate).await;
        }
    }

    async fn handle_answer(
        &mut self,
        from: ParticipantId,
        to: ParticipantId,
        sdp: String,
        seq: u64,
    ) {
        let flushed;
        {
            let Some(link) = self.links.get_mut(&from) else {
                let e = SignalError::InvalidMessage(format!("no active link for {from}"));
                self.reject(&from, &e).await;
                return;
            };
            if link.state != NegotiationState::Offering {
                let e = SignalError::InvalidMessage(format!(
                    "answer while link is {}",
                    link.state
                ));
                self.reject(&from, &e).await;
                return;
            }
            match link.accept_answer(seq, Instant::now()) {
                Some(candidates) => flushed = candidates,
                // Stale seq from a lost glare race; drop quietly.
                None => return,
            }
        }

        if let Err(e) = self.driver.handle_answer(&from, &to, sdp, seq).await {
            warn!(room = %self.id, listener = %from, "answer failed: {e}");
            self.fail_link(&from).await;
            return;
        }

        // The broadcaster side now has its remote description; replay the
        // candidates that arrived early, in order.
        let target = match self.topology {
            Topology::Mesh => to.clone(),
            Topology::Forwarding => relay_peer(),
        };
        for candidate in flushed {
            let _ = self
                .driver
                .deliver_candidate(&from, &target, candidate)
                .await;
        }
    }

    async fn handle_candidate(&mut self, from: ParticipantId, to: ParticipantId, candidate: String) {
        let broadcaster = self.registry.broadcaster(&self.id);
        let from_broadcaster = broadcaster.as_ref() == Some(&from);

        // Upstream candidates bypass the per-listener links.
        if from_broadcaster && self.topology == Topology::Forwarding && to == relay_peer() {
            if let Err(e) = self.driver.deliver_candidate(&from, &to, candidate).await {
                debug!(room = %self.id, "upstream candidate: {e}");
            }
            return;
        }

        let (listener, flow) = if from_broadcaster {
            (to.clone(), CandidateFlow::ToListener)
        } else {
            (from.clone(), CandidateFlow::ToBroadcaster)
        };

        let Some(link) = self.links.get_mut(&listener) else {
            let e = SignalError::InvalidMessage(format!("no active link for {listener}"));
            self.reject(&from, &e).await;
            return;
        };

        match link.route_candidate(flow, candidate.clone(), Instant::now()) {
            CandidateDisposition::Forward => {
                if let Err(e) = self.driver.deliver_candidate(&from, &to, candidate).await {
                    debug!(room = %self.id, %listener, "candidate delivery: {e}");
                }
            }
            CandidateDisposition::Buffered => {
                debug!(room = %self.id, %listener, "candidate buffered until remote description");
            }
        }
    }

    async fn handle_link_report(
        &mut self,
        from: ParticipantId,
        link_id: LinkId,
        state: NegotiationState,
    ) {
        let broadcaster = self.registry.broadcaster(&self.id);
        let Some(listener) = self.links.by_id_mut(link_id).map(|l| l.listener.clone()) else {
            // Stale report for a link that was already replaced or closed.
            debug!(room = %self.id, %from, link = %link_id, "stale link report");
            return;
        };
        if listener != from && broadcaster.as_ref() != Some(&from) {
            let e = SignalError::InvalidMessage("link report from an uninvolved peer".into());
            self.reject(&from, &e).await;
            return;
        }

        match state {
            NegotiationState::Connected => {
                // Reports on an already-connected link count as activity.
                let newly_connected = self
                    .links
                    .by_id_mut(link_id)
                    .is_some_and(|l| l.mark_connected(Instant::now()));
                if newly_connected {
                    info!(room = %self.id, %listener, link = %link_id, "link connected");
                    self.registry
                        .set_listener_phase(&self.id, &listener, ListenerPhase::Connected);
                    self.announce_link_state(link_id, &listener, NegotiationState::Connected, false)
                        .await;
                }
            }
            NegotiationState::Failed => {
                warn!(room = %self.id, %listener, link = %link_id, "client reported transport failure");
                self.fail_link(&listener).await;
            }
            other => {
                let e = SignalError::InvalidMessage(format!(
                    "clients may only report connected or failed, got {other}"
                ));
                self.reject(&from, &e).await;
            }
        }
    }

    async fn handle_deadline(&mut self, link_id: LinkId) {
        let Some(link) = self.links.by_id_mut(link_id) else {
            return;
        };
        let now = Instant::now();
        if !link.expired(now) {
            // The deadline moved (renegotiation); re-arm for the remainder.
            if let Some(deadline) = link.deadline
                && deadline > now
            {
                let id = link.id;
                self.arm_deadline(id, deadline - now);
            }
            return;
        }
        let listener = link.listener.clone();
        debug!(
            room = %self.id, %listener, link = %link_id,
            "{}", SignalError::NegotiationTimeout(link_id)
        );
        self.fail_link(&listener).await;
    }

    async fn handle_retry(&mut self, listener: ParticipantId) {
        if !self.registry.is_live(&self.id) {
            return;
        }
        let Some(participant) = self.registry.participant(&self.id, &listener) else {
            return;
        };
        if self
            .links
            .get(&listener)
            .is_some_and(|l| !l.state.is_terminal())
        {
            return;
        }
        info!(room = %self.id, %listener, "retrying negotiation");
        self.start_link(&listener, participant.tier, true).await;
    }

    /// Failure path shared by timeouts, client reports and relay transport
    /// loss: one retry after a short backoff, then demote to waiting.
    async fn fail_link(&mut self, listener: &ParticipantId) {
        let Some(mut link) = self.links.remove(listener) else {
            return;
        };
        if !link.fail() {
            return;
        }
        let exhausted = link.retry;
        self.driver.drop_listener(listener).await;

        self.announce_link_state(link.id, listener, NegotiationState::Failed, exhausted)
            .await;

        if exhausted {
            // Demoted back to waiting, not removed from the room.
            info!(room = %self.id, %listener, "retry exhausted, broadcast unavailable");
            self.registry
                .set_listener_phase(&self.id, listener, ListenerPhase::Waiting);
        } else {
            self.registry
                .set_listener_phase(&self.id, listener, ListenerPhase::Negotiating);
            let tx = self.command_tx.clone();
            let listener = listener.clone();
            let backoff = self.timings.retry_backoff;
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                let _ = tx.send(RoomCommand::Retry { listener }).await;
            });
        }
    }

    // ---- relay transport events ----------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::UpstreamEstablished => {
                info!(room = %self.id, "upstream media flowing");
            }
            TransportEvent::UpstreamLost => {
                // Fatal for the whole room.
                warn!(room = %self.id, "upstream transport lost, stopping broadcast");
                self.teardown_all().await;
            }
            TransportEvent::DownstreamEstablished(listener) => {
                if let Some(link) = self.links.get_mut(&listener) {
                    let id = link.id;
                    if link.mark_connected(Instant::now()) {
                        info!(room = %self.id, %listener, "downstream leg connected");
                        self.registry.set_listener_phase(
                            &self.id,
                            &listener,
                            ListenerPhase::Connected,
                        );
                        self.announce_link_state(
                            id,
                            &listener,
                            NegotiationState::Connected,
                            false,
                        )
                        .await;
                    }
                }
            }
            TransportEvent::DownstreamLost(listener) => {
                debug!(
                    room = %self.id, %listener,
                    "{}", SignalError::TransportFailure("downstream leg lost".into())
                );
                self.fail_link(&listener).await;
            }
            TransportEvent::CandidateReady { target, candidate } => {
                self.signaling
                    .send(
                        &target,
                        SignalMessage::IceCandidate {
                            to: target.clone(),
                            from: relay_peer(),
                            candidate,
                        },
                    )
                    .await;
            }
        }
    }

    // ---- supervision ----------------------------------------------------

    /// Periodic supervisor sweep: expire stuck negotiations, close idle
    /// links, reconcile registry listener phases with actual link states.
    async fn sweep(&mut self) {
        let now = Instant::now();

        // Relay legs report activity out-of-band; fold it into the links.
        for listener in self.links.listeners() {
            if let Some(ts) = self.driver.activity(&listener)
                && let Some(link) = self.links.get_mut(&listener)
                && ts > link.last_activity
            {
                link.touch(ts);
            }
        }

        for action in self.links.sweep(now, &self.timings) {
            match action {
                SweepAction::ExpirePending(listener) => {
                    debug!(room = %self.id, %listener, "sweep: negotiation expired");
                    self.fail_link(&listener).await;
                }
                SweepAction::CloseIdle(listener) => {
                    info!(room = %self.id, %listener, "sweep: closing idle link");
                    if let Some(mut link) = self.links.remove(&listener)
                        && link.close()
                    {
                        self.driver.drop_listener(&listener).await;
                        self.registry.set_listener_phase(
                            &self.id,
                            &listener,
                            ListenerPhase::Waiting,
                        );
                        self.echo_link_state(&link, false).await;
                    }
                }
            }
        }

        // Registry reconciliation: phases must match actually-connected
        // links; a listener with no link is waiting, not gone.
        for participant in self.registry.list_listeners(&self.id) {
            let actual = match self.links.get(&participant.id).map(|l| l.state) {
                Some(NegotiationState::Connected) => ListenerPhase::Connected,
                Some(s) if !s.is_terminal() => ListenerPhase::Negotiating,
                _ => ListenerPhase::Waiting,
            };
            if participant.phase != actual {
                debug!(
                    room = %self.id, listener = %participant.id,
                    from = ?participant.phase, to = ?actual,
                    "sweep: reconciling listener phase"
                );
                self.registry
                    .set_listener_phase(&self.id, &participant.id, actual);
            }
        }
    }

    // ---- helpers ---------------------------------------------------------

    /// Echo a supervised state transition to the affected participants.
    async fn announce_link_state(
        &self,
        link_id: LinkId,
        listener: &ParticipantId,
        state: NegotiationState,
        permanent: bool,
    ) {
        let msg = SignalMessage::LinkState {
            link_id,
            peer_id: listener.clone(),
            state,
            permanent,
        };
        self.signaling.send(listener, msg.clone()).await;
        if let Some(broadcaster) = self.registry.broadcaster(&self.id) {
            self.signaling.send(&broadcaster, msg).await;
        }
    }

    async fn echo_link_state(&self, link: &MediaLink, permanent: bool) {
        self.announce_link_state(link.id, &link.listener, link.state, permanent)
            .await;
    }

    async fn reject(&self, user: &ParticipantId, err: &SignalError) {
        self.signaling
            .send(
                user,
                SignalMessage::Error {
                    message: err.to_string(),
                },
            )
            .await;
    }
}

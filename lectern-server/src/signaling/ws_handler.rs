use crate::error::SignalError;
use crate::room::{RoomCommand, RoomManager};
use crate::signaling::SignalingService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use lectern_core::{ParticipantId, RoomId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct AppState {
    pub signaling: SignalingService,
    pub rooms: RoomManager,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let peer_id = ParticipantId::from(user_id);

    ws.on_upgrade(move |socket| handle_socket(socket, peer_id, state))
}

async fn handle_socket(socket: WebSocket, peer_id: ParticipantId, state: Arc<AppState>) {
    info!("new signaling connection: {peer_id}");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(peer_id.clone(), tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let peer_id = peer_id.clone();

        async move {
            // Set at join time; all later messages route through it.
            let mut joined: Option<(RoomId, mpsc::Sender<RoomCommand>)> = None;

            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => {
                            if !dispatch(&state, &peer_id, &mut joined, signal).await {
                                break;
                            }
                        }
                        // Malformed payloads are rejected explicitly, never
                        // silently ignored.
                        Err(e) => {
                            warn!("invalid signal message from {peer_id}: {e}");
                            reject(&state.signaling, &peer_id, format!("invalid message: {e}"));
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            // Disconnect implies leave.
            if let Some((_, room_tx)) = joined {
                let _ = room_tx
                    .send(RoomCommand::Leave {
                        user: peer_id.clone(),
                    })
                    .await;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.signaling.remove_peer(&peer_id);
    info!("signaling connection closed: {peer_id}");
}

fn reject(signaling: &SignalingService, peer_id: &ParticipantId, message: String) {
    signaling.send_signal(peer_id, &SignalMessage::Error { message });
}

/// Maps one inbound signal to a room command. Returns false when the room
/// task is gone and the connection should wind down.
async fn dispatch(
    state: &Arc<AppState>,
    peer_id: &ParticipantId,
    joined: &mut Option<(RoomId, mpsc::Sender<RoomCommand>)>,
    signal: SignalMessage,
) -> bool {
    let cmd = match signal {
        SignalMessage::Join {
            room_id,
            user_id,
            display_name,
            role,
            tier,
        } => {
            if &user_id != peer_id {
                reject(
                    &state.signaling,
                    peer_id,
                    SignalError::InvalidMessage("join for a different user".into()).to_string(),
                );
                return true;
            }
            let room_tx = state.rooms.room_sender(&room_id);
            *joined = Some((room_id, room_tx));
            RoomCommand::Join {
                user: user_id,
                display_name,
                role,
                tier,
            }
        }

        SignalMessage::Leave { room_id, user_id } => {
            if &user_id != peer_id {
                reject(
                    &state.signaling,
                    peer_id,
                    SignalError::InvalidMessage("leave for a different user".into()).to_string(),
                );
                return true;
            }
            match joined.take() {
                Some((joined_room, room_tx)) if joined_room == room_id => {
                    let _ = room_tx.send(RoomCommand::Leave { user: user_id }).await;
                    return true;
                }
                other => {
                    *joined = other;
                    reject(
                        &state.signaling,
                        peer_id,
                        SignalError::RoomNotFound(room_id).to_string(),
                    );
                    return true;
                }
            }
        }

        SignalMessage::BroadcastStart { room_id, .. } => match routed(joined, &room_id) {
            Some(_) => RoomCommand::BroadcastStart {
                user: peer_id.clone(),
            },
            None => {
                reject(
                    &state.signaling,
                    peer_id,
                    SignalError::RoomNotFound(room_id).to_string(),
                );
                return true;
            }
        },

        SignalMessage::BroadcastStop { room_id } => match routed(joined, &room_id) {
            Some(_) => RoomCommand::BroadcastStop {
                user: peer_id.clone(),
            },
            None => {
                reject(
                    &state.signaling,
                    peer_id,
                    SignalError::RoomNotFound(room_id).to_string(),
                );
                return true;
            }
        },

        SignalMessage::Offer { to, from, sdp, seq } => {
            if let Some(cmd) = from_self(state, peer_id, joined, &from) {
                return cmd;
            }
            RoomCommand::Offer { from, to, sdp, seq }
        }

        SignalMessage::Answer { to, from, sdp, seq } => {
            if let Some(cmd) = from_self(state, peer_id, joined, &from) {
                return cmd;
            }
            RoomCommand::Answer { from, to, sdp, seq }
        }

        SignalMessage::IceCandidate {
            to,
            from,
            candidate,
        } => {
            if let Some(cmd) = from_self(state, peer_id, joined, &from) {
                return cmd;
            }
            RoomCommand::Candidate {
                from,
                to,
                candidate,
            }
        }

        SignalMessage::LinkState { link_id, state: link_state, .. } => {
            if joined.is_none() {
                reject(
                    &state.signaling,
                    peer_id,
                    SignalError::InvalidMessage("link-state before join".into()).to_string(),
                );
                return true;
            }
            RoomCommand::LinkReport {
                from: peer_id.clone(),
                link_id,
                state: link_state,
            }
        }

        // Server-originated kinds coming from a client are out of sequence.
        SignalMessage::Joined { .. }
        | SignalMessage::ListenerReady { .. }
        | SignalMessage::Error { .. } => {
            reject(
                &state.signaling,
                peer_id,
                SignalError::InvalidMessage("unexpected server-side message kind".into())
                    .to_string(),
            );
            return true;
        }
    };

    let Some((_, room_tx)) = joined.as_ref() else {
        // Only Join sets the route; everything above already checked.
        return true;
    };
    if let Err(e) = room_tx.send(cmd).await {
        error!("room task for {peer_id} is gone: {e}");
        return false;
    }
    true
}

fn routed<'a>(
    joined: &'a Option<(RoomId, mpsc::Sender<RoomCommand>)>,
    room_id: &RoomId,
) -> Option<&'a mpsc::Sender<RoomCommand>> {
    match joined {
        Some((joined_room, tx)) if joined_room == room_id => Some(tx),
        _ => None,
    }
}

/// Offers, answers and candidates must carry the sender's own id and require
/// an established room route. Returns `Some(keep_going)` when the message
/// was rejected here.
fn from_self(
    state: &Arc<AppState>,
    peer_id: &ParticipantId,
    joined: &Option<(RoomId, mpsc::Sender<RoomCommand>)>,
    from: &ParticipantId,
) -> Option<bool> {
    if from != peer_id {
        reject(
            &state.signaling,
            peer_id,
            SignalError::InvalidMessage("spoofed sender id".into()).to_string(),
        );
        return Some(true);
    }
    if joined.is_none() {
        reject(
            &state.signaling,
            peer_id,
            SignalError::InvalidMessage("signaling before join".into()).to_string(),
        );
        return Some(true);
    }
    None
}

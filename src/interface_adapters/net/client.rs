// WebSocket gateway: one task per client connection, bridging the socket to
// the joined room's event channel and scoped outbound broadcast.

use std::future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Error,
    extract::{
        State,
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::sink::SinkExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn};

use crate::domain::normalize_room_id;
use crate::interface_adapters::protocol::{ClientMessage, JoinDto, JoinErrorDto, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng;
use crate::use_cases::{
    JoinRequest, RoomBroadcast, RoomEvent, RoomHandle, RoomJoinError, RoomLookupError,
    RoomRegistry, Scope,
};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    EventsClosed,
    OutboundClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

/// Serializes each scoped room event once and fans the shared bytes out to
/// every subscriber of the room.
pub async fn room_outbound_serializer(
    mut outbound_rx: broadcast::Receiver<(Scope, RoomBroadcast)>,
    bytes_tx: broadcast::Sender<(Scope, Utf8Bytes)>,
) {
    loop {
        match outbound_rx.recv().await {
            Ok((scope, event)) => {
                let msg = ServerMessage::from(event);
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize room event");
                        continue;
                    }
                };
                let _ = bytes_tx.send((scope, Utf8Bytes::from(txt)));
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "room serializer lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("room outbound channel closed; serializer exiting");
                break;
            }
        }
    }
}

/// Spawns the serialization pipeline for a freshly created room.
pub fn spawn_room_serializer(handle: &RoomHandle) {
    tokio::spawn(room_outbound_serializer(
        handle.outbound_tx.subscribe(),
        handle.bytes_tx.clone(),
    ));
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let registry = state.room_registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(mut socket: WebSocket, registry: Arc<RoomRegistry>) {
    // The connection id doubles as the player id once the client joins a room.
    let conn_id = rng::conn_id();
    let span = info_span!("conn", %conn_id, room_id = tracing::field::Empty);
    let _enter = span.enter();
    info!("client connected");

    let mut ctx = ConnCtx::new(conn_id, registry);
    if let Err(e) = run_client_loop(&mut socket, &mut ctx, &span).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

struct ConnCtx {
    conn_id: String,
    registry: Arc<RoomRegistry>,

    // Set while the connection is attached to a room.
    room_id: Option<Arc<str>>,
    event_tx: Option<mpsc::Sender<RoomEvent>>,
    bytes_rx: Option<broadcast::Receiver<(Scope, Utf8Bytes)>>,

    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_invalid_log: Instant,
    last_full_log: Instant,
    last_lag_log: Instant,

    close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    fn new(conn_id: String, registry: Arc<RoomRegistry>) -> Self {
        let now = Instant::now() - LOG_THROTTLE;
        Self {
            conn_id,
            registry,
            room_id: None,
            event_tx: None,
            bytes_rx: None,
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            invalid_json: 0,
            last_invalid_log: now,
            last_full_log: now,
            last_lag_log: now,
            close_frame: None,
        }
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

enum LoopAction {
    Continue,
    Disconnect,
    /// Attach to a room after a successful join handshake.
    Attach {
        room_id: Arc<str>,
        event_tx: mpsc::Sender<RoomEvent>,
        bytes_rx: broadcast::Receiver<(Scope, Utf8Bytes)>,
    },
    /// Drop the room attachment after an explicit leave.
    Detach,
    /// Outbound subscription lagged; ask the room for a fresh snapshot.
    Resync,
}

async fn run_client_loop(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    span: &tracing::Span,
) -> Result<(), NetError> {
    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        conn_id,
        registry,
        room_id,
        event_tx,
        bytes_rx,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_invalid_log,
        last_full_log,
        last_lag_log,
        close_frame,
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        let action = tokio::select! {
            // Incoming message from the client.
            incoming = socket.recv() => {
                match handle_incoming(
                    socket,
                    incoming,
                    conn_id,
                    registry,
                    room_id,
                    event_tx,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_invalid_log,
                    last_full_log,
                    close_frame,
                ).await {
                    Ok(action) => action,
                    Err(e) => {
                        fatal = Some(e);
                        LoopAction::Disconnect
                    }
                }
            }

            // Outbound room event, already serialized; filter by scope.
            outbound = async {
                match bytes_rx.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => future::pending().await,
                }
            } => match outbound {
                Ok((scope, bytes)) => {
                    if scope.includes(conn_id) {
                        match forward_bytes(bytes, socket, msgs_out, bytes_out).await {
                            LoopControl::Continue => LoopAction::Continue,
                            LoopControl::Disconnect => LoopAction::Disconnect,
                        }
                    } else {
                        LoopAction::Continue
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    if should_log(last_lag_log) {
                        warn!(missed = n, "outbound broadcasts lagged; requesting resync");
                    }
                    LoopAction::Resync
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("room outbound channel closed; disconnecting");
                    fatal = Some(NetError::OutboundClosed);
                    LoopAction::Disconnect
                }
            }
        };

        match action {
            LoopAction::Continue => {}
            LoopAction::Attach {
                room_id: new_room_id,
                event_tx: new_event_tx,
                bytes_rx: new_bytes_rx,
            } => {
                span.record("room_id", &*new_room_id);
                *room_id = Some(new_room_id);
                *event_tx = Some(new_event_tx);
                *bytes_rx = Some(new_bytes_rx);
            }
            LoopAction::Detach => {
                *room_id = None;
                *event_tx = None;
                *bytes_rx = None;
            }
            LoopAction::Resync => {
                // Recover staleness with a fresh snapshot instead of closing.
                if let Some(tx) = event_tx.as_ref() {
                    let _ = tx.try_send(RoomEvent::RequestSync {
                        conn_id: conn_id.clone(),
                    });
                }
            }
            LoopAction::Disconnect => {
                if let Some(frame) = close_frame.take() {
                    let _ = socket.send(Message::Close(Some(frame))).await;
                }
                if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                    debug!(error = ?err, "socket close error");
                }
                break;
            }
        }
    }

    disconnect_cleanup(
        conn_id,
        event_tx,
        *msgs_in,
        *msgs_out,
        *bytes_in,
        *bytes_out,
        *invalid_json,
    )
    .await;

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    conn_id: &str,
    registry: &Arc<RoomRegistry>,
    room_id: &Option<Arc<str>>,
    event_tx: &Option<mpsc::Sender<RoomEvent>>,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_invalid_log: &mut Instant,
    last_full_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopAction, NetError> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            *msgs_in += 1;
            *bytes_in += text.len() as u64;

            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    dispatch_message(
                        socket,
                        message,
                        conn_id,
                        registry,
                        room_id,
                        event_tx,
                        last_invalid_log,
                        last_full_log,
                    )
                    .await
                }
                Err(parse_err) => {
                    // Transport-level resilience over strictness: malformed
                    // messages are dropped with a log, the connection stays open.
                    *invalid_json += 1;
                    if should_log(last_invalid_log) {
                        warn!(
                            bytes = text.len(),
                            error = %parse_err,
                            "failed to parse client message; dropping"
                        );
                    }
                    Ok(LoopAction::Continue)
                }
            }
        }
        Some(Ok(Message::Binary(_))) => {
            *close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            Ok(LoopAction::Disconnect)
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(LoopAction::Continue),
        Some(Ok(Message::Close(_))) => Ok(LoopAction::Disconnect),
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopAction::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopAction::Disconnect)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_message(
    socket: &mut WebSocket,
    message: ClientMessage,
    conn_id: &str,
    registry: &Arc<RoomRegistry>,
    room_id: &Option<Arc<str>>,
    event_tx: &Option<mpsc::Sender<RoomEvent>>,
    last_invalid_log: &mut Instant,
    last_full_log: &mut Instant,
) -> Result<LoopAction, NetError> {
    match message {
        ClientMessage::Join(join) => {
            handle_join(socket, join, conn_id, registry, room_id, event_tx).await
        }

        ClientMessage::PlayerMove(m) => {
            let Some(tx) = room_event_target(&m.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            let event = RoomEvent::Move {
                conn_id: conn_id.to_string(),
                position: m.position.into(),
                velocity: m.velocity.into(),
                animation: m.animation.into(),
                timestamp: m.timestamp,
            };
            // Movement is droppable by design; never stall the socket on a
            // busy room. Dropped intermediate updates are tolerated.
            match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if should_log(last_full_log) {
                        warn!("room event channel full; dropping movement");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(NetError::EventsClosed),
            }
            Ok(LoopAction::Continue)
        }

        ClientMessage::CollectCoin(c) => {
            let Some(tx) = room_event_target(&c.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::ClaimCoin {
                    conn_id: conn_id.to_string(),
                    coin_id: c.coin_id,
                },
            )
            .await
        }

        ClientMessage::QuizResult(q) => {
            let Some(tx) = room_event_target(&q.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::QuizResult {
                    conn_id: conn_id.to_string(),
                    is_correct: q.is_correct,
                },
            )
            .await
        }

        ClientMessage::PlayerDied(d) => {
            let Some(tx) = room_event_target(&d.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::PlayerDied {
                    conn_id: conn_id.to_string(),
                },
            )
            .await
        }

        ClientMessage::StartGame(s) => {
            let Some(tx) = room_event_target(&s.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::StartGame {
                    conn_id: conn_id.to_string(),
                    host_is_spectator: s.host_is_spectator,
                },
            )
            .await
        }

        ClientMessage::RequestScoreboard(_) => {
            // Carries no room id; resolved from the connection's joined room.
            let Some(tx) = room_event_target("", room_id, event_tx, last_invalid_log) else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::RequestScoreboard {
                    conn_id: conn_id.to_string(),
                },
            )
            .await
        }

        ClientMessage::RequestSync(r) => {
            let Some(tx) = room_event_target(&r.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::RequestSync {
                    conn_id: conn_id.to_string(),
                },
            )
            .await
        }

        ClientMessage::SaveQuestions(s) => {
            let Some(tx) = room_event_target(&s.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::SaveQuestions {
                    conn_id: conn_id.to_string(),
                    questions: s.questions,
                },
            )
            .await
        }

        ClientMessage::RequestQuestions(r) => {
            let Some(tx) = room_event_target(&r.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::RequestQuestions {
                    conn_id: conn_id.to_string(),
                },
            )
            .await
        }

        ClientMessage::GameEnded(g) => {
            let Some(tx) = room_event_target(&g.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::EndGame {
                    conn_id: conn_id.to_string(),
                },
            )
            .await
        }

        ClientMessage::ResetGame(r) => {
            let Some(tx) = room_event_target(&r.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::ResetGame {
                    conn_id: conn_id.to_string(),
                },
            )
            .await
        }

        ClientMessage::Leave(l) => {
            let Some(tx) = room_event_target(&l.room_id, room_id, event_tx, last_invalid_log)
            else {
                return Ok(LoopAction::Continue);
            };
            forward_event(
                tx,
                RoomEvent::Leave {
                    conn_id: conn_id.to_string(),
                },
            )
            .await?;
            Ok(LoopAction::Detach)
        }
    }
}

/// Resolves the event sender for a room-scoped message, dropping messages
/// sent before a join or addressed to a different room.
fn room_event_target<'a>(
    msg_room_id: &str,
    room_id: &Option<Arc<str>>,
    event_tx: &'a Option<mpsc::Sender<RoomEvent>>,
    last_invalid_log: &mut Instant,
) -> Option<&'a mpsc::Sender<RoomEvent>> {
    let (Some(current), Some(tx)) = (room_id.as_deref(), event_tx.as_ref()) else {
        if should_log(last_invalid_log) {
            warn!("room message before join dropped");
        }
        return None;
    };
    if !msg_room_id.is_empty() && normalize_room_id(msg_room_id) != current {
        if should_log(last_invalid_log) {
            warn!(msg_room_id, "message for a different room dropped");
        }
        return None;
    }
    Some(tx)
}

async fn forward_event(
    tx: &mpsc::Sender<RoomEvent>,
    event: RoomEvent,
) -> Result<LoopAction, NetError> {
    tx.send(event).await.map_err(|_| NetError::EventsClosed)?;
    Ok(LoopAction::Continue)
}

async fn handle_join(
    socket: &mut WebSocket,
    join: JoinDto,
    conn_id: &str,
    registry: &Arc<RoomRegistry>,
    room_id: &Option<Arc<str>>,
    event_tx: &Option<mpsc::Sender<RoomEvent>>,
) -> Result<LoopAction, NetError> {
    let target = normalize_room_id(&join.room_id);
    if target.is_empty() {
        send_join_error(socket, "roomId is required").await?;
        return Ok(LoopAction::Continue);
    }

    // Rooms are created on first host join only; everyone else needs the
    // room to exist already.
    let (handle, created) = match registry.join_or_create(&target, join.is_host).await {
        Ok(result) => result,
        Err(RoomLookupError::NotFound) => {
            send_join_error(socket, RoomJoinError::RoomNotFound.message()).await?;
            return Ok(LoopAction::Continue);
        }
    };
    if created {
        spawn_room_serializer(&handle);
    }

    // Subscribe before the join event so the assignment and initial state
    // cannot be missed.
    let bytes_rx = handle.bytes_tx.subscribe();

    let (reply_tx, reply_rx) = oneshot::channel();
    let request = RoomEvent::Join(JoinRequest {
        conn_id: conn_id.to_string(),
        name: join.name,
        is_host: join.is_host,
        is_spectator: join.is_spectator,
        reply: reply_tx,
    });
    if handle.event_tx.send(request).await.is_err() {
        // Lost the race with room deletion; the client may retry.
        send_join_error(socket, RoomJoinError::RoomNotFound.message()).await?;
        return Ok(LoopAction::Continue);
    }

    match reply_rx.await {
        Ok(Ok(())) => {
            // Switching rooms leaves the previous one; a failed join above
            // would have left the old attachment untouched.
            if let (Some(previous), Some(previous_tx)) = (room_id.as_deref(), event_tx.as_ref()) {
                if previous != handle.room_id.as_ref() {
                    let _ = previous_tx
                        .send(RoomEvent::Leave {
                            conn_id: conn_id.to_string(),
                        })
                        .await;
                }
            }
            info!(room_id = %handle.room_id, "joined room");
            Ok(LoopAction::Attach {
                room_id: handle.room_id.clone(),
                event_tx: handle.event_tx.clone(),
                bytes_rx,
            })
        }
        Ok(Err(err)) => {
            send_join_error(socket, err.message()).await?;
            Ok(LoopAction::Continue)
        }
        // Reply dropped while the room shut down mid-join.
        Err(_) => {
            send_join_error(socket, RoomJoinError::RoomNotFound.message()).await?;
            Ok(LoopAction::Continue)
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    // Serialize message safely; log JSON errors instead of panicking.
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn send_join_error(socket: &mut WebSocket, message: &str) -> Result<(), NetError> {
    let msg = ServerMessage::JoinError(JoinErrorDto {
        message: message.to_string(),
    });
    send_message(socket, &msg).await.map(|_| ())
}

async fn forward_bytes(
    bytes: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = bytes.len();
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect follows immediately.
            warn!(error = ?err, "failed to send room event");
            LoopControl::Disconnect
        }
    }
}

async fn disconnect_cleanup(
    conn_id: &str,
    event_tx: &Option<mpsc::Sender<RoomEvent>>,
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
) {
    // Transport close maps to the Disconnected state; the room keeps the
    // scoreboard entry and notifies the remaining members.
    if let Some(tx) = event_tx.as_ref() {
        let _ = tx
            .send(RoomEvent::Disconnect {
                conn_id: conn_id.to_string(),
            })
            .await;
    }

    debug!(
        msgs_in,
        msgs_out, bytes_in, bytes_out, invalid_json, "connection stats"
    );
    info!("client disconnected");
}

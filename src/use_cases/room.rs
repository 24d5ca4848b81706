// The per-room actor: single writer for one Room's state.
//
// All mutations arrive through the event channel and are applied in receipt
// order; fan-out leaves through the scoped broadcast channel. The only
// scheduled work is the cancelable empty-room grace timer and the periodic
// large-room snapshot.

use std::future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, interval_at, sleep, Sleep};
use tracing::{debug, info};

use crate::domain::room::{ClaimOutcome, JoinError, Room};
use crate::domain::{map, Player};
use crate::use_cases::registry::{RoomRegistry, RoomSettings};
use crate::use_cases::types::{
    now_millis, CoinChangeReason, JoinRequest, PlayerSyncState, RoomBroadcast, RoomEvent,
    RoomJoinError, RoomSummary, Scope,
};

pub async fn room_task(
    mut room: Room,
    registry: Arc<RoomRegistry>,
    mut event_rx: mpsc::Receiver<RoomEvent>,
    outbound_tx: broadcast::Sender<(Scope, RoomBroadcast)>,
    settings: RoomSettings,
) {
    // A freshly created room has no members yet; arm the grace timer so a
    // host that dies before its join event lands cannot leak the room.
    let mut grace: Option<std::pin::Pin<Box<Sleep>>> =
        Some(Box::pin(sleep(settings.empty_room_grace)));
    // Stagger the first snapshot a full interval out.
    let mut sync_timer = interval_at(
        Instant::now() + settings.sync_interval,
        settings.sync_interval,
    );

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => apply_event(&mut room, event, &outbound_tx, &mut grace, &settings),
                    // Registry dropped the handle set; shut down with it.
                    None => break,
                }
            }

            // Empty-room deletion; a join during the window disarms this.
            () = async {
                match grace.as_mut() {
                    Some(timer) => timer.as_mut().await,
                    None => future::pending().await,
                }
            } => {
                if room.is_empty() {
                    registry.remove(room.id()).await;
                    info!(room_id = room.id(), "empty room removed after grace period");
                    break;
                }
                grace = None;
            }

            // Bound worst-case staleness in large rooms with a compact
            // full-state fan-out.
            _ = sync_timer.tick() => {
                if room.player_count() > settings.sync_min_players {
                    let players: Vec<PlayerSyncState> = room
                        .players()
                        .iter()
                        .filter(|p| !p.is_spectator)
                        .map(PlayerSyncState::from)
                        .collect();
                    emit(&outbound_tx, Scope::All, RoomBroadcast::GameStateSync { players });
                }
            }
        }
    }

    // The registry entry is gone, but joins may have raced removal through a
    // previously looked-up handle. Fail them so the client can retry (a host
    // retry recreates the room).
    event_rx.close();
    while let Ok(event) = event_rx.try_recv() {
        if let RoomEvent::Join(request) = event {
            let _ = request.reply.send(Err(RoomJoinError::RoomNotFound));
        }
    }
}

fn apply_event(
    room: &mut Room,
    event: RoomEvent,
    out: &broadcast::Sender<(Scope, RoomBroadcast)>,
    grace: &mut Option<std::pin::Pin<Box<Sleep>>>,
    settings: &RoomSettings,
) {
    let now = now_millis();
    match event {
        RoomEvent::Join(request) => apply_join(room, request, out, grace, now),

        RoomEvent::Move {
            conn_id,
            position,
            velocity,
            animation,
            timestamp,
        } => {
            // Last-write-wins; spectator and unknown-sender moves drop here.
            match room.apply_move(&conn_id, position, velocity, animation, now) {
                Some(player) => {
                    let broadcast = RoomBroadcast::PlayerMoved {
                        player_id: player.id.clone(),
                        // Name resolved server-side so renames stay consistent.
                        player_name: player.name.clone(),
                        position,
                        velocity,
                        animation,
                        timestamp,
                    };
                    emit(out, Scope::Except(conn_id), broadcast);
                }
                None => debug!(%conn_id, "movement from spectator or unknown player dropped"),
            }
        }

        RoomEvent::ClaimCoin { conn_id, coin_id } => {
            match room.claim_coin(&conn_id, &coin_id, now) {
                ClaimOutcome::Accepted { new_count } => {
                    let player_name = player_name(room, &conn_id);
                    emit(
                        out,
                        Scope::All,
                        RoomBroadcast::CoinCollected {
                            player_id: conn_id.clone(),
                            player_name: player_name.clone(),
                            coin_id,
                            new_coin_count: new_count,
                        },
                    );
                    emit_coins_updated(out, &conn_id, player_name, new_count, CoinChangeReason::Collect);
                    emit_scoreboard(room, out, Scope::All);
                }
                // Expected race on contested coins; no broadcast, no error.
                ClaimOutcome::Stale => debug!(%conn_id, %coin_id, "stale coin claim ignored"),
                ClaimOutcome::Ineligible => {
                    debug!(%conn_id, %coin_id, "coin claim from spectator or unknown player ignored");
                }
            }
        }

        RoomEvent::QuizResult {
            conn_id,
            is_correct,
        } => match room.apply_quiz_result(&conn_id, is_correct, now) {
            Some(coins) => {
                let player_name = player_name(room, &conn_id);
                emit_coins_updated(out, &conn_id, player_name, coins, CoinChangeReason::Quiz);
                emit_scoreboard(room, out, Scope::All);
            }
            None => debug!(%conn_id, "quiz result from spectator or unknown player ignored"),
        },

        RoomEvent::PlayerDied { conn_id } => match room.apply_death(&conn_id, now) {
            Some(true) => {
                let player_name = player_name(room, &conn_id);
                emit_coins_updated(out, &conn_id, player_name, 0, CoinChangeReason::Death);
                emit_scoreboard(room, out, Scope::All);
            }
            // Duplicate death notification for an already-zero player.
            Some(false) => debug!(%conn_id, "duplicate death notification ignored"),
            None => debug!(%conn_id, "death notification for unknown player ignored"),
        },

        RoomEvent::StartGame {
            conn_id,
            host_is_spectator,
        } => {
            if room.start(&conn_id, host_is_spectator) {
                info!(room_id = room.id(), host_is_spectator, "game started");
                emit_roster(room, out);
                emit_game_state(room, out, Scope::All);
            } else {
                debug!(%conn_id, "start request from non-host ignored");
            }
        }

        RoomEvent::RequestScoreboard { conn_id } => {
            emit_scoreboard(room, out, Scope::Only(conn_id));
        }

        RoomEvent::RequestSync { conn_id } => {
            emit_game_state(room, out, Scope::Only(conn_id));
        }

        RoomEvent::SaveQuestions { conn_id, questions } => {
            debug!(%conn_id, count = questions.len(), "room questions updated");
            room.set_questions(questions);
            emit(
                out,
                Scope::All,
                RoomBroadcast::QuestionsUpdated {
                    room_id: room.id().to_string(),
                    questions: room.questions().to_vec(),
                    count: room.questions().len(),
                },
            );
        }

        RoomEvent::RequestQuestions { conn_id } => {
            emit(
                out,
                Scope::Only(conn_id),
                RoomBroadcast::QuestionsReceived {
                    room_id: room.id().to_string(),
                    questions: room.questions().to_vec(),
                    count: room.questions().len(),
                },
            );
        }

        RoomEvent::EndGame { conn_id } => {
            if room.end_game() {
                info!(room_id = room.id(), %conn_id, "game ended");
                emit(out, Scope::All, RoomBroadcast::GameEnded);
            } else {
                debug!(%conn_id, "duplicate game end ignored");
            }
        }

        RoomEvent::ResetGame { conn_id } => {
            if room.player(&conn_id).is_some_and(|p| p.is_host) {
                room.reset(map::default_coins(), now);
                info!(room_id = room.id(), "room reset");
                emit_game_state(room, out, Scope::All);
                emit_scoreboard(room, out, Scope::All);
            } else {
                debug!(%conn_id, "reset request from non-host ignored");
            }
        }

        RoomEvent::Leave { conn_id } => {
            if apply_departure(room, &conn_id, out, grace, settings, now) {
                info!(room_id = room.id(), %conn_id, "player left");
            }
        }

        RoomEvent::Disconnect { conn_id } => {
            if apply_departure(room, &conn_id, out, grace, settings, now) {
                info!(room_id = room.id(), %conn_id, "player disconnected");
            }
        }

        RoomEvent::Summary { reply } => {
            let _ = reply.send(RoomSummary {
                room_id: room.id().to_string(),
                player_count: room.player_count(),
                started: room.started(),
                ended: room.ended(),
                created_at: room.created_at(),
            });
        }

        RoomEvent::FinalScores { reply } => {
            let _ = reply.send(room.final_scores().map(<[_]>::to_vec));
        }
    }
}

fn apply_join(
    room: &mut Room,
    request: JoinRequest,
    out: &broadcast::Sender<(Scope, RoomBroadcast)>,
    grace: &mut Option<std::pin::Pin<Box<Sleep>>>,
    now: u64,
) {
    let JoinRequest {
        conn_id,
        name,
        is_host,
        is_spectator,
        reply,
    } = request;

    match room.join(&conn_id, &name, is_host, is_spectator, now) {
        Ok(outcome) => {
            // Any successful join cancels pending deletion.
            *grace = None;
            let _ = reply.send(Ok(()));

            let Some(player) = room.player(&conn_id).cloned() else {
                return;
            };
            emit(
                out,
                Scope::Only(conn_id.clone()),
                RoomBroadcast::PlayerAssigned {
                    player: player.clone(),
                },
            );
            emit_game_state(room, out, Scope::Only(conn_id.clone()));

            if !outcome.resumed {
                info!(
                    room_id = room.id(),
                    %conn_id,
                    name = %player.name,
                    is_host,
                    "player joined"
                );
                emit(
                    out,
                    Scope::Except(conn_id),
                    RoomBroadcast::PlayerJoined { player },
                );
                emit_roster(room, out);
                emit_scoreboard(room, out, Scope::All);
            } else {
                debug!(%conn_id, "duplicate join resumed");
            }
        }
        Err(JoinError::HostConflict) => {
            // Requester-only failure; the room is unaffected.
            let _ = reply.send(Err(RoomJoinError::HostConflict));
        }
    }
}

// Leave and transport close share the same room-side effects; scoreboard
// entries survive either way.
fn apply_departure(
    room: &mut Room,
    conn_id: &str,
    out: &broadcast::Sender<(Scope, RoomBroadcast)>,
    grace: &mut Option<std::pin::Pin<Box<Sleep>>>,
    settings: &RoomSettings,
    now: u64,
) -> bool {
    let Some(player) = room.remove_player(conn_id, now) else {
        return false;
    };
    emit(
        out,
        Scope::Except(conn_id.to_string()),
        RoomBroadcast::PlayerLeft {
            player_id: player.id,
        },
    );
    emit_roster(room, out);
    emit_scoreboard(room, out, Scope::All);

    if room.is_empty() {
        *grace = Some(Box::pin(sleep(settings.empty_room_grace)));
    }
    true
}

fn player_name(room: &Room, conn_id: &str) -> String {
    room.player(conn_id).map(|p| p.name.clone()).unwrap_or_default()
}

fn emit(out: &broadcast::Sender<(Scope, RoomBroadcast)>, scope: Scope, event: RoomBroadcast) {
    // No subscribers is fine; sends are best-effort value snapshots.
    let _ = out.send((scope, event));
}

fn emit_roster(room: &Room, out: &broadcast::Sender<(Scope, RoomBroadcast)>) {
    let players: Vec<Player> = room.players().to_vec();
    emit(out, Scope::All, RoomBroadcast::PlayersUpdated { players });
}

fn emit_game_state(room: &Room, out: &broadcast::Sender<(Scope, RoomBroadcast)>, scope: Scope) {
    emit(
        out,
        scope,
        RoomBroadcast::GameState {
            players: room.players().to_vec(),
            coins: room.coins().to_vec(),
        },
    );
}

fn emit_scoreboard(room: &Room, out: &broadcast::Sender<(Scope, RoomBroadcast)>, scope: Scope) {
    emit(
        out,
        scope,
        RoomBroadcast::ScoreboardUpdate {
            rows: room.recompute_scoreboard(),
        },
    );
}

fn emit_coins_updated(
    out: &broadcast::Sender<(Scope, RoomBroadcast)>,
    conn_id: &str,
    player_name: String,
    coins: u32,
    reason: CoinChangeReason,
) {
    emit(
        out,
        Scope::All,
        RoomBroadcast::PlayerCoinsUpdated {
            player_id: conn_id.to_string(),
            player_name,
            coins,
            reason,
        },
    );
}

mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn unique_room() -> String {
    format!("T{}", uuid::Uuid::new_v4().simple())
}

async fn connect() -> WsClient {
    let base_url = support::ensure_server();
    let (socket, _) = connect_async(support::ws_url(base_url))
        .await
        .expect("websocket connect");
    socket
}

async fn send(socket: &mut WsClient, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send message");
}

/// Reads messages until one of the given type arrives, skipping everything
/// else (broadcast interleaving differs between runs).
async fn recv_until(socket: &mut WsClient, msg_type: &str) -> Value {
    recv_collect_until(socket, msg_type).await.1
}

/// Like `recv_until`, but also returns the skipped message types so tests can
/// assert something did NOT arrive in between.
async fn recv_collect_until(socket: &mut WsClient, msg_type: &str) -> (Vec<String>, Value) {
    let mut skipped = Vec::new();
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            let msg = socket
                .next()
                .await
                .expect("socket closed while waiting")
                .expect("websocket recv");
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(&text).expect("server sends valid json");
                if value["type"] == msg_type {
                    return (skipped, value);
                }
                if let Some(t) = value["type"].as_str() {
                    skipped.push(t.to_string());
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {msg_type}"))
}

struct Joined {
    player_id: String,
    assigned: Value,
    state: Value,
}

/// Joins a room and drains the join's own broadcast sequence (assignment,
/// initial state, roster, scoreboard) so later assertions never match stale
/// messages.
async fn join(socket: &mut WsClient, room_id: &str, name: &str, is_host: bool) -> Joined {
    join_with(socket, room_id, name, is_host, false).await
}

async fn join_with(
    socket: &mut WsClient,
    room_id: &str,
    name: &str,
    is_host: bool,
    is_spectator: bool,
) -> Joined {
    send(
        socket,
        json!({"type": "join", "data": {
            "roomId": room_id,
            "name": name,
            "isHost": is_host,
            "isSpectator": is_spectator
        }}),
    )
    .await;
    let assigned = recv_until(socket, "player-assigned").await;
    let state = recv_until(socket, "game-state").await;
    recv_until(socket, "scoreboard-update").await;
    let player_id = assigned["data"]["playerId"]
        .as_str()
        .expect("player id")
        .to_string();
    Joined {
        player_id,
        assigned,
        state,
    }
}

fn player_by_id<'a>(players: &'a Value, player_id: &str) -> &'a Value {
    players
        .as_array()
        .expect("players should be an array")
        .iter()
        .find(|p| p["id"] == player_id)
        .expect("player should be present")
}

fn board_entry<'a>(players: &'a Value, player_id: &str) -> &'a Value {
    players
        .as_array()
        .expect("scoreboard players should be an array")
        .iter()
        .find(|p| p["playerId"] == player_id)
        .expect("scoreboard entry should be present")
}

#[tokio::test]
async fn test_host_creates_room_and_joiner_sees_roster() {
    let room = unique_room();
    let mut host = connect().await;

    let joined = join(&mut host, &room, "Alice", true).await;
    assert_eq!(joined.assigned["data"]["isHost"], true);
    assert_eq!(joined.assigned["data"]["isSpectator"], false);

    // The joiner receives the full world: itself plus the coin layout.
    let players = joined.state["data"]["players"].as_array().expect("players");
    assert_eq!(players.len(), 1);
    assert!(!joined.state["data"]["coins"].as_array().expect("coins").is_empty());

    let mut bob = connect().await;
    let bob_joined = join(&mut bob, &room, "Bob", false).await;
    assert_ne!(bob_joined.player_id, joined.player_id);

    // The host is told about the new roster; Bob starts with zero coins.
    let updated = recv_until(&mut host, "players-updated").await;
    let players = &updated["data"]["players"];
    assert_eq!(players.as_array().expect("players").len(), 2);
    assert_eq!(player_by_id(players, &bob_joined.player_id)["coins"], 0);
}

#[tokio::test]
async fn test_non_host_join_to_missing_room_fails_and_connection_survives() {
    let mut socket = connect().await;

    send(
        &mut socket,
        json!({"type": "join", "data": {"roomId": unique_room(), "name": "Bob", "isHost": false}}),
    )
    .await;
    let err = recv_until(&mut socket, "join-error").await;
    assert_eq!(err["data"]["message"], "room not found");

    // The connection stays open; a host join on the same socket succeeds.
    let joined = join(&mut socket, &unique_room(), "Bob", true).await;
    assert_eq!(joined.assigned["data"]["isHost"], true);
}

#[tokio::test]
async fn test_second_host_join_is_rejected() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;

    let mut rival = connect().await;
    send(
        &mut rival,
        json!({"type": "join", "data": {"roomId": room, "name": "Mallory", "isHost": true}}),
    )
    .await;
    let err = recv_until(&mut rival, "join-error").await;
    assert_eq!(err["data"]["message"], "room already has a host");
}

#[tokio::test]
async fn test_room_ids_are_case_normalized() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room.to_lowercase(), "Alice", true).await;

    // A joiner using different casing lands in the same room.
    let mut bob = connect().await;
    join(&mut bob, &room.to_uppercase(), "Bob", false).await;
    let updated = recv_until(&mut host, "players-updated").await;
    assert_eq!(updated["data"]["players"].as_array().expect("players").len(), 2);
}

#[tokio::test]
async fn test_duplicate_names_get_deterministic_suffixes() {
    let room = unique_room();
    let mut first = connect().await;
    join(&mut first, &room, "Alex", true).await;

    let mut second = connect().await;
    let joined = join(&mut second, &room, "Alex", false).await;
    assert_eq!(
        player_by_id(&joined.state["data"]["players"], &joined.player_id)["name"],
        "Alex 1"
    );
}

#[tokio::test]
async fn test_coin_claim_grants_once_and_duplicate_is_silent() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;
    let mut bob = connect().await;
    let bob_id = join(&mut bob, &room, "Bob", false).await.player_id;

    send(
        &mut bob,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_250_400"}}),
    )
    .await;
    let collected = recv_until(&mut bob, "coin-collected").await;
    assert_eq!(collected["data"]["playerName"], "Bob");
    assert_eq!(collected["data"]["newCoinCount"], 1);
    let scoreboard = recv_until(&mut bob, "scoreboard-update").await;
    assert_eq!(board_entry(&scoreboard["data"]["players"], &bob_id)["coins"], 1);

    // Second claim for the same coin is rejected without any broadcast; the
    // next scoreboard we request still shows a single grant.
    send(
        &mut bob,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_250_400"}}),
    )
    .await;
    send(&mut bob, json!({"type": "request-scoreboard", "data": {}})).await;
    let (skipped, scoreboard) = recv_collect_until(&mut bob, "scoreboard-update").await;
    assert!(!skipped.iter().any(|t| t == "coin-collected"));
    assert_eq!(board_entry(&scoreboard["data"]["players"], &bob_id)["coins"], 1);
}

#[tokio::test]
async fn test_movement_fans_out_with_server_resolved_name() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;
    let mut bob = connect().await;
    join(&mut bob, &room, "Bob", false).await;

    send(
        &mut bob,
        json!({"type": "player-move", "data": {
            "roomId": room,
            "position": {"x": 320.0, "y": 128.0},
            "velocity": {"x": 4.5, "y": 0.0},
            "animation": "run",
            "timestamp": 1234.5
        }}),
    )
    .await;

    let moved = recv_until(&mut host, "player-moved").await;
    assert_eq!(moved["data"]["playerName"], "Bob");
    assert_eq!(moved["data"]["position"]["x"], 320.0);
    assert_eq!(moved["data"]["animation"], "run");
    assert_eq!(moved["data"]["timestamp"], 1234.5);
}

#[tokio::test]
async fn test_spectator_host_movement_is_never_broadcast() {
    let room = unique_room();
    let mut host = connect().await;
    let joined = join_with(&mut host, &room, "Host", true, true).await;
    assert_eq!(joined.assigned["data"]["isSpectator"], true);

    let mut bob = connect().await;
    join(&mut bob, &room, "Bob", false).await;

    // Spectator movement first, then Bob's claim; if the move were broadcast
    // Bob would see player-moved before coin-collected.
    send(
        &mut host,
        json!({"type": "player-move", "data": {"roomId": room, "position": {"x": 1.0, "y": 1.0}}}),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    send(
        &mut bob,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_350_400"}}),
    )
    .await;
    let (skipped, _) = recv_collect_until(&mut bob, "coin-collected").await;
    assert!(!skipped.iter().any(|t| t == "player-moved"));
}

#[tokio::test]
async fn test_quiz_deltas_are_additive_with_pickup_and_clamped() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;

    send(
        &mut host,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_450_360"}}),
    )
    .await;
    recv_until(&mut host, "coin-collected").await;

    // Correct answer adds on top of the pickup increment.
    send(
        &mut host,
        json!({"type": "quiz-result", "data": {"roomId": room, "isCorrect": true}}),
    )
    .await;
    let updated = recv_until(&mut host, "player-coins-updated").await;
    assert_eq!(updated["data"]["coins"], 2);
    assert_eq!(updated["data"]["reason"], "quiz");

    // Wrong answers subtract, saturating at zero.
    for expected in [1, 0, 0] {
        send(
            &mut host,
            json!({"type": "quiz-result", "data": {"roomId": room, "isCorrect": false}}),
        )
        .await;
        let updated = recv_until(&mut host, "player-coins-updated").await;
        assert_eq!(updated["data"]["coins"], expected);
    }
}

#[tokio::test]
async fn test_death_zeroes_score_and_duplicate_is_noop() {
    let room = unique_room();
    let mut host = connect().await;
    let host_id = join(&mut host, &room, "Alice", true).await.player_id;

    send(
        &mut host,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_550_320"}}),
    )
    .await;
    recv_until(&mut host, "scoreboard-update").await;

    send(&mut host, json!({"type": "player-died", "data": {"roomId": room}})).await;
    let updated = recv_until(&mut host, "player-coins-updated").await;
    assert_eq!(updated["data"]["coins"], 0);
    assert_eq!(updated["data"]["reason"], "death");
    recv_until(&mut host, "scoreboard-update").await;

    // A duplicate death produces no rebroadcast; the requested scoreboard
    // still shows zero.
    send(&mut host, json!({"type": "player-died", "data": {"roomId": room}})).await;
    send(&mut host, json!({"type": "request-scoreboard", "data": {}})).await;
    let (skipped, scoreboard) = recv_collect_until(&mut host, "scoreboard-update").await;
    assert!(!skipped.iter().any(|t| t == "player-coins-updated"));
    assert_eq!(board_entry(&scoreboard["data"]["players"], &host_id)["coins"], 0);
}

#[tokio::test]
async fn test_leaving_keeps_the_score_on_the_board() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;
    let mut bob = connect().await;
    let bob_id = join(&mut bob, &room, "Bob", false).await.player_id;

    send(
        &mut bob,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_650_320"}}),
    )
    .await;
    recv_until(&mut host, "coin-collected").await;

    send(&mut bob, json!({"type": "leave", "data": {"roomId": room}})).await;

    let left = recv_until(&mut host, "player-left").await;
    assert_eq!(left["data"]["playerId"], bob_id.as_str());
    let updated = recv_until(&mut host, "players-updated").await;
    assert_eq!(updated["data"]["players"].as_array().expect("players").len(), 1);
    // Scoreboard entries survive roster removal for the room's lifetime.
    let scoreboard = recv_until(&mut host, "scoreboard-update").await;
    assert_eq!(board_entry(&scoreboard["data"]["players"], &bob_id)["coins"], 1);
}

#[tokio::test]
async fn test_only_the_host_starts_the_game() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;
    let mut bob = connect().await;
    join(&mut bob, &room, "Bob", false).await;

    // Non-host start is ignored; the host start reaches Bob as a fresh full
    // game-state.
    send(&mut bob, json!({"type": "start-game", "data": {"roomId": room}})).await;
    send(&mut host, json!({"type": "start-game", "data": {"roomId": room}})).await;
    recv_until(&mut bob, "game-state").await;
}

#[tokio::test]
async fn test_request_sync_returns_full_state_to_requester() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;

    send(
        &mut host,
        json!({"type": "request-sync", "data": {"roomId": room}}),
    )
    .await;
    let state = recv_until(&mut host, "game-state").await;
    assert_eq!(state["data"]["players"].as_array().expect("players").len(), 1);
}

#[tokio::test]
async fn test_questions_are_stored_and_relayed() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;
    let mut bob = connect().await;
    join(&mut bob, &room, "Bob", false).await;

    let questions = json!([
        {"question": "2 + 2?", "options": ["3", "4"], "answer": 1},
        {"question": "Capital of France?", "options": ["Paris", "Rome"], "answer": 0}
    ]);
    send(
        &mut host,
        json!({"type": "save-questions", "data": {"roomId": room, "questions": questions}}),
    )
    .await;
    let updated = recv_until(&mut bob, "questions-updated").await;
    assert_eq!(updated["data"]["count"], 2);

    send(
        &mut bob,
        json!({"type": "request-questions", "data": {"roomId": room}}),
    )
    .await;
    let received = recv_until(&mut bob, "questions-received").await;
    assert_eq!(received["data"]["questions"].as_array().expect("questions").len(), 2);
}

#[tokio::test]
async fn test_reset_restores_the_coin_layout_and_zeroes_scores() {
    let room = unique_room();
    let mut host = connect().await;
    let joined = join(&mut host, &room, "Alice", true).await;
    let full_layout = joined.state["data"]["coins"].as_array().expect("coins").len();

    send(
        &mut host,
        json!({"type": "collect-coin", "data": {"roomId": room, "coinId": "coin_750_280"}}),
    )
    .await;
    recv_until(&mut host, "scoreboard-update").await;

    send(&mut host, json!({"type": "reset-game", "data": {"roomId": room}})).await;
    let state = recv_until(&mut host, "game-state").await;
    assert_eq!(state["data"]["coins"].as_array().expect("coins").len(), full_layout);
    assert_eq!(player_by_id(&state["data"]["players"], &joined.player_id)["coins"], 0);
    let scoreboard = recv_until(&mut host, "scoreboard-update").await;
    assert_eq!(
        board_entry(&scoreboard["data"]["players"], &joined.player_id)["coins"],
        0
    );
}

#[tokio::test]
async fn test_malformed_messages_are_dropped_without_closing() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Alice", true).await;

    // Unknown type and a payload missing required fields are both dropped.
    send(&mut host, json!({"type": "warp-drive", "data": {}})).await;
    send(&mut host, json!({"type": "collect-coin", "data": {"roomId": room}})).await;

    // The connection still works afterwards.
    send(&mut host, json!({"type": "request-scoreboard", "data": {}})).await;
    recv_until(&mut host, "scoreboard-update").await;
}

#[tokio::test]
async fn test_large_rooms_receive_periodic_compact_snapshots() {
    let room = unique_room();
    let mut host = connect().await;
    join(&mut host, &room, "Host", true).await;

    // Push the roster past the snapshot threshold.
    let mut others = Vec::new();
    for i in 0..10 {
        let mut socket = connect().await;
        join(&mut socket, &room, &format!("P{i}"), false).await;
        others.push(socket);
    }

    let sync = recv_until(&mut host, "game-state-sync").await;
    let players = sync["data"]["players"].as_array().expect("players");
    assert_eq!(players.len(), 11);
    // Compact form only: no name, no coins.
    assert!(players[0]["name"].is_null());
    assert!(players[0].get("coins").is_none());
}

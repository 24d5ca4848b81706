// Read-only HTTP surface: thin snapshot queries over the room tasks, with no
// synchronization semantics of their own.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::normalize_room_id;
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::protocol::ScoreRowDto;
use crate::interface_adapters::state::AppState;
use crate::use_cases::{RoomEvent, RoomSummary};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rooms = state.room_registry.room_count().await;
    Json(HealthResponse { status: "ok", rooms })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoResponse {
    pub room_id: String,
    pub player_count: usize,
    pub started: bool,
    pub ended: bool,
    pub created_at: u64,
}

impl From<RoomSummary> for RoomInfoResponse {
    fn from(summary: RoomSummary) -> Self {
        Self {
            room_id: summary.room_id,
            player_count: summary.player_count,
            started: summary.started,
            ended: summary.ended,
            created_at: summary.created_at,
        }
    }
}

pub async fn room_info_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Response {
    let room_id = normalize_room_id(&room_id);
    let Some(handle) = state.room_registry.get(&room_id).await else {
        return not_found("room not found");
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .event_tx
        .send(RoomEvent::Summary { reply: reply_tx })
        .await
        .is_err()
    {
        // Room shut down between lookup and query.
        return not_found("room not found");
    }
    match reply_rx.await {
        Ok(summary) => (StatusCode::OK, Json(RoomInfoResponse::from(summary))).into_response(),
        Err(_) => not_found("room not found"),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScoresResponse {
    pub room_id: String,
    pub players: Vec<ScoreRowDto>,
}

pub async fn final_scores_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Response {
    let room_id = normalize_room_id(&room_id);
    let Some(handle) = state.room_registry.get(&room_id).await else {
        return not_found("room not found");
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .event_tx
        .send(RoomEvent::FinalScores { reply: reply_tx })
        .await
        .is_err()
    {
        return not_found("room not found");
    }
    match reply_rx.await {
        Ok(Some(rows)) => {
            let players: Vec<ScoreRowDto> = rows.iter().map(ScoreRowDto::from).collect();
            (StatusCode::OK, Json(FinalScoresResponse { room_id, players })).into_response()
        }
        // Snapshot exists only once the game has ended.
        Ok(None) => not_found("final scores not available"),
        Err(_) => not_found("room not found"),
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// Use-case level inputs/outputs for the room actor.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;

use crate::domain::{Animation, Coin, Player, ScoreRow, Vec2};

/// Wall-clock millis used for `last_update`/`last_active` stamps.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Join failures reported back to the requesting connection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomJoinError {
    RoomNotFound,
    HostConflict,
}

impl RoomJoinError {
    /// User-facing `join-error` message text.
    pub fn message(&self) -> &'static str {
        match self {
            RoomJoinError::RoomNotFound => "room not found",
            RoomJoinError::HostConflict => "room already has a host",
        }
    }
}

#[derive(Debug)]
pub struct JoinRequest {
    pub conn_id: String,
    pub name: String,
    pub is_host: bool,
    pub is_spectator: bool,
    /// Requester-only reply; the room task answers immediately and never
    /// waits on the requesting connection.
    pub reply: oneshot::Sender<Result<(), RoomJoinError>>,
}

/// Inbound mutations and queries, applied in receipt order by the owning
/// room task. This channel is the room's serialization point.
#[derive(Debug)]
pub enum RoomEvent {
    Join(JoinRequest),
    Move {
        conn_id: String,
        position: Vec2,
        velocity: Vec2,
        animation: Animation,
        /// Client-monotonic send time, relayed untouched.
        timestamp: f64,
    },
    ClaimCoin {
        conn_id: String,
        coin_id: String,
    },
    QuizResult {
        conn_id: String,
        is_correct: bool,
    },
    PlayerDied {
        conn_id: String,
    },
    StartGame {
        conn_id: String,
        host_is_spectator: bool,
    },
    RequestScoreboard {
        conn_id: String,
    },
    RequestSync {
        conn_id: String,
    },
    SaveQuestions {
        conn_id: String,
        questions: Vec<serde_json::Value>,
    },
    RequestQuestions {
        conn_id: String,
    },
    EndGame {
        conn_id: String,
    },
    ResetGame {
        conn_id: String,
    },
    Leave {
        conn_id: String,
    },
    Disconnect {
        conn_id: String,
    },
    /// Read-only snapshot for the HTTP surface.
    Summary {
        reply: oneshot::Sender<RoomSummary>,
    },
    FinalScores {
        reply: oneshot::Sender<Option<Vec<ScoreRow>>>,
    },
}

/// Delivery scope for one outbound broadcast. Every room subscriber sees the
/// pair and filters locally, so payloads are serialized exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Everyone in the room except the originating connection.
    Except(String),
    /// The named connection only.
    Only(String),
}

impl Scope {
    pub fn includes(&self, conn_id: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Except(excluded) => excluded != conn_id,
            Scope::Only(target) => target == conn_id,
        }
    }
}

/// Reason tag attached to authoritative coin-count updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinChangeReason {
    Collect,
    Quiz,
    Death,
}

/// Compact per-player state for the periodic large-room snapshot.
#[derive(Debug, Clone)]
pub struct PlayerSyncState {
    pub id: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub animation: Animation,
}

impl From<&Player> for PlayerSyncState {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            position: player.position,
            velocity: player.velocity,
            animation: player.animation,
        }
    }
}

/// Outbound room events as value snapshots; a broadcast in flight is never
/// affected by later room mutations.
#[derive(Debug, Clone)]
pub enum RoomBroadcast {
    PlayerAssigned {
        player: Player,
    },
    GameState {
        players: Vec<Player>,
        coins: Vec<Coin>,
    },
    PlayersUpdated {
        players: Vec<Player>,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        player_id: String,
    },
    PlayerMoved {
        player_id: String,
        player_name: String,
        position: Vec2,
        velocity: Vec2,
        animation: Animation,
        timestamp: f64,
    },
    CoinCollected {
        player_id: String,
        player_name: String,
        coin_id: String,
        new_coin_count: u32,
    },
    PlayerCoinsUpdated {
        player_id: String,
        player_name: String,
        coins: u32,
        reason: CoinChangeReason,
    },
    ScoreboardUpdate {
        rows: Vec<ScoreRow>,
    },
    GameStateSync {
        players: Vec<PlayerSyncState>,
    },
    QuestionsUpdated {
        room_id: String,
        questions: Vec<serde_json::Value>,
        count: usize,
    },
    QuestionsReceived {
        room_id: String,
        questions: Vec<serde_json::Value>,
        count: usize,
    },
    GameEnded,
}

/// Read-only room snapshot for the HTTP surface.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub room_id: String,
    pub player_count: usize,
    pub started: bool,
    pub ended: bool,
    pub created_at: u64,
}

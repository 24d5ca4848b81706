// Wire protocol DTOs and conversions for public session server messages.
// Payloads are JSON `{"type": "<kebab-case>", "data": {…}}` with camelCase
// fields, matching what the browser client speaks.

use serde::{Deserialize, Serialize};

use crate::domain::{Animation, Coin, Player, ScoreRow, Vec2};
use crate::use_cases::{CoinChangeReason, PlayerSyncState, RoomBroadcast};

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    // Handshake; also re-sent by clients that want a resume.
    Join(JoinDto),
    PlayerMove(PlayerMoveDto),
    CollectCoin(CollectCoinDto),
    QuizResult(QuizResultDto),
    PlayerDied(PlayerDiedDto),
    StartGame(StartGameDto),
    RequestScoreboard(RequestScoreboardDto),
    RequestSync(RequestSyncDto),
    Leave(LeaveDto),
    SaveQuestions(SaveQuestionsDto),
    RequestQuestions(RequestQuestionsDto),
    GameEnded(GameEndedDto),
    ResetGame(ResetGameDto),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDto {
    pub room_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_spectator: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMoveDto {
    pub room_id: String,
    pub position: Vec2Dto,
    #[serde(default)]
    pub velocity: Vec2Dto,
    #[serde(default)]
    pub animation: AnimationDto,
    /// Client-monotonic send time in millis.
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectCoinDto {
    pub room_id: String,
    pub coin_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultDto {
    pub room_id: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDiedDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameDto {
    pub room_id: String,
    #[serde(default)]
    pub host_is_spectator: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestScoreboardDto {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSyncDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQuestionsDto {
    pub room_id: String,
    /// Question payloads are opaque to the server; stored and relayed as-is.
    pub questions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQuestionsDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndedDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetGameDto {
    pub room_id: String,
}

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    // Assigned identity for the connection after a join is accepted.
    PlayerAssigned(PlayerAssignedDto),
    // Full world snapshot: roster plus remaining claimable coins.
    GameState(GameStateDto),
    PlayersUpdated(PlayersUpdatedDto),
    PlayerJoined(PlayerDto),
    PlayerLeft(PlayerLeftDto),
    PlayerMoved(PlayerMovedDto),
    CoinCollected(CoinCollectedDto),
    // Authoritative per-player coin count.
    PlayerCoinsUpdated(PlayerCoinsUpdatedDto),
    ScoreboardUpdate(ScoreboardUpdateDto),
    // Compact periodic snapshot for large rooms.
    GameStateSync(GameStateSyncDto),
    QuestionsUpdated(QuestionsDto),
    QuestionsReceived(QuestionsDto),
    JoinError(JoinErrorDto),
    GameEnded(GameEndedEventDto),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAssignedDto {
    pub player_id: String,
    pub is_host: bool,
    pub is_spectator: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_spectator: bool,
    pub ready: bool,
    pub coins: u32,
    pub position: Vec2Dto,
    pub velocity: Vec2Dto,
    pub animation: AnimationDto,
    pub color: String,
    pub last_update: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinStateDto {
    pub id: String,
    pub position: Vec2Dto,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateDto {
    pub players: Vec<PlayerDto>,
    pub coins: Vec<CoinStateDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersUpdatedDto {
    pub players: Vec<PlayerDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftDto {
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMovedDto {
    pub player_id: String,
    pub player_name: String,
    pub position: Vec2Dto,
    pub velocity: Vec2Dto,
    pub animation: AnimationDto,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinCollectedDto {
    pub player_id: String,
    pub player_name: String,
    pub coin_id: String,
    pub new_coin_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCoinsUpdatedDto {
    pub player_id: String,
    pub player_name: String,
    pub coins: u32,
    pub reason: CoinReasonDto,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardUpdateDto {
    pub players: Vec<ScoreRowDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRowDto {
    pub player_id: String,
    pub name: String,
    pub coins: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateSyncDto {
    pub players: Vec<PlayerSyncDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSyncDto {
    pub id: String,
    pub position: Vec2Dto,
    pub velocity: Vec2Dto,
    pub animation: AnimationDto,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsDto {
    pub room_id: String,
    pub questions: Vec<serde_json::Value>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinErrorDto {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameEndedEventDto {}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Vec2Dto {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl From<Vec2Dto> for Vec2 {
    fn from(v: Vec2Dto) -> Self {
        Vec2 { x: v.x, y: v.y }
    }
}

impl From<Vec2> for Vec2Dto {
    fn from(v: Vec2) -> Self {
        Vec2Dto { x: v.x, y: v.y }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationDto {
    #[default]
    Idle,
    Run,
    Jump,
}

impl From<AnimationDto> for Animation {
    fn from(a: AnimationDto) -> Self {
        match a {
            AnimationDto::Idle => Animation::Idle,
            AnimationDto::Run => Animation::Run,
            AnimationDto::Jump => Animation::Jump,
        }
    }
}

impl From<Animation> for AnimationDto {
    fn from(a: Animation) -> Self {
        match a {
            Animation::Idle => AnimationDto::Idle,
            Animation::Run => AnimationDto::Run,
            Animation::Jump => AnimationDto::Jump,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinReasonDto {
    Collect,
    Quiz,
    Death,
}

impl From<CoinChangeReason> for CoinReasonDto {
    fn from(reason: CoinChangeReason) -> Self {
        match reason {
            CoinChangeReason::Collect => CoinReasonDto::Collect,
            CoinChangeReason::Quiz => CoinReasonDto::Quiz,
            CoinChangeReason::Death => CoinReasonDto::Death,
        }
    }
}

impl From<&Player> for PlayerDto {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            is_host: player.is_host,
            is_spectator: player.is_spectator,
            ready: player.ready,
            coins: player.coins,
            position: player.position.into(),
            velocity: player.velocity.into(),
            animation: player.animation.into(),
            color: player.color.to_string(),
            last_update: player.last_update,
        }
    }
}

impl From<&Coin> for CoinStateDto {
    fn from(coin: &Coin) -> Self {
        Self {
            id: coin.id.clone(),
            position: coin.position.into(),
        }
    }
}

impl From<&ScoreRow> for ScoreRowDto {
    fn from(row: &ScoreRow) -> Self {
        Self {
            player_id: row.player_id.clone(),
            name: row.name.clone(),
            coins: row.coins,
        }
    }
}

impl From<&PlayerSyncState> for PlayerSyncDto {
    fn from(state: &PlayerSyncState) -> Self {
        Self {
            id: state.id.clone(),
            position: state.position.into(),
            velocity: state.velocity.into(),
            animation: state.animation.into(),
        }
    }
}

impl From<RoomBroadcast> for ServerMessage {
    fn from(event: RoomBroadcast) -> Self {
        match event {
            RoomBroadcast::PlayerAssigned { player } => {
                ServerMessage::PlayerAssigned(PlayerAssignedDto {
                    player_id: player.id.clone(),
                    is_host: player.is_host,
                    is_spectator: player.is_spectator,
                })
            }
            RoomBroadcast::GameState { players, coins } => ServerMessage::GameState(GameStateDto {
                players: players.iter().map(PlayerDto::from).collect(),
                coins: coins.iter().map(CoinStateDto::from).collect(),
            }),
            RoomBroadcast::PlayersUpdated { players } => {
                ServerMessage::PlayersUpdated(PlayersUpdatedDto {
                    players: players.iter().map(PlayerDto::from).collect(),
                })
            }
            RoomBroadcast::PlayerJoined { player } => {
                ServerMessage::PlayerJoined(PlayerDto::from(&player))
            }
            RoomBroadcast::PlayerLeft { player_id } => {
                ServerMessage::PlayerLeft(PlayerLeftDto { player_id })
            }
            RoomBroadcast::PlayerMoved {
                player_id,
                player_name,
                position,
                velocity,
                animation,
                timestamp,
            } => ServerMessage::PlayerMoved(PlayerMovedDto {
                player_id,
                player_name,
                position: position.into(),
                velocity: velocity.into(),
                animation: animation.into(),
                timestamp,
            }),
            RoomBroadcast::CoinCollected {
                player_id,
                player_name,
                coin_id,
                new_coin_count,
            } => ServerMessage::CoinCollected(CoinCollectedDto {
                player_id,
                player_name,
                coin_id,
                new_coin_count,
            }),
            RoomBroadcast::PlayerCoinsUpdated {
                player_id,
                player_name,
                coins,
                reason,
            } => ServerMessage::PlayerCoinsUpdated(PlayerCoinsUpdatedDto {
                player_id,
                player_name,
                coins,
                reason: reason.into(),
            }),
            RoomBroadcast::ScoreboardUpdate { rows } => {
                ServerMessage::ScoreboardUpdate(ScoreboardUpdateDto {
                    players: rows.iter().map(ScoreRowDto::from).collect(),
                })
            }
            RoomBroadcast::GameStateSync { players } => {
                ServerMessage::GameStateSync(GameStateSyncDto {
                    players: players.iter().map(PlayerSyncDto::from).collect(),
                })
            }
            RoomBroadcast::QuestionsUpdated {
                room_id,
                questions,
                count,
            } => ServerMessage::QuestionsUpdated(QuestionsDto {
                room_id,
                questions,
                count,
            }),
            RoomBroadcast::QuestionsReceived {
                room_id,
                questions,
                count,
            } => ServerMessage::QuestionsReceived(QuestionsDto {
                room_id,
                questions,
                count,
            }),
            RoomBroadcast::GameEnded => ServerMessage::GameEnded(GameEndedEventDto {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_join_payload_arrives_then_kebab_tag_and_camel_fields_parse() {
        let raw = r#"{"type":"join","data":{"roomId":"abcd","name":"Alice","isHost":true}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).expect("join should parse");
        let ClientMessage::Join(join) = msg else {
            panic!("expected join");
        };
        assert_eq!(join.room_id, "abcd");
        assert!(join.is_host);
        assert!(!join.is_spectator);
    }

    #[test]
    fn when_move_payload_omits_optionals_then_defaults_apply() {
        let raw = r#"{"type":"player-move","data":{"roomId":"ABCD","position":{"x":3.0,"y":4.0}}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).expect("move should parse");
        let ClientMessage::PlayerMove(m) = msg else {
            panic!("expected player-move");
        };
        assert_eq!(m.position.x, 3.0);
        assert_eq!(m.velocity.x, 0.0);
        assert!(matches!(m.animation, AnimationDto::Idle));
    }

    #[test]
    fn when_required_fields_are_missing_then_parse_fails() {
        let raw = r#"{"type":"collect-coin","data":{"roomId":"ABCD"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn when_server_message_serializes_then_wire_names_are_kebab_and_camel() {
        let msg = ServerMessage::CoinCollected(CoinCollectedDto {
            player_id: "c1".into(),
            player_name: "Bob".into(),
            coin_id: "coin_250_400".into(),
            new_coin_count: 1,
        });
        let txt = serde_json::to_string(&msg).expect("serialize");
        assert!(txt.contains(r#""type":"coin-collected""#));
        assert!(txt.contains(r#""newCoinCount":1"#));
        assert!(txt.contains(r#""playerName":"Bob""#));
    }
}

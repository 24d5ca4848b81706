// Domain-level session state: players, coins, scoreboard entries.

/// Maximum accepted display name length; longer names fall back to the default.
pub const MAX_NAME_LEN: usize = 32;
/// Display name used when a client joins with an empty or oversized name.
pub const DEFAULT_NAME: &str = "Player";
/// Scoreboard broadcasts carry at most this many entries.
pub const SCOREBOARD_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Animation state mirrored between clients; the server never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Animation {
    #[default]
    Idle,
    Run,
    Jump,
}

#[derive(Debug, Clone)]
pub struct Player {
    /// Connection id assigned by the gateway; never reused across transports.
    pub id: String,
    /// Display name, unique among active players in the room.
    pub name: String,
    pub is_host: bool,
    /// Only ever true for the host.
    pub is_spectator: bool,
    pub ready: bool,
    pub coins: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub animation: Animation,
    /// Derived deterministically from the id so every client agrees.
    pub color: &'static str,
    /// Millis timestamp of the last state change for this player.
    pub last_update: u64,
}

#[derive(Debug, Clone)]
pub struct Coin {
    pub id: String,
    pub position: Vec2,
}

impl Coin {
    /// Coin ids are derived from the integer position so retried claims
    /// resolve to the same coin.
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            id: coin_id(x, y),
            position: Vec2::new(x as f32, y as f32),
        }
    }
}

pub fn coin_id(x: i32, y: i32) -> String {
    format!("coin_{x}_{y}")
}

/// Scoreboard entry; outlives the player's roster membership for the room's
/// lifetime so scores survive disconnects.
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub name: String,
    pub coins: u32,
    pub last_active: u64,
    /// Insertion order, used as the stable tie-breaker when sorting.
    pub seq: u64,
}

/// One row of the derived, sorted scoreboard view.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub player_id: String,
    pub name: String,
    pub coins: u32,
}

const PLAYER_COLORS: [&str; 10] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#008080",
];

/// Deterministic color pick so every client renders the same player the same
/// way without negotiating.
pub fn color_for_id(id: &str) -> &'static str {
    PLAYER_COLORS[(fnv1a(id.as_bytes()) % PLAYER_COLORS.len() as u64) as usize]
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    hash
}

use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("GAME_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
}

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const OUTBOUND_BROADCAST_CAPACITY: usize = 256;

// Empty rooms survive this long; a rejoin inside the window cancels deletion.
pub const EMPTY_ROOM_GRACE: Duration = Duration::from_secs(5);
// Cadence of the compact full-state fan-out for large rooms.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(2);
// Rooms must exceed this many players before periodic snapshots are sent.
pub const SYNC_MIN_PLAYERS: usize = 10;

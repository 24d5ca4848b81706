// Domain layer: room state and rules, free of I/O and framework types.

pub mod map;
pub mod room;
pub mod state;

pub use room::{ClaimOutcome, JoinError, JoinOutcome, Room, normalize_room_id};
pub use state::{Animation, Coin, Player, ScoreEntry, ScoreRow, Vec2};

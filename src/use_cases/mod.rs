// Use cases layer: application workflows for the session server.

pub mod registry;
pub mod room;
pub mod types;

pub use registry::{RoomHandle, RoomLookupError, RoomRegistry, RoomSettings};
pub use types::{
    CoinChangeReason, JoinRequest, PlayerSyncState, RoomBroadcast, RoomEvent, RoomJoinError,
    RoomSummary, Scope,
};

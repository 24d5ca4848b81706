// Registry of active rooms: concurrency-safe lookup plus one actor task and
// one serialization pipeline per room. The map lock is only ever held for
// insert/lookup/remove, never across room work, so rooms stay independent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::info;

use crate::domain::room::Room;
use crate::domain::map;
use crate::use_cases::room::room_task;
use crate::use_cases::types::{now_millis, RoomBroadcast, RoomEvent, Scope};

/// Shared configuration applied to newly created rooms.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Capacity for inbound room events.
    pub event_channel_capacity: usize,
    /// Capacity for the scoped outbound broadcast channels.
    pub outbound_channel_capacity: usize,
    /// How long an empty room survives before deletion.
    pub empty_room_grace: Duration,
    /// Cadence of the compact full-state snapshot for large rooms.
    pub sync_interval: Duration,
    /// Rooms must exceed this many players before snapshots are sent.
    pub sync_min_players: usize,
}

/// Errors returned by room lookup for non-host joiners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLookupError {
    /// Room does not exist and the requester may not create it.
    NotFound,
}

/// Per-room channels shared by every connection attached to the room.
#[derive(Clone)]
pub struct RoomHandle {
    /// Identifier clients use to target this room (already normalized).
    pub room_id: Arc<str>,
    /// Sender for room events into the room task.
    pub event_tx: mpsc::Sender<RoomEvent>,
    /// Broadcast sender for scoped domain-level outbound events.
    pub outbound_tx: broadcast::Sender<(Scope, RoomBroadcast)>,
    /// Broadcast sender for the serialized form of the same events.
    pub bytes_tx: broadcast::Sender<(Scope, Utf8Bytes)>,
}

/// Thread-safe registry for active rooms.
pub struct RoomRegistry {
    /// Global settings applied to newly created rooms.
    settings: RoomSettings,
    /// Map of room id to active handle.
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves a room for a joiner. Existing rooms are returned as-is; a
    /// missing room is created only when the requester claims the host role.
    /// Returns the handle and whether this call created the room (a created
    /// room still needs its serializer spawned by the adapter layer).
    pub async fn join_or_create(
        self: &Arc<Self>,
        room_id: &str,
        requester_is_host: bool,
    ) -> Result<(RoomHandle, bool), RoomLookupError> {
        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(room_id) {
            return Ok((handle.clone(), false));
        }
        if !requester_is_host {
            return Err(RoomLookupError::NotFound);
        }

        // Channel wiring for the room actor.
        let (event_tx, event_rx) = mpsc::channel::<RoomEvent>(self.settings.event_channel_capacity);
        let (outbound_tx, _outbound_rx) =
            broadcast::channel::<(Scope, RoomBroadcast)>(self.settings.outbound_channel_capacity);
        let (bytes_tx, _bytes_rx) =
            broadcast::channel::<(Scope, Utf8Bytes)>(self.settings.outbound_channel_capacity);

        let room = Room::new(room_id.to_string(), map::default_coins(), now_millis());

        // Spawn the single-writer task owning this room's state.
        tokio::spawn(room_task(
            room,
            Arc::clone(self),
            event_rx,
            outbound_tx.clone(),
            self.settings.clone(),
        ));

        let handle = RoomHandle {
            room_id: Arc::from(room_id),
            event_tx,
            outbound_tx,
            bytes_tx,
        };
        rooms.insert(room_id.to_string(), handle.clone());
        info!(room_id, "room created");
        Ok((handle, true))
    }

    /// Returns a room handle for the provided id, if it exists.
    pub async fn get(&self, room_id: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    /// Drops the registry entry. Only the room's own task calls this, after
    /// the empty grace period confirms the room is still unused.
    pub async fn remove(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        rooms.remove(room_id).is_some()
    }

    /// Number of live rooms, for the health surface.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

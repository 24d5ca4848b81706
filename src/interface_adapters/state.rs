use std::sync::Arc;

use crate::use_cases::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    // Owns the set of active room tasks.
    pub room_registry: Arc<RoomRegistry>,
}

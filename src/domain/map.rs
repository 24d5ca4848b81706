// Built-in world data used when the map collaborator declares nothing.
//
// Tilemaps, spawn regions, and coin placement belong to the client-side map
// data; the server only needs a deterministic fallback so rooms are playable
// before any map is negotiated.

use crate::domain::state::{Coin, Vec2};

/// Spawn point for newly joined players when the map declares no region.
pub const DEFAULT_SPAWN: Vec2 = Vec2 { x: 100.0, y: 400.0 };

// Integer tile positions of the default collectible layout.
const DEFAULT_COIN_POSITIONS: [(i32, i32); 12] = [
    (250, 400),
    (350, 400),
    (450, 360),
    (550, 320),
    (650, 320),
    (750, 280),
    (850, 240),
    (950, 240),
    (1050, 200),
    (1150, 200),
    (1250, 160),
    (1350, 160),
];

/// The claimable coin set a fresh or reset room starts with.
pub fn default_coins() -> Vec<Coin> {
    DEFAULT_COIN_POSITIONS
        .iter()
        .map(|&(x, y)| Coin::at(x, y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_default_coins_are_built_then_ids_are_unique() {
        let coins = default_coins();
        let mut ids: Vec<&str> = coins.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), coins.len());
    }
}

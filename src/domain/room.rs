// Room rules: membership, host/spectator capabilities, the coin economy,
// and the derived scoreboard. Pure state transitions; the owning task in
// use_cases serializes all calls, so nothing here needs interior locking.

use std::collections::HashMap;

use crate::domain::map::DEFAULT_SPAWN;
use crate::domain::state::{
    Animation, Coin, Player, ScoreEntry, ScoreRow, Vec2, color_for_id, DEFAULT_NAME, MAX_NAME_LEN,
    SCOREBOARD_LIMIT,
};

/// Join failures reported to the requester only, never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// An active host already holds the room.
    HostConflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// True when the join matched an already-active player record for the
    /// same connection (duplicate join from a live transport).
    pub resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Accepted { new_count: u32 },
    /// Coin already claimed or never existed; an expected race, not a fault.
    Stale,
    /// Claimer is unknown or a spectator.
    Ineligible,
}

/// Room ids are caller-supplied short codes; normalize case so "abcd" and
/// "ABCD" address the same room.
pub fn normalize_room_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub struct Room {
    id: String,
    /// Active players in join order, unique by connection id.
    players: Vec<Player>,
    /// Score entries outlive roster membership for the room's lifetime.
    scoreboard: HashMap<String, ScoreEntry>,
    /// Unclaimed coins; a claim removes its coin here exactly once.
    coins: Vec<Coin>,
    /// Opaque quiz question payloads stored for relay; the server never
    /// inspects their contents.
    questions: Vec<serde_json::Value>,
    started: bool,
    ended: bool,
    final_scores: Option<Vec<ScoreRow>>,
    created_at: u64,
    next_seq: u64,
}

impl Room {
    pub fn new(id: String, coins: Vec<Coin>, created_at: u64) -> Self {
        Self {
            id,
            players: Vec::new(),
            scoreboard: HashMap::new(),
            coins,
            questions: Vec::new(),
            started: false,
            ended: false,
            final_scores: None,
            created_at,
            next_seq: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    pub fn questions(&self) -> &[serde_json::Value] {
        &self.questions
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn final_scores(&self) -> Option<&[ScoreRow]> {
        self.final_scores.as_deref()
    }

    pub fn player(&self, conn_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == conn_id)
    }

    fn player_mut(&mut self, conn_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == conn_id)
    }

    fn has_active_host(&self) -> bool {
        self.players.iter().any(|p| p.is_host)
    }

    /// Adds a player, or resumes the record when the same live connection
    /// sends a duplicate join. A connection id seen before in the scoreboard
    /// (joined, left, joined again on the same transport) gets its coins back.
    pub fn join(
        &mut self,
        conn_id: &str,
        requested_name: &str,
        is_host: bool,
        is_spectator: bool,
        now: u64,
    ) -> Result<JoinOutcome, JoinError> {
        if let Some(player) = self.player_mut(conn_id) {
            player.last_update = now;
            return Ok(JoinOutcome { resumed: true });
        }

        if is_host && self.has_active_host() {
            return Err(JoinError::HostConflict);
        }

        let name = self.unique_name(requested_name);
        // Spectator is a host capability; clamp rather than reject.
        let is_spectator = is_spectator && is_host;
        // A stale score entry for this exact connection id means a rejoin on
        // the same transport; restore the score instead of starting over.
        let coins = self.scoreboard.get(conn_id).map_or(0, |e| e.coins);

        self.players.push(Player {
            id: conn_id.to_string(),
            name,
            is_host,
            is_spectator,
            ready: false,
            coins,
            position: DEFAULT_SPAWN,
            velocity: Vec2::default(),
            animation: Animation::Idle,
            color: color_for_id(conn_id),
            last_update: now,
        });
        self.sync_score(conn_id, now);

        Ok(JoinOutcome { resumed: false })
    }

    /// Removes a player from the roster; the scoreboard entry stays so the
    /// score survives a disconnect within the room's lifetime.
    pub fn remove_player(&mut self, conn_id: &str, now: u64) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == conn_id)?;
        let player = self.players.remove(index);
        if let Some(entry) = self.scoreboard.get_mut(conn_id) {
            entry.last_active = now;
        }
        Some(player)
    }

    /// Last-write-wins position update. Returns the updated player for
    /// fan-out, or None when the sender is unknown or a spectator (spectator
    /// positions are never broadcast).
    pub fn apply_move(
        &mut self,
        conn_id: &str,
        position: Vec2,
        velocity: Vec2,
        animation: Animation,
        now: u64,
    ) -> Option<&Player> {
        let player = self.players.iter_mut().find(|p| p.id == conn_id)?;
        if player.is_spectator {
            return None;
        }
        player.position = position;
        player.velocity = velocity;
        player.animation = animation;
        player.last_update = now;
        Some(player)
    }

    /// Atomic per-room claim: succeeds iff the coin is still unclaimed.
    pub fn claim_coin(&mut self, conn_id: &str, coin_id: &str, now: u64) -> ClaimOutcome {
        let Some(player_index) = self.players.iter().position(|p| p.id == conn_id) else {
            return ClaimOutcome::Ineligible;
        };
        if self.players[player_index].is_spectator {
            return ClaimOutcome::Ineligible;
        }

        let Some(coin_index) = self.coins.iter().position(|c| c.id == coin_id) else {
            return ClaimOutcome::Stale;
        };
        self.coins.remove(coin_index);

        let player = &mut self.players[player_index];
        player.coins += 1;
        player.last_update = now;
        let new_count = player.coins;
        self.sync_score(conn_id, now);
        ClaimOutcome::Accepted { new_count }
    }

    /// Applies the quiz delta on top of the pickup increment: +1 for a
    /// correct answer, -1 (clamped at zero) otherwise. Additive with the
    /// claim so close-together updates never overwrite each other.
    pub fn apply_quiz_result(&mut self, conn_id: &str, is_correct: bool, now: u64) -> Option<u32> {
        let player = self.players.iter_mut().find(|p| p.id == conn_id)?;
        if player.is_spectator {
            return None;
        }
        player.coins = if is_correct {
            player.coins + 1
        } else {
            player.coins.saturating_sub(1)
        };
        player.last_update = now;
        let new_count = player.coins;
        self.sync_score(conn_id, now);
        Some(new_count)
    }

    /// Zeroes the authoritative coin count on death. Idempotent: returns
    /// Some(false) when the count was already zero so duplicate death
    /// notifications trigger no rebroadcast.
    pub fn apply_death(&mut self, conn_id: &str, now: u64) -> Option<bool> {
        let player = self.players.iter_mut().find(|p| p.id == conn_id)?;
        if player.coins == 0 {
            return Some(false);
        }
        player.coins = 0;
        player.last_update = now;
        self.sync_score(conn_id, now);
        Some(true)
    }

    /// Host-only game start; the host may opt into spectating its own room.
    pub fn start(&mut self, conn_id: &str, host_is_spectator: bool) -> bool {
        let Some(player) = self.players.iter_mut().find(|p| p.id == conn_id) else {
            return false;
        };
        if !player.is_host {
            return false;
        }
        if host_is_spectator {
            player.is_spectator = true;
        }
        self.started = true;
        true
    }

    /// Marks the room ended and snapshots the final scores exactly once.
    /// Returns false for repeated end signals.
    pub fn end_game(&mut self) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;
        // Final scores keep every entry; only live broadcasts are truncated.
        self.final_scores = Some(self.sorted_rows());
        true
    }

    /// Returns the room to a fresh pre-game state with a full coin layout.
    /// Scores are zeroed but entries survive so names stay on the board.
    pub fn reset(&mut self, coins: Vec<Coin>, now: u64) {
        self.started = false;
        self.ended = false;
        self.final_scores = None;
        self.coins = coins;
        for player in &mut self.players {
            player.coins = 0;
            player.last_update = now;
        }
        for entry in self.scoreboard.values_mut() {
            entry.coins = 0;
        }
        for player_id in self.players.iter().map(|p| p.id.clone()).collect::<Vec<_>>() {
            self.sync_score(&player_id, now);
        }
    }

    pub fn set_questions(&mut self, questions: Vec<serde_json::Value>) {
        self.questions = questions;
    }

    /// The only path producing scoreboard broadcast payloads: drop entries
    /// without a name, sort by coins descending with insertion-order ties,
    /// truncate to the broadcast limit. Pure over the current entries.
    pub fn recompute_scoreboard(&self) -> Vec<ScoreRow> {
        let mut rows = self.sorted_rows();
        rows.truncate(SCOREBOARD_LIMIT);
        rows
    }

    fn sorted_rows(&self) -> Vec<ScoreRow> {
        let mut entries: Vec<(&String, &ScoreEntry)> = self
            .scoreboard
            .iter()
            .filter(|(_, e)| !e.name.is_empty())
            .collect();
        entries.sort_by(|(_, a), (_, b)| b.coins.cmp(&a.coins).then(a.seq.cmp(&b.seq)));
        entries
            .into_iter()
            .map(|(id, e)| ScoreRow {
                player_id: id.clone(),
                name: e.name.clone(),
                coins: e.coins,
            })
            .collect()
    }

    // Re-syncs the scoreboard entry from the live player record so broadcasts
    // never show a stale name or count.
    fn sync_score(&mut self, conn_id: &str, now: u64) {
        let Some(player) = self.players.iter().find(|p| p.id == conn_id) else {
            return;
        };
        let name = player.name.clone();
        let coins = player.coins;
        match self.scoreboard.get_mut(conn_id) {
            Some(entry) => {
                entry.name = name;
                entry.coins = coins;
                entry.last_active = now;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.scoreboard.insert(
                    conn_id.to_string(),
                    ScoreEntry {
                        name,
                        coins,
                        last_active: now,
                        seq,
                    },
                );
            }
        }
    }

    // Resolves name collisions deterministically: "Name", "Name 1", "Name 2"…
    // against the active roster. Joins are never rejected over a name.
    fn unique_name(&self, requested: &str) -> String {
        let mut base = requested.trim();
        if base.is_empty() || base.len() > MAX_NAME_LEN {
            base = DEFAULT_NAME;
        }
        let taken = |candidate: &str| self.players.iter().any(|p| p.name == candidate);
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base} {n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

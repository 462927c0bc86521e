//! Session State
//!
//! The aggregate a play session owns for its whole lifetime: board,
//! collector buffer, overflow, score and status. Every tile of the session
//! is in exactly one of board, buffer, overflow or the cleared list.

use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::rng::{derive_session_seed, DeterministicRng};
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::board::Board;
use crate::game::buffer::{CollectorBuffer, BUFFER_CAPACITY};
use crate::game::events::ActionLog;
use crate::game::layout::{Level, LayoutError, ValidatedLayout};
use crate::game::overflow::OverflowStore;
use crate::game::tile::{Tile, TileId};

// =============================================================================
// IDS
// =============================================================================

/// Unique session identifier (UUID bytes).
pub type SessionId = [u8; 16];

/// Unique player identifier (UUID as bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting actions
    #[default]
    Active,
    /// Solved or stuck. Terminal.
    Completed,
    /// Given up by the player. Terminal.
    Abandoned,
}

/// How a terminal session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every tile matched away
    Cleared,
    /// Buffer full with no triplet left to make
    Stuck,
}

/// Result screen data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Final score
    pub score: u32,
    /// Status at the time of the summary
    pub status: SessionStatus,
    /// Terminal outcome, if reached
    pub outcome: Option<Outcome>,
    /// Logged actions, matches included
    pub moves: u32,
    /// Triplets cleared
    pub matches: u32,
    /// When play began
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole seconds from start to end; `None` while still active
    pub duration_secs: Option<i64>,
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Tiles are lost or duplicated across board, buffer, overflow and cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tile partition is broken")]
pub struct BrokenPartition;

/// The pieces of a session, for hosts rebuilding one from their own records.
#[derive(Clone, Debug)]
pub struct SessionParts {
    /// Session id
    pub session_id: SessionId,
    /// Owning player
    pub player_id: PlayerId,
    /// Level being played
    pub level_id: u32,
    /// Seed the RNG started from
    pub rng_seed: u64,
    /// RNG in its current state
    pub rng: DeterministicRng,
    /// Placed tiles
    pub board: Board,
    /// Collector row
    pub buffer: CollectorBuffer,
    /// Removed tiles
    pub overflow: OverflowStore,
    /// Matched tile ids
    pub cleared: Vec<TileId>,
    /// Tiles the session started with
    pub total_tiles: u32,
    /// Score
    pub score: u32,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Action history
    pub log: ActionLog,
    /// Commit counter
    pub version: u64,
    /// When play began
    pub started_at: DateTime<Utc>,
    /// When play ended
    pub ended_at: Option<DateTime<Utc>>,
}

/// Complete state of one play session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub(crate) session_id: SessionId,
    pub(crate) player_id: PlayerId,
    pub(crate) level_id: u32,
    pub(crate) rng_seed: u64,
    pub(crate) rng: DeterministicRng,
    pub(crate) board: Board,
    pub(crate) buffer: CollectorBuffer,
    pub(crate) overflow: OverflowStore,
    pub(crate) cleared: Vec<TileId>,
    pub(crate) total_tiles: u32,
    pub(crate) score: u32,
    pub(crate) status: SessionStatus,
    pub(crate) log: ActionLog,
    pub(crate) version: u64,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Create a session from an already validated layout.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        player_id: PlayerId,
        level_id: u32,
        layout: &ValidatedLayout,
        rng: DeterministicRng,
        rng_seed: u64,
        max_accessible_layer: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut board = Board::new(max_accessible_layer);
        board.initialize(layout);

        Self {
            session_id,
            player_id,
            level_id,
            rng_seed,
            rng,
            total_tiles: board.len() as u32,
            board,
            buffer: CollectorBuffer::new(),
            overflow: OverflowStore::new(),
            cleared: Vec::new(),
            score: 0,
            status: SessionStatus::Active,
            log: ActionLog::new(),
            version: 0,
            started_at,
            ended_at: None,
        }
    }

    /// Reassemble a session, checking that every tile is accounted for.
    pub fn from_parts(parts: SessionParts) -> Result<Self, BrokenPartition> {
        let state = Self {
            session_id: parts.session_id,
            player_id: parts.player_id,
            level_id: parts.level_id,
            rng_seed: parts.rng_seed,
            rng: parts.rng,
            board: parts.board,
            buffer: parts.buffer,
            overflow: parts.overflow,
            cleared: parts.cleared,
            total_tiles: parts.total_tiles,
            score: parts.score,
            status: parts.status,
            log: parts.log,
            version: parts.version,
            started_at: parts.started_at,
            ended_at: parts.ended_at,
        };

        if state.check_partition() {
            Ok(state)
        } else {
            Err(BrokenPartition)
        }
    }

    /// Start a session on a level, generating its layout if it has none.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        session_id: SessionId,
        player_id: PlayerId,
        level: &Level,
        rows: u32,
        cols: u32,
        max_accessible_layer: u32,
        started_at: DateTime<Utc>,
    ) -> Result<Self, LayoutError> {
        let rng_seed = derive_session_seed(&session_id, player_id.as_bytes(), level.level_id);
        let mut rng = DeterministicRng::new(rng_seed);
        let layout = level.resolve_layout(&mut rng, rows, cols)?;

        info!(
            session = %hex::encode(&session_id[..4]),
            level = level.level_id,
            tiles = layout.len(),
            "session started"
        );

        Ok(Self::new(
            session_id,
            player_id,
            level.level_id,
            &layout,
            rng,
            rng_seed,
            max_accessible_layer,
            started_at,
        ))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Session id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Owning player.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Level being played.
    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    /// Seed the session RNG started from.
    pub fn rng_seed(&self) -> u64 {
        self.rng_seed
    }

    /// Placed tiles.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Collector row.
    pub fn buffer(&self) -> &CollectorBuffer {
        &self.buffer
    }

    /// Removed tiles awaiting return.
    pub fn overflow(&self) -> &OverflowStore {
        &self.overflow
    }

    /// Ids of matched tiles, in clearing order.
    pub fn cleared(&self) -> &[TileId] {
        &self.cleared
    }

    /// Tiles the session started with.
    pub fn total_tiles(&self) -> u32 {
        self.total_tiles
    }

    /// Current score.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Action history.
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Commit counter used for conditional saves.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When play began.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When play ended, once terminal.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// True while actions are accepted.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    // =========================================================================
    // Terminal evaluation
    // =========================================================================

    /// Whether play can no longer continue.
    ///
    /// True when everything is cleared, or when the buffer is full with no
    /// kind present three times and nothing left on the board or in
    /// overflow to change that.
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// Like [`is_terminal`](Self::is_terminal), but says which way it ended.
    pub fn outcome(&self) -> Option<Outcome> {
        if !self.overflow.is_empty() || !self.board.is_empty() {
            return None;
        }
        if self.buffer.is_empty() {
            return Some(Outcome::Cleared);
        }
        // resolve_matches should already have consumed any run
        if self.buffer.has_reachable_triplet() {
            return None;
        }
        if self.buffer.len() == BUFFER_CAPACITY {
            return Some(Outcome::Stuck);
        }
        None
    }

    /// Mark the level solved.
    ///
    /// Takes the player's recorded progress and returns the new value when
    /// it should advance (to one past this level), `None` otherwise.
    pub fn complete_level(&mut self, recorded_progress: u32, at: DateTime<Utc>) -> Option<u32> {
        self.status = SessionStatus::Completed;
        self.ended_at = Some(at);
        info!(level = self.level_id, score = self.score, "level completed");

        if self.level_id >= recorded_progress {
            Some(self.level_id + 1)
        } else {
            None
        }
    }

    /// End a stuck session. Progress is left alone.
    pub fn finish_stuck(&mut self, at: DateTime<Utc>) {
        self.status = SessionStatus::Completed;
        self.ended_at = Some(at);
        info!(level = self.level_id, score = self.score, "session stuck");
    }

    /// Give up. Returns false if the session had already ended.
    pub fn abandon(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Abandoned;
        self.ended_at = Some(at);
        debug!(level = self.level_id, "session abandoned");
        true
    }

    /// Result screen data.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            score: self.score,
            status: self.status,
            outcome: self.outcome(),
            moves: self.log.len() as u32,
            matches: self.cleared.len() as u32 / 3,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_secs: self
                .ended_at
                .map(|end| (end - self.started_at).num_seconds().max(0)),
        }
    }

    // =========================================================================
    // Integrity
    // =========================================================================

    /// Check that board, buffer, overflow and cleared tiles are disjoint
    /// and together account for every tile the session started with.
    pub fn check_partition(&self) -> bool {
        let mut seen = BTreeSet::new();
        let live = self
            .board
            .tiles()
            .map(|t| t.id)
            .chain(self.buffer.iter().map(|t| t.id))
            .chain(self.overflow.as_slice().iter().map(|t| t.id))
            .chain(self.cleared.iter().copied());

        for id in live {
            if !seen.insert(id) {
                return false;
            }
        }

        seen.len() == self.total_tiles as usize
            && seen.iter().all(|id| (1..=self.total_tiles).contains(&id.0))
    }

    /// Deterministic hash of everything that affects play.
    ///
    /// Wall-clock fields are left out so a replay reaches the same hash.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.level_id, self.rng_seed, |hasher| {
            hasher.update_uuid(&self.session_id);
            hasher.update_uuid(&self.player_id.0);

            hasher.update_len(self.board.len());
            for tile in self.board.tiles() {
                hash_tile(hasher, tile);
            }
            hasher.update_len(self.buffer.len());
            for tile in self.buffer.iter() {
                hash_tile(hasher, tile);
            }
            hasher.update_len(self.overflow.len());
            for tile in self.overflow.as_slice() {
                hash_tile(hasher, tile);
            }
            hasher.update_len(self.cleared.len());
            for id in &self.cleared {
                hasher.update_u32(id.0);
            }

            hasher.update_u32(self.total_tiles);
            hasher.update_u32(self.score);
            hasher.update_u8(self.status as u8);
            let [s0, s1] = self.rng.state();
            hasher.update_u64(s0);
            hasher.update_u64(s1);
            hasher.update_u64(self.log.len() as u64);
            hasher.update_u64(self.version);
        })
    }
}

fn hash_tile(hasher: &mut StateHasher, tile: &Tile) {
    hasher.update_u32(tile.id.0);
    hasher.update_u8(tile.kind as u8);
    hasher.update_i32(tile.position.x);
    hasher.update_i32(tile.position.y);
    hasher.update_u32(tile.position.layer);
    hasher.update_i32(tile.z);
}

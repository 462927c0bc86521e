//! Session Snapshots
//!
//! The persisted form of a [`SessionState`]. Board tiles, buffer, overflow,
//! score and status round-trip exactly; buffer and overflow keep their
//! order. JSON is the readable encoding, bincode the compact one.
//!
//! Every snapshot carries the SHA-256 state hash of the session it was
//! taken from. Restoring recomputes it and refuses on mismatch.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::board::{Board, BoardError};
use crate::game::buffer::CollectorBuffer;
use crate::game::events::ActionLog;
use crate::game::overflow::OverflowStore;
use crate::game::state::{PlayerId, SessionId, SessionParts, SessionState, SessionStatus};
use crate::game::tile::{Tile, TileId};

/// Current snapshot layout version.
pub const SNAPSHOT_FORMAT: u32 = 1;

/// Snapshot decoding and validation errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON codec failure.
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode codec failure.
    #[error("bincode codec: {0}")]
    Bincode(#[from] bincode::Error),

    /// Written by a newer or unknown format.
    #[error("unsupported snapshot format {0}")]
    UnsupportedFormat(u32),

    /// Board tiles are inconsistent.
    #[error("board: {0}")]
    Board(#[from] BoardError),

    /// More buffer entries than slots.
    #[error("buffer holds {0} tiles")]
    BufferOverfull(usize),

    /// Tiles are lost or duplicated across board, buffer, overflow and cleared.
    #[error("tile partition is broken")]
    BrokenPartition,

    /// Stored hash is not valid hex.
    #[error("state hash is malformed")]
    MalformedHash,

    /// Recomputed hash differs from the stored one.
    #[error("state hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        /// Hash carried by the snapshot
        stored: String,
        /// Hash of the restored state
        computed: String,
    },
}

/// Persisted session record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Layout version of this record
    pub format: u32,
    /// Session id
    pub session_id: Uuid,
    /// Owning player
    pub player_id: Uuid,
    /// Level being played
    pub level_id: u32,
    /// Seed the session RNG started from
    pub rng_seed: u64,
    /// RNG state at the time of the snapshot
    pub rng_state: [u64; 2],
    /// Accessible band the board was created with
    pub max_accessible_layer: u32,
    /// Tiles on the board, in position order
    pub board_tiles: Vec<Tile>,
    /// Collector row, in slot order
    pub buffer: Vec<Tile>,
    /// Removed tiles, in removal order
    pub overflow: Vec<Tile>,
    /// Matched tile ids, in clearing order
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
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the captured state
    pub state_hash: String,
}

impl SessionSnapshot {
    /// Capture a session.
    pub fn capture(state: &SessionState) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            session_id: Uuid::from_bytes(state.session_id),
            player_id: Uuid::from_bytes(state.player_id.0),
            level_id: state.level_id,
            rng_seed: state.rng_seed,
            rng_state: state.rng.state(),
            max_accessible_layer: state.board.max_accessible_layer(),
            board_tiles: state.board.tiles().copied().collect(),
            buffer: state.buffer.as_slice().to_vec(),
            overflow: state.overflow.as_slice().to_vec(),
            cleared: state.cleared.clone(),
            total_tiles: state.total_tiles,
            score: state.score,
            status: state.status,
            log: state.log.clone(),
            version: state.version,
            started_at: state.started_at,
            ended_at: state.ended_at,
            state_hash: hex::encode(state.compute_hash()),
        }
    }

    /// Rebuild the session, checking structure and hash.
    pub fn restore(self) -> Result<SessionState, SnapshotError> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(SnapshotError::UnsupportedFormat(self.format));
        }

        let stored = hex::decode(&self.state_hash).map_err(|_| SnapshotError::MalformedHash)?;

        let buffer_len = self.buffer.len();
        let buffer = CollectorBuffer::from_entries(self.buffer)
            .map_err(|_| SnapshotError::BufferOverfull(buffer_len))?;

        let mut rng = DeterministicRng::new(self.rng_seed);
        rng.set_state(self.rng_state);

        let state = SessionState::from_parts(SessionParts {
            session_id: self.session_id.into_bytes(),
            player_id: PlayerId::new(self.player_id.into_bytes()),
            level_id: self.level_id,
            rng_seed: self.rng_seed,
            rng,
            board: Board::from_tiles(self.board_tiles, self.max_accessible_layer)?,
            buffer,
            overflow: OverflowStore::from_tiles(self.overflow),
            cleared: self.cleared,
            total_tiles: self.total_tiles,
            score: self.score,
            status: self.status,
            log: self.log,
            version: self.version,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
        .map_err(|_| SnapshotError::BrokenPartition)?;

        let computed = state.compute_hash();
        if stored.as_slice() != computed.as_slice() {
            return Err(SnapshotError::HashMismatch {
                stored: self.state_hash,
                computed: hex::encode(computed),
            });
        }

        Ok(state)
    }

    /// Session id as raw bytes.
    pub fn id(&self) -> SessionId {
        self.session_id.into_bytes()
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as bincode.
    pub fn to_bincode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from bincode.
    pub fn from_bincode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Capture a session for persistence.
pub fn serialize(state: &SessionState) -> SessionSnapshot {
    SessionSnapshot::capture(state)
}

/// Restore a persisted session.
pub fn deserialize(snapshot: SessionSnapshot) -> Result<SessionState, SnapshotError> {
    snapshot.restore()
}

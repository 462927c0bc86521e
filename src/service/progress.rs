//! Player Progress
//!
//! The highest level each player may start. Owned by the host; the engine
//! reads it to gate levels and writes it when a level is cleared.

use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::info;

use crate::game::state::PlayerId;

/// Progress of a player that has never cleared anything.
pub const INITIAL_PROGRESS: u32 = 1;

/// Progress lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    /// Player is not registered.
    #[error("unknown player {0}")]
    UnknownPlayer(String),

    /// Backing storage failed.
    #[error("progress storage: {0}")]
    Storage(String),
}

/// Player progress collaborator.
///
/// Called directly from async code, so lookups should return promptly.
pub trait ProgressTracker: Send + Sync {
    /// Highest unlocked level.
    fn progress(&self, player: PlayerId) -> Result<u32, ProgressError>;

    /// Record a new highest unlocked level.
    fn set_progress(&self, player: PlayerId, level_id: u32) -> Result<(), ProgressError>;
}

/// In-memory progress table.
#[derive(Debug)]
pub struct MemoryProgress {
    players: RwLock<BTreeMap<PlayerId, u32>>,
    auto_register: bool,
}

impl Default for MemoryProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProgress {
    /// Table where unseen players start at level 1.
    pub fn new() -> Self {
        Self {
            players: RwLock::new(BTreeMap::new()),
            auto_register: true,
        }
    }

    /// Table that only knows explicitly registered players.
    pub fn strict() -> Self {
        Self {
            auto_register: false,
            ..Self::new()
        }
    }

    /// Register a player at level 1.
    pub fn register(&self, player: PlayerId) -> Result<(), ProgressError> {
        let mut players = self.players.write().map_err(|_| poisoned())?;
        players.entry(player).or_insert(INITIAL_PROGRESS);
        Ok(())
    }
}

impl ProgressTracker for MemoryProgress {
    fn progress(&self, player: PlayerId) -> Result<u32, ProgressError> {
        let players = self.players.read().map_err(|_| poisoned())?;
        match players.get(&player) {
            Some(level) => Ok(*level),
            None if self.auto_register => Ok(INITIAL_PROGRESS),
            None => Err(ProgressError::UnknownPlayer(player.to_uuid_string())),
        }
    }

    fn set_progress(&self, player: PlayerId, level_id: u32) -> Result<(), ProgressError> {
        let mut players = self.players.write().map_err(|_| poisoned())?;
        if !self.auto_register && !players.contains_key(&player) {
            return Err(ProgressError::UnknownPlayer(player.to_uuid_string()));
        }
        players.insert(player, level_id);
        info!(player = %hex::encode(&player.0[..4]), level_id, "progress advanced");
        Ok(())
    }
}

fn poisoned() -> ProgressError {
    ProgressError::Storage("progress lock poisoned".to_string())
}

//! Overflow Store
//!
//! Holding area for tiles the remove tool pulls out of the buffer.
//! Kept in insertion order so the host can render it stably.

use crate::game::tile::{Tile, TileId};

/// Tiles evicted from the buffer, recoverable one at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverflowStore {
    tiles: Vec<Tile>,
}

impl OverflowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted tiles, preserving order.
    pub fn from_tiles(tiles: Vec<Tile>) -> Self {
        Self { tiles }
    }

    /// Append tiles in the order given.
    pub fn add_all<I>(&mut self, tiles: I)
    where
        I: IntoIterator<Item = Tile>,
    {
        self.tiles.extend(tiles);
    }

    /// Take a tile out by id.
    pub fn remove_by_id(&mut self, id: TileId) -> Option<Tile> {
        let idx = self.tiles.iter().position(|t| t.id == id)?;
        Some(self.tiles.remove(idx))
    }

    /// True if the tile is held here.
    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.iter().any(|t| t.id == id)
    }

    /// Tiles in insertion order.
    pub fn as_slice(&self) -> &[Tile] {
        &self.tiles
    }

    /// Number of held tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// True if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

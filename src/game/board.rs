//! Board and Occlusion
//!
//! Tracks the tiles still placed on the field and decides which of them can
//! be picked up. A tile is covered by anything on a strictly higher layer
//! whose half-offset footprint overlaps it.
//!
//! Alongside the position map the board keeps a per-column layer index, so
//! an occlusion query is four ordered-set range lookups instead of a scan
//! of every layer above.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::warn;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::rng::DeterministicRng;
use crate::game::layout::ValidatedLayout;
use crate::game::tile::{Position, Tile, TileId, TileKind};

/// Highest layer index a player may pick from (layers 0, 1 and 2).
pub const DEFAULT_MAX_ACCESSIBLE_LAYER: u32 = 2;

/// Board consistency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Something already sits at the target position.
    #[error("board position {0} is occupied")]
    PositionOccupied(Position),

    /// A tile id appears twice.
    #[error("tile {0} placed twice")]
    DuplicateId(TileId),

    /// A column has a hole below the queried layer.
    #[error("column under {position} has no tile at layer {missing_layer}")]
    ColumnGap {
        /// Queried position
        position: Position,
        /// Lowest empty layer under it
        missing_layer: u32,
    },
}

/// The field of placed tiles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    tiles: BTreeMap<Position, Tile>,
    index: BTreeMap<TileId, Position>,
    columns: BTreeMap<(i32, i32), BTreeSet<u32>>,
    max_accessible_layer: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACCESSIBLE_LAYER)
    }
}

impl Board {
    /// Create an empty board with the given accessible band.
    pub fn new(max_accessible_layer: u32) -> Self {
        Self {
            tiles: BTreeMap::new(),
            index: BTreeMap::new(),
            columns: BTreeMap::new(),
            max_accessible_layer,
        }
    }

    /// Rebuild a board from persisted tiles.
    pub fn from_tiles<I>(tiles: I, max_accessible_layer: u32) -> Result<Self, BoardError>
    where
        I: IntoIterator<Item = Tile>,
    {
        let mut board = Self::new(max_accessible_layer);
        for tile in tiles {
            if board.index.contains_key(&tile.id) {
                return Err(BoardError::DuplicateId(tile.id));
            }
            board.place(tile)?;
        }
        Ok(board)
    }

    /// Clear the board and place a validated layout.
    ///
    /// Tiles are numbered from 1 in layout order.
    pub fn initialize(&mut self, layout: &ValidatedLayout) -> &BTreeMap<Position, Tile> {
        self.tiles.clear();
        self.index.clear();
        self.columns.clear();

        for (i, entry) in layout.entries().iter().enumerate() {
            let mut tile = Tile::new(TileId(i as u32 + 1), entry.kind, entry.position());
            if let Some(z) = entry.z {
                tile.z = z;
            }
            // Validation already ruled out duplicate positions
            self.insert_unchecked(tile);
        }

        &self.tiles
    }

    /// Highest layer a tile may sit on and still be picked.
    pub fn max_accessible_layer(&self) -> u32 {
        self.max_accessible_layer
    }

    /// Check whether a tile at `pos` could be picked up.
    ///
    /// The layer must be inside the accessible band and no tile may sit on
    /// any higher layer at one of the four footprint offsets.
    pub fn is_accessible(&self, pos: Position) -> bool {
        if pos.layer > self.max_accessible_layer {
            return false;
        }

        for (dx, dy) in Position::FOOTPRINT {
            let (Some(cx), Some(cy)) = (pos.x.checked_add(dx), pos.y.checked_add(dy)) else {
                continue;
            };
            let covered = self
                .columns
                .get(&(cx, cy))
                .is_some_and(|layers| layers.range(pos.layer + 1..).next().is_some());
            if covered {
                #[cfg(feature = "debug-tracing")]
                trace!(%pos, cx, cy, "tile covered");
                return false;
            }
        }

        true
    }

    /// Tile at a position.
    pub fn get(&self, pos: Position) -> Option<&Tile> {
        self.tiles.get(&pos)
    }

    /// Tile with a given id.
    pub fn get_by_id(&self, id: TileId) -> Option<&Tile> {
        self.index.get(&id).and_then(|pos| self.tiles.get(pos))
    }

    /// Remove the tile at a position.
    pub fn remove(&mut self, pos: Position) -> Option<Tile> {
        let tile = self.tiles.remove(&pos)?;
        self.index.remove(&tile.id);
        if let Some(layers) = self.columns.get_mut(&pos.column()) {
            layers.remove(&pos.layer);
            if layers.is_empty() {
                self.columns.remove(&pos.column());
            }
        }
        Some(tile)
    }

    /// Put a tile back at `pos`.
    pub fn reinsert(&mut self, mut tile: Tile, pos: Position) -> Result<(), BoardError> {
        tile.position = pos;
        self.place(tile)
    }

    /// Number of tiles under `pos` in the same column.
    ///
    /// Columns are expected to be gap-free. A hole is reported rather than
    /// counted around, since the UI would otherwise show the wrong depth.
    pub fn lower_tile_count(&self, pos: Position) -> Result<u32, BoardError> {
        let Some(layers) = self.columns.get(&pos.column()) else {
            return if pos.layer == 0 {
                Ok(0)
            } else {
                Err(self.column_gap(pos, 0))
            };
        };

        let below = layers.range(..pos.layer).count() as u32;
        if below == pos.layer {
            return Ok(below);
        }

        let missing_layer = (0..pos.layer)
            .find(|l| !layers.contains(l))
            .unwrap_or(0);
        Err(self.column_gap(pos, missing_layer))
    }

    fn column_gap(&self, position: Position, missing_layer: u32) -> BoardError {
        warn!(%position, missing_layer, "gap in tile column");
        BoardError::ColumnGap { position, missing_layer }
    }

    /// All currently pickable tiles, in position order.
    pub fn accessible_tiles(&self) -> Vec<Tile> {
        self.tiles
            .values()
            .filter(|t| self.is_accessible(t.position))
            .copied()
            .collect()
    }

    /// Randomly permute kinds across the placed tiles. Positions stay put.
    pub fn shuffle_kinds(&mut self, rng: &mut DeterministicRng) {
        let mut kinds: Vec<TileKind> = self.tiles.values().map(|t| t.kind).collect();
        rng.shuffle(&mut kinds);
        for (tile, kind) in self.tiles.values_mut().zip(kinds) {
            tile.kind = kind;
        }
    }

    /// Iterate tiles in position order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Number of placed tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// True if nothing is placed.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    fn place(&mut self, tile: Tile) -> Result<(), BoardError> {
        if self.tiles.contains_key(&tile.position) {
            return Err(BoardError::PositionOccupied(tile.position));
        }
        self.insert_unchecked(tile);
        Ok(())
    }

    fn insert_unchecked(&mut self, tile: Tile) {
        let pos = tile.position;
        self.index.insert(tile.id, pos);
        self.columns.entry(pos.column()).or_default().insert(pos.layer);
        self.tiles.insert(pos, tile);
    }
}

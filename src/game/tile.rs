//! Tile Definitions
//!
//! Tile identity, kind and 3D position.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// TILE KIND
// =============================================================================

/// Symbol printed on a tile. Three of a kind in a row clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TileKind {
    /// Bamboo shoot
    Bamboo = 0,
    /// Leaf
    Leaf = 1,
    /// Panda
    Panda = 2,
    /// Fish
    Fish = 3,
    /// Carrot
    Carrot = 4,
    /// Fire
    Fire = 5,
}

impl TileKind {
    /// Every kind, in index order.
    pub const ALL: [TileKind; 6] = [
        TileKind::Bamboo,
        TileKind::Leaf,
        TileKind::Panda,
        TileKind::Fish,
        TileKind::Carrot,
        TileKind::Fire,
    ];

    /// Get from index (0-5).
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TileKind::Bamboo => "bamboo",
            TileKind::Leaf => "leaf",
            TileKind::Panda => "panda",
            TileKind::Fish => "fish",
            TileKind::Carrot => "carrot",
            TileKind::Fire => "fire",
        }
    }
}

impl fmt::Display for TileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TILE ID
// =============================================================================

/// Tile identifier, unique within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub u32);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// Board coordinate: planar `(x, y)` plus stack `layer` (0 = bottom).
///
/// Ordering is `(x, y, layer)`, which keeps a column's layers adjacent in
/// sorted maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
    /// Stack height
    pub layer: u32,
}

impl Position {
    /// Planar offsets a tile above can sit at and still cover `(x, y)`.
    ///
    /// Tiles stack with a half-cell overlap, so anything one column left,
    /// one row up, or diagonally up-left also occludes.
    pub const FOOTPRINT: [(i32, i32); 4] = [(0, 0), (-1, 0), (0, -1), (-1, -1)];

    /// Create a position.
    pub const fn new(x: i32, y: i32, layer: u32) -> Self {
        Self { x, y, layer }
    }

    /// The planar column this position belongs to.
    #[inline]
    pub fn column(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.layer)
    }
}

// =============================================================================
// TILE
// =============================================================================

/// A placed tile.
///
/// The same record travels unchanged from board to buffer to overflow, so
/// the withdraw tool always knows where a tile came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TileRecord", into = "TileRecord")]
pub struct Tile {
    /// Session-unique id
    pub id: TileId,
    /// Printed symbol
    pub kind: TileKind,
    /// Originating board position
    pub position: Position,
    /// Render tie-break hint. No gameplay meaning.
    pub z: i32,
}

/// Flat persisted shape of a [`Tile`].
#[derive(Serialize, Deserialize)]
struct TileRecord {
    id: TileId,
    #[serde(rename = "type")]
    kind: TileKind,
    x: i32,
    y: i32,
    layer: u32,
    #[serde(default)]
    z: i32,
}

impl From<TileRecord> for Tile {
    fn from(r: TileRecord) -> Self {
        Self {
            id: r.id,
            kind: r.kind,
            position: Position::new(r.x, r.y, r.layer),
            z: r.z,
        }
    }
}

impl From<Tile> for TileRecord {
    fn from(t: Tile) -> Self {
        Self {
            id: t.id,
            kind: t.kind,
            x: t.position.x,
            y: t.position.y,
            layer: t.position.layer,
            z: t.z,
        }
    }
}

impl Tile {
    /// Create a tile whose `z` hint equals its layer.
    pub fn new(id: TileId, kind: TileKind, position: Position) -> Self {
        Self {
            id,
            kind,
            position,
            z: position.layer as i32,
        }
    }
}

//! Collector Buffer
//!
//! The bounded row where picked tiles wait for a three-of-a-kind.
//! Order matters: only three *adjacent* tiles of one kind match.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::layout::MATCH_SIZE;
use crate::game::tile::{Tile, TileKind};

/// Slots in the collector row.
pub const BUFFER_CAPACITY: usize = 7;

/// Insertion refused because every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("collector buffer is full")]
pub struct BufferFull;

/// Three tiles cleared together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTriplet {
    /// Shared kind
    pub kind: TileKind,
    /// The cleared tiles, in buffer order
    pub tiles: [Tile; MATCH_SIZE],
}

/// Ordered, bounded sequence of tiles in play.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectorBuffer {
    entries: Vec<Tile>,
}

impl CollectorBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, preserving their order.
    pub fn from_entries(entries: Vec<Tile>) -> Result<Self, BufferFull> {
        if entries.len() > BUFFER_CAPACITY {
            return Err(BufferFull);
        }
        Ok(Self { entries })
    }

    /// True while there is a free slot.
    #[inline]
    pub fn can_accept(&self) -> bool {
        self.entries.len() < BUFFER_CAPACITY
    }

    /// Insert a tile, clustering it with its kind.
    ///
    /// Lands right after the last tile of the same kind, or at the end if
    /// there is none. Returns the slot it landed in.
    pub fn insert(&mut self, tile: Tile) -> Result<usize, BufferFull> {
        if !self.can_accept() {
            return Err(BufferFull);
        }

        let index = self
            .entries
            .iter()
            .rposition(|t| t.kind == tile.kind)
            .map_or(self.entries.len(), |last| last + 1);
        self.entries.insert(index, tile);
        Ok(index)
    }

    /// Clear every run of three adjacent same-kind tiles.
    ///
    /// Removing a triplet can bring two neighbours together into a new
    /// run, so the scan restarts from the front after each hit. Calling
    /// this on a settled buffer does nothing.
    pub fn resolve_matches(&mut self) -> Vec<MatchedTriplet> {
        let mut matched = Vec::new();

        while let Some(i) = self.first_triplet() {
            let run: Vec<Tile> = self.entries.drain(i..i + MATCH_SIZE).collect();
            matched.push(MatchedTriplet {
                kind: run[0].kind,
                tiles: [run[0], run[1], run[2]],
            });
        }

        matched
    }

    fn first_triplet(&self) -> Option<usize> {
        self.entries
            .windows(MATCH_SIZE)
            .position(|w| w.iter().all(|t| t.kind == w[0].kind))
    }

    /// Remove the rightmost tile.
    pub fn pop_last(&mut self) -> Option<Tile> {
        self.entries.pop()
    }

    /// Peek at the rightmost tile.
    pub fn last(&self) -> Option<&Tile> {
        self.entries.last()
    }

    /// Remove and return up to `n` tiles from the front, in order.
    pub fn take_first(&mut self, n: usize) -> Vec<Tile> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    /// Count of tiles per kind.
    pub fn kind_counts(&self) -> BTreeMap<TileKind, usize> {
        let mut counts = BTreeMap::new();
        for tile in &self.entries {
            *counts.entry(tile.kind).or_insert(0) += 1;
        }
        counts
    }

    /// True if some kind has enough tiles here to form a triplet.
    pub fn has_reachable_triplet(&self) -> bool {
        self.kind_counts().values().any(|c| *c >= MATCH_SIZE)
    }

    /// Entries in order.
    pub fn as_slice(&self) -> &[Tile] {
        &self.entries
    }

    /// Iterate entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.entries.iter()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= BUFFER_CAPACITY
    }
}

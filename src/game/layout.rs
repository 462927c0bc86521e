//! Level Layouts
//!
//! A layout is the initial kind/position assignment for every tile of a
//! level. A level is only clearable when each kind appears a multiple of
//! three times, so nothing reaches a board without passing [`validate`].

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::core::rng::DeterministicRng;
use crate::game::tile::{Position, TileKind};

/// Tiles of one kind needed for a match.
pub const MATCH_SIZE: usize = 3;

/// Fewest stacked layers the generator produces.
pub const MIN_GENERATED_LAYERS: u32 = 3;

/// Most stacked layers the generator produces.
pub const MAX_GENERATED_LAYERS: u32 = 8;

/// Layout rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// A kind's tile count is not a multiple of three.
    #[error("invalid layout: {count} {kind} tiles is not a multiple of 3")]
    InvalidCounts {
        /// Offending kind
        kind: TileKind,
        /// How many tiles of it the layout holds
        count: usize,
    },

    /// Two entries claim the same `(x, y, layer)`.
    #[error("invalid layout: position {0} used twice")]
    DuplicatePosition(Position),

    /// No such level in the catalog.
    #[error("unknown level {0}")]
    UnknownLevel(u32),
}

// =============================================================================
// LAYOUT
// =============================================================================

/// One tile placement in a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
    /// Stack height
    #[serde(default)]
    pub layer: u32,
    /// Render hint; defaults to the layer
    #[serde(default)]
    pub z: Option<i32>,
    /// Tile kind
    #[serde(rename = "type")]
    pub kind: TileKind,
}

impl LayoutEntry {
    /// Create an entry with the default `z` hint.
    pub fn new(x: i32, y: i32, layer: u32, kind: TileKind) -> Self {
        Self { x, y, layer, z: None, kind }
    }

    /// Board position of this entry.
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.layer)
    }
}

/// Unvalidated list of placements, as stored with a level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelLayout(pub Vec<LayoutEntry>);

impl LevelLayout {
    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no tiles.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<LayoutEntry>> for LevelLayout {
    fn from(entries: Vec<LayoutEntry>) -> Self {
        Self(entries)
    }
}

/// A layout that passed [`validate`].
///
/// Only obtainable through validation, so a board can never be built from
/// a layout that breaks the divisibility rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedLayout {
    entries: Vec<LayoutEntry>,
}

impl ValidatedLayout {
    /// The validated placements.
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no tiles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of tiles per kind.
    pub fn kind_counts(&self) -> BTreeMap<TileKind, usize> {
        count_kinds(&self.entries)
    }
}

fn count_kinds(entries: &[LayoutEntry]) -> BTreeMap<TileKind, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.kind).or_insert(0) += 1;
    }
    counts
}

/// Validate a layout.
///
/// Fails on the first kind (in kind order) whose count is not a multiple
/// of three, or on a repeated position.
pub fn validate(layout: LevelLayout) -> Result<ValidatedLayout, LayoutError> {
    for (kind, count) in count_kinds(&layout.0) {
        if count % MATCH_SIZE != 0 {
            return Err(LayoutError::InvalidCounts { kind, count });
        }
    }

    let mut seen = BTreeSet::new();
    for entry in &layout.0 {
        if !seen.insert(entry.position()) {
            return Err(LayoutError::DuplicatePosition(entry.position()));
        }
    }

    Ok(ValidatedLayout { entries: layout.0 })
}

// =============================================================================
// PROCEDURAL GENERATION
// =============================================================================

/// Number of stacked layers for a difficulty rating.
pub fn layers_for_difficulty(difficulty: u32) -> u32 {
    (MIN_GENERATED_LAYERS + difficulty.saturating_sub(1))
        .clamp(MIN_GENERATED_LAYERS, MAX_GENERATED_LAYERS)
}

/// Generate a random stacked layout on a `rows x cols` grid.
///
/// Each cell gets a random stack height. The kind multiset gives every
/// kind the same base share (a multiple of three) and hands out what is
/// left three tiles at a time, so the result always validates.
pub fn generate(
    rng: &mut DeterministicRng,
    rows: u32,
    cols: u32,
    layers: u32,
) -> Result<ValidatedLayout, LayoutError> {
    let layers = layers.max(1);

    let mut positions = Vec::new();
    for y in 0..rows as i32 {
        for x in 0..cols as i32 {
            let height = rng.next_int_range(1, layers);
            for layer in 0..height {
                positions.push(Position::new(x, y, layer));
            }
        }
    }

    // Dropping from the end only ever trims column tops
    let total = positions.len() / MATCH_SIZE * MATCH_SIZE;
    positions.truncate(total);

    let kind_count = TileKind::ALL.len();
    let base = total / kind_count / MATCH_SIZE * MATCH_SIZE;
    let mut distribution: BTreeMap<TileKind, usize> =
        TileKind::ALL.iter().map(|k| (*k, base)).collect();

    let mut remaining = total - base * kind_count;
    let mut pool: Vec<TileKind> = Vec::new();
    while remaining >= MATCH_SIZE {
        if pool.is_empty() {
            pool = TileKind::ALL.to_vec();
        }
        let idx = rng.next_int(pool.len() as u32) as usize;
        let kind = pool.swap_remove(idx);
        if let Some(count) = distribution.get_mut(&kind) {
            *count += MATCH_SIZE;
        }
        remaining -= MATCH_SIZE;
    }

    let mut kinds: Vec<TileKind> = distribution
        .iter()
        .flat_map(|(kind, count)| std::iter::repeat(*kind).take(*count))
        .collect();
    rng.shuffle(&mut kinds);

    debug!(rows, cols, layers, tiles = total, "generated layout");

    let entries = positions
        .into_iter()
        .zip(kinds)
        .map(|(pos, kind)| LayoutEntry::new(pos.x, pos.y, pos.layer, kind))
        .collect::<Vec<_>>();

    validate(LevelLayout(entries))
}

// =============================================================================
// LEVELS
// =============================================================================

/// A playable level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Level number, starting at 1
    pub level_id: u32,
    /// Difficulty rating (1-5)
    pub difficulty: u32,
    /// Fixed layout; `None` (or empty) means generate one per session
    #[serde(default)]
    pub layout: Option<LevelLayout>,
}

impl Level {
    /// Create a level that is generated procedurally.
    pub fn generated(level_id: u32, difficulty: u32) -> Self {
        Self { level_id, difficulty, layout: None }
    }

    /// Create a level with a fixed layout.
    pub fn with_layout(level_id: u32, difficulty: u32, layout: LevelLayout) -> Self {
        Self { level_id, difficulty, layout: Some(layout) }
    }

    /// Produce the validated layout a new session starts from.
    pub fn resolve_layout(
        &self,
        rng: &mut DeterministicRng,
        rows: u32,
        cols: u32,
    ) -> Result<ValidatedLayout, LayoutError> {
        match &self.layout {
            Some(layout) if !layout.is_empty() => validate(layout.clone()),
            _ => generate(rng, rows, cols, layers_for_difficulty(self.difficulty)),
        }
    }
}

/// The set of levels a host offers.
#[derive(Clone, Debug, Default)]
pub struct LevelCatalog {
    levels: BTreeMap<u32, Level>,
}

impl LevelCatalog {
    /// Number of levels in the standard catalog.
    pub const STANDARD_LEVELS: u32 = 10;

    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ten generated levels with difficulty ramping from 1 to 5.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for id in 1..=Self::STANDARD_LEVELS {
            catalog.insert(Level::generated(id, ((id + 1) / 2).min(5)));
        }
        catalog
    }

    /// Add or replace a level.
    pub fn insert(&mut self, level: Level) {
        self.levels.insert(level.level_id, level);
    }

    /// Look up a level.
    pub fn get(&self, level_id: u32) -> Result<&Level, LayoutError> {
        self.levels.get(&level_id).ok_or(LayoutError::UnknownLevel(level_id))
    }

    /// All levels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(kinds: &[TileKind]) -> LevelLayout {
        kinds
            .iter()
            .enumerate()
            .map(|(i, k)| LayoutEntry::new(i as i32, 0, 0, *k))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_validate_accepts_multiples_of_three() {
        let layout = entries(&[
            TileKind::Bamboo, TileKind::Bamboo, TileKind::Bamboo,
            TileKind::Fire, TileKind::Fire, TileKind::Fire,
        ]);
        let validated = validate(layout).unwrap();
        assert_eq!(validated.len(), 6);
        assert_eq!(validated.kind_counts()[&TileKind::Fire], 3);
    }

    #[test]
    fn test_validate_rejects_bad_count() {
        let layout = entries(&[
            TileKind::Bamboo, TileKind::Bamboo, TileKind::Bamboo,
            TileKind::Leaf, TileKind::Leaf,
        ]);
        assert_eq!(
            validate(layout),
            Err(LayoutError::InvalidCounts { kind: TileKind::Leaf, count: 2 })
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_position() {
        let layout = LevelLayout(vec![
            LayoutEntry::new(0, 0, 0, TileKind::Fish),
            LayoutEntry::new(1, 0, 0, TileKind::Fish),
            LayoutEntry::new(0, 0, 0, TileKind::Fish),
        ]);
        assert_eq!(
            validate(layout),
            Err(LayoutError::DuplicatePosition(Position::new(0, 0, 0)))
        );
    }

    #[test]
    fn test_empty_layout_is_valid() {
        assert!(validate(LevelLayout::default()).unwrap().is_empty());
    }

    #[test]
    fn test_generate_divisible_by_three() {
        for seed in 0..50 {
            let mut rng = DeterministicRng::new(seed);
            let layout = generate(&mut rng, 5, 5, 4).unwrap();
            assert!(!layout.is_empty());
            assert_eq!(layout.len() % 3, 0);
            for count in layout.kind_counts().values() {
                assert_eq!(count % 3, 0);
            }
        }
    }

    #[test]
    fn test_generate_columns_are_contiguous() {
        let mut rng = DeterministicRng::new(99);
        let layout = generate(&mut rng, 4, 4, 6).unwrap();
        let positions: BTreeSet<Position> = layout.entries().iter().map(|e| e.position()).collect();

        for pos in &positions {
            for below in 0..pos.layer {
                assert!(positions.contains(&Position::new(pos.x, pos.y, below)));
            }
        }
    }

    #[test]
    fn test_generate_deterministic() {
        let a = generate(&mut DeterministicRng::new(7), 5, 5, 3).unwrap();
        let b = generate(&mut DeterministicRng::new(7), 5, 5, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_layers_for_difficulty() {
        assert_eq!(layers_for_difficulty(0), 3);
        assert_eq!(layers_for_difficulty(1), 3);
        assert_eq!(layers_for_difficulty(3), 5);
        assert_eq!(layers_for_difficulty(20), 8);
    }

    #[test]
    fn test_standard_catalog() {
        let catalog = LevelCatalog::standard();
        assert_eq!(catalog.iter().count(), 10);
        assert_eq!(catalog.get(1).unwrap().difficulty, 1);
        assert_eq!(catalog.get(4).unwrap().difficulty, 2);
        assert_eq!(catalog.get(10).unwrap().difficulty, 5);
        assert_eq!(catalog.get(11), Err(LayoutError::UnknownLevel(11)));
    }

    #[test]
    fn test_resolve_uses_fixed_layout() {
        let fixed = entries(&[TileKind::Panda, TileKind::Panda, TileKind::Panda]);
        let level = Level::with_layout(1, 1, fixed);
        let layout = level.resolve_layout(&mut DeterministicRng::new(1), 5, 5).unwrap();
        assert_eq!(layout.len(), 3);
    }

    #[test]
    fn test_layout_json_shape() {
        let json = r#"[{"x":1,"y":2,"type":"leaf"},{"x":1,"y":2,"layer":1,"z":5,"type":"leaf"}]"#;
        let layout: LevelLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.0[0].layer, 0);
        assert_eq!(layout.0[1].z, Some(5));
    }
}

//! Game Logic Module
//!
//! All rules of a match session. 100% deterministic: no clock, no global
//! RNG, no I/O. Timestamps for the action log come in from the caller.
//!
//! ## Module Structure
//!
//! - `tile`: Tile kinds, ids and positions
//! - `layout`: Level layouts, validation and generation
//! - `board`: Placed tiles and occlusion
//! - `buffer`: Collector row and triplet matching
//! - `overflow`: Tiles set aside by the remove tool
//! - `tools`: The five player actions
//! - `state`: Session aggregate and terminal evaluation
//! - `events`: Action log for audit and replay

pub mod tile;
pub mod layout;
pub mod board;
pub mod buffer;
pub mod overflow;
pub mod tools;
pub mod state;
pub mod events;

// Re-export key types
pub use tile::{Position, Tile, TileId, TileKind};
pub use layout::{Level, LevelCatalog, LevelLayout, LayoutEntry, LayoutError, ValidatedLayout};
pub use board::Board;
pub use buffer::{CollectorBuffer, MatchedTriplet, BUFFER_CAPACITY};
pub use overflow::OverflowStore;
pub use tools::{Action, ActionError, ActionOutcome, BoardDelta};
pub use state::{
    BrokenPartition, Outcome, PlayerId, SessionId, SessionParts, SessionState, SessionStatus,
    SessionSummary,
};
pub use events::{ActionKind, ActionLog, ActionRecord};

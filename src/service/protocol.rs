//! Protocol Messages
//!
//! Request and result types the host layer exchanges with the engine.
//! Serialized as JSON.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::game::buffer::MatchedTriplet;
use crate::game::layout::{Level, LevelLayout};
use crate::game::state::{Outcome, SessionState, SessionStatus};
use crate::game::tile::Tile;
use crate::game::tools::{Action, ActionError, ActionOutcome, BoardDelta};

// =============================================================================
// HOST -> ENGINE
// =============================================================================

/// Where a new session's layout comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LayoutSource {
    /// The catalog entry for the level (generated if it has no layout).
    #[default]
    Catalog,
    /// Generate a fresh layout at this difficulty.
    Generate {
        /// Difficulty 1..=5
        difficulty: u32,
    },
    /// Use a host-supplied layout.
    Provided {
        /// Tile list
        layout: LevelLayout,
    },
}

/// Request to start a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Player starting the level
    pub player_id: Uuid,
    /// Level to play
    pub level_id: u32,
    /// Layout source
    #[serde(default)]
    pub layout: LayoutSource,
}

/// One action against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Target session
    pub session_id: Uuid,
    /// Action, tagged by `action`
    #[serde(flatten)]
    pub action: Action,
}

// =============================================================================
// ENGINE -> HOST
// =============================================================================

/// Initial view of a started session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStarted {
    /// New session id
    pub session_id: Uuid,
    /// Level being played
    pub level_id: u32,
    /// Every tile on the board
    pub board: Vec<Tile>,
    /// Tiles the player can pick now
    pub accessible_tiles: Vec<Tile>,
}

impl SessionStarted {
    /// Build from a fresh session.
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            session_id: Uuid::from_bytes(*state.session_id()),
            level_id: state.level_id(),
            board: state.board().tiles().copied().collect(),
            accessible_tiles: state.board().accessible_tiles(),
        }
    }
}

/// One row of the level select screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelListing {
    /// Level number
    pub level_id: u32,
    /// Difficulty rating
    pub difficulty: u32,
    /// Whether the player may start it
    pub unlocked: bool,
}

impl LevelListing {
    /// Listing for `level` given the player's progress.
    pub fn new(level: &Level, progress: u32) -> Self {
        Self {
            level_id: level.level_id,
            difficulty: level.difficulty,
            unlocked: level.level_id <= progress,
        }
    }
}

/// Response to an action.
///
/// Rejected actions still carry the current view, with `success = false`
/// and the reason in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Whether the action was applied
    pub success: bool,
    /// Why it was refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
    /// Collector row after the action
    pub buffer: Vec<Tile>,
    /// Overflow after the action
    pub overflow: Vec<Tile>,
    /// Board changes
    pub board_delta: BoardDelta,
    /// Tiles pickable after the action
    pub accessible_tiles: Vec<Tile>,
    /// Triplets cleared by the action
    pub matches: Vec<MatchedTriplet>,
    /// Points gained
    pub points: u32,
    /// Total score
    pub score: u32,
    /// Lifecycle status
    pub status: SessionStatus,
    /// True once play cannot continue
    pub terminal: bool,
    /// Terminal outcome, if reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Commit counter after the action
    pub version: u64,
}

impl ActionResult {
    fn view(state: &SessionState) -> Self {
        let outcome = state.outcome();
        Self {
            success: false,
            error: None,
            buffer: state.buffer().as_slice().to_vec(),
            overflow: state.overflow().as_slice().to_vec(),
            board_delta: BoardDelta::default(),
            accessible_tiles: state.board().accessible_tiles(),
            matches: Vec::new(),
            points: 0,
            score: state.score(),
            status: state.status(),
            terminal: outcome.is_some(),
            outcome,
            version: state.version(),
        }
    }

    /// Result of an applied action.
    pub fn accepted(state: &SessionState, outcome: ActionOutcome) -> Self {
        Self {
            success: true,
            board_delta: outcome.delta,
            matches: outcome.matches,
            points: outcome.points,
            ..Self::view(state)
        }
    }

    /// Result of a refused action.
    pub fn rejected(state: &SessionState, error: ActionError) -> Self {
        Self {
            error: Some(error),
            ..Self::view(state)
        }
    }
}

//! Tool Set
//!
//! The five player actions. Each one checks every precondition before it
//! touches anything, so a failed action leaves the session exactly as it
//! was.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::game::buffer::{MatchedTriplet, BUFFER_CAPACITY};
use crate::game::events::{ActionKind, ActionRecord};
use crate::game::layout::MATCH_SIZE;
use crate::game::state::{SessionState, SessionStatus};
use crate::game::tile::{Position, Tile, TileId};

/// Points per cleared triplet.
pub const MATCH_SCORE: u32 = 10;

/// A player action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Pick a board tile into the buffer.
    Select {
        /// Tile to pick
        tile_id: TileId,
    },
    /// Move the first three buffer tiles to overflow.
    UseRemoveTool,
    /// Move one overflow tile back into the buffer.
    ReturnRemovedTile {
        /// Tile to return
        tile_id: TileId,
    },
    /// Put the last buffer tile back on the board.
    UseWithdrawTool,
    /// Reshuffle kinds across the board.
    UseShuffleTool,
}

impl Action {
    /// Log kind for this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Select { .. } => ActionKind::Select,
            Action::UseRemoveTool => ActionKind::UseRemoveTool,
            Action::ReturnRemovedTile { .. } => ActionKind::ReturnRemovedTile,
            Action::UseWithdrawTool => ActionKind::UseWithdrawTool,
            Action::UseShuffleTool => ActionKind::UseShuffleTool,
        }
    }

    /// Rebuild the action behind a log record.
    ///
    /// `Match` records are consequences of other actions and give `None`.
    pub fn from_record(record: &ActionRecord) -> Option<Self> {
        match record.kind {
            ActionKind::Select => record.tile_id.map(|tile_id| Action::Select { tile_id }),
            ActionKind::Match => None,
            ActionKind::UseRemoveTool => Some(Action::UseRemoveTool),
            ActionKind::ReturnRemovedTile => {
                record.tile_id.map(|tile_id| Action::ReturnRemovedTile { tile_id })
            }
            ActionKind::UseWithdrawTool => Some(Action::UseWithdrawTool),
            ActionKind::UseShuffleTool => Some(Action::UseShuffleTool),
        }
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ActionError {
    /// No such tile on the board.
    #[error("tile {tile_id} is not on the board")]
    TileNotFound {
        /// Requested tile
        tile_id: TileId,
    },

    /// Tile is covered or above the accessible band.
    #[error("tile {tile_id} is not accessible")]
    TileInaccessible {
        /// Requested tile
        tile_id: TileId,
    },

    /// Buffer has no free slot.
    #[error("collector buffer is full")]
    BufferFull,

    /// Remove tool needs three buffer tiles.
    #[error("buffer holds {len} tiles, remove tool needs 3")]
    BufferTooShort {
        /// Current buffer length
        len: usize,
    },

    /// Withdraw needs a buffer tile.
    #[error("collector buffer is empty")]
    BufferEmpty,

    /// Return target is not in overflow.
    #[error("tile {tile_id} is not in overflow")]
    OverflowMiss {
        /// Requested tile
        tile_id: TileId,
    },

    /// Withdraw target position is taken.
    #[error("board position {position} is occupied")]
    BoardPositionOccupied {
        /// Original position of the withdrawn tile
        position: Position,
    },

    /// Shuffle needs at least one board tile.
    #[error("board is empty")]
    BoardEmpty,

    /// Session already ended.
    #[error("session is {status:?}, not active")]
    SessionNotActive {
        /// Current status
        status: SessionStatus,
    },
}

/// Positions that changed on the board.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDelta {
    /// Positions vacated
    pub removed: Vec<Position>,
    /// Tiles put (back) on the board
    pub placed: Vec<Tile>,
    /// Every board tile may have a new kind
    pub reshuffled: bool,
}

/// What an accepted action did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Action kind
    pub kind: ActionKind,
    /// Tile acted on, if any
    pub tile_id: Option<TileId>,
    /// Triplets cleared as a consequence
    pub matches: Vec<MatchedTriplet>,
    /// Points gained
    pub points: u32,
    /// Board changes
    pub delta: BoardDelta,
}

impl ActionOutcome {
    fn new(kind: ActionKind, tile_id: Option<TileId>) -> Self {
        Self {
            kind,
            tile_id,
            matches: Vec::new(),
            points: 0,
            delta: BoardDelta::default(),
        }
    }
}

/// Apply one action to an active session.
pub fn apply(
    state: &mut SessionState,
    action: Action,
    at: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    if !state.is_active() {
        return Err(ActionError::SessionNotActive { status: state.status });
    }

    let outcome = match action {
        Action::Select { tile_id } => select(state, tile_id, at),
        Action::UseRemoveTool => use_remove_tool(state, at),
        Action::ReturnRemovedTile { tile_id } => return_removed_tile(state, tile_id, at),
        Action::UseWithdrawTool => use_withdraw_tool(state, at),
        Action::UseShuffleTool => use_shuffle_tool(state, at),
    }?;

    state.version += 1;
    debug_assert!(state.check_partition());
    Ok(outcome)
}

/// Re-apply logged actions to a session, keeping their timestamps.
///
/// Returns how many actions were applied. Stops at the first refusal.
pub fn replay(state: &mut SessionState, records: &[ActionRecord]) -> Result<usize, ActionError> {
    let mut applied = 0;
    for record in records {
        if let Some(action) = Action::from_record(record) {
            apply(state, action, record.at)?;
            applied += 1;
        }
    }
    Ok(applied)
}

/// Pick an accessible board tile into the buffer and clear any matches.
pub fn select(
    state: &mut SessionState,
    tile_id: TileId,
    at: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    let position = state
        .board
        .get_by_id(tile_id)
        .map(|t| t.position)
        .ok_or(ActionError::TileNotFound { tile_id })?;
    if !state.board.is_accessible(position) {
        return Err(ActionError::TileInaccessible { tile_id });
    }
    if !state.buffer.can_accept() {
        return Err(ActionError::BufferFull);
    }

    let tile = state.board.remove(position).ok_or(ActionError::TileNotFound { tile_id })?;
    state.buffer.insert(tile).map_err(|_| ActionError::BufferFull)?;
    state.log.append(ActionKind::Select, Some(tile_id), at);

    let mut outcome = ActionOutcome::new(ActionKind::Select, Some(tile_id));
    outcome.delta.removed.push(position);
    settle_matches(state, &mut outcome, at);

    debug!(%tile_id, %position, buffer = state.buffer.len(), "tile selected");
    Ok(outcome)
}

/// Move the first three buffer tiles into overflow.
pub fn use_remove_tool(
    state: &mut SessionState,
    at: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    if state.buffer.len() < MATCH_SIZE {
        return Err(ActionError::BufferTooShort { len: state.buffer.len() });
    }

    let removed = state.buffer.take_first(MATCH_SIZE);
    state.overflow.add_all(removed);
    state.log.append(ActionKind::UseRemoveTool, None, at);

    debug!(overflow = state.overflow.len(), "remove tool used");
    Ok(ActionOutcome::new(ActionKind::UseRemoveTool, None))
}

/// Move a tile from overflow back into the buffer and clear any matches.
pub fn return_removed_tile(
    state: &mut SessionState,
    tile_id: TileId,
    at: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    if !state.overflow.contains(tile_id) {
        return Err(ActionError::OverflowMiss { tile_id });
    }
    if !state.buffer.can_accept() {
        return Err(ActionError::BufferFull);
    }

    let tile = state
        .overflow
        .remove_by_id(tile_id)
        .ok_or(ActionError::OverflowMiss { tile_id })?;
    state.buffer.insert(tile).map_err(|_| ActionError::BufferFull)?;
    state.log.append(ActionKind::ReturnRemovedTile, Some(tile_id), at);

    let mut outcome = ActionOutcome::new(ActionKind::ReturnRemovedTile, Some(tile_id));
    settle_matches(state, &mut outcome, at);

    debug!(%tile_id, buffer = state.buffer.len(), "tile returned from overflow");
    Ok(outcome)
}

/// Put the rightmost buffer tile back where it came from.
pub fn use_withdraw_tool(
    state: &mut SessionState,
    at: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    let Some(last) = state.buffer.last().copied() else {
        return Err(ActionError::BufferEmpty);
    };
    let position = last.position;
    if state.board.get(position).is_some() {
        return Err(ActionError::BoardPositionOccupied { position });
    }

    let tile = state.buffer.pop_last().ok_or(ActionError::BufferEmpty)?;
    state
        .board
        .reinsert(tile, position)
        .map_err(|_| ActionError::BoardPositionOccupied { position })?;
    state.log.append(ActionKind::UseWithdrawTool, Some(tile.id), at);

    let mut outcome = ActionOutcome::new(ActionKind::UseWithdrawTool, Some(tile.id));
    outcome.delta.placed.push(tile);

    debug!(tile_id = %tile.id, %position, "tile withdrawn to board");
    Ok(outcome)
}

/// Randomly permute kinds across the board.
pub fn use_shuffle_tool(
    state: &mut SessionState,
    at: DateTime<Utc>,
) -> Result<ActionOutcome, ActionError> {
    if state.board.is_empty() {
        return Err(ActionError::BoardEmpty);
    }

    state.board.shuffle_kinds(&mut state.rng);
    state.log.append(ActionKind::UseShuffleTool, None, at);

    let mut outcome = ActionOutcome::new(ActionKind::UseShuffleTool, None);
    outcome.delta.reshuffled = true;

    debug!(tiles = state.board.len(), "board shuffled");
    Ok(outcome)
}

fn settle_matches(state: &mut SessionState, outcome: &mut ActionOutcome, at: DateTime<Utc>) {
    let matches = state.buffer.resolve_matches();
    for triplet in &matches {
        state.cleared.extend(triplet.tiles.iter().map(|t| t.id));
        state.log.append(ActionKind::Match, None, at);
        debug!(kind = %triplet.kind, "triplet cleared");
    }

    let points = MATCH_SCORE * matches.len() as u32;
    state.score = state.score.saturating_add(points);
    outcome.points = points;
    outcome.matches = matches;
    debug_assert!(state.buffer.len() <= BUFFER_CAPACITY);
}

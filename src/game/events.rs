//! Action Log
//!
//! Append-only record of accepted actions for audit and replay.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::tile::TileId;

/// Kind of logged action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Tile picked from the board
    Select,
    /// Triplet cleared from the buffer
    Match,
    /// First three buffer tiles moved to overflow
    UseRemoveTool,
    /// Overflow tile moved back to the buffer
    ReturnRemovedTile,
    /// Last buffer tile put back on the board
    UseWithdrawTool,
    /// Board kinds reshuffled
    UseShuffleTool,
}

impl ActionKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Select => "select",
            ActionKind::Match => "match",
            ActionKind::UseRemoveTool => "use_remove_tool",
            ActionKind::ReturnRemovedTile => "return_removed_tile",
            ActionKind::UseWithdrawTool => "use_withdraw_tool",
            ActionKind::UseShuffleTool => "use_shuffle_tool",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Position in the log, from 0
    pub seq: u64,
    /// What happened
    pub kind: ActionKind,
    /// Tile involved, if any
    pub tile_id: Option<TileId>,
    /// When the host accepted the action
    pub at: DateTime<Utc>,
}

/// Append-only action history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
}

impl ActionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return it.
    pub fn append(
        &mut self,
        kind: ActionKind,
        tile_id: Option<TileId>,
        at: DateTime<Utc>,
    ) -> &ActionRecord {
        let seq = self.records.len() as u64;
        self.records.push(ActionRecord { seq, kind, tile_id, at });
        &self.records[self.records.len() - 1]
    }

    /// Records from `seq` onward.
    pub fn since(&self, seq: u64) -> &[ActionRecord] {
        let start = (seq as usize).min(self.records.len());
        &self.records[start..]
    }

    /// All records in order.
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records of one kind.
    pub fn count(&self, kind: ActionKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }
}

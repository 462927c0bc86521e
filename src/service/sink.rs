//! Action Sinks
//!
//! Optional host hook that receives every committed action record, for
//! analytics or an external audit trail. Delivery is best-effort.

use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::game::events::ActionRecord;
use crate::game::state::SessionId;

/// Sink delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action sink: {0}")]
pub struct SinkError(pub String);

/// Receiver for committed action records.
pub trait ActionSink: Send + Sync {
    /// Deliver one record.
    fn record(&self, session_id: &SessionId, record: &ActionRecord) -> Result<(), SinkError>;
}

/// Emits each record as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ActionSink for TracingSink {
    fn record(&self, session_id: &SessionId, record: &ActionRecord) -> Result<(), SinkError> {
        info!(
            session = %hex::encode(&session_id[..4]),
            seq = record.seq,
            kind = %record.kind,
            tile = ?record.tile_id.map(|t| t.0),
            "action"
        );
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(SessionId, ActionRecord)>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far.
    pub fn records(&self) -> Vec<(SessionId, ActionRecord)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ActionSink for MemorySink {
    fn record(&self, session_id: &SessionId, record: &ActionRecord) -> Result<(), SinkError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| SinkError("sink lock poisoned".to_string()))?;
        records.push((*session_id, record.clone()));
        Ok(())
    }
}

//! Service Layer
//!
//! Host boundary around the engine: configuration, wire types, persistence,
//! player progress and the session manager.
//! This layer is **non-deterministic** (ids, clocks, storage); all rules
//! run through `game/`.

pub mod config;
pub mod protocol;
pub mod snapshot;
pub mod store;
pub mod progress;
pub mod sink;
pub mod session;

pub use config::EngineConfig;
pub use protocol::{
    ActionRequest, ActionResult, LayoutSource, LevelListing, SessionStarted, StartRequest,
};
pub use snapshot::{SessionSnapshot, SnapshotError};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError};
pub use progress::{MemoryProgress, ProgressError, ProgressTracker};
pub use sink::{ActionSink, MemorySink, SinkError, TracingSink};
pub use session::{SessionError, SessionManager};

//! # Panda Match Server
//!
//! Session engine for a layered three-of-a-kind tile matching game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PANDA MATCH SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Game rules (deterministic)                │
//! │  ├── tile.rs     - Tile kinds, ids, positions                │
//! │  ├── layout.rs   - Validation, generation, level catalog     │
//! │  ├── board.rs    - Placed tiles and occlusion                │
//! │  ├── buffer.rs   - Collector row and triplet matching        │
//! │  ├── overflow.rs - Tiles set aside by the remove tool        │
//! │  ├── tools.rs    - The five player actions                   │
//! │  ├── state.rs    - Session aggregate, terminal evaluation    │
//! │  └── events.rs   - Action log                                │
//! │                                                              │
//! │  service/        - Host boundary (non-deterministic)         │
//! │  ├── config.rs   - Environment-driven settings               │
//! │  ├── protocol.rs - Request and result types                  │
//! │  ├── snapshot.rs - Persisted session record                  │
//! │  ├── store.rs    - Snapshot stores                           │
//! │  ├── progress.rs - Player level progress                     │
//! │  ├── sink.rs     - Action record sinks                       │
//! │  └── session.rs  - Per-session serialized execution          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies (timestamps are passed in)
//! - All randomness from the session's seeded Xorshift128+
//!
//! Replaying the same actions against a restored snapshot produces the
//! same shuffles and the same state hash.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod service;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::state::{PlayerId, SessionId, SessionState};
pub use game::tools::{Action, ActionError};
pub use service::{EngineConfig, SessionManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

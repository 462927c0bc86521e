//! Core deterministic primitives.
//!
//! Seeded randomness and state hashing shared by the engine and the
//! snapshot layer.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, derive_session_seed};
pub use hash::{StateHash, StateHasher, compute_state_hash};

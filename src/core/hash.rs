//! Session State Hashing
//!
//! SHA-256 over a fixed field order. Snapshots carry this hash and are
//! refused on restore if the recomputed value differs; replays compare it
//! to prove they reached the same state.

use sha2::{Sha256, Digest};

const STATE_DOMAIN: &[u8] = b"PANDA_MATCH_STATE_V1";

/// 32-byte SHA-256 digest.
pub type StateHash = [u8; 32];

/// Little-endian field writer over SHA-256.
///
/// Callers must feed fields in the same order every time.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    fn new() -> Self {
        Self {
            hasher: Sha256::new().chain_update(STATE_DOMAIN),
        }
    }

    /// Tile kinds and status discriminants.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Tile ids, layers, counters.
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// RNG words, versions.
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Planar coordinates, which may be negative.
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Session and player ids.
    #[inline]
    pub fn update_uuid(&mut self, uuid: &[u8; 16]) {
        self.hasher.update(uuid);
    }

    /// Length prefix for a variable-size list.
    ///
    /// Keeps `[a, b] + [c]` distinct from `[a] + [b, c]`.
    #[inline]
    pub fn update_len(&mut self, len: usize) {
        self.update_u64(len as u64);
    }

    fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Hash a session: level and seed first, then whatever `add_state` feeds.
pub fn compute_state_hash<F>(level_id: u32, rng_seed: u64, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::new();
    hasher.update_u32(level_id);
    hasher.update_u64(rng_seed);

    add_state(&mut hasher);

    hasher.finalize()
}

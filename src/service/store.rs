//! Session Stores
//!
//! Where snapshots live between actions. Saves are conditional on the
//! version the writer loaded, so a writer that raced past the session lock
//! gets a [`StoreError::VersionConflict`] instead of silently clobbering.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::game::state::SessionId;
use crate::service::snapshot::{SessionSnapshot, SnapshotError};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(#[from] SnapshotError),

    /// Stored version differs from the one the writer expected.
    #[error("version conflict: expected {expected:?}, found {found:?}")]
    VersionConflict {
        /// Version the writer loaded (`None` for a new session)
        expected: Option<u64>,
        /// Version actually stored (`None` if absent)
        found: Option<u64>,
    },

    /// No snapshot under this id.
    #[error("no stored session {0}")]
    NotFound(Uuid),
}

/// Persistence for session snapshots.
///
/// Calls are synchronous and may block on I/O. The session manager runs
/// them on tokio's blocking pool, never on a runtime worker.
pub trait SessionStore: Send + Sync {
    /// Load the latest snapshot of a session.
    fn load(&self, id: &SessionId) -> Result<SessionSnapshot, StoreError>;

    /// Save a snapshot.
    ///
    /// `expected_version` is the version the caller loaded, or `None` when
    /// creating. The save is refused if the stored version differs.
    fn save(
        &self,
        snapshot: &SessionSnapshot,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Whether a snapshot exists under `id`.
    fn contains(&self, id: &SessionId) -> Result<bool, StoreError> {
        match self.load(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn check_version(expected: Option<u64>, found: Option<u64>) -> Result<(), StoreError> {
    if expected == found {
        Ok(())
    } else {
        Err(StoreError::VersionConflict { expected, found })
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store keeping bincode-encoded snapshots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<SessionId, (u64, Vec<u8>)>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, id: &SessionId) -> Result<SessionSnapshot, StoreError> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        let (_, bytes) = records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(Uuid::from_bytes(*id)))?;
        Ok(SessionSnapshot::from_bincode(bytes)?)
    }

    fn save(
        &self,
        snapshot: &SessionSnapshot,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let bytes = snapshot.to_bincode()?;
        let mut records = self.records.lock().map_err(|_| poisoned())?;

        let id = snapshot.id();
        check_version(expected_version, records.get(&id).map(|(v, _)| *v))?;
        records.insert(id, (snapshot.version, bytes));
        Ok(())
    }

    fn contains(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.records.lock().map_err(|_| poisoned())?.contains_key(id))
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::Other, "store lock poisoned"))
}

// =============================================================================
// JSON FILE STORE
// =============================================================================

/// One pretty-printed JSON file per session.
///
/// Writes go to a temporary file that is then renamed over the old one, so
/// a crash mid-save leaves the previous snapshot intact.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the snapshots.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", Uuid::from_bytes(*id)))
    }

    fn read(&self, id: &SessionId) -> Result<Option<SessionSnapshot>, StoreError> {
        match fs::read_to_string(self.path_for(id)) {
            Ok(json) => Ok(Some(SessionSnapshot::from_json(&json)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self, id: &SessionId) -> Result<SessionSnapshot, StoreError> {
        self.read(id)?
            .ok_or_else(|| StoreError::NotFound(Uuid::from_bytes(*id)))
    }

    fn contains(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.path_for(id).try_exists()?)
    }

    fn save(
        &self,
        snapshot: &SessionSnapshot,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;

        let id = snapshot.id();
        let found = self.read(&id)?.map(|s| s.version);
        check_version(expected_version, found)?;

        let json = serde_json::to_string_pretty(snapshot).map_err(SnapshotError::from)?;
        let path = self.path_for(&id);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), version = snapshot.version, "snapshot written");
        Ok(())
    }
}

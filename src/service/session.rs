//! Session Management
//!
//! Hosts play sessions on top of a [`SessionStore`] and a
//! [`ProgressTracker`]. Every operation on a session runs load, mutate and
//! persist under that session's own lock, so two actions on one session
//! never interleave while different sessions proceed in parallel.
//!
//! A lock lives only while its session is active. It is created when the
//! session starts (or on first use of a session saved by an earlier
//! process) and dropped once the session completes or is abandoned.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::game::layout::{Level, LayoutError, LevelCatalog};
use crate::game::state::{Outcome, PlayerId, SessionId, SessionState, SessionSummary};
use crate::game::tile::Tile;
use crate::game::tools::{self, Action};
use crate::service::config::EngineConfig;
use crate::service::progress::{ProgressError, ProgressTracker};
use crate::service::protocol::{ActionResult, LayoutSource, LevelListing, SessionStarted};
use crate::service::sink::ActionSink;
use crate::service::snapshot::{SessionSnapshot, SnapshotError};
use crate::service::store::{SessionStore, StoreError};

/// Host-level errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session under this id.
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    /// Player has not unlocked the level yet.
    #[error("level {level_id} is locked (progress {progress})")]
    LevelLocked {
        /// Requested level
        level_id: u32,
        /// Player's unlocked level
        progress: u32,
    },

    /// Layout rejected or level unknown.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Progress lookup or update failed.
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Stored snapshot could not be restored.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A store call on the blocking pool panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] JoinError),
}

/// Session manager.
pub struct SessionManager<S, P> {
    config: EngineConfig,
    catalog: LevelCatalog,
    store: Arc<S>,
    progress: P,
    sink: Option<Arc<dyn ActionSink>>,
    /// Locks of active sessions.
    locks: RwLock<BTreeMap<SessionId, Arc<Mutex<()>>>>,
}

impl<S, P> SessionManager<S, P>
where
    S: SessionStore + 'static,
    P: ProgressTracker,
{
    /// Create new session manager.
    pub fn new(config: EngineConfig, catalog: LevelCatalog, store: S, progress: P) -> Self {
        Self {
            config,
            catalog,
            store: Arc::new(store),
            progress,
            sink: None,
            locks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Forward committed action records to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ActionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Progress collaborator.
    pub fn progress(&self) -> &P {
        &self.progress
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Every catalog level, flagged by whether `player_id` may start it.
    pub fn levels(&self, player_id: PlayerId) -> Result<Vec<LevelListing>, SessionError> {
        let progress = self.progress.progress(player_id)?;
        Ok(self
            .catalog
            .iter()
            .map(|level| LevelListing::new(level, progress))
            .collect())
    }

    /// Start a new session for `player_id` on `level_id`.
    #[instrument(skip(self, source), fields(player = %hex::encode(&player_id.0[..4])))]
    pub async fn start_session(
        &self,
        player_id: PlayerId,
        level_id: u32,
        source: LayoutSource,
    ) -> Result<SessionStarted, SessionError> {
        let progress = self.progress.progress(player_id)?;
        if level_id > progress {
            return Err(SessionError::LevelLocked { level_id, progress });
        }

        let level = match source {
            LayoutSource::Catalog => self.catalog.get(level_id)?.clone(),
            LayoutSource::Generate { difficulty } => Level::generated(level_id, difficulty),
            LayoutSource::Provided { layout } => {
                let difficulty = self.catalog.get(level_id).map(|l| l.difficulty).unwrap_or(1);
                Level::with_layout(level_id, difficulty, layout)
            }
        };

        let session_id = Uuid::new_v4().into_bytes();
        let state = SessionState::start(
            session_id,
            player_id,
            &level,
            self.config.board_rows,
            self.config.board_cols,
            self.config.max_accessible_layer,
            Utc::now(),
        )?;

        let lock = Arc::new(Mutex::new(()));
        let _guard = lock.lock().await;
        self.locks.write().await.insert(session_id, Arc::clone(&lock));

        if let Err(err) = self.save(&state, None).await {
            self.release(&session_id).await;
            return Err(err);
        }

        Ok(SessionStarted::from_state(&state))
    }

    /// Apply one action.
    ///
    /// Rule violations come back as `Ok` with `success = false` and leave
    /// the stored session untouched. Storage and progress failures are
    /// `Err` and leave it untouched as well, so the action can be retried.
    #[instrument(skip(self), fields(session = %hex::encode(&session_id[..4])))]
    pub async fn apply_action(
        &self,
        session_id: SessionId,
        action: Action,
    ) -> Result<ActionResult, SessionError> {
        let lock = self.session_lock(session_id).await?;
        let _guard = lock.lock().await;

        let mut state = self.load(session_id).await?;
        let loaded_version = state.version();
        let log_mark = state.log().len() as u64;
        let at = Utc::now();

        let outcome = match tools::apply(&mut state, action, at) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(%err, "action rejected");
                if !state.is_active() {
                    self.release(&session_id).await;
                }
                return Ok(ActionResult::rejected(&state, err));
            }
        };

        let advance = match state.outcome() {
            Some(Outcome::Cleared) => {
                let recorded = self.progress.progress(state.player_id())?;
                state.complete_level(recorded, at)
            }
            Some(Outcome::Stuck) => {
                state.finish_stuck(at);
                None
            }
            None => None,
        };

        // Progress goes first: if it fails nothing is saved and the
        // clearing action can simply be sent again
        if let Some(next) = advance {
            self.progress.set_progress(state.player_id(), next)?;
        }
        self.save(&state, Some(loaded_version)).await?;

        if !state.is_active() {
            self.release(&session_id).await;
        }
        self.emit(&session_id, &state, log_mark);
        Ok(ActionResult::accepted(&state, outcome))
    }

    /// Give up a session. Does nothing if it already ended.
    #[instrument(skip(self), fields(session = %hex::encode(&session_id[..4])))]
    pub async fn abandon(&self, session_id: SessionId) -> Result<SessionSummary, SessionError> {
        let lock = self.session_lock(session_id).await?;
        let _guard = lock.lock().await;

        let mut state = self.load(session_id).await?;
        let loaded_version = state.version();
        if state.abandon(Utc::now()) {
            state.version += 1;
            self.save(&state, Some(loaded_version)).await?;
            info!(score = state.score(), "session abandoned");
        }

        self.release(&session_id).await;
        Ok(state.summary())
    }

    /// Current state of a session.
    ///
    /// Reads the latest committed snapshot without taking the session lock.
    pub async fn session(&self, session_id: SessionId) -> Result<SessionState, SessionError> {
        self.load(session_id).await
    }

    /// Result screen data.
    pub async fn summary(&self, session_id: SessionId) -> Result<SessionSummary, SessionError> {
        Ok(self.session(session_id).await?.summary())
    }

    /// Tiles the player can pick right now.
    pub async fn accessible_tiles(&self, session_id: SessionId) -> Result<Vec<Tile>, SessionError> {
        Ok(self.session(session_id).await?.board().accessible_tiles())
    }

    /// Number of active sessions holding a lock.
    pub async fn session_count(&self) -> usize {
        self.locks.read().await.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn session_lock(&self, id: SessionId) -> Result<Arc<Mutex<()>>, SessionError> {
        if let Some(lock) = self.locks.read().await.get(&id) {
            return Ok(Arc::clone(lock));
        }
        // Sessions saved by an earlier process get their lock on first use
        if !self.blocking(move |store| store.contains(&id)).await? {
            return Err(SessionError::SessionNotFound(Uuid::from_bytes(id)));
        }
        Ok(Arc::clone(self.locks.write().await.entry(id).or_default()))
    }

    /// Drop the lock of a session that is no longer active.
    ///
    /// A waiter still holding the old lock only ever sees a finished session.
    async fn release(&self, id: &SessionId) {
        if self.locks.write().await.remove(id).is_some() {
            debug!("session lock released");
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, SessionError>
    where
        F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || op(&store)).await?;
        result.map_err(|err| match err {
            StoreError::NotFound(uuid) => SessionError::SessionNotFound(uuid),
            other => SessionError::Store(other),
        })
    }

    async fn load(&self, id: SessionId) -> Result<SessionState, SessionError> {
        let snapshot = self.blocking(move |store| store.load(&id)).await?;
        Ok(snapshot.restore()?)
    }

    async fn save(&self, state: &SessionState, expected: Option<u64>) -> Result<(), SessionError> {
        let snapshot = SessionSnapshot::capture(state);
        self.blocking(move |store| store.save(&snapshot, expected)).await
    }

    fn emit(&self, session_id: &SessionId, state: &SessionState, from_seq: u64) {
        let Some(sink) = &self.sink else {
            return;
        };
        for record in state.log().since(from_seq) {
            if let Err(err) = sink.record(session_id, record) {
                warn!(%err, seq = record.seq, "action sink failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::layout::{LayoutEntry, LevelLayout};
    use crate::game::state::SessionStatus;
    use crate::game::tile::{TileId, TileKind};
    use crate::game::tools::ActionError;
    use crate::service::progress::MemoryProgress;
    use crate::service::sink::{MemorySink, SinkError};
    use crate::service::store::MemoryStore;
    use crate::game::events::ActionRecord;
    use std::sync::atomic::{AtomicBool, Ordering};

    type TestManager = SessionManager<MemoryStore, MemoryProgress>;

    fn manager_with<P: ProgressTracker>(progress: P) -> SessionManager<MemoryStore, P> {
        SessionManager::new(
            EngineConfig::default(),
            LevelCatalog::standard(),
            MemoryStore::new(),
            progress,
        )
    }

    fn manager() -> TestManager {
        manager_with(MemoryProgress::new())
    }

    fn player() -> PlayerId {
        PlayerId::new([5; 16])
    }

    fn three_bamboo() -> LayoutSource {
        LayoutSource::Provided {
            layout: LevelLayout(vec![
                LayoutEntry::new(0, 0, 0, TileKind::Bamboo),
                LayoutEntry::new(2, 0, 0, TileKind::Bamboo),
                LayoutEntry::new(4, 0, 0, TileKind::Bamboo),
            ]),
        }
    }

    fn id_of(started: &SessionStarted) -> SessionId {
        started.session_id.into_bytes()
    }

    #[tokio::test]
    async fn test_start_session_persists() {
        let manager = manager();
        let started = manager.start_session(player(), 1, LayoutSource::Catalog).await.unwrap();

        assert!(!started.board.is_empty());
        assert!(!started.accessible_tiles.is_empty());
        assert_eq!(manager.store().len(), 1);

        let state = manager.session(id_of(&started)).await.unwrap();
        assert_eq!(state.level_id(), 1);
        assert!(state.is_active());
    }

    #[tokio::test]
    async fn test_locked_level() {
        let manager = manager();
        let result = manager.start_session(player(), 3, LayoutSource::Catalog).await;
        assert!(matches!(result, Err(SessionError::LevelLocked { level_id: 3, progress: 1 })));
    }

    #[tokio::test]
    async fn test_unknown_level() {
        let manager = manager();
        manager.progress().set_progress(player(), 50).unwrap();
        let result = manager.start_session(player(), 42, LayoutSource::Catalog).await;
        assert!(matches!(result, Err(SessionError::Layout(LayoutError::UnknownLevel(42)))));
    }

    #[tokio::test]
    async fn test_invalid_layout_rejected() {
        let manager = manager();
        let source = LayoutSource::Provided {
            layout: LevelLayout(vec![LayoutEntry::new(0, 0, 0, TileKind::Fish)]),
        };
        let result = manager.start_session(player(), 1, source).await;
        assert!(matches!(result, Err(SessionError::Layout(LayoutError::InvalidCounts { .. }))));
        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_clearing_advances_progress() {
        let manager = manager();
        let started = manager.start_session(player(), 1, three_bamboo()).await.unwrap();
        let id = id_of(&started);

        for tile in 1..=3 {
            let result = manager
                .apply_action(id, Action::Select { tile_id: TileId(tile) })
                .await
                .unwrap();
            assert!(result.success);
        }

        let state = manager.session(id).await.unwrap();
        assert_eq!(state.status(), SessionStatus::Completed);
        assert_eq!(state.score(), 10);
        assert!(state.ended_at().is_some());
        assert_eq!(manager.progress().progress(player()), Ok(2));

        let summary = manager.summary(id).await.unwrap();
        assert_eq!(summary.outcome, Some(Outcome::Cleared));
        assert!(summary.duration_secs.is_some());
    }

    #[tokio::test]
    async fn test_replaying_old_level_keeps_progress() {
        let manager = manager();
        manager.progress().set_progress(player(), 4).unwrap();
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());

        for tile in 1..=3 {
            manager.apply_action(id, Action::Select { tile_id: TileId(tile) }).await.unwrap();
        }
        assert_eq!(manager.progress().progress(player()), Ok(4));
    }

    #[tokio::test]
    async fn test_rejected_action_leaves_store_untouched() {
        let manager = manager();
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());

        let result = manager.apply_action(id, Action::UseWithdrawTool).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error, Some(ActionError::BufferEmpty));
        assert_eq!(manager.session(id).await.unwrap().version(), 0);
    }

    #[tokio::test]
    async fn test_actions_after_completion_rejected() {
        let manager = manager();
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());
        for tile in 1..=3 {
            manager.apply_action(id, Action::Select { tile_id: TileId(tile) }).await.unwrap();
        }

        let result = manager.apply_action(id, Action::UseShuffleTool).await.unwrap();
        assert!(matches!(result.error, Some(ActionError::SessionNotActive { .. })));
    }

    #[tokio::test]
    async fn test_abandon() {
        let manager = manager();
        let id = id_of(&manager.start_session(player(), 1, LayoutSource::Catalog).await.unwrap());

        let summary = manager.abandon(id).await.unwrap();
        assert_eq!(summary.status, SessionStatus::Abandoned);
        assert!(summary.ended_at.is_some());
        assert_eq!(manager.session_count().await, 0);

        // Second abandon is a no-op
        let again = manager.abandon(id).await.unwrap();
        assert_eq!(again, summary);
        assert_eq!(manager.session(id).await.unwrap().version(), 1);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let manager = manager();
        let result = manager.apply_action([0; 16], Action::UseShuffleTool).await;
        assert!(matches!(result, Err(SessionError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_sink_receives_records() {
        let sink = Arc::new(MemorySink::new());
        let manager = manager().with_sink(sink.clone());
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());

        for tile in 1..=3 {
            manager.apply_action(id, Action::Select { tile_id: TileId(tile) }).await.unwrap();
        }

        let kinds: Vec<_> = sink.records().iter().map(|(_, r)| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["select", "select", "select", "match"]);
    }

    struct FailingSink;

    impl ActionSink for FailingSink {
        fn record(&self, _: &SessionId, _: &ActionRecord) -> Result<(), SinkError> {
            Err(SinkError("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_roll_back() {
        let manager = manager().with_sink(Arc::new(FailingSink));
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());

        let result = manager
            .apply_action(id, Action::Select { tile_id: TileId(1) })
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(manager.session(id).await.unwrap().buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_actions_serialize() {
        let manager = Arc::new(manager());
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());

        // Both race for the same tile; exactly one may win
        let a = tokio::spawn({
            let m = manager.clone();
            async move { m.apply_action(id, Action::Select { tile_id: TileId(1) }).await }
        });
        let b = tokio::spawn({
            let m = manager.clone();
            async move { m.apply_action(id, Action::Select { tile_id: TileId(1) }).await }
        });

        let results = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        assert_eq!(results.iter().filter(|r| r.success).count(), 1);

        let state = manager.session(id).await.unwrap();
        assert_eq!(state.buffer().len(), 1);
        assert!(state.check_partition());
    }

    #[tokio::test]
    async fn test_lock_entries_follow_active_sessions() {
        let manager = manager();

        for n in 0..20u8 {
            let result = manager.apply_action([n; 16], Action::UseShuffleTool).await;
            assert!(matches!(result, Err(SessionError::SessionNotFound(_))));
            assert!(manager.abandon([n; 16]).await.is_err());
        }
        assert_eq!(manager.session_count().await, 0);

        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());
        assert_eq!(manager.session_count().await, 1);

        for tile in 1..=3 {
            manager.apply_action(id, Action::Select { tile_id: TileId(tile) }).await.unwrap();
        }
        assert_eq!(manager.session(id).await.unwrap().status(), SessionStatus::Completed);
        assert_eq!(manager.session_count().await, 0);

        // Touching the finished session does not bring its lock back
        let result = manager.apply_action(id, Action::UseShuffleTool).await.unwrap();
        assert!(!result.success);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_stored_session_gets_lock_on_first_use() {
        let manager = manager();
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());
        manager.release(&id).await;
        assert_eq!(manager.session_count().await, 0);

        let result = manager
            .apply_action(id, Action::Select { tile_id: TileId(1) })
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(manager.session_count().await, 1);
    }

    /// Progress table whose writes can be switched off.
    struct FlakyProgress {
        inner: MemoryProgress,
        fail_writes: AtomicBool,
    }

    impl ProgressTracker for FlakyProgress {
        fn progress(&self, player: PlayerId) -> Result<u32, ProgressError> {
            self.inner.progress(player)
        }

        fn set_progress(&self, player: PlayerId, level_id: u32) -> Result<(), ProgressError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ProgressError::Storage("progress table offline".to_string()));
            }
            self.inner.set_progress(player, level_id)
        }
    }

    #[tokio::test]
    async fn test_progress_failure_leaves_clear_retryable() {
        let manager = manager_with(FlakyProgress {
            inner: MemoryProgress::new(),
            fail_writes: AtomicBool::new(true),
        });
        let id = id_of(&manager.start_session(player(), 1, three_bamboo()).await.unwrap());

        for tile in 1..=2 {
            manager.apply_action(id, Action::Select { tile_id: TileId(tile) }).await.unwrap();
        }
        let result = manager.apply_action(id, Action::Select { tile_id: TileId(3) }).await;
        assert!(matches!(result, Err(SessionError::Progress(ProgressError::Storage(_)))));

        let stored = manager.session(id).await.unwrap();
        assert!(stored.is_active());
        assert_eq!(stored.buffer().len(), 2);
        assert_eq!(stored.version(), 2);

        manager.progress().fail_writes.store(false, Ordering::SeqCst);
        let retry = manager
            .apply_action(id, Action::Select { tile_id: TileId(3) })
            .await
            .unwrap();
        assert!(retry.success);
        assert_eq!(retry.status, SessionStatus::Completed);
        assert_eq!(manager.progress().progress(player()), Ok(2));
    }

    #[tokio::test]
    async fn test_levels_listing() {
        let manager = manager();
        manager.progress().set_progress(player(), 3).unwrap();

        let levels = manager.levels(player()).unwrap();
        assert_eq!(levels.len(), LevelCatalog::STANDARD_LEVELS as usize);
        let unlocked: Vec<u32> = levels.iter().filter(|l| l.unlocked).map(|l| l.level_id).collect();
        assert_eq!(unlocked, vec![1, 2, 3]);
    }
}

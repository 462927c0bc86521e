//! Panda Match Server
//!
//! Demo host for the Panda Match engine.
//! Plays a catalog level end to end with a greedy strategy, then replays
//! the action log against a fresh session to check determinism.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use panda_match::{
    VERSION,
    game::{
        buffer::BUFFER_CAPACITY,
        layout::LevelCatalog,
        state::{PlayerId, SessionState},
        tile::TileKind,
        tools::{self, Action},
    },
    service::{
        EngineConfig, JsonFileStore, LayoutSource, MemoryProgress, SessionManager, TracingSink,
    },
};

/// Upper bound on demo moves.
const MAX_STEPS: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Panda Match Server v{}", VERSION);
    info!("Accessible layers: 0..={}", config.max_accessible_layer);
    info!("Generator grid: {}x{}", config.board_rows, config.board_cols);

    demo_session(config).await
}

/// Play level 1 and verify the replay.
async fn demo_session(config: EngineConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let store = JsonFileStore::open(&config.data_dir)
        .with_context(|| format!("cannot open store at {}", config.data_dir.display()))?;
    let catalog = LevelCatalog::standard();
    let manager = SessionManager::new(config.clone(), catalog.clone(), store, MemoryProgress::new())
        .with_sink(std::sync::Arc::new(TracingSink));

    let player = PlayerId::new(*uuid::Uuid::new_v4().as_bytes());
    for level in manager.levels(player)? {
        let lock = if level.unlocked { "open" } else { "locked" };
        info!("Level {:>2} (difficulty {}): {}", level.level_id, level.difficulty, lock);
    }
    let started = manager.start_session(player, 1, LayoutSource::Catalog).await?;
    let session_id = started.session_id.into_bytes();

    info!("Session ID: {}", started.session_id);
    info!("Tiles: {} ({} accessible)", started.board.len(), started.accessible_tiles.len());

    for step in 0..MAX_STEPS {
        let state = manager.session(session_id).await?;
        if !state.is_active() {
            break;
        }

        let action = choose_action(&state);
        let result = manager.apply_action(session_id, action).await?;
        if !result.success {
            warn!(step, ?action, error = ?result.error, "demo move refused");
            break;
        }
        if !result.matches.is_empty() {
            info!(
                "Step {}: cleared {} triplet(s), score {}",
                step,
                result.matches.len(),
                result.score
            );
        }
        if result.terminal {
            info!("Terminal after {} steps: {:?}", step + 1, result.outcome);
            break;
        }
    }

    // Print final results
    info!("=== Session Results ===");
    let final_state = manager.session(session_id).await?;
    let summary = final_state.summary();
    info!("Status: {:?}", summary.status);
    if let Some(secs) = summary.duration_secs {
        info!("Duration: {}s", secs);
    }
    info!("Score: {} ({} matches, {} log entries)", summary.score, summary.matches, summary.moves);
    info!("Final State Hash: {}", hex::encode(final_state.compute_hash()));

    // Verify determinism by replaying
    info!("=== Verifying Determinism ===");
    let level = catalog.get(1)?;
    let mut replayed = SessionState::start(
        session_id,
        player,
        level,
        config.board_rows,
        config.board_cols,
        config.max_accessible_layer,
        final_state.started_at(),
    )?;
    let applied = tools::replay(&mut replayed, final_state.log().records())?;
    info!("Replayed {} actions", applied);

    let same_play = replayed.board() == final_state.board()
        && replayed.buffer() == final_state.buffer()
        && replayed.overflow() == final_state.overflow()
        && replayed.score() == final_state.score();
    if same_play {
        info!("DETERMINISM VERIFIED: replay matches");
    } else {
        warn!("DETERMINISM FAILURE: replay differs");
    }

    Ok(())
}

/// Greedy move choice.
///
/// Completes a triplet when it can, keeps two slots free for building
/// pairs, and falls back to the tools when the row gets crowded.
fn choose_action(state: &SessionState) -> Action {
    let counts = state.buffer().kind_counts();
    let held = |kind: TileKind| counts.get(&kind).copied().unwrap_or(0);
    let accessible = state.board().accessible_tiles();
    let can_accept = state.buffer().can_accept();

    if can_accept {
        if let Some(tile) = accessible.iter().find(|t| held(t.kind) == 2) {
            return Action::Select { tile_id: tile.id };
        }
        if let Some(tile) = state.overflow().as_slice().iter().find(|t| held(t.kind) == 2) {
            return Action::ReturnRemovedTile { tile_id: tile.id };
        }
    }
    if state.buffer().len() < BUFFER_CAPACITY - 2 {
        if let Some(tile) = accessible.iter().max_by_key(|t| held(t.kind)) {
            return Action::Select { tile_id: tile.id };
        }
    }
    if state.overflow().is_empty() && state.buffer().len() >= 3 {
        return Action::UseRemoveTool;
    }
    if can_accept {
        if let Some(tile) = accessible.first() {
            return Action::Select { tile_id: tile.id };
        }
        if let Some(tile) = state.overflow().as_slice().first() {
            return Action::ReturnRemovedTile { tile_id: tile.id };
        }
    }
    if !state.board().is_empty() && accessible.is_empty() {
        return Action::UseShuffleTool;
    }
    Action::UseWithdrawTool
}

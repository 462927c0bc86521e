//! Engine Configuration
//!
//! Host-side settings, read from the environment with sane defaults.

use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::game::board::DEFAULT_MAX_ACCESSIBLE_LAYER;

/// Default generator grid height.
pub const DEFAULT_BOARD_ROWS: u32 = 5;

/// Default generator grid width.
pub const DEFAULT_BOARD_COLS: u32 = 5;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Highest layer a tile may sit on and still be picked.
    pub max_accessible_layer: u32,
    /// Rows of the procedural generator grid.
    pub board_rows: u32,
    /// Columns of the procedural generator grid.
    pub board_cols: u32,
    /// Directory for the JSON file store.
    pub data_dir: PathBuf,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_accessible_layer: DEFAULT_MAX_ACCESSIBLE_LAYER,
            board_rows: DEFAULT_BOARD_ROWS,
            board_cols: DEFAULT_BOARD_COLS,
            data_dir: PathBuf::from("data/sessions"),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables keep their default. Unparseable numbers are logged
    /// and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_accessible_layer: env_number("PANDA_MATCH_MAX_ACCESSIBLE_LAYER")
                .unwrap_or(defaults.max_accessible_layer),
            board_rows: env_number("PANDA_MATCH_BOARD_ROWS")
                .filter(|r| *r > 0)
                .unwrap_or(defaults.board_rows),
            board_cols: env_number("PANDA_MATCH_BOARD_COLS")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.board_cols),
            data_dir: std::env::var("PANDA_MATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            log_level: std::env::var("PANDA_MATCH_LOG").unwrap_or(defaults.log_level),
        }
    }
}

fn env_number<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_accessible_layer, 2);
        assert_eq!((config.board_rows, config.board_cols), (5, 5));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_from_env_overrides() {
        // Only this test touches these variables
        std::env::set_var("PANDA_MATCH_BOARD_ROWS", "7");
        std::env::set_var("PANDA_MATCH_BOARD_COLS", "zero");
        std::env::set_var("PANDA_MATCH_DATA_DIR", "/tmp/panda");

        let config = EngineConfig::from_env();
        assert_eq!(config.board_rows, 7);
        assert_eq!(config.board_cols, DEFAULT_BOARD_COLS);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/panda"));

        std::env::remove_var("PANDA_MATCH_BOARD_ROWS");
        std::env::remove_var("PANDA_MATCH_BOARD_COLS");
        std::env::remove_var("PANDA_MATCH_DATA_DIR");
    }
}

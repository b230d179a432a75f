// ABOUTME: Configuration loading and validation for the trailstore binary.
// ABOUTME: Reads TRAILSTORE_* environment variables (after .env) into store and hub settings.

use std::path::PathBuf;

use thiserror::Error;
use trailstore_hub::HubConfig;
use trailstore_store::StoreConfig;
use trailstore_store::store::{DEFAULT_CURSOR_WINDOW, DEFAULT_VACUUM_THRESHOLD};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    NotPositive { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: PathBuf,
    pub cursor_window: usize,
    pub vacuum_threshold: u64,
    pub target_points: u64,
}

impl AppConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - TRAILSTORE_DB: database file (default: ~/.trailstore/tracks.db)
    /// - TRAILSTORE_CURSOR_WINDOW: points per result window (default: 1024)
    /// - TRAILSTORE_VACUUM_THRESHOLD: deleted rows before compaction (default: 10000)
    /// - TRAILSTORE_TARGET_POINTS: hub point budget (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = std::env::var("TRAILSTORE_DB")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".trailstore")
                    .join("tracks.db")
            });

        let cursor_window = positive("TRAILSTORE_CURSOR_WINDOW", DEFAULT_CURSOR_WINDOW as u64)?;
        let vacuum_threshold = positive("TRAILSTORE_VACUUM_THRESHOLD", DEFAULT_VACUUM_THRESHOLD)?;
        let target_points = positive(
            "TRAILSTORE_TARGET_POINTS",
            trailstore_hub::hub::DEFAULT_TARGET_POINTS,
        )?;

        Ok(Self {
            database,
            cursor_window: usize::try_from(cursor_window).unwrap_or(usize::MAX),
            vacuum_threshold,
            target_points,
        })
    }

    pub fn store(&self) -> StoreConfig {
        StoreConfig {
            path: self.database.clone(),
            cursor_window: self.cursor_window,
            vacuum_threshold: self.vacuum_threshold,
        }
    }

    pub fn hub(&self) -> HubConfig {
        HubConfig {
            target_points: self.target_points,
            ..HubConfig::default()
        }
    }
}

fn positive(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::NotPositive { name, value: raw }),
    }
}

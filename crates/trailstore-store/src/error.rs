// ABOUTME: Error types for the track store and its schema migrations.
// ABOUTME: Integrity violations, storage failures and iterator misuse each get their own variant.

use thiserror::Error;
use trailstore_core::{MarkerId, TrackId};

/// Errors raised while moving the schema between versions.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema version {requested} is newer than the latest known version {latest}")]
    UnknownVersion { requested: u32, latest: u32 },

    #[error("migration ladder has a gap: expected version {expected}, found {found}")]
    LadderGap { expected: u32, found: u32 },

    #[error("migration to version {version} failed: {message}")]
    Step { version: u32, message: String },

    #[error("{count} foreign key violations after migrating")]
    ForeignKeyViolations { count: usize },
}

/// Errors raised by [`crate::TrackStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("marker not found: {0}")]
    MarkerNotFound(MarkerId),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("track point iterator exhausted")]
    IteratorExhausted,

    #[error("track point iterator already closed")]
    IteratorClosed,

    #[error("store connection lock poisoned")]
    LockPoisoned,
}

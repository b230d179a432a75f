// ABOUTME: Persistence layer: versioned SQLite schema, track CRUD, paged point iteration.
// ABOUTME: Also hosts the sensor statistics query and the store change broadcast.

pub mod cursor;
pub mod error;
pub mod migration;
pub mod schema;
pub mod sensor;
pub mod store;

pub use cursor::TrackPointIterator;
pub use error::{MigrationError, StoreError};
pub use store::{StoreChange, StoreConfig, TrackStore};

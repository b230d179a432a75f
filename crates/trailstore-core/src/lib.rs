// ABOUTME: Core library for trailstore, containing the track domain model and statistics.
// ABOUTME: Shared by the store (persistence) and the hub (live resampling) crates.

pub mod activity;
pub mod marker;
pub mod model;
pub mod point;
pub mod stats;
pub mod updater;

pub use activity::ActivityType;
pub use marker::Marker;
pub use model::{MarkerId, ModelError, Track, TrackId, TrackPointId};
pub use point::{Position, TrackPoint, TrackPointType};
pub use stats::{SensorStatistics, TrackStatistics};
pub use updater::TrackStatisticsUpdater;

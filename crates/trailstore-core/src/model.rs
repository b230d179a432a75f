// ABOUTME: Defines the Track entity and the typed row identifiers for tracks, points and markers.
// ABOUTME: Identifiers wrap the SQLite row id; a Track without an id has not been persisted yet.

use std::fmt;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::activity::ActivityType;
use crate::stats::TrackStatistics;

/// Errors raised when decoding persisted values into domain types.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("unknown track point type code: {0}")]
    UnknownPointType(i64),

    #[error("invalid uuid bytes (expected 16, got {0})")]
    InvalidUuid(usize),

    #[error("timestamp out of range: {0} ms")]
    TimestampOutOfRange(i64),

    #[error("utc offset out of range: {0} s")]
    OffsetOutOfRange(i32),
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Row id of a track.
    TrackId
);
row_id!(
    /// Row id of a track point. Strictly increasing in insertion order, so it
    /// doubles as the resume cursor for point iteration.
    TrackPointId
);
row_id!(
    /// Row id of a marker.
    MarkerId
);

/// One recorded or imported trajectory together with its cached statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<TrackId>,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Legacy icon name, kept because older exports still reference it.
    pub icon: String,
    pub activity_type: ActivityType,
    /// Offset from UTC in seconds at the place the track was recorded.
    pub utc_offset_seconds: i32,
    pub statistics: TrackStatistics,
}

impl Track {
    /// Create an unsaved track with a fresh UUID and zeroed statistics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            icon: String::new(),
            activity_type: ActivityType::Unknown,
            utc_offset_seconds: 0,
            statistics: TrackStatistics::default(),
        }
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ModelError> {
        FixedOffset::east_opt(self.utc_offset_seconds)
            .ok_or(ModelError::OffsetOutOfRange(self.utc_offset_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_track_is_unsaved_with_zeroed_statistics() {
        let track = Track::new("Morning ride");

        assert!(track.id.is_none());
        assert!(!track.uuid.is_nil());
        assert_eq!(track.name, "Morning ride");
        assert_eq!(track.activity_type, ActivityType::Unknown);
        assert_eq!(track.statistics, TrackStatistics::default());
    }

    #[test]
    fn new_tracks_get_distinct_uuids() {
        assert_ne!(Track::new("a").uuid, Track::new("b").uuid);
    }

    #[test]
    fn utc_offset_rejects_out_of_range_seconds() {
        let mut track = Track::new("offset");
        track.utc_offset_seconds = 2 * 3600;
        assert_eq!(track.utc_offset().unwrap().local_minus_utc(), 7200);

        track.utc_offset_seconds = 90_000;
        assert_eq!(
            track.utc_offset(),
            Err(ModelError::OffsetOutOfRange(90_000))
        );
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&TrackId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(TrackPointId(7).to_string(), "7");
    }
}

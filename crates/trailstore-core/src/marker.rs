// ABOUTME: Markers are user or system placed annotations attached to a track.
// ABOUTME: A marker snapshots position and time, plus the length and duration since the previous marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{MarkerId, TrackId};
use crate::point::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: Option<MarkerId>,
    pub track_id: TrackId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub time: DateTime<Utc>,
    pub position: Option<Position>,
    pub altitude_m: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub bearing_deg: Option<f64>,
    /// Distance covered since the previous marker, in meters.
    pub length_m: f64,
    /// Time elapsed since the previous marker, in milliseconds.
    pub duration_ms: i64,
    pub photo_url: Option<String>,
}

impl Marker {
    pub fn new(track_id: TrackId, name: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            track_id,
            name: name.into(),
            description: String::new(),
            category: String::new(),
            icon: String::new(),
            time,
            position: None,
            altitude_m: None,
            accuracy_m: None,
            bearing_deg: None,
            length_m: 0.0,
            duration_ms: 0,
            photo_url: None,
        }
    }

    pub fn has_photo(&self) -> bool {
        self.photo_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_requires_non_empty_url() {
        let mut marker = Marker::new(TrackId(1), "Summit", Utc::now());
        assert!(!marker.has_photo());
        marker.photo_url = Some(String::new());
        assert!(!marker.has_photo());
        marker.photo_url = Some("file:///photos/summit.jpg".to_string());
        assert!(marker.has_photo());
    }
}

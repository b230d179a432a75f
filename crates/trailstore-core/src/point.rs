// ABOUTME: TrackPoint samples, their segment-boundary type tags and geographic positions.
// ABOUTME: Provides the persisted integer codes and micro-degree coordinate encoding.

use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::model::{ModelError, TrackPointId};

/// Speeds at or below this (m/s) count as standing still.
pub const MAX_NO_MOVEMENT_SPEED: f64 = 0.224;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackPointType {
    SegmentStartManual,
    SegmentStartAutomatic,
    #[default]
    Ordinary,
    SegmentEnd,
}

impl TrackPointType {
    pub fn code(self) -> i64 {
        match self {
            TrackPointType::SegmentStartManual => -2,
            TrackPointType::SegmentStartAutomatic => -1,
            TrackPointType::Ordinary => 0,
            TrackPointType::SegmentEnd => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, ModelError> {
        match code {
            -2 => Ok(TrackPointType::SegmentStartManual),
            -1 => Ok(TrackPointType::SegmentStartAutomatic),
            0 => Ok(TrackPointType::Ordinary),
            1 => Ok(TrackPointType::SegmentEnd),
            other => Err(ModelError::UnknownPointType(other)),
        }
    }

    pub fn is_segment_boundary(self) -> bool {
        self != TrackPointType::Ordinary
    }

    pub fn is_segment_start(self) -> bool {
        matches!(
            self,
            TrackPointType::SegmentStartManual | TrackPointType::SegmentStartAutomatic
        )
    }
}

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Stored as integer micro-degrees.
    pub fn to_e6(self) -> (i64, i64) {
        (
            (self.latitude * 1e6).round() as i64,
            (self.longitude * 1e6).round() as i64,
        )
    }

    pub fn from_e6(latitude_e6: i64, longitude_e6: i64) -> Self {
        Self::new(latitude_e6 as f64 / 1e6, longitude_e6 as f64 / 1e6)
    }

    pub fn is_valid(self) -> bool {
        self.latitude.abs() <= 90.0 && self.longitude.abs() <= 180.0
    }

    /// Great-circle distance in meters.
    pub fn distance_to(self, other: Position) -> f64 {
        let a = Point::new(self.longitude, self.latitude);
        let b = Point::new(other.longitude, other.latitude);
        Haversine::distance(a, b)
    }
}

/// One ordered sample (or segment boundary) within a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub id: Option<TrackPointId>,
    pub point_type: TrackPointType,
    pub time: DateTime<Utc>,
    pub position: Option<Position>,
    pub altitude_m: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub vertical_accuracy_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub bearing_deg: Option<f64>,
    pub heart_rate_bpm: Option<f64>,
    pub cadence_rpm: Option<f64>,
    pub power_w: Option<f64>,
    pub sensor_distance_m: Option<f64>,
    pub altitude_gain_m: Option<f64>,
    pub altitude_loss_m: Option<f64>,
}

impl TrackPoint {
    fn empty(point_type: TrackPointType, time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            point_type,
            time,
            position: None,
            altitude_m: None,
            accuracy_m: None,
            vertical_accuracy_m: None,
            speed_mps: None,
            bearing_deg: None,
            heart_rate_bpm: None,
            cadence_rpm: None,
            power_w: None,
            sensor_distance_m: None,
            altitude_gain_m: None,
            altitude_loss_m: None,
        }
    }

    /// An ordinary sample at a position.
    pub fn at(time: DateTime<Utc>, position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::empty(TrackPointType::Ordinary, time)
        }
    }

    /// A segment boundary. Boundaries never carry a position.
    pub fn boundary(point_type: TrackPointType, time: DateTime<Utc>) -> Self {
        Self::empty(point_type, time)
    }

    /// The position, unless this is a boundary or the coordinate is out of range.
    pub fn valid_position(&self) -> Option<Position> {
        if self.point_type.is_segment_boundary() {
            return None;
        }
        self.position.filter(|p| p.is_valid())
    }

    pub fn is_moving(&self) -> bool {
        self.speed_mps.is_some_and(|s| s > MAX_NO_MOVEMENT_SPEED)
    }

    pub fn distance_to(&self, other: &TrackPoint) -> Option<f64> {
        Some(self.valid_position()?.distance_to(other.valid_position()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn type_codes_match_persisted_values() {
        assert_eq!(TrackPointType::SegmentStartManual.code(), -2);
        assert_eq!(TrackPointType::SegmentStartAutomatic.code(), -1);
        assert_eq!(TrackPointType::Ordinary.code(), 0);
        assert_eq!(TrackPointType::SegmentEnd.code(), 1);
        assert_eq!(
            TrackPointType::from_code(7),
            Err(ModelError::UnknownPointType(7))
        );
    }

    #[test]
    fn only_ordinary_is_not_a_boundary() {
        assert!(!TrackPointType::Ordinary.is_segment_boundary());
        assert!(TrackPointType::SegmentEnd.is_segment_boundary());
        assert!(TrackPointType::SegmentStartAutomatic.is_segment_start());
        assert!(!TrackPointType::SegmentEnd.is_segment_start());
    }

    #[test]
    fn micro_degree_encoding_keeps_six_decimals() {
        let position = Position::new(48.137154, 11.576124);
        let (lat, lon) = position.to_e6();
        assert_eq!((lat, lon), (48_137_154, 11_576_124));
        assert_eq!(Position::from_e6(lat, lon), position);
    }

    #[test]
    fn haversine_distance_of_one_degree_latitude() {
        let d = Position::new(0.0, 0.0).distance_to(Position::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn boundary_points_have_no_valid_position() {
        let mut point = TrackPoint::boundary(TrackPointType::SegmentEnd, t(0));
        point.position = Some(Position::new(1.0, 1.0));
        assert!(point.valid_position().is_none());

        let ordinary = TrackPoint::at(t(0), Position::new(100.0, 0.0));
        assert!(ordinary.valid_position().is_none());
    }

    #[test]
    fn moving_requires_speed_above_threshold() {
        let mut point = TrackPoint::at(t(0), Position::new(0.0, 0.0));
        assert!(!point.is_moving());
        point.speed_mps = Some(0.2);
        assert!(!point.is_moving());
        point.speed_mps = Some(1.0);
        assert!(point.is_moving());
    }
}

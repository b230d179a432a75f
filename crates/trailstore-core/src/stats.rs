// ABOUTME: Aggregates derived from a track's points: movement statistics and sensor statistics.
// ABOUTME: TrackStatistics is the denormalized cache stored on each track row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Movement summary of a track. Zeroed for a track with no points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackStatistics {
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub total_distance_m: f64,
    pub total_time_ms: i64,
    pub moving_time_ms: i64,
    pub max_speed_mps: f64,
    pub min_altitude_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub altitude_gain_m: Option<f64>,
    pub altitude_loss_m: Option<f64>,
}

impl TrackStatistics {
    /// Statistics of an empty span beginning (and ending) at `time`.
    pub fn starting_at(time: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(time),
            stop_time: Some(time),
            ..Self::default()
        }
    }

    pub fn average_speed(&self) -> f64 {
        if self.total_time_ms == 0 {
            return 0.0;
        }
        self.total_distance_m / (self.total_time_ms as f64 / 1000.0)
    }

    pub fn average_moving_speed(&self) -> f64 {
        if self.moving_time_ms == 0 {
            return 0.0;
        }
        self.total_distance_m / (self.moving_time_ms as f64 / 1000.0)
    }

    /// The smoothed top speed, never below the average moving speed.
    pub fn max_speed(&self) -> f64 {
        self.max_speed_mps.max(self.average_moving_speed())
    }

    pub fn update_altitude_extremes(&mut self, altitude_m: f64) {
        self.min_altitude_m = Some(self.min_altitude_m.map_or(altitude_m, |m| m.min(altitude_m)));
        self.max_altitude_m = Some(self.max_altitude_m.map_or(altitude_m, |m| m.max(altitude_m)));
    }

    pub fn add_altitude_gain(&mut self, gain_m: f64) {
        self.altitude_gain_m = Some(self.altitude_gain_m.unwrap_or(0.0) + gain_m);
    }

    pub fn add_altitude_loss(&mut self, loss_m: f64) {
        self.altitude_loss_m = Some(self.altitude_loss_m.unwrap_or(0.0) + loss_m);
    }

    /// Combine with statistics covering a disjoint time span.
    pub fn merge(&mut self, other: &TrackStatistics) {
        self.start_time = min_opt(self.start_time, other.start_time);
        self.stop_time = max_opt(self.stop_time, other.stop_time);
        self.total_distance_m += other.total_distance_m;
        self.total_time_ms += other.total_time_ms;
        self.moving_time_ms += other.moving_time_ms;
        self.max_speed_mps = self.max_speed_mps.max(other.max_speed_mps);
        if let Some(min) = other.min_altitude_m {
            self.update_altitude_extremes(min);
        }
        if let Some(max) = other.max_altitude_m {
            self.update_altitude_extremes(max);
        }
        self.altitude_gain_m = sum_opt(self.altitude_gain_m, other.altitude_gain_m);
        self.altitude_loss_m = sum_opt(self.altitude_loss_m, other.altitude_loss_m);
    }
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn sum_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

/// Heart rate, cadence and power aggregates of one track.
///
/// Averages are weighted by how long each reading was current. A metric
/// with no readings at all is `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorStatistics {
    pub max_heart_rate_bpm: Option<f64>,
    pub avg_heart_rate_bpm: Option<f64>,
    pub max_cadence_rpm: Option<f64>,
    pub avg_cadence_rpm: Option<f64>,
    pub max_power_w: Option<f64>,
    pub avg_power_w: Option<f64>,
}

impl SensorStatistics {
    pub fn has_heart_rate(&self) -> bool {
        self.avg_heart_rate_bpm.is_some()
    }

    pub fn has_cadence(&self) -> bool {
        self.avg_cadence_rpm.is_some()
    }

    pub fn has_power(&self) -> bool {
        self.avg_power_w.is_some()
    }
}

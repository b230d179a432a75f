// ABOUTME: Incremental TrackStatistics accumulator fed one TrackPoint at a time.
// ABOUTME: Tracks per-segment distance, moving time, smoothed max speed and altitude extremes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::point::{TrackPoint, TrackPointType};
use crate::stats::TrackStatistics;

const ALTITUDE_SMOOTHING: usize = 25;
const SPEED_SMOOTHING: usize = 25;

/// Speed changes implying more than 2g (m/s per ms) are treated as noise.
const MAX_ACCELERATION: f64 = 0.02;

/// Some receivers report 128 m/s as an error code.
const SPEED_ERROR_CODE: f64 = 128.0;

pub const DEFAULT_MIN_RECORDING_DISTANCE_M: f64 = 5.0;

#[derive(Debug, Clone)]
struct RingBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

/// Running statistics over a stream of points in id order.
///
/// Points between a segment end and the next segment start (a pause) do not
/// contribute time. Distance only accrues once the position moved at least
/// the minimum recording distance, or the point reports a moving speed.
#[derive(Debug, Clone)]
pub struct TrackStatisticsUpdater {
    track: TrackStatistics,
    segment: Option<TrackStatistics>,
    segment_has_points: bool,
    last_point: Option<TrackPoint>,
    last_moving_point: Option<TrackPoint>,
    altitude: RingBuffer,
    speed: RingBuffer,
    min_recording_distance_m: f64,
}

impl Default for TrackStatisticsUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RECORDING_DISTANCE_M)
    }
}

impl TrackStatisticsUpdater {
    pub fn new(min_recording_distance_m: f64) -> Self {
        Self {
            track: TrackStatistics::default(),
            segment: None,
            segment_has_points: false,
            last_point: None,
            last_moving_point: None,
            altitude: RingBuffer::new(ALTITUDE_SMOOTHING),
            speed: RingBuffer::new(SPEED_SMOOTHING),
            min_recording_distance_m,
        }
    }

    /// Snapshot of the whole track so far, including the open segment.
    pub fn statistics(&self) -> TrackStatistics {
        let mut stats = self.track.clone();
        if let Some(segment) = self.segment.as_ref().filter(|_| self.segment_has_points) {
            stats.merge(segment);
        }
        stats
    }

    pub fn smoothed_altitude(&self) -> f64 {
        self.altitude.average()
    }

    pub fn add_point(&mut self, point: &TrackPoint) {
        match point.point_type {
            TrackPointType::SegmentEnd => {
                if let Some(segment) = self.segment.as_mut() {
                    extend_to(segment, point.time);
                }
                self.finish_segment();
            }
            TrackPointType::SegmentStartManual | TrackPointType::SegmentStartAutomatic => {
                self.finish_segment();
                self.segment = Some(TrackStatistics::starting_at(point.time));
            }
            TrackPointType::Ordinary => self.add_sample(point),
        }
    }

    fn finish_segment(&mut self) {
        if let Some(mut segment) = self.segment.take() {
            if self.segment_has_points {
                // Distance crept below the threshold since the last moving point.
                if let (Some(last), Some(moving)) = (&self.last_point, &self.last_moving_point) {
                    segment.total_distance_m += moving.distance_to(last).unwrap_or(0.0);
                }
                self.track.merge(&segment);
            }
        }
        self.segment_has_points = false;
        self.last_point = None;
        self.last_moving_point = None;
        self.altitude.reset();
        self.speed.reset();
    }

    fn add_sample(&mut self, point: &TrackPoint) {
        let segment = self
            .segment
            .get_or_insert_with(|| TrackStatistics::starting_at(point.time));
        extend_to(segment, point.time);
        self.segment_has_points = true;

        if point.valid_position().is_none() {
            return;
        }

        if let Some(altitude) = point.altitude_m {
            self.altitude.push(altitude);
            segment.update_altitude_extremes(self.altitude.average());
        }
        if let Some(gain) = point.altitude_gain_m {
            segment.add_altitude_gain(gain);
        }
        if let Some(loss) = point.altitude_loss_m {
            segment.add_altitude_loss(loss);
        }

        let (Some(last), Some(last_moving)) = (&self.last_point, &self.last_moving_point) else {
            self.last_point = Some(point.clone());
            self.last_moving_point = Some(point.clone());
            return;
        };

        let moving_distance = last_moving.distance_to(point).unwrap_or(0.0);
        if moving_distance < self.min_recording_distance_m && !point.is_moving() {
            self.speed.reset();
            self.last_point = Some(point.clone());
            return;
        }

        let moving_time_ms = (point.time - last.time).num_milliseconds();
        if moving_time_ms < 0 {
            self.last_point = Some(point.clone());
            return;
        }

        segment.total_distance_m += moving_distance;
        segment.moving_time_ms += moving_time_ms;

        if let (Some(speed), Some(last_speed)) = (point.speed_mps, last.speed_mps) {
            if !point.is_moving() {
                self.speed.reset();
            } else if is_valid_speed(speed, last_speed, moving_time_ms, &self.speed) {
                self.speed.push(speed);
                segment.max_speed_mps = segment.max_speed_mps.max(self.speed.average());
            }
        }

        self.last_point = Some(point.clone());
        self.last_moving_point = Some(point.clone());
    }
}

fn extend_to(segment: &mut TrackStatistics, time: DateTime<Utc>) {
    segment.stop_time = Some(time);
    if let Some(start) = segment.start_time {
        segment.total_time_ms = (time - start).num_milliseconds().max(0);
    }
}

fn is_valid_speed(speed: f64, last_speed: f64, elapsed_ms: i64, recent: &RingBuffer) -> bool {
    if speed == 0.0 || (speed - SPEED_ERROR_CODE).abs() < 1.0 {
        return false;
    }
    let max_change = MAX_ACCELERATION * elapsed_ms as f64;
    if (last_speed - speed).abs() > max_change {
        return false;
    }
    if recent.is_full() {
        let average = recent.average();
        return speed < average * 10.0 && (average - speed).abs() < max_change;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Position;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(secs * 1000).unwrap()
    }

    /// Points 0.001 degrees of latitude apart (about 111 m) every 10 seconds.
    fn moving_point(step: i64, start_secs: i64) -> TrackPoint {
        let mut point = TrackPoint::at(
            t(start_secs + step * 10),
            Position::new(45.0 + step as f64 * 0.001, 7.0),
        );
        point.speed_mps = Some(11.0);
        point.altitude_m = Some(100.0);
        point
    }

    #[test]
    fn empty_updater_reports_default_statistics() {
        let updater = TrackStatisticsUpdater::default();
        assert_eq!(updater.statistics(), TrackStatistics::default());
    }

    #[test]
    fn straight_line_accumulates_distance_and_time() {
        let mut updater = TrackStatisticsUpdater::default();
        for step in 0..4 {
            updater.add_point(&moving_point(step, 0));
        }

        let stats = updater.statistics();
        assert_eq!(stats.start_time, Some(t(0)));
        assert_eq!(stats.stop_time, Some(t(30)));
        assert_eq!(stats.total_time_ms, 30_000);
        assert_eq!(stats.moving_time_ms, 30_000);
        assert!((stats.total_distance_m - 333.6).abs() < 1.0, "{}", stats.total_distance_m);
        assert_eq!(stats.min_altitude_m, Some(100.0));
        assert_eq!(stats.max_altitude_m, Some(100.0));
        assert_eq!(stats.max_speed_mps, 11.0);
    }

    #[test]
    fn paused_time_is_excluded() {
        let mut updater = TrackStatisticsUpdater::default();
        updater.add_point(&TrackPoint::boundary(TrackPointType::SegmentStartManual, t(0)));
        updater.add_point(&moving_point(0, 0));
        updater.add_point(&moving_point(1, 0));
        updater.add_point(&TrackPoint::boundary(TrackPointType::SegmentEnd, t(10)));
        updater.add_point(&TrackPoint::boundary(TrackPointType::SegmentStartManual, t(100)));
        updater.add_point(&moving_point(2, 90));
        updater.add_point(&moving_point(3, 90));

        let stats = updater.statistics();
        assert_eq!(stats.start_time, Some(t(0)));
        assert_eq!(stats.stop_time, Some(t(120)));
        // Two segments of 10s and 20s; the 90s pause does not count.
        assert_eq!(stats.total_time_ms, 30_000);
        assert_eq!(stats.moving_time_ms, 20_000);
    }

    #[test]
    fn stationary_points_do_not_add_distance() {
        let mut updater = TrackStatisticsUpdater::default();
        for secs in 0..5 {
            let mut point = TrackPoint::at(t(secs), Position::new(45.0, 7.0));
            point.speed_mps = Some(0.0);
            updater.add_point(&point);
        }

        let stats = updater.statistics();
        assert_eq!(stats.total_distance_m, 0.0);
        assert_eq!(stats.moving_time_ms, 0);
        assert_eq!(stats.total_time_ms, 4_000);
    }

    #[test]
    fn implausible_speed_is_ignored() {
        let mut updater = TrackStatisticsUpdater::default();
        updater.add_point(&moving_point(0, 0));
        let mut spike = moving_point(1, 0);
        spike.speed_mps = Some(128.0);
        updater.add_point(&spike);

        assert_eq!(updater.statistics().max_speed_mps, 0.0);
    }

    #[test]
    fn altitude_gain_and_loss_are_summed() {
        let mut updater = TrackStatisticsUpdater::default();
        for step in 0..3 {
            let mut point = moving_point(step, 0);
            point.altitude_gain_m = Some(1.5);
            point.altitude_loss_m = Some(0.5);
            updater.add_point(&point);
        }

        let stats = updater.statistics();
        assert_eq!(stats.altitude_gain_m, Some(4.5));
        assert_eq!(stats.altitude_loss_m, Some(1.5));
    }
}

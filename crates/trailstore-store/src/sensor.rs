// ABOUTME: Duration-weighted heart rate, cadence and power statistics computed in one query.
// ABOUTME: Each sample counts for the time until the next sample; manual pauses count for nothing.

use rusqlite::params;
use trailstore_core::{SensorStatistics, TrackId};

use crate::error::StoreError;
use crate::store::TrackStore;

// A sample's span ends at the next row's time. A manual segment start (-2)
// contributes time 0, so the span before it clamps to zero, and the start row
// itself is not a sample. Averages divide by the span of rows that carry the
// metric; when that span is zero the plain mean is used.
const SENSOR_STATS_QUERY: &str = "
WITH ordered AS (
    SELECT type, time, sensor_heartrate AS hr, sensor_cadence AS cad, sensor_power AS pwr,
           LEAD(time * (type != -2)) OVER (ORDER BY _id) AS next_time
    FROM trackpoints
    WHERE trackid = ?1
),
weighted AS (
    SELECT hr, cad, pwr, MAX(time, COALESCE(next_time, time)) - time AS span
    FROM ordered
    WHERE type != -2
)
SELECT
    MAX(hr),
    COALESCE(SUM(hr * span) / NULLIF(SUM(CASE WHEN hr IS NOT NULL THEN span END), 0), AVG(hr)),
    MAX(cad),
    COALESCE(SUM(cad * span) / NULLIF(SUM(CASE WHEN cad IS NOT NULL THEN span END), 0), AVG(cad)),
    MAX(pwr),
    COALESCE(SUM(pwr * span) / NULLIF(SUM(CASE WHEN pwr IS NOT NULL THEN span END), 0), AVG(pwr))
FROM weighted";

impl TrackStore {
    /// Sensor aggregates of a track. A metric with no readings is `None`.
    ///
    /// Each average divides by the time covered by rows that carry that
    /// metric, not by the span of the whole track. A sensor that drops out
    /// for a while therefore keeps its average: readings of 100 bpm at 0 s
    /// and 20 s with a gap row at 10 s average 100, where dividing by the
    /// full span would report 50.
    pub fn sensor_statistics(&self, track_id: TrackId) -> Result<SensorStatistics, StoreError> {
        let conn = self.lock()?;
        let stats = conn.query_row(SENSOR_STATS_QUERY, params![track_id.0], |row| {
            Ok(SensorStatistics {
                max_heart_rate_bpm: row.get(0)?,
                avg_heart_rate_bpm: row.get(1)?,
                max_cadence_rpm: row.get(2)?,
                avg_cadence_rpm: row.get(3)?,
                max_power_w: row.get(4)?,
                avg_power_w: row.get(5)?,
            })
        })?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use trailstore_core::{Position, Track, TrackPoint, TrackPointType};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(secs * 1000).unwrap()
    }

    fn sample(secs: i64, heart_rate: Option<f64>) -> TrackPoint {
        let mut point = TrackPoint::at(t(secs), Position::new(45.0, 7.0));
        point.heart_rate_bpm = heart_rate;
        point
    }

    fn store_with(points: &[TrackPoint]) -> (TrackStore, TrackId) {
        let store = TrackStore::open_in_memory().unwrap();
        let id = store.insert_track(&Track::new("sensors")).unwrap();
        store.bulk_insert_track_points(id, points).unwrap();
        (store, id)
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn track_without_readings_reports_nothing() {
        let (store, id) = store_with(&[sample(0, None), sample(10, None)]);

        let stats = store.sensor_statistics(id).unwrap();

        assert_eq!(stats, SensorStatistics::default());
        assert!(!stats.has_heart_rate());
    }

    #[test]
    fn unknown_track_reports_nothing() {
        let store = TrackStore::open_in_memory().unwrap();
        assert_eq!(
            store.sensor_statistics(TrackId(42)).unwrap(),
            SensorStatistics::default()
        );
    }

    #[test]
    fn average_is_weighted_by_time_to_next_sample() {
        // 100 bpm held for 30 s, 160 bpm held for 10 s.
        let (store, id) = store_with(&[
            sample(0, Some(100.0)),
            sample(30, Some(160.0)),
            sample(40, Some(120.0)),
        ]);

        let stats = store.sensor_statistics(id).unwrap();

        assert_eq!(stats.max_heart_rate_bpm, Some(160.0));
        assert!(close(stats.avg_heart_rate_bpm, 115.0), "{:?}", stats.avg_heart_rate_bpm);
    }

    #[test]
    fn manual_pause_contributes_no_time() {
        let mut resume = TrackPoint::boundary(TrackPointType::SegmentStartManual, t(100));
        resume.heart_rate_bpm = Some(250.0);
        let (store, id) = store_with(&[
            sample(0, Some(100.0)),
            sample(10, Some(100.0)),
            // Last reading before the pause would span 80 s without the exclusion.
            sample(20, Some(60.0)),
            resume,
            sample(100, Some(200.0)),
            sample(110, Some(200.0)),
        ]);

        let stats = store.sensor_statistics(id).unwrap();

        // (100*10 + 100*10 + 60*0 + 200*10) / 30
        assert!(close(stats.avg_heart_rate_bpm, 4000.0 / 30.0), "{:?}", stats.avg_heart_rate_bpm);
        assert_eq!(stats.max_heart_rate_bpm, Some(200.0));
    }

    #[test]
    fn gaps_in_coverage_do_not_dilute_the_average() {
        let (store, id) = store_with(&[
            sample(0, Some(100.0)),
            sample(10, None),
            sample(20, Some(100.0)),
            sample(30, None),
        ]);

        let stats = store.sensor_statistics(id).unwrap();

        assert!(close(stats.avg_heart_rate_bpm, 100.0), "{:?}", stats.avg_heart_rate_bpm);
    }

    #[test]
    fn single_reading_falls_back_to_its_value() {
        let (store, id) = store_with(&[sample(0, Some(90.0))]);

        let stats = store.sensor_statistics(id).unwrap();

        assert_eq!(stats.avg_heart_rate_bpm, Some(90.0));
        assert_eq!(stats.max_heart_rate_bpm, Some(90.0));
    }

    #[test]
    fn metrics_are_independent() {
        let mut first = sample(0, None);
        first.cadence_rpm = Some(80.0);
        first.power_w = Some(200.0);
        let mut second = sample(10, None);
        second.cadence_rpm = Some(90.0);
        second.power_w = Some(300.0);
        let (store, id) = store_with(&[first, second, sample(20, None)]);

        let stats = store.sensor_statistics(id).unwrap();

        assert!(!stats.has_heart_rate());
        assert!(close(stats.avg_cadence_rpm, 85.0));
        assert_eq!(stats.max_power_w, Some(300.0));
        assert!(close(stats.avg_power_w, 250.0));
    }
}

// ABOUTME: End-to-end smoke tests across the store and hub crates.
// ABOUTME: Covers cascading delete with statistics, and live streaming of a growing track.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use trailstore_core::{
    Marker, Position, Track, TrackPoint, TrackPointId, TrackPointType, TrackStatistics,
    TrackStatisticsUpdater,
};
use trailstore_hub::{HubConfig, RecordingStatus, TrackDataListener};
use trailstore_store::{StoreConfig, TrackStore};

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000 + secs * 1000).unwrap()
}

/// Points 0.0005 degrees of latitude apart (about 55 m) every 10 seconds.
fn make_points(from: i64, count: i64) -> Vec<TrackPoint> {
    (from..from + count)
        .map(|i| {
            let mut point = TrackPoint::at(
                t(i * 10),
                Position::from_e6(46_000_000 + i * 500, 7_000_000),
            );
            point.speed_mps = Some(5.5);
            point.altitude_m = Some(600.0 + i as f64);
            point.heart_rate_bpm = Some(140.0);
            point
        })
        .collect()
}

fn statistics_of(points: &[TrackPoint]) -> TrackStatistics {
    let mut updater = TrackStatisticsUpdater::default();
    for point in points {
        updater.add_point(point);
    }
    updater.statistics()
}

#[test]
fn smoke_test_cascade_delete_keeps_other_tracks_intact() {
    // 1. Open an on-disk store
    let dir = tempfile::TempDir::new().unwrap();
    let store = TrackStore::open(&StoreConfig::new(dir.path().join("tracks.db"))).unwrap();

    // 2. Track A: ten ordinary points, no pauses
    let a_points = make_points(0, 10);
    let mut track_a = Track::new("A");
    track_a.statistics = statistics_of(&a_points);
    let a = store.insert_track(&track_a).unwrap();
    store.bulk_insert_track_points(a, &a_points).unwrap();
    store.insert_marker(&Marker::new(a, "A start", t(0))).unwrap();

    // 3. Track B: three points and a manual pause boundary
    let mut b_points = make_points(100, 3);
    b_points.push(TrackPoint::boundary(TrackPointType::SegmentStartManual, t(1040)));
    let mut track_b = Track::new("B");
    track_b.statistics = statistics_of(&b_points);
    let b = store.insert_track(&track_b).unwrap();
    store.bulk_insert_track_points(b, &b_points).unwrap();
    store.insert_marker(&Marker::new(b, "B start", t(1000))).unwrap();

    let a_before = store.get_track(a).unwrap().unwrap();
    let a_sensors_before = store.sensor_statistics(a).unwrap();

    // 4. Delete B
    let deleted = store.delete_track(b).unwrap();
    assert_eq!(deleted, 1 + 4 + 1);

    // 5. B is gone entirely
    assert!(store.get_track(b).unwrap().is_none());
    assert_eq!(store.track_point_count(b).unwrap(), 0);
    assert!(store.get_markers(b, None, 10).unwrap().is_empty());
    assert!(store.last_track_point_id(b).unwrap().is_none());

    // 6. A is untouched
    assert_eq!(store.track_point_count(a).unwrap(), 10);
    assert_eq!(store.get_track(a).unwrap().unwrap(), a_before);
    assert_eq!(store.sensor_statistics(a).unwrap(), a_sensors_before);
    assert_eq!(store.get_markers(a, None, 10).unwrap().len(), 1);
    assert!((a_before.statistics.total_distance_m - 500.4).abs() < 2.0);

    // 7. Re-reading A's points gives back what was written
    let reread: Vec<TrackPoint> = store
        .with_track_points(a, None, |points| {
            let mut all = Vec::new();
            while points.has_next()? {
                all.push(points.next_point()?);
            }
            Ok(all)
        })
        .unwrap();
    assert_eq!(reread.len(), 10);
    assert_eq!(statistics_of(&reread), a_before.statistics);
    assert_eq!(store.open_cursor_count(), 0);
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Clear,
    In(i64, f64),
    Out(i64),
    Done,
}

#[derive(Clone, Default)]
struct Screen(Arc<Mutex<Vec<Seen>>>);

impl Screen {
    fn seen(&self) -> Vec<Seen> {
        self.0.lock().unwrap().clone()
    }

    fn points_since_clear(&self) -> Vec<i64> {
        let seen = self.seen();
        let start = seen.iter().rposition(|s| *s == Seen::Clear).map_or(0, |i| i + 1);
        seen[start..]
            .iter()
            .filter_map(|s| match s {
                Seen::In(id, _) | Seen::Out(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn last_distance(&self) -> f64 {
        self.seen()
            .iter()
            .rev()
            .find_map(|s| match s {
                Seen::In(_, distance) => Some(*distance),
                _ => None,
            })
            .unwrap_or(0.0)
    }
}

impl TrackDataListener for Screen {
    fn on_track_updated(&mut self, _track: &Track) {}

    fn clear_track_points(&mut self) {
        self.0.lock().unwrap().push(Seen::Clear);
    }

    fn on_sampled_in_point(&mut self, point: &TrackPoint, statistics: &TrackStatistics) {
        let id = point.id.map_or(0, |id| id.0);
        self.0.lock().unwrap().push(Seen::In(id, statistics.total_distance_m));
    }

    fn on_sampled_out_point(&mut self, point: &TrackPoint, _statistics: &TrackStatistics) {
        self.0.lock().unwrap().push(Seen::Out(point.id.map_or(0, |id| id.0)));
    }

    fn on_point_stream_done(&mut self) {
        self.0.lock().unwrap().push(Seen::Done);
    }
}

#[tokio::test]
async fn smoke_test_hub_streams_growing_track_to_two_listeners() {
    // 1. Store with a recording track of 20 points
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(TrackStore::open(&StoreConfig::new(dir.path().join("tracks.db"))).unwrap());
    let id = store.insert_track(&Track::new("live")).unwrap();
    store.bulk_insert_track_points(id, &make_points(0, 20)).unwrap();

    // 2. Hub with one listener, following the recording
    let hub = trailstore_hub::spawn(
        Arc::clone(&store),
        HubConfig {
            target_points: 1000,
            ..HubConfig::default()
        },
    )
    .unwrap();
    let first = Screen::default();
    hub.register_listener(first.clone()).await.unwrap();
    hub.set_recording_status(RecordingStatus::recording(id)).await.unwrap();
    hub.load_track(id).await.unwrap();
    hub.start().await.unwrap();
    assert_eq!(first.points_since_clear(), (1..=20).collect::<Vec<_>>());

    // 3. The recorder appends points in batches
    for batch in 0..3 {
        store
            .bulk_insert_track_points(id, &make_points(20 + batch * 5, 5))
            .unwrap();
    }
    let mut caught_up = false;
    for _ in 0..200 {
        if hub.snapshot().await.unwrap().last_seen == Some(TrackPointId(35)) {
            caught_up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(caught_up, "hub never saw the appended points");
    assert_eq!(first.points_since_clear(), (1..=35).collect::<Vec<_>>());

    // 4. A second display joins late and gets the same picture
    let second = Screen::default();
    hub.register_listener(second.clone()).await.unwrap();
    assert_eq!(second.seen().first(), Some(&Seen::Clear));
    assert_eq!(second.points_since_clear(), first.points_since_clear());
    assert!((second.last_distance() - first.last_distance()).abs() < 1e-6);
    assert!(first.last_distance() > 1800.0, "{}", first.last_distance());

    // 5. Recording stops; both displays keep streaming new points
    hub.set_recording_status(RecordingStatus::default()).await.unwrap();
    store.insert_track_point(id, &make_points(35, 1)[0]).unwrap();
    for _ in 0..200 {
        if second.points_since_clear().len() == 36 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(first.points_since_clear(), (1..=36).collect::<Vec<_>>());
    assert_eq!(second.points_since_clear(), (1..=36).collect::<Vec<_>>());

    hub.shutdown().await.unwrap();
}

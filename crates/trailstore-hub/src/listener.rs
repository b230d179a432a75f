// ABOUTME: Callback interface for presentation code that consumes the hub's track stream.
// ABOUTME: All callbacks run on the hub thread, in the order the hub produces them.

use std::fmt;

use trailstore_core::{Marker, Track, TrackPoint, TrackStatistics};

/// Receives the selected track, its resampled points and its markers.
///
/// A point stream is always preceded by `clear_track_points` on a full
/// reload and closed by `on_point_stream_done`; markers follow the same
/// clear, items, done pattern.
pub trait TrackDataListener: Send {
    fn on_track_updated(&mut self, track: &Track);

    fn clear_track_points(&mut self);

    fn on_sampled_in_point(&mut self, point: &TrackPoint, statistics: &TrackStatistics);

    /// Points thinned out by the sampling stride. Ignored by default.
    fn on_sampled_out_point(&mut self, _point: &TrackPoint, _statistics: &TrackStatistics) {}

    fn on_point_stream_done(&mut self) {}

    fn clear_markers(&mut self) {}

    fn on_new_marker(&mut self, _marker: &Marker) {}

    fn on_marker_stream_done(&mut self) {}
}

/// Handle returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

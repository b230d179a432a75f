// ABOUTME: Resampling rules for streaming a track to listeners under a point budget.
// ABOUTME: Decides per point whether it is sampled in, and tracks progress since the last reset.

use trailstore_core::{TrackPointId, TrackPointType, TrackStatisticsUpdater};

/// Stride that thins the points between `first_seen` and `last_point` down to
/// roughly `target` sampled-in points.
pub fn sampling_frequency(
    first_seen: TrackPointId,
    last_point: Option<TrackPointId>,
    target: u64,
) -> u64 {
    let span = last_point.map_or(0, |last| last.0.saturating_sub(first_seen.0).max(0));
    1 + u64::try_from(span).unwrap_or(0) / target.max(1)
}

/// How a single point reaches listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Hit by the sampling stride; counts against the point budget.
    Stride,
    /// Segment boundaries are never thinned out.
    Boundary,
    /// Final point of a track that is not being recorded.
    Tail,
    SampledOut,
}

impl Delivery {
    pub fn classify(index: u64, frequency: u64, point_type: TrackPointType, is_tail: bool) -> Self {
        if index % frequency.max(1) == 0 {
            Delivery::Stride
        } else if point_type.is_segment_boundary() {
            Delivery::Boundary
        } else if is_tail {
            Delivery::Tail
        } else {
            Delivery::SampledOut
        }
    }

    pub fn is_sampled_in(self) -> bool {
        !matches!(self, Delivery::SampledOut)
    }
}

/// Progress of the stream shared by all listeners since the last reset.
#[derive(Debug, Clone)]
pub struct SamplingState {
    /// Points seen since the reset, sampled in or not. Indexes the stride.
    pub num_loaded: u64,
    /// Stride hits since the reset, compared against the budget.
    pub num_sampled_in: u64,
    pub first_seen: Option<TrackPointId>,
    pub last_seen: Option<TrackPointId>,
    pub updater: TrackStatisticsUpdater,
    min_recording_distance_m: f64,
}

impl SamplingState {
    pub fn new(min_recording_distance_m: f64) -> Self {
        Self {
            num_loaded: 0,
            num_sampled_in: 0,
            first_seen: None,
            last_seen: None,
            updater: TrackStatisticsUpdater::new(min_recording_distance_m),
            min_recording_distance_m,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.min_recording_distance_m);
    }

    /// At least one point was delivered, so a continuation can resume after it.
    pub fn is_primed(&self) -> bool {
        self.last_seen.is_some()
    }

    /// No room is left for another stride hit.
    pub fn budget_spent(&self, target: u64) -> bool {
        self.num_sampled_in >= target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_is_one_under_budget() {
        assert_eq!(sampling_frequency(TrackPointId(1), Some(TrackPointId(100)), 5000), 1);
        assert_eq!(sampling_frequency(TrackPointId(1), None, 5000), 1);
    }

    #[test]
    fn frequency_grows_with_span() {
        assert_eq!(sampling_frequency(TrackPointId(1), Some(TrackPointId(5001)), 5000), 2);
        assert_eq!(sampling_frequency(TrackPointId(1), Some(TrackPointId(26)), 10), 3);
        assert_eq!(sampling_frequency(TrackPointId(10), Some(TrackPointId(5)), 10), 1);
    }

    #[test]
    fn stride_hits_every_nth_index() {
        let delivered: Vec<bool> = (0..7)
            .map(|i| Delivery::classify(i, 3, TrackPointType::Ordinary, false).is_sampled_in())
            .collect();
        assert_eq!(delivered, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn boundaries_are_always_sampled_in() {
        for frequency in 1..10 {
            for index in 0..20 {
                for point_type in [
                    TrackPointType::SegmentStartManual,
                    TrackPointType::SegmentStartAutomatic,
                    TrackPointType::SegmentEnd,
                ] {
                    assert!(Delivery::classify(index, frequency, point_type, false).is_sampled_in());
                }
            }
        }
    }

    #[test]
    fn tail_is_sampled_in_off_stride() {
        assert_eq!(
            Delivery::classify(4, 3, TrackPointType::Ordinary, true),
            Delivery::Tail
        );
        assert_eq!(
            Delivery::classify(3, 3, TrackPointType::Ordinary, true),
            Delivery::Stride
        );
    }

    #[test]
    fn reset_clears_progress() {
        let mut state = SamplingState::new(5.0);
        state.num_loaded = 10;
        state.num_sampled_in = 4;
        state.first_seen = Some(TrackPointId(1));
        state.last_seen = Some(TrackPointId(10));
        assert!(state.is_primed());
        assert!(state.budget_spent(4));

        state.reset();

        assert!(!state.is_primed());
        assert_eq!(state.num_loaded, 0);
        assert!(!state.budget_spent(4));
    }
}

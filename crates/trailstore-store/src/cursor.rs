// ABOUTME: Forward-only iterator over one track's points, fetched in bounded result windows.
// ABOUTME: Holds at most one window in memory and must be closed (or dropped) to release it.

use std::collections::VecDeque;

use trailstore_core::{TrackId, TrackPoint, TrackPointId};

use crate::error::StoreError;
use crate::store::TrackStore;

/// Iterates the points of a track in ascending id order.
///
/// Each window is a fresh query for ids greater than the last one returned,
/// so points appended while iterating are picked up until a window comes
/// back empty. After that the iterator is exhausted and stays so.
pub struct TrackPointIterator<'s> {
    store: &'s TrackStore,
    track_id: TrackId,
    buffer: VecDeque<TrackPoint>,
    resume_after: Option<TrackPointId>,
    window: usize,
    exhausted: bool,
    open: bool,
}

impl<'s> TrackPointIterator<'s> {
    pub(crate) fn open(
        store: &'s TrackStore,
        track_id: TrackId,
        after: Option<TrackPointId>,
        window: usize,
    ) -> Self {
        store.cursor_opened();
        Self {
            store,
            track_id,
            buffer: VecDeque::new(),
            resume_after: after,
            window: window.max(1),
            exhausted: false,
            open: true,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// Id of the last point handed out, or the starting cursor.
    pub fn last_id(&self) -> Option<TrackPointId> {
        self.resume_after
    }

    pub fn has_next(&mut self) -> Result<bool, StoreError> {
        self.ensure_open()?;
        self.fill()?;
        Ok(!self.buffer.is_empty())
    }

    pub fn next_point(&mut self) -> Result<TrackPoint, StoreError> {
        self.ensure_open()?;
        self.fill()?;
        let point = self.buffer.pop_front().ok_or(StoreError::IteratorExhausted)?;
        if point.id.is_some() {
            self.resume_after = point.id;
        }
        Ok(point)
    }

    /// Release the result window. Closing twice is an error.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.release();
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        if self.open {
            self.open = false;
            self.buffer = VecDeque::new();
            self.store.cursor_released();
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::IteratorClosed)
        }
    }

    fn fill(&mut self) -> Result<(), StoreError> {
        if !self.buffer.is_empty() || self.exhausted {
            return Ok(());
        }
        let points = self
            .store
            .fetch_track_points(self.track_id, self.resume_after, self.window)?;
        if points.is_empty() {
            self.exhausted = true;
        }
        self.buffer.extend(points);
        Ok(())
    }
}

impl Drop for TrackPointIterator<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

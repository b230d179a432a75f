// ABOUTME: SQLite-backed store for tracks, track points and markers with cascading deletes.
// ABOUTME: Every write is transactional and followed by a StoreChange broadcast naming the collection.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tokio::sync::broadcast;
use trailstore_core::{
    ActivityType, Marker, MarkerId, ModelError, Position, Track, TrackId, TrackPoint,
    TrackPointId, TrackPointType, TrackStatistics,
};
use uuid::Uuid;

use crate::cursor::TrackPointIterator;
use crate::error::StoreError;
use crate::migration;
use crate::schema;

pub const DEFAULT_CURSOR_WINDOW: usize = 1024;
pub const DEFAULT_VACUUM_THRESHOLD: u64 = 10_000;

const CHANGE_CHANNEL_CAPACITY: usize = 256;
const DELETED_ROWS_KEY: &str = "deleted_rows_since_compaction";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Points fetched per result window by a [`TrackPointIterator`].
    pub cursor_window: usize,
    /// Deleted rows tolerated before the store compacts itself.
    pub vacuum_threshold: u64,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor_window: DEFAULT_CURSOR_WINDOW,
            vacuum_threshold: DEFAULT_VACUUM_THRESHOLD,
        }
    }
}

/// The entity collection touched by a committed write. Receivers re-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreChange {
    Tracks,
    TrackPoints,
    Markers,
}

/// Persistent track store. Safe to share across threads behind an `Arc`;
/// each call takes the connection lock for the duration of one transaction.
pub struct TrackStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
    cursor_window: usize,
    vacuum_threshold: u64,
    open_cursors: AtomicUsize,
}

const TRACK_COLUMNS: &str = "_id, uuid, name, description, category, icon, activity_type, \
    starttime_offset, starttime, stoptime, totaldistance, totaltime, movingtime, maxspeed, \
    minelevation, maxelevation, elevationgain, elevationloss";

const POINT_COLUMNS: &str = "_id, type, time, latitude, longitude, elevation, accuracy, \
    accuracy_vertical, speed, bearing, sensor_heartrate, sensor_cadence, sensor_power, \
    sensor_distance, elevation_gain, elevation_loss";

const MARKER_COLUMNS: &str = "_id, trackid, name, description, category, icon, time, latitude, \
    longitude, elevation, accuracy, bearing, length, duration, photourl";

impl TrackStore {
    /// Open or create the store at `config.path`, migrating it to the latest
    /// schema version.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::from_connection(conn, config.cursor_window, config.vacuum_threshold)?;
        tracing::info!(path = %config.path.display(), "track store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(
            Connection::open_in_memory()?,
            DEFAULT_CURSOR_WINDOW,
            DEFAULT_VACUUM_THRESHOLD,
        )
    }

    fn from_connection(
        mut conn: Connection,
        cursor_window: usize,
        vacuum_threshold: u64,
    ) -> Result<Self, StoreError> {
        migration::migrate(&mut conn, migration::latest_version())?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(schema::META)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            cursor_window: cursor_window.max(1),
            vacuum_threshold,
            open_cursors: AtomicUsize::new(0),
        })
    }

    /// Subscribe to committed-write notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        Ok(migration::current_version(&conn)?)
    }

    pub fn cursor_window(&self) -> usize {
        self.cursor_window
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is not an error.
        let _ = self.changes.send(change);
    }

    // --- tracks ---

    /// Insert a track. A nil UUID is replaced with a fresh one; an explicit
    /// id is kept (imports), otherwise the row id is assigned.
    pub fn insert_track(&self, track: &Track) -> Result<TrackId, StoreError> {
        let uuid = if track.uuid.is_nil() {
            Uuid::new_v4()
        } else {
            track.uuid
        };
        let id = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO tracks (_id, uuid, name, description, category, icon, activity_type,
                    starttime_offset)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    track.id.map(|id| id.0),
                    uuid.as_bytes().to_vec(),
                    track.name,
                    track.description,
                    track.category,
                    track.icon,
                    track.activity_type.id(),
                    track.utc_offset_seconds,
                ],
            )?;
            let id = TrackId(tx.last_insert_rowid());
            write_statistics(&tx, id, &track.statistics)?;
            tx.commit()?;
            id
        };
        tracing::debug!(track_id = %id, "inserted track");
        self.notify(StoreChange::Tracks);
        Ok(id)
    }

    pub fn get_track(&self, id: TrackId) -> Result<Option<Track>, StoreError> {
        let conn = self.lock()?;
        let track = conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE _id = ?1"),
                params![id.0],
                track_from_row,
            )
            .optional()?;
        Ok(track)
    }

    pub fn get_track_by_uuid(&self, uuid: &Uuid) -> Result<Option<Track>, StoreError> {
        let conn = self.lock()?;
        let track = conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE uuid = ?1"),
                params![uuid.as_bytes().to_vec()],
                track_from_row,
            )
            .optional()?;
        Ok(track)
    }

    /// All tracks, most recently started first.
    pub fn get_tracks(&self) -> Result<Vec<Track>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY starttime DESC, _id DESC"
        ))?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Replace a track's metadata and cached statistics.
    pub fn update_track(&self, track: &Track) -> Result<(), StoreError> {
        let id = track
            .id
            .ok_or_else(|| StoreError::Integrity("cannot update a track without an id".into()))?;
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE tracks SET uuid = ?2, name = ?3, description = ?4, category = ?5,
                    icon = ?6, activity_type = ?7, starttime_offset = ?8
                 WHERE _id = ?1",
                params![
                    id.0,
                    track.uuid.as_bytes().to_vec(),
                    track.name,
                    track.description,
                    track.category,
                    track.icon,
                    track.activity_type.id(),
                    track.utc_offset_seconds,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::TrackNotFound(id));
            }
            write_statistics(&tx, id, &track.statistics)?;
            tx.commit()?;
        }
        self.notify(StoreChange::Tracks);
        Ok(())
    }

    /// Refresh the cached statistics. Writers call this after appending points.
    pub fn update_track_statistics(
        &self,
        id: TrackId,
        statistics: &TrackStatistics,
    ) -> Result<(), StoreError> {
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            if write_statistics(&tx, id, statistics)? == 0 {
                return Err(StoreError::TrackNotFound(id));
            }
            tx.commit()?;
        }
        self.notify(StoreChange::Tracks);
        Ok(())
    }

    /// Delete a track with all of its points and markers. Returns the number
    /// of rows removed, children included.
    pub fn delete_track(&self, id: TrackId) -> Result<u64, StoreError> {
        self.delete_tracks(&[id])
    }

    /// Delete several tracks in one transaction. Fails without deleting
    /// anything if any of them does not exist.
    pub fn delete_tracks(&self, ids: &[TrackId]) -> Result<u64, StoreError> {
        self.delete_tracks_then_reclaim(ids, vacuum)
    }

    fn delete_tracks_then_reclaim(
        &self,
        ids: &[TrackId],
        reclaim: impl FnOnce(&Connection) -> rusqlite::Result<()>,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = {
            let mut conn = self.lock()?;
            let enforced: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            if enforced != 1 {
                return Err(StoreError::Integrity(
                    "foreign key enforcement is off; refusing to delete tracks".into(),
                ));
            }
            let tx = conn.transaction()?;
            let mut deleted = 0u64;
            for &id in ids {
                deleted += delete_track_rows(&tx, id)?;
            }
            add_deleted_rows(&tx, deleted)?;
            tx.commit()?;
            deleted
        };
        tracing::info!(tracks = ids.len(), rows = deleted, "deleted tracks");
        self.notify(StoreChange::Tracks);
        self.notify(StoreChange::TrackPoints);
        self.notify(StoreChange::Markers);
        self.compact_if_needed(reclaim);
        Ok(deleted)
    }

    pub fn delete_all_tracks(&self) -> Result<u64, StoreError> {
        let ids = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare("SELECT _id FROM tracks")?;
            stmt.query_map([], |row| row.get(0).map(TrackId))?
                .collect::<Result<Vec<_>, _>>()?
        };
        self.delete_tracks(&ids)
    }

    // --- track points ---

    pub fn insert_track_point(
        &self,
        track_id: TrackId,
        point: &TrackPoint,
    ) -> Result<TrackPointId, StoreError> {
        let id = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            ensure_track(&tx, track_id)?;
            let id = insert_point(&tx, track_id, point)?;
            tx.commit()?;
            id
        };
        self.notify(StoreChange::TrackPoints);
        Ok(id)
    }

    /// Insert points in order within one transaction.
    pub fn bulk_insert_track_points(
        &self,
        track_id: TrackId,
        points: &[TrackPoint],
    ) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            ensure_track(&tx, track_id)?;
            for point in points {
                insert_point(&tx, track_id, point)?;
            }
            tx.commit()?;
        }
        self.notify(StoreChange::TrackPoints);
        Ok(points.len())
    }

    pub fn last_track_point_id(&self, track_id: TrackId) -> Result<Option<TrackPointId>, StoreError> {
        let conn = self.lock()?;
        let id: Option<i64> = conn.query_row(
            "SELECT MAX(_id) FROM trackpoints WHERE trackid = ?1",
            params![track_id.0],
            |row| row.get(0),
        )?;
        Ok(id.map(TrackPointId))
    }

    /// The newest ordinary point that has a position.
    pub fn last_valid_track_point(&self, track_id: TrackId) -> Result<Option<TrackPoint>, StoreError> {
        let conn = self.lock()?;
        let point = conn
            .query_row(
                &format!(
                    "SELECT {POINT_COLUMNS} FROM trackpoints
                     WHERE trackid = ?1 AND type = 0 AND latitude IS NOT NULL AND longitude IS NOT NULL
                     ORDER BY _id DESC LIMIT 1"
                ),
                params![track_id.0],
                point_from_row,
            )
            .optional()?;
        Ok(point)
    }

    pub fn track_point_count(&self, track_id: TrackId) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trackpoints WHERE trackid = ?1",
            params![track_id.0],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// One result window of points after `after`, in id order.
    pub(crate) fn fetch_track_points(
        &self,
        track_id: TrackId,
        after: Option<TrackPointId>,
        limit: usize,
    ) -> Result<Vec<TrackPoint>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {POINT_COLUMNS} FROM trackpoints
             WHERE trackid = ?1 AND _id > ?2 ORDER BY _id LIMIT ?3"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let points = stmt
            .query_map(
                params![track_id.0, after.map_or(0, |id| id.0), limit],
                point_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    /// Open a forward-only iterator over a track's points, starting after
    /// `after` (or at the first point).
    pub fn track_point_iterator(
        &self,
        track_id: TrackId,
        after: Option<TrackPointId>,
    ) -> Result<TrackPointIterator<'_>, StoreError> {
        Ok(TrackPointIterator::open(self, track_id, after, self.cursor_window))
    }

    /// Run `f` over a point iterator that is released however `f` returns.
    pub fn with_track_points<R>(
        &self,
        track_id: TrackId,
        after: Option<TrackPointId>,
        f: impl FnOnce(&mut TrackPointIterator<'_>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut iterator = self.track_point_iterator(track_id, after)?;
        let result = f(&mut iterator);
        iterator.release();
        result
    }

    /// Number of iterators currently holding a result window.
    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub(crate) fn cursor_opened(&self) {
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cursor_released(&self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }

    // --- markers ---

    pub fn insert_marker(&self, marker: &Marker) -> Result<MarkerId, StoreError> {
        let id = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            ensure_track(&tx, marker.track_id)?;
            let id = insert_marker_row(&tx, marker)?;
            tx.commit()?;
            id
        };
        self.notify(StoreChange::Markers);
        Ok(id)
    }

    pub fn bulk_insert_markers(&self, markers: &[Marker]) -> Result<usize, StoreError> {
        if markers.is_empty() {
            return Ok(0);
        }
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            for marker in markers {
                ensure_track(&tx, marker.track_id)?;
                insert_marker_row(&tx, marker)?;
            }
            tx.commit()?;
        }
        self.notify(StoreChange::Markers);
        Ok(markers.len())
    }

    pub fn get_marker(&self, id: MarkerId) -> Result<Option<Marker>, StoreError> {
        let conn = self.lock()?;
        let marker = conn
            .query_row(
                &format!("SELECT {MARKER_COLUMNS} FROM markers WHERE _id = ?1"),
                params![id.0],
                marker_from_row,
            )
            .optional()?;
        Ok(marker)
    }

    /// Up to `limit` markers of a track after `after`, oldest first.
    pub fn get_markers(
        &self,
        track_id: TrackId,
        after: Option<MarkerId>,
        limit: usize,
    ) -> Result<Vec<Marker>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MARKER_COLUMNS} FROM markers
             WHERE trackid = ?1 AND _id > ?2 ORDER BY _id LIMIT ?3"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let markers = stmt
            .query_map(
                params![track_id.0, after.map_or(0, |id| id.0), limit],
                marker_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(markers)
    }

    /// Markers whose name, description or category contains `text`, newest first.
    pub fn search_markers(
        &self,
        track_id: Option<TrackId>,
        text: &str,
    ) -> Result<Vec<Marker>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MARKER_COLUMNS} FROM markers
             WHERE (?1 IS NULL OR trackid = ?1)
               AND (name LIKE ?2 OR description LIKE ?2 OR category LIKE ?2)
             ORDER BY time DESC, _id DESC"
        ))?;
        let pattern = format!("%{text}%");
        let markers = stmt
            .query_map(params![track_id.map(|id| id.0), pattern], marker_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(markers)
    }

    pub fn update_marker(&self, marker: &Marker) -> Result<(), StoreError> {
        let id = marker
            .id
            .ok_or_else(|| StoreError::Integrity("cannot update a marker without an id".into()))?;
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            ensure_track(&tx, marker.track_id)?;
            let (latitude, longitude) = split_position(marker.position);
            let changed = tx.execute(
                "UPDATE markers SET trackid = ?2, name = ?3, description = ?4, category = ?5,
                    icon = ?6, time = ?7, latitude = ?8, longitude = ?9, elevation = ?10,
                    accuracy = ?11, bearing = ?12, length = ?13, duration = ?14, photourl = ?15
                 WHERE _id = ?1",
                params![
                    id.0,
                    marker.track_id.0,
                    marker.name,
                    marker.description,
                    marker.category,
                    marker.icon,
                    marker.time.timestamp_millis(),
                    latitude,
                    longitude,
                    marker.altitude_m,
                    marker.accuracy_m,
                    marker.bearing_deg,
                    marker.length_m,
                    marker.duration_ms,
                    marker.photo_url,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::MarkerNotFound(id));
            }
            tx.commit()?;
        }
        self.notify(StoreChange::Markers);
        Ok(())
    }

    pub fn delete_marker(&self, id: MarkerId) -> Result<(), StoreError> {
        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let changed = tx.execute("DELETE FROM markers WHERE _id = ?1", params![id.0])?;
            if changed == 0 {
                return Err(StoreError::MarkerNotFound(id));
            }
            add_deleted_rows(&tx, 1)?;
            tx.commit()?;
        }
        self.notify(StoreChange::Markers);
        self.compact_if_needed(vacuum);
        Ok(())
    }

    /// The number to give the next marker of a track (1-based).
    pub fn next_marker_number(&self, track_id: TrackId) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM markers WHERE trackid = ?1",
            params![track_id.0],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0) + 1)
    }

    // --- compaction ---

    pub fn deleted_rows_since_compaction(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        Ok(read_deleted_rows(&conn)?)
    }

    /// Reclaim free pages and reset the deleted-row counter.
    pub fn compact(&self) -> Result<(), StoreError> {
        self.compact_with(vacuum)
    }

    fn compact_with(
        &self,
        reclaim: impl FnOnce(&Connection) -> rusqlite::Result<()>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        reclaim(&conn)?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, '0')
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![DELETED_ROWS_KEY],
        )?;
        tracing::info!("compacted track store");
        Ok(())
    }

    fn compact_if_needed(&self, reclaim: impl FnOnce(&Connection) -> rusqlite::Result<()>) {
        let pending = match self.deleted_rows_since_compaction() {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "could not read deleted row counter");
                return;
            }
        };
        if pending <= self.vacuum_threshold {
            return;
        }
        if let Err(e) = self.compact_with(reclaim) {
            // The deletes are committed; the counter stays so the next delete retries.
            tracing::warn!(error = %e, pending, "compaction failed");
        }
    }
}

fn vacuum(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("VACUUM;")
}

fn ensure_track(tx: &Transaction<'_>, id: TrackId) -> Result<(), StoreError> {
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM tracks WHERE _id = ?1)",
        params![id.0],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::TrackNotFound(id))
    }
}

fn delete_track_rows(tx: &Transaction<'_>, id: TrackId) -> Result<u64, StoreError> {
    let children: i64 = tx.query_row(
        "SELECT (SELECT COUNT(*) FROM trackpoints WHERE trackid = ?1)
              + (SELECT COUNT(*) FROM markers WHERE trackid = ?1)",
        params![id.0],
        |row| row.get(0),
    )?;
    if tx.execute("DELETE FROM tracks WHERE _id = ?1", params![id.0])? == 0 {
        return Err(StoreError::TrackNotFound(id));
    }
    Ok(1 + u64::try_from(children).unwrap_or(0))
}

fn read_deleted_rows(conn: &Connection) -> rusqlite::Result<u64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![DELETED_ROWS_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn add_deleted_rows(tx: &Transaction<'_>, rows: u64) -> rusqlite::Result<()> {
    let total = read_deleted_rows(tx)?.saturating_add(rows);
    tx.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![DELETED_ROWS_KEY, total.to_string()],
    )?;
    Ok(())
}

fn write_statistics(
    tx: &Transaction<'_>,
    id: TrackId,
    stats: &TrackStatistics,
) -> rusqlite::Result<usize> {
    tx.execute(
        "UPDATE tracks SET starttime = ?2, stoptime = ?3, totaldistance = ?4, totaltime = ?5,
            movingtime = ?6, avgspeed = ?7, avgmovingspeed = ?8, maxspeed = ?9,
            minelevation = ?10, maxelevation = ?11, elevationgain = ?12, elevationloss = ?13
         WHERE _id = ?1",
        params![
            id.0,
            stats.start_time.map(|t| t.timestamp_millis()),
            stats.stop_time.map(|t| t.timestamp_millis()),
            stats.total_distance_m,
            stats.total_time_ms,
            stats.moving_time_ms,
            stats.average_speed(),
            stats.average_moving_speed(),
            stats.max_speed_mps,
            stats.min_altitude_m,
            stats.max_altitude_m,
            stats.altitude_gain_m,
            stats.altitude_loss_m,
        ],
    )
}

fn insert_point(
    tx: &Transaction<'_>,
    track_id: TrackId,
    point: &TrackPoint,
) -> rusqlite::Result<TrackPointId> {
    let position = if point.point_type.is_segment_boundary() {
        None
    } else {
        point.position
    };
    let (latitude, longitude) = split_position(position);
    let mut stmt = tx.prepare_cached(
        "INSERT INTO trackpoints (_id, trackid, type, time, latitude, longitude, elevation,
            accuracy, accuracy_vertical, speed, bearing, sensor_heartrate, sensor_cadence,
            sensor_power, sensor_distance, elevation_gain, elevation_loss)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?;
    stmt.execute(params![
        point.id.map(|id| id.0),
        track_id.0,
        point.point_type.code(),
        point.time.timestamp_millis(),
        latitude,
        longitude,
        point.altitude_m,
        point.accuracy_m,
        point.vertical_accuracy_m,
        point.speed_mps,
        point.bearing_deg,
        point.heart_rate_bpm,
        point.cadence_rpm,
        point.power_w,
        point.sensor_distance_m,
        point.altitude_gain_m,
        point.altitude_loss_m,
    ])?;
    Ok(TrackPointId(tx.last_insert_rowid()))
}

fn insert_marker_row(tx: &Transaction<'_>, marker: &Marker) -> rusqlite::Result<MarkerId> {
    let (latitude, longitude) = split_position(marker.position);
    tx.execute(
        "INSERT INTO markers (_id, trackid, name, description, category, icon, time, latitude,
            longitude, elevation, accuracy, bearing, length, duration, photourl)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            marker.id.map(|id| id.0),
            marker.track_id.0,
            marker.name,
            marker.description,
            marker.category,
            marker.icon,
            marker.time.timestamp_millis(),
            latitude,
            longitude,
            marker.altitude_m,
            marker.accuracy_m,
            marker.bearing_deg,
            marker.length_m,
            marker.duration_ms,
            marker.photo_url,
        ],
    )?;
    Ok(MarkerId(tx.last_insert_rowid()))
}

fn split_position(position: Option<Position>) -> (Option<i64>, Option<i64>) {
    match position.map(Position::to_e6) {
        Some((latitude, longitude)) => (Some(latitude), Some(longitude)),
        None => (None, None),
    }
}

fn join_position(latitude: Option<i64>, longitude: Option<i64>) -> Option<Position> {
    Some(Position::from_e6(latitude?, longitude?))
}

fn conversion_error(column: usize, ty: Type, err: ModelError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(err))
}

fn time_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let Some(ms) = row.get::<_, Option<i64>>(column)? else {
        return Ok(None);
    };
    DateTime::from_timestamp_millis(ms)
        .map(Some)
        .ok_or_else(|| conversion_error(column, Type::Integer, ModelError::TimestampOutOfRange(ms)))
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    let uuid = match row.get::<_, Option<Vec<u8>>>(1)? {
        Some(bytes) => Uuid::from_slice(&bytes)
            .map_err(|_| conversion_error(1, Type::Blob, ModelError::InvalidUuid(bytes.len())))?,
        None => Uuid::nil(),
    };
    let activity: Option<String> = row.get(6)?;
    Ok(Track {
        id: Some(TrackId(row.get(0)?)),
        uuid,
        name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        category: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        icon: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        activity_type: activity
            .as_deref()
            .map_or(ActivityType::Unknown, ActivityType::from_id),
        utc_offset_seconds: row.get(7)?,
        statistics: TrackStatistics {
            start_time: time_column(row, 8)?,
            stop_time: time_column(row, 9)?,
            total_distance_m: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
            total_time_ms: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
            moving_time_ms: row.get::<_, Option<i64>>(12)?.unwrap_or(0),
            max_speed_mps: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
            min_altitude_m: row.get(14)?,
            max_altitude_m: row.get(15)?,
            altitude_gain_m: row.get(16)?,
            altitude_loss_m: row.get(17)?,
        },
    })
}

pub(crate) fn point_from_row(row: &Row<'_>) -> rusqlite::Result<TrackPoint> {
    let code: i64 = row.get(1)?;
    let point_type = TrackPointType::from_code(code)
        .map_err(|e| conversion_error(1, Type::Integer, e))?;
    let position = if point_type.is_segment_boundary() {
        None
    } else {
        join_position(row.get(3)?, row.get(4)?)
    };
    Ok(TrackPoint {
        id: Some(TrackPointId(row.get(0)?)),
        point_type,
        time: time_column(row, 2)?.unwrap_or_default(),
        position,
        altitude_m: row.get(5)?,
        accuracy_m: row.get(6)?,
        vertical_accuracy_m: row.get(7)?,
        speed_mps: row.get(8)?,
        bearing_deg: row.get(9)?,
        heart_rate_bpm: row.get(10)?,
        cadence_rpm: row.get(11)?,
        power_w: row.get(12)?,
        sensor_distance_m: row.get(13)?,
        altitude_gain_m: row.get(14)?,
        altitude_loss_m: row.get(15)?,
    })
}

fn marker_from_row(row: &Row<'_>) -> rusqlite::Result<Marker> {
    Ok(Marker {
        id: Some(MarkerId(row.get(0)?)),
        track_id: TrackId(row.get(1)?),
        name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        category: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        icon: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        time: time_column(row, 6)?.unwrap_or_default(),
        position: join_position(row.get(7)?, row.get(8)?),
        altitude_m: row.get(9)?,
        accuracy_m: row.get(10)?,
        bearing_deg: row.get(11)?,
        length_m: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
        duration_ms: row.get::<_, Option<i64>>(13)?.unwrap_or(0),
        photo_url: row.get(14)?,
    })
}

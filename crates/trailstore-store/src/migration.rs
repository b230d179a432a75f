// ABOUTME: Versioned schema migration ladder and the interpreter that applies it.
// ABOUTME: Each version is a list of tagged steps run in one transaction, upward or downward.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params_from_iter};
use trailstore_core::{ActivityType, TrackPointType};
use uuid::Uuid;

use crate::error::MigrationError;
use crate::schema;

/// Latitude (micro-degrees) that encoded a segment end before points had a type column.
pub const LEGACY_PAUSE_LATITUDE_E6: i64 = 100_000_000;
/// Latitude (micro-degrees) that encoded a manual segment start.
pub const LEGACY_RESUME_LATITUDE_E6: i64 = 200_000_000;

/// Copies a table into a freshly created definition.
#[derive(Debug, Clone, Copy)]
pub struct Rebuild {
    pub table: &'static str,
    /// `CREATE TABLE` statement for the new definition, using the final table name.
    pub create: &'static str,
    /// Target columns of the copy.
    pub columns: &'static str,
    /// Source expressions, one per target column. Defaults to `columns`.
    pub select: Option<&'static str>,
    /// Rows of the old table that survive the copy.
    pub filter: Option<&'static str>,
    /// Indexes to recreate once the old table is gone.
    pub indexes: &'static [&'static str],
}

pub type RowMapper = fn(&[Value]) -> Result<Vec<Value>, String>;

/// Rewrites columns row by row with a Rust function.
#[derive(Debug, Clone, Copy)]
pub struct Backfill {
    pub table: &'static str,
    pub read: &'static [&'static str],
    pub write: &'static [&'static str],
    pub map: RowMapper,
}

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Execute(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
    RebuildTable(Rebuild),
    Backfill(Backfill),
}

#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static [Step],
    pub down: &'static [Step],
}

const fn rebuild(
    table: &'static str,
    create: &'static str,
    columns: &'static str,
    indexes: &'static [&'static str],
) -> Step {
    Step::RebuildTable(Rebuild {
        table,
        create,
        columns,
        select: None,
        filter: None,
        indexes,
    })
}

pub static LADDER: &[Migration] = &[
    Migration {
        version: 1,
        description: "create tracks, trackpoints and markers",
        up: &[
            Step::Execute(schema::TRACKS_V1),
            Step::Execute(schema::TRACKPOINTS_V1),
            Step::Execute(schema::MARKERS_V1),
        ],
        down: &[
            Step::Execute("DROP TABLE markers"),
            Step::Execute("DROP TABLE trackpoints"),
            Step::Execute("DROP TABLE tracks"),
        ],
    },
    Migration {
        version: 2,
        description: "drop never populated track columns",
        up: &[rebuild("tracks", schema::TRACKS_V2, schema::TRACKS_V2_COLUMNS, &[])],
        down: &[Step::RebuildTable(Rebuild {
            table: "tracks",
            create: schema::TRACKS_V1,
            columns: schema::TRACKS_V1_COLUMNS,
            select: Some(schema::TRACKS_V1_FROM_V2),
            filter: None,
            indexes: &[],
        })],
    },
    Migration {
        version: 3,
        description: "index points and markers by track",
        up: &[
            Step::Execute(schema::TRACKPOINTS_TRACKID_INDEX),
            Step::Execute(schema::MARKERS_TRACKID_INDEX),
        ],
        down: &[
            Step::Execute("DROP INDEX trackpoints_trackid_index"),
            Step::Execute("DROP INDEX markers_trackid_index"),
        ],
    },
    Migration {
        version: 4,
        description: "stable track uuids",
        up: &[
            Step::AddColumn {
                table: "tracks",
                column: "uuid BLOB",
            },
            Step::Backfill(Backfill {
                table: "tracks",
                read: &[],
                write: &["uuid"],
                map: assign_uuid,
            }),
            Step::Execute(schema::TRACKS_UUID_INDEX),
        ],
        down: &[rebuild("tracks", schema::TRACKS_V2, schema::TRACKS_V2_COLUMNS, &[])],
    },
    Migration {
        version: 5,
        description: "altitude gain and loss",
        up: &[
            Step::AddColumn {
                table: "tracks",
                column: "elevationloss REAL",
            },
            Step::AddColumn {
                table: "trackpoints",
                column: "elevation_gain REAL",
            },
            Step::AddColumn {
                table: "trackpoints",
                column: "elevation_loss REAL",
            },
        ],
        down: &[
            rebuild(
                "tracks",
                schema::TRACKS_V4,
                schema::TRACKS_V4_COLUMNS,
                &[schema::TRACKS_UUID_INDEX],
            ),
            rebuild(
                "trackpoints",
                schema::TRACKPOINTS_V1,
                schema::TRACKPOINTS_V1_COLUMNS,
                &[schema::TRACKPOINTS_TRACKID_INDEX],
            ),
        ],
    },
    Migration {
        version: 6,
        description: "cascade deletes from tracks to points and markers",
        up: &[
            Step::RebuildTable(Rebuild {
                table: "trackpoints",
                create: schema::TRACKPOINTS_V6,
                columns: schema::TRACKPOINTS_V5_COLUMNS,
                select: None,
                filter: Some(schema::OWNED_BY_EXISTING_TRACK),
                indexes: &[schema::TRACKPOINTS_TRACKID_INDEX],
            }),
            Step::RebuildTable(Rebuild {
                table: "markers",
                create: schema::MARKERS_V6,
                columns: schema::MARKERS_V1_COLUMNS,
                select: None,
                filter: Some(schema::OWNED_BY_EXISTING_TRACK),
                indexes: &[schema::MARKERS_TRACKID_INDEX],
            }),
        ],
        down: &[
            rebuild(
                "trackpoints",
                schema::TRACKPOINTS_V5,
                schema::TRACKPOINTS_V5_COLUMNS,
                &[schema::TRACKPOINTS_TRACKID_INDEX],
            ),
            rebuild(
                "markers",
                schema::MARKERS_V1,
                schema::MARKERS_V1_COLUMNS,
                &[schema::MARKERS_TRACKID_INDEX],
            ),
        ],
    },
    Migration {
        version: 7,
        description: "typed segment boundaries",
        up: &[
            Step::AddColumn {
                table: "trackpoints",
                column: "type INTEGER NOT NULL DEFAULT 0 CHECK (type IN (-2, -1, 0, 1))",
            },
            Step::Backfill(Backfill {
                table: "trackpoints",
                read: &["latitude", "longitude"],
                write: &["type", "latitude", "longitude"],
                map: type_from_sentinel,
            }),
        ],
        down: &[
            Step::Backfill(Backfill {
                table: "trackpoints",
                read: &["type", "latitude", "longitude"],
                write: &["latitude", "longitude"],
                map: sentinel_from_type,
            }),
            rebuild(
                "trackpoints",
                schema::TRACKPOINTS_V6,
                schema::TRACKPOINTS_V5_COLUMNS,
                &[schema::TRACKPOINTS_TRACKID_INDEX],
            ),
        ],
    },
    Migration {
        version: 8,
        description: "sensor distance and vertical accuracy",
        up: &[
            Step::AddColumn {
                table: "trackpoints",
                column: "sensor_distance REAL",
            },
            Step::AddColumn {
                table: "trackpoints",
                column: "accuracy_vertical REAL",
            },
        ],
        down: &[rebuild(
            "trackpoints",
            schema::TRACKPOINTS_V7,
            schema::TRACKPOINTS_V7_COLUMNS,
            &[schema::TRACKPOINTS_TRACKID_INDEX],
        )],
    },
    Migration {
        version: 9,
        description: "track utc offset",
        up: &[Step::AddColumn {
            table: "tracks",
            column: "starttime_offset INTEGER NOT NULL DEFAULT 0",
        }],
        down: &[rebuild(
            "tracks",
            schema::TRACKS_V5,
            schema::TRACKS_V5_COLUMNS,
            &[schema::TRACKS_UUID_INDEX],
        )],
    },
    Migration {
        version: 10,
        description: "typed activity replaces icon",
        up: &[
            Step::AddColumn {
                table: "tracks",
                column: "activity_type TEXT",
            },
            Step::Backfill(Backfill {
                table: "tracks",
                read: &["icon", "category"],
                write: &["activity_type"],
                map: activity_from_icon,
            }),
        ],
        down: &[rebuild(
            "tracks",
            schema::TRACKS_V9,
            schema::TRACKS_V9_COLUMNS,
            &[schema::TRACKS_UUID_INDEX],
        )],
    },
];

pub fn latest_version() -> u32 {
    LADDER.last().map_or(0, |m| m.version)
}

pub fn current_version(conn: &Connection) -> Result<u32, MigrationError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(u32::try_from(version).unwrap_or(0))
}

/// Move the database to `target` using the built-in ladder.
pub fn migrate(conn: &mut Connection, target: u32) -> Result<(), MigrationError> {
    migrate_with(conn, LADDER, target)
}

/// Open the database file at `path` and move it to `target`. Returns the
/// version it was at before.
pub fn migrate_file(path: &Path, target: u32) -> Result<u32, MigrationError> {
    let mut conn = Connection::open(path)?;
    let previous = current_version(&conn)?;
    migrate(&mut conn, target)?;
    Ok(previous)
}

/// Move the database to `target` using `ladder`, upgrading or downgrading one
/// version per transaction.
pub fn migrate_with(
    conn: &mut Connection,
    ladder: &[Migration],
    target: u32,
) -> Result<(), MigrationError> {
    validate(ladder)?;
    let latest = ladder.last().map_or(0, |m| m.version);
    if target > latest {
        return Err(MigrationError::UnknownVersion {
            requested: target,
            latest,
        });
    }
    let current = current_version(conn)?;
    if current > latest {
        return Err(MigrationError::UnknownVersion {
            requested: current,
            latest,
        });
    }
    if current == target {
        return Ok(());
    }

    // Rebuilds rename tables; keep references pointing at the table name.
    conn.execute_batch("PRAGMA foreign_keys = OFF; PRAGMA legacy_alter_table = ON;")?;
    let result = if target > current {
        ladder
            .iter()
            .filter(|m| m.version > current && m.version <= target)
            .try_for_each(|m| apply(conn, m.up, m.version, m.version, m.description))
    } else {
        ladder
            .iter()
            .rev()
            .filter(|m| m.version <= current && m.version > target)
            .try_for_each(|m| apply(conn, m.down, m.version, m.version - 1, m.description))
    };
    let restored = conn.execute_batch("PRAGMA legacy_alter_table = OFF; PRAGMA foreign_keys = ON;");
    result?;
    restored?;
    Ok(())
}

fn validate(ladder: &[Migration]) -> Result<(), MigrationError> {
    for (expected, migration) in (1u32..).zip(ladder) {
        if migration.version != expected {
            return Err(MigrationError::LadderGap {
                expected,
                found: migration.version,
            });
        }
    }
    Ok(())
}

fn apply(
    conn: &mut Connection,
    steps: &[Step],
    version: u32,
    resulting_version: u32,
    description: &str,
) -> Result<(), MigrationError> {
    let tx = conn.transaction()?;
    for step in steps {
        apply_step(&tx, step, version).map_err(|e| match e {
            MigrationError::Sqlite(err) => MigrationError::Step {
                version,
                message: err.to_string(),
            },
            other => other,
        })?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {resulting_version}"))?;

    let violations = {
        let mut stmt = tx.prepare("PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |_| Ok(()))?;
        rows.count()
    };
    if violations > 0 {
        return Err(MigrationError::ForeignKeyViolations { count: violations });
    }

    tx.commit()?;
    tracing::info!(
        version,
        resulting_version,
        description,
        "applied schema migration"
    );
    Ok(())
}

fn apply_step(tx: &Transaction<'_>, step: &Step, version: u32) -> Result<(), MigrationError> {
    match step {
        Step::Execute(sql) => tx.execute_batch(sql)?,
        Step::AddColumn { table, column } => {
            tx.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column}"))?
        }
        Step::RebuildTable(rebuild) => rebuild_table(tx, rebuild)?,
        Step::Backfill(backfill) => backfill_rows(tx, backfill, version)?,
    }
    Ok(())
}

fn rebuild_table(tx: &Transaction<'_>, rebuild: &Rebuild) -> Result<(), MigrationError> {
    let table = rebuild.table;
    let old = format!("{table}_old");
    tx.execute_batch(&format!("ALTER TABLE {table} RENAME TO {old}"))?;
    tx.execute_batch(rebuild.create)?;

    let select = rebuild.select.unwrap_or(rebuild.columns);
    let filter = rebuild
        .filter
        .map(|f| format!(" WHERE {f}"))
        .unwrap_or_default();
    let copied = tx.execute(
        &format!(
            "INSERT INTO {table} ({}) SELECT {select} FROM {old}{filter}",
            rebuild.columns
        ),
        [],
    )?;
    let total: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {old}"), [], |row| row.get(0))?;
    let skipped = usize::try_from(total).unwrap_or(0).saturating_sub(copied);
    if skipped > 0 {
        tracing::warn!(table, skipped, "rebuild dropped rows failing the copy filter");
    }

    tx.execute_batch(&format!("DROP TABLE {old}"))?;
    for index in rebuild.indexes {
        tx.execute_batch(index)?;
    }
    Ok(())
}

fn backfill_rows(
    tx: &Transaction<'_>,
    backfill: &Backfill,
    version: u32,
) -> Result<(), MigrationError> {
    let table = backfill.table;
    let read = std::iter::once("_id")
        .chain(backfill.read.iter().copied())
        .collect::<Vec<_>>()
        .join(", ");
    let rows: Vec<(i64, Vec<Value>)> = {
        let mut stmt = tx.prepare(&format!("SELECT {read} FROM {table}"))?;
        let mapped = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let values = (1..=backfill.read.len())
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((id, values))
        })?;
        mapped.collect::<Result<_, _>>()?
    };

    let assignments = backfill
        .write
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let mut update = tx.prepare(&format!(
        "UPDATE {table} SET {assignments} WHERE _id = ?{}",
        backfill.write.len() + 1
    ))?;

    for (id, values) in rows {
        let mut written = (backfill.map)(&values).map_err(|message| MigrationError::Step {
            version,
            message: format!("{table} row {id}: {message}"),
        })?;
        if written.len() != backfill.write.len() {
            return Err(MigrationError::Step {
                version,
                message: format!(
                    "{table} row {id}: backfill produced {} values for {} columns",
                    written.len(),
                    backfill.write.len()
                ),
            });
        }
        written.push(Value::Integer(id));
        update.execute(params_from_iter(written.iter()))?;
    }
    Ok(())
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        _ => None,
    }
}

fn text(value: &Value) -> Option<&str> {
    match value {
        Value::Text(s) => Some(s.as_str()),
        _ => None,
    }
}

fn assign_uuid(_row: &[Value]) -> Result<Vec<Value>, String> {
    Ok(vec![Value::Blob(Uuid::new_v4().as_bytes().to_vec())])
}

/// `[latitude, longitude]` -> `[type, latitude, longitude]`
fn type_from_sentinel(row: &[Value]) -> Result<Vec<Value>, String> {
    let [latitude, longitude] = row else {
        return Err(format!("expected 2 values, got {}", row.len()));
    };
    let boundary = match integer(latitude) {
        Some(LEGACY_PAUSE_LATITUDE_E6) => Some(TrackPointType::SegmentEnd),
        Some(LEGACY_RESUME_LATITUDE_E6) => Some(TrackPointType::SegmentStartManual),
        _ => None,
    };
    Ok(match boundary {
        Some(kind) => vec![Value::Integer(kind.code()), Value::Null, Value::Null],
        None => vec![
            Value::Integer(TrackPointType::Ordinary.code()),
            latitude.clone(),
            longitude.clone(),
        ],
    })
}

/// `[type, latitude, longitude]` -> `[latitude, longitude]`
fn sentinel_from_type(row: &[Value]) -> Result<Vec<Value>, String> {
    let [kind, latitude, longitude] = row else {
        return Err(format!("expected 3 values, got {}", row.len()));
    };
    let code = integer(kind).ok_or_else(|| format!("non-integer point type {kind:?}"))?;
    let kind = TrackPointType::from_code(code).map_err(|e| e.to_string())?;
    Ok(match kind {
        TrackPointType::SegmentEnd => vec![Value::Integer(LEGACY_PAUSE_LATITUDE_E6), Value::Null],
        TrackPointType::SegmentStartManual => {
            vec![Value::Integer(LEGACY_RESUME_LATITUDE_E6), Value::Null]
        }
        TrackPointType::SegmentStartAutomatic | TrackPointType::Ordinary => {
            vec![latitude.clone(), longitude.clone()]
        }
    })
}

/// `[icon, category]` -> `[activity_type]`
fn activity_from_icon(row: &[Value]) -> Result<Vec<Value>, String> {
    let [icon, category] = row else {
        return Err(format!("expected 2 values, got {}", row.len()));
    };
    let activity = ActivityType::from_legacy(text(icon), text(category));
    Ok(vec![Value::Text(activity.id().to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;

    type Snapshot = Vec<(String, Vec<String>, Vec<Vec<Value>>)>;

    fn legacy_db() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn, 1).unwrap();
        conn.execute_batch(
            "INSERT INTO tracks (_id, name, description, category, icon, starttime, stoptime,
                numpoints, totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed,
                maxspeed, minelevation, maxelevation, elevationgain, mingrade, maxgrade)
             VALUES
                (1, 'Commute', 'to work', 'cycling', 'BIKE', 1000, 9000, 0, 1200.5, 8000, 7000,
                 0.15, 0.17, 4.2, 510.0, 530.0, 12.0, 0, 0),
                (2, 'Lunch run', '', 'Running', '', 20000, 30000, 0, 800.0, 10000, 9000,
                 0.08, 0.09, 3.1, NULL, NULL, NULL, 0, 0);
             INSERT INTO trackpoints (_id, trackid, longitude, latitude, time, elevation, accuracy,
                speed, bearing, sensor_heartrate, sensor_cadence, sensor_power)
             VALUES
                (1, 1, 11576124, 48137154, 1000, 510.0, 5.0, 3.5, 90.0, 120.0, 80.0, 150.0),
                (2, 1, NULL, 100000000, 2000, NULL, NULL, NULL, NULL, NULL, NULL, NULL),
                (3, 1, NULL, 200000000, 5000, NULL, NULL, NULL, NULL, NULL, NULL, NULL),
                (4, 1, 11576200, 48137300, 9000, 530.0, 4.0, 4.2, 91.0, 130.0, NULL, NULL),
                (5, 2, 11000000, 48000000, 20000, NULL, 8.0, 3.0, NULL, NULL, NULL, NULL);
             INSERT INTO markers (_id, name, description, category, icon, trackid, length,
                duration, longitude, latitude, time, elevation, accuracy, bearing, photourl)
             VALUES
                (1, 'Bakery', 'croissants', 'food', 'FOOD', 1, 600.0, 4000, 11576150,
                 48137200, 5000, 520.0, 5.0, 90.0, NULL),
                (2, 'Park', '', '', '', 2, 400.0, 5000, 11000100, 48000100, 25000, NULL,
                 NULL, NULL, 'file:///park.jpg');",
        )
        .unwrap();
        conn
    }

    fn snapshot(conn: &Connection) -> Snapshot {
        ["tracks", "trackpoints", "markers"]
            .into_iter()
            .map(|table| {
                let columns = {
                    let mut stmt = conn
                        .prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))
                        .unwrap();
                    stmt.query_map([], |row| row.get::<_, String>(0))
                        .unwrap()
                        .collect::<Result<Vec<_>, _>>()
                        .unwrap()
                };
                let mut stmt = conn
                    .prepare(&format!("SELECT * FROM {table} ORDER BY _id"))
                    .unwrap();
                let width = columns.len();
                let rows = stmt
                    .query_map([], |row| {
                        (0..width).map(|i| row.get::<_, Value>(i)).collect()
                    })
                    .unwrap()
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap();
                (table.to_string(), columns, rows)
            })
            .collect()
    }

    fn columns_of(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn fresh_database_migrates_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        migrate(&mut conn, latest_version()).unwrap();

        assert_eq!(current_version(&conn).unwrap(), latest_version());
        let columns = columns_of(&conn, "trackpoints");
        assert!(columns.contains(&"type".to_string()));
        assert!(columns.contains(&"accuracy_vertical".to_string()));
        assert!(columns_of(&conn, "tracks").contains(&"activity_type".to_string()));
    }

    #[test]
    fn migrate_file_reports_previous_version() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracks.db");

        assert_eq!(migrate_file(&path, 6).unwrap(), 0);
        assert_eq!(migrate_file(&path, 3).unwrap(), 6);

        let conn = Connection::open(&path).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 3);
    }

    #[test]
    fn ladder_is_contiguous() {
        validate(LADDER).unwrap();
        assert_eq!(latest_version(), LADDER.len() as u32);
    }

    #[test]
    fn every_step_round_trips_the_sample_dataset() {
        let mut conn = legacy_db();
        for version in 1..latest_version() {
            let before = snapshot(&conn);

            migrate(&mut conn, version + 1).unwrap();
            migrate(&mut conn, version).unwrap();

            assert_eq!(
                snapshot(&conn),
                before,
                "round trip through version {} changed data",
                version + 1
            );
            migrate(&mut conn, version + 1).unwrap();
        }
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn full_downgrade_returns_to_empty_database() {
        let mut conn = legacy_db();
        migrate(&mut conn, latest_version()).unwrap();
        migrate(&mut conn, 0).unwrap();

        assert_eq!(current_version(&conn).unwrap(), 0);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('tracks', 'trackpoints', 'markers')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn uuid_backfill_gives_each_track_a_distinct_uuid() {
        let mut conn = legacy_db();
        migrate(&mut conn, 4).unwrap();

        let uuids: Vec<Vec<u8>> = {
            let mut stmt = conn.prepare("SELECT uuid FROM tracks ORDER BY _id").unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(uuids.len(), 2);
        assert!(uuids.iter().all(|u| u.len() == 16));
        assert_ne!(uuids[0], uuids[1]);
    }

    #[test]
    fn sentinel_latitudes_become_typed_boundaries() {
        let mut conn = legacy_db();
        migrate(&mut conn, 7).unwrap();

        let rows: Vec<(i64, Option<i64>, Option<i64>)> = {
            let mut stmt = conn
                .prepare("SELECT type, latitude, longitude FROM trackpoints WHERE trackid = 1 ORDER BY _id")
                .unwrap();
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(
            rows,
            vec![
                (0, Some(48137154), Some(11576124)),
                (1, None, None),
                (-2, None, None),
                (0, Some(48137300), Some(11576200)),
            ]
        );
    }

    #[test]
    fn activity_backfill_prefers_icon_then_category() {
        let mut conn = legacy_db();
        migrate(&mut conn, 10).unwrap();

        let activities: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT activity_type FROM tracks ORDER BY _id")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(activities, vec!["biking", "running"]);
    }

    #[test]
    fn cascade_rebuild_drops_orphaned_rows() {
        let mut conn = legacy_db();
        migrate(&mut conn, 5).unwrap();
        conn.execute_batch(
            "INSERT INTO trackpoints (_id, trackid, time) VALUES (99, 42, 1);
             INSERT INTO markers (_id, trackid, name) VALUES (99, NULL, 'lost');",
        )
        .unwrap();

        migrate(&mut conn, 6).unwrap();

        let orphans: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM trackpoints WHERE _id = 99)
                      + (SELECT COUNT(*) FROM markers WHERE _id = 99)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
        let kept: i64 = conn
            .query_row("SELECT COUNT(*) FROM trackpoints", [], |row| row.get(0))
            .unwrap();
        assert_eq!(kept, 5);
    }

    #[test]
    fn migrating_past_latest_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = migrate(&mut conn, latest_version() + 1).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion { .. }));
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn ladder_with_gap_is_rejected_before_running() {
        static GAPPED: &[Migration] = &[
            Migration {
                version: 1,
                description: "one",
                up: &[Step::Execute("CREATE TABLE one (x INTEGER)")],
                down: &[Step::Execute("DROP TABLE one")],
            },
            Migration {
                version: 3,
                description: "three",
                up: &[Step::Execute("CREATE TABLE three (x INTEGER)")],
                down: &[Step::Execute("DROP TABLE three")],
            },
        ];
        let mut conn = Connection::open_in_memory().unwrap();

        let err = migrate_with(&mut conn, GAPPED, 1).unwrap_err();

        assert!(matches!(
            err,
            MigrationError::LadderGap {
                expected: 2,
                found: 3
            }
        ));
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn failing_step_rolls_back_its_whole_version() {
        static BROKEN: &[Migration] = &[
            Migration {
                version: 1,
                description: "ok",
                up: &[Step::Execute("CREATE TABLE things (x INTEGER)")],
                down: &[Step::Execute("DROP TABLE things")],
            },
            Migration {
                version: 2,
                description: "half broken",
                up: &[
                    Step::AddColumn {
                        table: "things",
                        column: "y INTEGER",
                    },
                    Step::Execute("INSERT INTO no_such_table VALUES (1)"),
                ],
                down: &[],
            },
        ];
        let mut conn = Connection::open_in_memory().unwrap();

        let err = migrate_with(&mut conn, BROKEN, 2).unwrap_err();

        assert!(matches!(err, MigrationError::Step { version: 2, .. }));
        assert_eq!(current_version(&conn).unwrap(), 1);
        assert_eq!(columns_of(&conn, "things"), vec!["x".to_string()]);
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn backfill_arity_mismatch_is_a_step_error() {
        fn too_many(_row: &[Value]) -> Result<Vec<Value>, String> {
            Ok(vec![Value::Null, Value::Null])
        }
        static BAD: &[Migration] = &[Migration {
            version: 1,
            description: "bad backfill",
            up: &[
                Step::Execute("CREATE TABLE items (_id INTEGER PRIMARY KEY, v INTEGER); INSERT INTO items VALUES (1, 1);"),
                Step::Backfill(Backfill {
                    table: "items",
                    read: &[],
                    write: &["v"],
                    map: too_many,
                }),
            ],
            down: &[],
        }];
        let mut conn = Connection::open_in_memory().unwrap();

        let err = migrate_with(&mut conn, BAD, 1).unwrap_err();

        assert!(matches!(err, MigrationError::Step { .. }));
        assert_eq!(current_version(&conn).unwrap(), 0);
    }
}

// ABOUTME: Table definitions for each schema version that a rebuild step can target.
// ABOUTME: Column lists are kept next to their DDL so copy statements stay in sync.

pub const TRACKS_V1: &str = "CREATE TABLE tracks (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    starttime INTEGER,
    stoptime INTEGER,
    numpoints INTEGER,
    totaldistance REAL,
    totaltime INTEGER,
    movingtime INTEGER,
    avgspeed REAL,
    avgmovingspeed REAL,
    maxspeed REAL,
    minelevation REAL,
    maxelevation REAL,
    elevationgain REAL,
    mingrade REAL,
    maxgrade REAL
)";

pub const TRACKS_V1_COLUMNS: &str = "_id, name, description, category, icon, starttime, stoptime, \
    numpoints, totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed, maxspeed, \
    minelevation, maxelevation, elevationgain, mingrade, maxgrade";

/// Restores the dropped v1 columns as zeros.
pub const TRACKS_V1_FROM_V2: &str = "_id, name, description, category, icon, starttime, stoptime, \
    0, totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed, maxspeed, \
    minelevation, maxelevation, elevationgain, 0, 0";

pub const TRACKS_V2: &str = "CREATE TABLE tracks (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    starttime INTEGER,
    stoptime INTEGER,
    totaldistance REAL,
    totaltime INTEGER,
    movingtime INTEGER,
    avgspeed REAL,
    avgmovingspeed REAL,
    maxspeed REAL,
    minelevation REAL,
    maxelevation REAL,
    elevationgain REAL
)";

pub const TRACKS_V2_COLUMNS: &str = "_id, name, description, category, icon, starttime, stoptime, \
    totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed, maxspeed, \
    minelevation, maxelevation, elevationgain";

pub const TRACKS_V4: &str = "CREATE TABLE tracks (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    starttime INTEGER,
    stoptime INTEGER,
    totaldistance REAL,
    totaltime INTEGER,
    movingtime INTEGER,
    avgspeed REAL,
    avgmovingspeed REAL,
    maxspeed REAL,
    minelevation REAL,
    maxelevation REAL,
    elevationgain REAL,
    uuid BLOB
)";

pub const TRACKS_V4_COLUMNS: &str = "_id, name, description, category, icon, starttime, stoptime, \
    totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed, maxspeed, \
    minelevation, maxelevation, elevationgain, uuid";

pub const TRACKS_V5: &str = "CREATE TABLE tracks (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    starttime INTEGER,
    stoptime INTEGER,
    totaldistance REAL,
    totaltime INTEGER,
    movingtime INTEGER,
    avgspeed REAL,
    avgmovingspeed REAL,
    maxspeed REAL,
    minelevation REAL,
    maxelevation REAL,
    elevationgain REAL,
    uuid BLOB,
    elevationloss REAL
)";

pub const TRACKS_V5_COLUMNS: &str = "_id, name, description, category, icon, starttime, stoptime, \
    totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed, maxspeed, \
    minelevation, maxelevation, elevationgain, uuid, elevationloss";

pub const TRACKS_V9: &str = "CREATE TABLE tracks (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    starttime INTEGER,
    stoptime INTEGER,
    totaldistance REAL,
    totaltime INTEGER,
    movingtime INTEGER,
    avgspeed REAL,
    avgmovingspeed REAL,
    maxspeed REAL,
    minelevation REAL,
    maxelevation REAL,
    elevationgain REAL,
    uuid BLOB,
    elevationloss REAL,
    starttime_offset INTEGER NOT NULL DEFAULT 0
)";

pub const TRACKS_V9_COLUMNS: &str = "_id, name, description, category, icon, starttime, stoptime, \
    totaldistance, totaltime, movingtime, avgspeed, avgmovingspeed, maxspeed, \
    minelevation, maxelevation, elevationgain, uuid, elevationloss, starttime_offset";

pub const TRACKS_UUID_INDEX: &str = "CREATE UNIQUE INDEX tracks_uuid_index ON tracks(uuid)";

pub const TRACKPOINTS_V1: &str = "CREATE TABLE trackpoints (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    trackid INTEGER,
    longitude INTEGER,
    latitude INTEGER,
    time INTEGER,
    elevation REAL,
    accuracy REAL,
    speed REAL,
    bearing REAL,
    sensor_heartrate REAL,
    sensor_cadence REAL,
    sensor_power REAL
)";

pub const TRACKPOINTS_V1_COLUMNS: &str = "_id, trackid, longitude, latitude, time, elevation, \
    accuracy, speed, bearing, sensor_heartrate, sensor_cadence, sensor_power";

pub const TRACKPOINTS_V5: &str = "CREATE TABLE trackpoints (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    trackid INTEGER,
    longitude INTEGER,
    latitude INTEGER,
    time INTEGER,
    elevation REAL,
    accuracy REAL,
    speed REAL,
    bearing REAL,
    sensor_heartrate REAL,
    sensor_cadence REAL,
    sensor_power REAL,
    elevation_gain REAL,
    elevation_loss REAL
)";

pub const TRACKPOINTS_V5_COLUMNS: &str = "_id, trackid, longitude, latitude, time, elevation, \
    accuracy, speed, bearing, sensor_heartrate, sensor_cadence, sensor_power, \
    elevation_gain, elevation_loss";

pub const TRACKPOINTS_V6: &str = "CREATE TABLE trackpoints (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    trackid INTEGER NOT NULL REFERENCES tracks(_id) ON UPDATE CASCADE ON DELETE CASCADE,
    longitude INTEGER,
    latitude INTEGER,
    time INTEGER,
    elevation REAL,
    accuracy REAL,
    speed REAL,
    bearing REAL,
    sensor_heartrate REAL,
    sensor_cadence REAL,
    sensor_power REAL,
    elevation_gain REAL,
    elevation_loss REAL
)";

pub const TRACKPOINTS_V7: &str = "CREATE TABLE trackpoints (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    trackid INTEGER NOT NULL REFERENCES tracks(_id) ON UPDATE CASCADE ON DELETE CASCADE,
    longitude INTEGER,
    latitude INTEGER,
    time INTEGER,
    elevation REAL,
    accuracy REAL,
    speed REAL,
    bearing REAL,
    sensor_heartrate REAL,
    sensor_cadence REAL,
    sensor_power REAL,
    elevation_gain REAL,
    elevation_loss REAL,
    type INTEGER NOT NULL DEFAULT 0 CHECK (type IN (-2, -1, 0, 1))
)";

pub const TRACKPOINTS_V7_COLUMNS: &str = "_id, trackid, longitude, latitude, time, elevation, \
    accuracy, speed, bearing, sensor_heartrate, sensor_cadence, sensor_power, \
    elevation_gain, elevation_loss, type";

pub const TRACKPOINTS_TRACKID_INDEX: &str =
    "CREATE INDEX trackpoints_trackid_index ON trackpoints(trackid)";

pub const MARKERS_V1: &str = "CREATE TABLE markers (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    trackid INTEGER,
    length REAL,
    duration INTEGER,
    longitude INTEGER,
    latitude INTEGER,
    time INTEGER,
    elevation REAL,
    accuracy REAL,
    bearing REAL,
    photourl TEXT
)";

pub const MARKERS_V1_COLUMNS: &str = "_id, name, description, category, icon, trackid, length, \
    duration, longitude, latitude, time, elevation, accuracy, bearing, photourl";

pub const MARKERS_V6: &str = "CREATE TABLE markers (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    category TEXT,
    icon TEXT,
    trackid INTEGER NOT NULL REFERENCES tracks(_id) ON UPDATE CASCADE ON DELETE CASCADE,
    length REAL,
    duration INTEGER,
    longitude INTEGER,
    latitude INTEGER,
    time INTEGER,
    elevation REAL,
    accuracy REAL,
    bearing REAL,
    photourl TEXT
)";

pub const MARKERS_TRACKID_INDEX: &str = "CREATE INDEX markers_trackid_index ON markers(trackid)";

/// Rows whose owning track still exists; orphans cannot satisfy the foreign key.
pub const OWNED_BY_EXISTING_TRACK: &str = "trackid IN (SELECT _id FROM tracks)";

/// Store bookkeeping, outside the versioned schema.
pub const META: &str = "CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

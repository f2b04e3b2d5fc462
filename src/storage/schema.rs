//! Database schema definitions
//!
//! Records and segment entries are stored as JSON next to the few columns
//! queries filter or sort on.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per phase execution
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phase TEXT NOT NULL,
    segment TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- The record db: one authoritative record per URL
CREATE TABLE IF NOT EXISTS records (
    url TEXT PRIMARY KEY,
    status INTEGER NOT NULL,
    fetch_time INTEGER NOT NULL,
    score REAL NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);

-- Generated fetch lists
CREATE TABLE IF NOT EXISTS segments (
    name TEXT PRIMARY KEY,
    stage TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS segment_entries (
    segment TEXT NOT NULL REFERENCES segments(name),
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (segment, position)
);

-- Records emitted while fetching a segment
CREATE TABLE IF NOT EXISTS fetch_output (
    segment TEXT NOT NULL REFERENCES segments(name),
    seq INTEGER NOT NULL,
    url TEXT NOT NULL,
    data TEXT NOT NULL,
    content BLOB,
    PRIMARY KEY (segment, seq)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

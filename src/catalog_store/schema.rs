//! Database schema for the retrieval catalog.
//!
//! Two tables: albums (covers plus their flattened feature artifacts)
//! and songs (audio, MIDI, and pitch-sequence artifact paths, with a
//! weak album reference).

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version.
const SCHEMA_VERSION: i64 = 1;

const CATALOG_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    pic_file_path TEXT NOT NULL,
    flattened TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS songs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    audio_file_path TEXT NOT NULL,
    audio_file_path_midi TEXT NOT NULL,
    midi_json TEXT NOT NULL DEFAULT '',
    album_id INTEGER REFERENCES albums(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_songs_album_id ON songs(album_id);
"#;

/// Create or migrate the catalog schema on an open connection.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .context("Failed to create schema_version table")?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })
        .context("Failed to read schema version")?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(CATALOG_SCHEMA_SQL)
            .context("Failed to create catalog tables")?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

//! SQLite-backed catalog store.
//!
//! Holds the album and song catalog rows whose path fields point at the
//! upload and feature artifacts on disk. Reads go through a small round-
//! robin connection pool; writes through a dedicated connection.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

use super::models::{Album, AlbumWithSongs, Page, Song};
use super::schema::initialize_schema;

/// Number of read connections.
const READ_POOL_SIZE: usize = 4;

/// Maximum rows per listing page.
pub const MAX_PAGE_SIZE: i64 = 10;

/// Invalid sizes fall back to the maximum; oversized requests clamp.
fn normalize_page_size(page_size: i64) -> i64 {
    if page_size < 1 {
        MAX_PAGE_SIZE
    } else {
        page_size.min(MAX_PAGE_SIZE)
    }
}

#[derive(Clone)]
pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

impl SqliteCatalogStore {
    /// Open (and bootstrap if needed) the catalog database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;
        initialize_schema(&write_conn)?;

        let album_count: i64 = write_conn
            .query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0))
            .unwrap_or(0);
        let song_count: i64 = write_conn
            .query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))
            .unwrap_or(0);
        info!(
            "Opened retrieval catalog: {} albums, {} songs",
            album_count, song_count
        );

        let mut read_pool = Vec::with_capacity(READ_POOL_SIZE);
        for _ in 0..READ_POOL_SIZE {
            let read_conn = Connection::open_with_flags(
                db_path_ref,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.pragma_update(None, "journal_mode", "WAL")?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(SqliteCatalogStore {
            read_pool,
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    fn parse_album_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get(0)?,
            name: row.get(1)?,
            pic_file_path: row.get(2)?,
            flattened: row.get(3)?,
        })
    }

    fn parse_song_row(row: &rusqlite::Row) -> rusqlite::Result<Song> {
        Ok(Song {
            id: row.get(0)?,
            name: row.get(1)?,
            audio_file_path: row.get(2)?,
            audio_file_path_midi: row.get(3)?,
            midi_json: row.get(4)?,
            album_id: row.get(5)?,
        })
    }

    // =========================================================================
    // Albums
    // =========================================================================

    /// List albums newest-first with a LIKE filter on name.
    pub fn list_albums(&self, page: i64, page_size: i64, search: &str) -> Result<Page<Album>> {
        let page = page.max(1);
        let page_size = normalize_page_size(page_size);
        let pattern = format!("%{}%", search);
        let offset = (page - 1) * page_size;

        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();

        let total_items: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM albums WHERE name LIKE ?1",
                params![pattern],
                |r| r.get(0),
            )
            .context("Failed to count albums")?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, name, pic_file_path, flattened FROM albums
             WHERE name LIKE ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let data = stmt
            .query_map(params![pattern, page_size, offset], Self::parse_album_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list albums")?;

        Ok(Page {
            total_items,
            page,
            page_size,
            data,
        })
    }

    /// Every album row, for scoring and model builds.
    pub fn all_albums(&self) -> Result<Vec<Album>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached("SELECT id, name, pic_file_path, flattened FROM albums ORDER BY id")?;
        let albums = stmt
            .query_map([], Self::parse_album_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load albums")?;
        Ok(albums)
    }

    pub fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let album = conn
            .query_row(
                "SELECT id, name, pic_file_path, flattened FROM albums WHERE id = ?1",
                params![id],
                Self::parse_album_row,
            )
            .optional()
            .context("Failed to get album")?;
        Ok(album)
    }

    /// Album with its songs resolved, or None when absent.
    pub fn get_album_with_songs(&self, id: i64) -> Result<Option<AlbumWithSongs>> {
        let album = match self.get_album(id)? {
            Some(album) => album,
            None => return Ok(None),
        };
        let songs = self.songs_for_album(id)?;
        Ok(Some(AlbumWithSongs { album, songs }))
    }

    pub fn insert_album(
        &self,
        name: &str,
        pic_file_path: &str,
        flattened: &str,
    ) -> Result<Album> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT INTO albums (name, pic_file_path, flattened) VALUES (?1, ?2, ?3)",
            params![name, pic_file_path, flattened],
        )
        .context("Failed to insert album")?;
        let id = conn.last_insert_rowid();
        Ok(Album {
            id,
            name: name.to_string(),
            pic_file_path: pic_file_path.to_string(),
            flattened: flattened.to_string(),
        })
    }

    /// Delete an album row. Songs referencing it fall back to NULL.
    pub fn delete_album(&self, id: i64) -> Result<bool> {
        let conn = self.write_conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM albums WHERE id = ?1", params![id])
            .context("Failed to delete album")?;
        Ok(changed > 0)
    }

    // =========================================================================
    // Songs
    // =========================================================================

    /// List songs newest-first with a LIKE filter on name.
    pub fn list_songs(&self, page: i64, page_size: i64, search: &str) -> Result<Page<Song>> {
        let page = page.max(1);
        let page_size = normalize_page_size(page_size);
        let pattern = format!("%{}%", search);
        let offset = (page - 1) * page_size;

        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();

        let total_items: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM songs WHERE name LIKE ?1",
                params![pattern],
                |r| r.get(0),
            )
            .context("Failed to count songs")?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, name, audio_file_path, audio_file_path_midi, midi_json, album_id
             FROM songs WHERE name LIKE ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let data = stmt
            .query_map(params![pattern, page_size, offset], Self::parse_song_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list songs")?;

        Ok(Page {
            total_items,
            page,
            page_size,
            data,
        })
    }

    /// Every song row, for scoring.
    pub fn all_songs(&self) -> Result<Vec<Song>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, audio_file_path, audio_file_path_midi, midi_json, album_id
             FROM songs ORDER BY id",
        )?;
        let songs = stmt
            .query_map([], Self::parse_song_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load songs")?;
        Ok(songs)
    }

    /// Songs that do not belong to any album.
    pub fn unassociated_songs(&self) -> Result<Vec<Song>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, audio_file_path, audio_file_path_midi, midi_json, album_id
             FROM songs WHERE album_id IS NULL ORDER BY id DESC",
        )?;
        let songs = stmt
            .query_map([], Self::parse_song_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load unassociated songs")?;
        Ok(songs)
    }

    pub fn songs_for_album(&self, album_id: i64) -> Result<Vec<Song>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, audio_file_path, audio_file_path_midi, midi_json, album_id
             FROM songs WHERE album_id = ?1 ORDER BY id",
        )?;
        let songs = stmt
            .query_map(params![album_id], Self::parse_song_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load album songs")?;
        Ok(songs)
    }

    pub fn get_song(&self, id: i64) -> Result<Option<Song>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let song = conn
            .query_row(
                "SELECT id, name, audio_file_path, audio_file_path_midi, midi_json, album_id
                 FROM songs WHERE id = ?1",
                params![id],
                Self::parse_song_row,
            )
            .optional()
            .context("Failed to get song")?;
        Ok(song)
    }

    pub fn insert_song(
        &self,
        name: &str,
        audio_file_path: &str,
        audio_file_path_midi: &str,
        midi_json: &str,
    ) -> Result<Song> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT INTO songs (name, audio_file_path, audio_file_path_midi, midi_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, audio_file_path, audio_file_path_midi, midi_json],
        )
        .context("Failed to insert song")?;
        let id = conn.last_insert_rowid();
        Ok(Song {
            id,
            name: name.to_string(),
            audio_file_path: audio_file_path.to_string(),
            audio_file_path_midi: audio_file_path_midi.to_string(),
            midi_json: midi_json.to_string(),
            album_id: None,
        })
    }

    /// Point a song at an album. Returns false when either row is
    /// missing.
    pub fn assign_song_to_album(&self, album_id: i64, song_id: i64) -> Result<bool> {
        if self.get_album(album_id)?.is_none() {
            return Ok(false);
        }
        let conn = self.write_conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE songs SET album_id = ?1 WHERE id = ?2",
                params![album_id, song_id],
            )
            .context("Failed to assign song to album")?;
        Ok(changed > 0)
    }

    pub fn delete_song(&self, id: i64) -> Result<bool> {
        let conn = self.write_conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM songs WHERE id = ?1", params![id])
            .context("Failed to delete song")?;
        Ok(changed > 0)
    }
}

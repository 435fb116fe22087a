//! Query result cache for catalog lookups.
//!
//! Catalog search is the expensive step of a sync run, and chart songs
//! recur week after week. The cache maps a composed query string to the
//! catalog song it resolved to. Only successful resolutions are cached:
//! a miss may succeed later when the catalog grows, so misses are retried
//! on every run.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use rustc_hash::FxHashMap;

use crate::models::{CatalogSong, Song};

pub trait QueryCache: Send + Sync {
    fn get(&self, query: &str) -> Result<Option<CatalogSong>>;

    fn put(&self, query: &str, song: &CatalogSong) -> Result<()>;

    /// Persist pending writes. A no-op for caches that write through.
    fn flush(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory cache, for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryQueryCache {
    entries: Mutex<FxHashMap<String, CatalogSong>>,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, FxHashMap<String, CatalogSong>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("query cache lock poisoned"))
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, query: &str) -> Result<Option<CatalogSong>> {
        Ok(self.entries()?.get(query).cloned())
    }

    fn put(&self, query: &str, song: &CatalogSong) -> Result<()> {
        self.entries()?.insert(query.to_string(), song.clone());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }
}

/// SQLite-backed cache that survives across runs.
pub struct SqliteQueryCache {
    conn: Mutex<Connection>,
}

impl SqliteQueryCache {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening query cache {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS query_cache (
                 query    TEXT PRIMARY KEY,
                 artist   TEXT NOT NULL,
                 title    TEXT NOT NULL,
                 track_id TEXT NOT NULL
             )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("query cache lock poisoned"))
    }
}

impl QueryCache for SqliteQueryCache {
    fn get(&self, query: &str) -> Result<Option<CatalogSong>> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT artist, title, track_id FROM query_cache WHERE query = ?1",
                params![query],
                |row| {
                    Ok(CatalogSong::new(
                        Song::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(found)
    }

    fn put(&self, query: &str, song: &CatalogSong) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO query_cache (query, artist, title, track_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![query, song.song.artist, song.song.title, song.track_id],
        )?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // writes go straight to the database
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let count: usize =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_song(track_id: &str) -> CatalogSong {
        CatalogSong::new(Song::new("The Script", "Arms Open"), track_id)
    }

    fn exercise(cache: &dyn QueryCache) {
        assert!(cache.is_empty().unwrap());
        assert_eq!(cache.get("script track:arms open").unwrap(), None);

        cache
            .put("script track:arms open", &cached_song("uri:1"))
            .unwrap();
        assert_eq!(
            cache.get("script track:arms open").unwrap(),
            Some(cached_song("uri:1"))
        );
        assert_eq!(cache.len().unwrap(), 1);

        // same query resolves again, the entry is replaced
        cache
            .put("script track:arms open", &cached_song("uri:2"))
            .unwrap();
        assert_eq!(
            cache.get("script track:arms open").unwrap(),
            Some(cached_song("uri:2"))
        );
        assert_eq!(cache.len().unwrap(), 1);

        cache.flush().unwrap();
    }

    #[test]
    fn memory_cache_round_trips() {
        exercise(&MemoryQueryCache::new());
    }

    #[test]
    fn sqlite_cache_round_trips() {
        exercise(&SqliteQueryCache::open_in_memory().unwrap());
    }
}

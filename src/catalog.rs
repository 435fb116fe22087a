//! Music catalog access: search, playlists and the song-to-track lookup.
//!
//! [`MusicCatalog`] is the seam between the sync logic and whatever holds
//! the track data. The bundled implementation is [`SqliteCatalog`], a local
//! catalog dump indexed with FTS5, which keeps sync runs reproducible and
//! independent of a network account.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::cache::QueryCache;
use crate::compare;
use crate::models::{CatalogSong, Playlist, SearchHit, Song};
use crate::query::QueryWords;

/// Candidates considered per search before best-candidate selection.
const SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog host unavailable: {0}")]
    HostUnavailable(String),

    #[error("catalog store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("query cache error: {0}")]
    Cache(String),

    #[error("catalog lock poisoned")]
    Poisoned,
}

pub trait MusicCatalog: Send + Sync {
    /// Resolve a chart song to a catalog track.
    ///
    /// `Ok(None)` means the catalog has no acceptable match; resolution
    /// failures (host down, broken store) are errors.
    fn find_song(&self, song: &Song) -> Result<Option<CatalogSong>, CatalogError>;

    fn get_or_create_playlist(&self, name: &str) -> Result<Playlist, CatalogError>;

    fn tracks_in_playlist(&self, playlist: &Playlist) -> Result<Vec<CatalogSong>, CatalogError>;

    fn add_to_playlist(
        &self,
        playlist: &Playlist,
        songs: &[CatalogSong],
    ) -> Result<(), CatalogError>;
}

/// Catalog backed by a local SQLite dump with an FTS5 track index.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    cache: Box<dyn QueryCache>,
}

impl SqliteCatalog {
    pub fn open(path: &Path, cache: Box<dyn QueryCache>) -> Result<Self, CatalogError> {
        Self::with_connection(Connection::open(path)?, cache)
    }

    pub fn open_in_memory(cache: Box<dyn QueryCache>) -> Result<Self, CatalogError> {
        Self::with_connection(Connection::open_in_memory()?, cache)
    }

    fn with_connection(
        conn: Connection,
        cache: Box<dyn QueryCache>,
    ) -> Result<Self, CatalogError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracks (
                 id         INTEGER PRIMARY KEY,
                 track_id   TEXT NOT NULL UNIQUE,
                 artist     TEXT NOT NULL,
                 title      TEXT NOT NULL,
                 popularity INTEGER NOT NULL DEFAULT 0
             );
             CREATE VIRTUAL TABLE IF NOT EXISTS tracks_fts USING fts5(
                 artist, title, content='tracks', content_rowid='id'
             );
             CREATE TABLE IF NOT EXISTS playlists (
                 id   INTEGER PRIMARY KEY,
                 name TEXT NOT NULL UNIQUE
             );
             CREATE TABLE IF NOT EXISTS playlist_tracks (
                 playlist_id INTEGER NOT NULL REFERENCES playlists(id),
                 track_id    TEXT NOT NULL,
                 artist      TEXT NOT NULL,
                 title       TEXT NOT NULL,
                 PRIMARY KEY (playlist_id, track_id)
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::Poisoned)
    }

    /// Load one track into the catalog, keeping the FTS index in step.
    pub fn add_track(
        &self,
        track_id: &str,
        artist: &str,
        title: &str,
        popularity: i32,
    ) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tracks (track_id, artist, title, popularity)
             VALUES (?1, ?2, ?3, ?4)",
            params![track_id, artist, title, popularity],
        )?;
        conn.execute(
            "INSERT INTO tracks_fts (rowid, artist, title)
             VALUES (last_insert_rowid(), ?1, ?2)",
            params![artist, title],
        )?;
        Ok(())
    }

    fn search_tracks(&self, query: &str) -> Result<Vec<SearchHit>, CatalogError> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT t.track_id, t.artist, t.title, t.popularity
             FROM tracks_fts
             JOIN tracks t ON t.id = tracks_fts.rowid
             WHERE tracks_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![match_expr, SEARCH_LIMIT], |row| {
                Ok(SearchHit {
                    track_id: row.get(0)?,
                    artist: row.get(1)?,
                    title: row.get(2)?,
                    popularity: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

}

/// Translate a composed query into an FTS5 MATCH expression.
///
/// Bare keywords search the artist column, keywords behind the `track:`
/// field prefix search the title column. All terms are required.
fn fts_match_expression(query: &str) -> Option<String> {
    let (artist_part, title_part) = match query.split_once("track:") {
        Some((artist, title)) => (artist, title),
        None => (query, ""),
    };
    let mut terms: Vec<String> = Vec::new();
    for word in artist_part.split_whitespace() {
        terms.push(format!("artist:\"{}\"", word.replace('"', "\"\"")));
    }
    for word in title_part.split_whitespace() {
        terms.push(format!("title:\"{}\"", word.replace('"', "\"\"")));
    }
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

impl MusicCatalog for SqliteCatalog {
    fn find_song(&self, song: &Song) -> Result<Option<CatalogSong>, CatalogError> {
        let words = QueryWords::for_song(song);
        let query = words.normalized();
        if query.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self
            .cache
            .get(&query)
            .map_err(|e| CatalogError::Cache(e.to_string()))?
        {
            debug!("cache hit for '{query}'");
            return Ok(Some(cached));
        }

        let mut hits = self.search_tracks(&query)?;
        if hits.is_empty() {
            let minimized = words.minimized();
            if minimized != query {
                debug!("no hits for '{query}', retrying with '{minimized}'");
                hits = self.search_tracks(&minimized)?;
            }
        }

        let best = compare::select_best(song, hits);
        if let Some(found) = &best {
            // misses are not cached; the catalog may resolve them later
            self.cache
                .put(&query, found)
                .map_err(|e| CatalogError::Cache(e.to_string()))?;
        }
        Ok(best)
    }

    fn get_or_create_playlist(&self, name: &str) -> Result<Playlist, CatalogError> {
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM playlists WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO playlists (name) VALUES (?1)", params![name])?;
                conn.last_insert_rowid()
            }
        };
        Ok(Playlist {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    fn tracks_in_playlist(&self, playlist: &Playlist) -> Result<Vec<CatalogSong>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT track_id, artist, title FROM playlist_tracks
             WHERE playlist_id = ?1
             ORDER BY artist, title",
        )?;
        let songs = stmt
            .query_map(params![playlist.id], |row| {
                Ok(CatalogSong::new(
                    Song::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                    row.get::<_, String>(0)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    fn add_to_playlist(
        &self,
        playlist: &Playlist,
        songs: &[CatalogSong],
    ) -> Result<(), CatalogError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_id, artist, title)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for song in songs {
                stmt.execute(params![
                    playlist.id,
                    song.track_id,
                    song.song.artist,
                    song.song.title,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryQueryCache;
    use crate::query;

    fn catalog() -> SqliteCatalog {
        SqliteCatalog::open_in_memory(Box::new(MemoryQueryCache::new())).unwrap()
    }

    #[test]
    fn match_expression_scopes_keywords_to_their_column() {
        assert_eq!(
            fts_match_expression("script track:arms open").as_deref(),
            Some("artist:\"script\" AND title:\"arms\" AND title:\"open\"")
        );
        assert_eq!(
            fts_match_expression("band").as_deref(),
            Some("artist:\"band\"")
        );
        assert_eq!(
            fts_match_expression("track:song").as_deref(),
            Some("title:\"song\"")
        );
        assert_eq!(fts_match_expression(""), None);
    }

    #[test]
    fn finds_a_song_through_the_full_text_index() {
        let catalog = catalog();
        catalog
            .add_track("uri:1", "The Script", "Arms Open", 60)
            .unwrap();
        catalog
            .add_track("uri:2", "The Script", "Hall of Fame", 80)
            .unwrap();

        let song = Song::new("The Scr!pt", "Arms Open");
        // the stylized spelling normalizes to the same query as the catalog text
        let found = catalog.find_song(&song).unwrap();
        assert_eq!(found, Some(CatalogSong::new(song, "uri:1")));
    }

    #[test]
    fn prefers_the_most_popular_candidate() {
        let catalog = catalog();
        catalog.add_track("uri:album", "Abba", "Waterloo", 55).unwrap();
        catalog.add_track("uri:single", "Abba", "Waterloo", 78).unwrap();

        let song = Song::new("ABBA", "Waterloo");
        let found = catalog.find_song(&song).unwrap().unwrap();
        assert_eq!(found.track_id, "uri:single");
        // the chart spelling is kept, not the catalog's
        assert_eq!(found.song, song);
    }

    #[test]
    fn retries_with_a_minimized_query_when_the_full_one_misses() {
        let catalog = catalog();
        catalog
            .add_track("uri:1", "Alphaville Marianne", "Forever Young", 50)
            .unwrap();

        let song = Song::new("Alphaville Marianne Duo Big", "Forever Young");
        let found = catalog.find_song(&song).unwrap().unwrap();
        assert_eq!(found.track_id, "uri:1");
    }

    #[test]
    fn resolutions_come_from_the_cache_when_present() {
        let cache = MemoryQueryCache::new();
        let song = Song::new("The Script", "Arms Open");
        let resolved = CatalogSong::new(song.clone(), "uri:cached");
        cache.put(&query::compose_query(&song), &resolved).unwrap();

        // no tracks loaded at all; only the cache can answer
        let catalog = SqliteCatalog::open_in_memory(Box::new(cache)).unwrap();
        assert_eq!(catalog.find_song(&song).unwrap(), Some(resolved));
    }

    #[test]
    fn misses_are_not_cached_and_resolve_once_the_track_exists() {
        let catalog = catalog();
        let song = Song::new("The Script", "Arms Open");
        assert_eq!(catalog.find_song(&song).unwrap(), None);

        catalog
            .add_track("uri:1", "The Script", "Arms Open", 60)
            .unwrap();
        assert!(catalog.find_song(&song).unwrap().is_some());
    }

    #[test]
    fn song_without_keywords_resolves_to_nothing() {
        assert_eq!(catalog().find_song(&Song::new("", "")).unwrap(), None);
    }

    #[test]
    fn playlists_are_created_once_and_keep_their_tracks() {
        let catalog = catalog();
        let playlist = catalog.get_or_create_playlist("2018 charted songs").unwrap();
        assert_eq!(
            catalog.get_or_create_playlist("2018 charted songs").unwrap(),
            playlist
        );
        assert!(catalog.tracks_in_playlist(&playlist).unwrap().is_empty());

        let songs = vec![
            CatalogSong::new(Song::new("Abba", "Waterloo"), "uri:1"),
            CatalogSong::new(Song::new("The Script", "Arms Open"), "uri:2"),
        ];
        catalog.add_to_playlist(&playlist, &songs).unwrap();
        // re-adding the same track is a no-op
        catalog.add_to_playlist(&playlist, &songs[..1]).unwrap();

        assert_eq!(catalog.tracks_in_playlist(&playlist).unwrap(), songs);
    }
}

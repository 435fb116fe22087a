//! SQLite persistence for scraped chart entries.
//!
//! The store is resumable: the scrape schedule asks for the highest year and
//! week already present per chart and continues from there. Writes are
//! keyed on (chart, year, week, position) so re-scraping a week replaces it.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::models::{ChartEntry, MusicChart, Song};

pub struct ChartStore {
    conn: Connection,
}

impl ChartStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening chart database {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the schema when it is missing. Returns true when a new store
    /// was created.
    pub fn create_schema_if_needed(&self) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'chart_entries'
             )",
            [],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }
        self.conn.execute_batch(
            "CREATE TABLE chart_entries (
                 chart          TEXT NOT NULL,
                 year           INTEGER NOT NULL,
                 week           INTEGER NOT NULL,
                 position       INTEGER NOT NULL,
                 is_new_release INTEGER NOT NULL,
                 artist         TEXT NOT NULL,
                 title          TEXT NOT NULL,
                 PRIMARY KEY (chart, year, week, position)
             );
             CREATE INDEX chart_entries_by_year ON chart_entries (year, is_new_release);",
        )?;
        Ok(true)
    }

    /// Store a batch of entries in one transaction, replacing any earlier
    /// scrape of the same positions.
    pub fn upsert_all(&mut self, entries: &[ChartEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO chart_entries
                     (chart, year, week, position, is_new_release, artist, title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.chart.name(),
                    entry.year,
                    entry.week,
                    entry.position,
                    entry.is_new_release,
                    entry.song.artist,
                    entry.song.title,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn highest_year_stored(&self, chart: MusicChart) -> Result<Option<i32>> {
        let year = self.conn.query_row(
            "SELECT MAX(year) FROM chart_entries WHERE chart = ?1",
            params![chart.name()],
            |row| row.get::<_, Option<i32>>(0),
        )?;
        Ok(year)
    }

    pub fn highest_week_stored(&self, chart: MusicChart, year: i32) -> Result<Option<u8>> {
        let week = self.conn.query_row(
            "SELECT MAX(week) FROM chart_entries WHERE chart = ?1 AND year = ?2",
            params![chart.name(), year],
            |row| row.get::<_, Option<u8>>(0),
        )?;
        Ok(week)
    }

    /// All distinct songs that entered a chart in the given year, in song
    /// natural order.
    pub fn songs_for_year(&self, year: i32) -> Result<Vec<Song>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT artist, title FROM chart_entries
             WHERE year = ?1 AND is_new_release = 1
             ORDER BY artist, title",
        )?;
        let songs = stmt
            .query_map(params![year], |row| {
                Ok(Song::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }
}

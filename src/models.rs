//! Core data models for chart scraping and catalog reconciliation.
//!
//! This module contains the value types shared by the whole pipeline:
//! songs, chart entries, catalog hits and the sync report.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Songs
// ============================================================================

/// A song with a `title` performed by an `artist`.
///
/// The natural order of songs is alphabetical by artist, then by title
/// (the derived `Ord` with this field order does exactly that). Songs are
/// plain values: equality and ordering depend on nothing but the two fields,
/// so they can be used as map keys and in sorted output.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Song {
    pub artist: String,
    pub title: String,
}

impl Song {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// A [`Song`] that has been resolved to a track in the external catalog.
///
/// Two catalog songs with the same `track_id` denote the same track by
/// definition, whatever their textual fields say: once a song is linked,
/// the catalog is the source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSong {
    pub song: Song,
    pub track_id: String,
}

impl CatalogSong {
    pub fn new(song: Song, track_id: impl Into<String>) -> Self {
        Self {
            song,
            track_id: track_id.into(),
        }
    }
}

/// One raw candidate returned by a catalog search, in the order the search
/// engine returned it. Consumed once by the best-candidate selection.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub popularity: i32, // 0-100
}

/// A playlist hosted by the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Charts
// ============================================================================

/// The music charts this software knows how to scrape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MusicChart {
    Top40,
    Tipparade,
}

impl MusicChart {
    pub const ALL: [MusicChart; 2] = [MusicChart::Top40, MusicChart::Tipparade];

    pub fn name(self) -> &'static str {
        match self {
            MusicChart::Top40 => "Top 40",
            MusicChart::Tipparade => "Tipparade",
        }
    }

    /// Path segment used in chart page URLs.
    pub fn slug(self) -> &'static str {
        match self {
            MusicChart::Top40 => "top40",
            MusicChart::Tipparade => "tipparade",
        }
    }

    /// First year this chart was published.
    pub fn year_started(self) -> i32 {
        match self {
            MusicChart::Top40 => 1965,
            MusicChart::Tipparade => 1967,
        }
    }

    /// Week number of the first published edition in [`year_started`](Self::year_started).
    pub fn week_started(self) -> u8 {
        match self {
            MusicChart::Top40 => 1,
            MusicChart::Tipparade => 28,
        }
    }

    /// Resolve a chart from its display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|chart| chart.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for MusicChart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One scraped (chart, year, week, position, song) record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartEntry {
    pub chart: MusicChart,
    pub year: i32,
    pub week: u8,
    pub position: u8,
    pub is_new_release: bool,
    pub song: Song,
}

// ============================================================================
// Sync report
// ============================================================================

/// Outcome counts for one playlist sync run, serialized to JSON on request.
#[derive(Default, Debug, Clone, Serialize)]
pub struct SyncReport {
    pub playlist_name: String,
    pub songs: usize,
    pub already_present: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub added: usize,
    pub elapsed_seconds: f64,
}

impl SyncReport {
    /// Share of looked-up songs that resolved to a catalog track, in percent.
    pub fn match_rate(&self) -> f64 {
        let looked_up = self.matched + self.unmatched;
        if looked_up == 0 {
            0.0
        } else {
            100.0 * self.matched as f64 / looked_up as f64
        }
    }

    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn songs_order_by_artist_then_title() {
        let mut songs = vec![
            Song::new("Queen", "Innuendo"),
            Song::new("Abba", "Waterloo"),
            Song::new("Abba", "SOS"),
        ];
        songs.sort();
        assert_eq!(
            songs,
            vec![
                Song::new("Abba", "SOS"),
                Song::new("Abba", "Waterloo"),
                Song::new("Queen", "Innuendo"),
            ]
        );
    }

    #[test]
    fn chart_resolves_from_display_name() {
        assert_eq!(MusicChart::from_name("Top 40"), Some(MusicChart::Top40));
        assert_eq!(
            MusicChart::from_name("tipparade"),
            Some(MusicChart::Tipparade)
        );
        assert_eq!(MusicChart::from_name("Billboard"), None);
    }

    #[test]
    fn match_rate_ignores_songs_already_present() {
        let report = SyncReport {
            songs: 10,
            already_present: 6,
            matched: 3,
            unmatched: 1,
            ..Default::default()
        };
        assert_eq!(report.match_rate(), 75.0);
    }
}

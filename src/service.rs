//! The two top-level workflows: keeping the chart store current and filling
//! a year playlist from it.

use std::time::Instant;

use anyhow::Result;
use chrono::{Datelike, Local};
use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::catalog::{CatalogError, MusicCatalog};
use crate::compare::SongComparator;
use crate::fetch::DocumentFetcher;
use crate::models::{MusicChart, Song, SyncReport};
use crate::progress;
use crate::scrape::ChartScraper;
use crate::store::ChartStore;

/// ISO weeks per year, upper bound.
const MAX_WEEKS_PER_YEAR: u8 = 53;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOutcome {
    pub weeks_visited: usize,
    pub entries_stored: usize,
}

/// Brings the chart store up to date with the published charts.
///
/// Scraping resumes where the store left off; the highest stored week is
/// scraped again because chart pages receive late corrections.
pub struct ChartService<'a> {
    scraper: &'a dyn ChartScraper,
    store: &'a mut ChartStore,
}

impl<'a> ChartService<'a> {
    pub fn new(scraper: &'a dyn ChartScraper, store: &'a mut ChartStore) -> Self {
        Self { scraper, store }
    }

    /// Scrape all missing weeks of the given charts, up to the current ISO
    /// week. `fetcher_for` decides where a week's page comes from, so runs
    /// can be pointed at the live site or at saved fixtures.
    pub fn update<F>(&mut self, charts: &[MusicChart], fetcher_for: F) -> Result<ScrapeOutcome>
    where
        F: Fn(MusicChart, i32, u8) -> Box<dyn DocumentFetcher>,
    {
        let today = Local::now();
        let current_year = today.iso_week().year();
        let current_week = today.iso_week().week() as u8;

        let mut outcome = ScrapeOutcome::default();
        for &chart in charts {
            let first_year = match self.store.highest_year_stored(chart)? {
                Some(year) => year,
                None => chart.year_started(),
            };
            for year in first_year..=current_year {
                let first_week = match self.store.highest_week_stored(chart, year)? {
                    // scrape the newest stored week again, it may have been corrected
                    Some(week) => week,
                    None if year == chart.year_started() => chart.week_started(),
                    None => 1,
                };
                let last_week = if year == current_year {
                    current_week
                } else {
                    MAX_WEEKS_PER_YEAR
                };
                if first_week > last_week {
                    continue;
                }

                let pb = progress::create_progress_bar(
                    u64::from(last_week - first_week) + 1,
                    &format!("{chart} {year}"),
                );
                for week in first_week..=last_week {
                    let fetcher = fetcher_for(chart, year, week);
                    let entries = self.scraper.scrape(fetcher.as_ref())?;
                    if !entries.is_empty() {
                        self.store.upsert_all(&entries)?;
                        outcome.entries_stored += entries.len();
                    }
                    outcome.weeks_visited += 1;
                    pb.inc(1);
                }
                pb.finish_and_clear();
            }
        }
        info!(
            "scrape finished: {} weeks visited, {} entries stored",
            outcome.weeks_visited, outcome.entries_stored
        );
        Ok(outcome)
    }
}

/// Fills a playlist with the catalog tracks for a year's charted songs.
pub struct PlaylistService<'a> {
    catalog: &'a dyn MusicCatalog,
    comparator: SongComparator,
}

impl<'a> PlaylistService<'a> {
    pub fn new(catalog: &'a dyn MusicCatalog) -> Self {
        Self {
            catalog,
            comparator: SongComparator::default(),
        }
    }

    pub fn with_comparator(catalog: &'a dyn MusicCatalog, comparator: SongComparator) -> Self {
        Self { catalog, comparator }
    }

    /// Make sure every given song is in the named playlist, resolving songs
    /// through the catalog. Idempotent: songs whose equivalent is already in
    /// the playlist are skipped, and a track is never added twice.
    pub fn fill_playlist(
        &self,
        playlist_name: &str,
        songs: &[Song],
    ) -> Result<SyncReport, CatalogError> {
        let start = Instant::now();
        let mut report = SyncReport {
            playlist_name: playlist_name.to_string(),
            songs: songs.len(),
            ..Default::default()
        };
        if songs.is_empty() {
            return Ok(report);
        }

        let playlist = self.catalog.get_or_create_playlist(playlist_name)?;
        let existing = self.catalog.tracks_in_playlist(&playlist)?;

        // membership is a pure comparison over all (song, existing) pairs
        let (present, missing): (Vec<&Song>, Vec<&Song>) = songs.par_iter().partition(|song| {
            existing
                .iter()
                .any(|have| self.comparator.same(&have.song, song))
        });
        report.already_present = present.len();

        let mut known_ids: FxHashSet<String> =
            existing.iter().map(|have| have.track_id.clone()).collect();
        let mut to_add = Vec::new();
        let pb = progress::create_progress_bar(missing.len() as u64, "Resolving songs");
        for song in missing {
            match self.catalog.find_song(song)? {
                Some(found) => {
                    report.matched += 1;
                    // two chart spellings can resolve to the same track
                    if known_ids.insert(found.track_id.clone()) {
                        to_add.push(found);
                    }
                }
                None => {
                    report.unmatched += 1;
                    debug!("no catalog match for {song}");
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if !to_add.is_empty() {
            self.catalog.add_to_playlist(&playlist, &to_add)?;
        }
        report.added = to_add.len();
        report.elapsed_seconds = start.elapsed().as_secs_f64();

        if report.unmatched > 0 {
            warn!(
                "{} of {} looked-up songs had no catalog match ({:.1}% matched)",
                report.unmatched,
                report.matched + report.unmatched,
                report.match_rate()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryQueryCache;
    use crate::catalog::SqliteCatalog;
    use crate::fetch::FetchError;
    use crate::models::ChartEntry;
    use std::sync::Mutex;

    struct LocationFetcher(String);

    impl DocumentFetcher for LocationFetcher {
        fn fetch(&self) -> Result<Option<String>, FetchError> {
            Ok(Some(self.0.clone()))
        }

        fn location(&self) -> &str {
            &self.0
        }
    }

    /// Records which (year, week) pages were requested; every page yields
    /// one new-release entry.
    struct RecordingScraper {
        calls: Mutex<Vec<(i32, u8)>>,
    }

    impl RecordingScraper {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChartScraper for RecordingScraper {
        fn supported_charts(&self) -> &[MusicChart] {
            &[MusicChart::Top40]
        }

        fn url_for(&self, _chart: MusicChart, year: i32, week: u8) -> String {
            format!("{year}/{week}")
        }

        fn scrape(&self, fetcher: &dyn DocumentFetcher) -> Result<Vec<ChartEntry>> {
            let location = fetcher.fetch()?.unwrap();
            let (year, week) = location.split_once('/').unwrap();
            let year: i32 = year.parse()?;
            let week: u8 = week.parse()?;
            self.calls.lock().unwrap().push((year, week));
            Ok(vec![ChartEntry {
                chart: MusicChart::Top40,
                year,
                week,
                position: 1,
                is_new_release: true,
                song: Song::new(format!("Artist {year}"), format!("Week {week}")),
            }])
        }
    }

    #[test]
    fn update_resumes_from_the_highest_stored_week() {
        let today = Local::now();
        let year = today.iso_week().year();
        let week = today.iso_week().week() as u8;

        let mut store = ChartStore::open_in_memory().unwrap();
        store.create_schema_if_needed().unwrap();
        store
            .upsert_all(&[ChartEntry {
                chart: MusicChart::Top40,
                year,
                week,
                position: 1,
                is_new_release: false,
                song: Song::new("Stored", "Earlier"),
            }])
            .unwrap();

        let scraper = RecordingScraper::new();
        let outcome = ChartService::new(&scraper, &mut store)
            .update(scraper.supported_charts(), |_chart, year, week| {
                Box::new(LocationFetcher(format!("{year}/{week}")))
            })
            .unwrap();

        // only the current week is scraped again
        assert_eq!(*scraper.calls.lock().unwrap(), vec![(year, week)]);
        assert_eq!(outcome.weeks_visited, 1);
        assert_eq!(outcome.entries_stored, 1);

        // the re-scrape replaced the stored entry
        assert_eq!(
            store.songs_for_year(year).unwrap(),
            vec![Song::new(format!("Artist {year}"), format!("Week {week}"))]
        );
    }

    fn catalog_with_tracks() -> SqliteCatalog {
        let catalog = SqliteCatalog::open_in_memory(Box::new(MemoryQueryCache::new())).unwrap();
        catalog
            .add_track("uri:waterloo", "Abba", "Waterloo", 70)
            .unwrap();
        catalog
            .add_track("uri:arms-open", "The Script", "Arms Open", 60)
            .unwrap();
        catalog
    }

    #[test]
    fn fill_playlist_adds_matches_and_reports_the_rest() {
        let catalog = catalog_with_tracks();
        let service = PlaylistService::new(&catalog);
        let songs = vec![
            Song::new("ABBA", "Waterloo"),
            Song::new("The Scr!pt", "Arms Open"),
            Song::new("Unknown Act", "Never Released"),
        ];

        let report = service.fill_playlist("2018 charted songs", &songs).unwrap();
        assert_eq!(report.songs, 3);
        assert_eq!(report.already_present, 0);
        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.added, 2);

        let playlist = catalog.get_or_create_playlist("2018 charted songs").unwrap();
        assert_eq!(catalog.tracks_in_playlist(&playlist).unwrap().len(), 2);
    }

    #[test]
    fn fill_playlist_is_idempotent() {
        let catalog = catalog_with_tracks();
        let service = PlaylistService::new(&catalog);
        let songs = vec![
            Song::new("ABBA", "Waterloo"),
            Song::new("The Script", "Arms Open"),
        ];

        service.fill_playlist("2018 charted songs", &songs).unwrap();
        let report = service.fill_playlist("2018 charted songs", &songs).unwrap();

        assert_eq!(report.already_present, 2);
        assert_eq!(report.matched, 0);
        assert_eq!(report.added, 0);
    }

    #[test]
    fn duplicate_resolutions_add_the_track_once() {
        let catalog = catalog_with_tracks();
        let service = PlaylistService::new(&catalog);
        // both spellings resolve to the same track
        let songs = vec![
            Song::new("The Script", "Arms Open"),
            Song::new("Scr!pt", "Arms Open"),
        ];

        let report = service.fill_playlist("2018 charted songs", &songs).unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.added, 1);
    }

    #[test]
    fn empty_song_list_yields_an_empty_report() {
        let catalog = catalog_with_tracks();
        let report = PlaylistService::new(&catalog)
            .fill_playlist("2018 charted songs", &[])
            .unwrap();
        assert_eq!(report.songs, 0);
        assert_eq!(report.added, 0);
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chartfix::cache::{MemoryQueryCache, QueryCache, SqliteQueryCache};
use chartfix::catalog::{MusicCatalog, SqliteCatalog};
use chartfix::fetch::{DocumentFetcher, FileFetcher, HttpFetcher};
use chartfix::models::{MusicChart, Song};
use chartfix::progress;
use chartfix::scrape::{ChartScraper, Top40Scraper};
use chartfix::service::{ChartService, PlaylistService};
use chartfix::store::ChartStore;

#[derive(Parser)]
#[command(name = "chartfix")]
#[command(about = "Scrape weekly music charts and keep year playlists in sync with a catalog")]
struct Args {
    /// Hide progress bars for tail-friendly output
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the chart database up to date with the published charts
    Scrape {
        /// Chart database
        db: PathBuf,

        /// Read chart pages from saved files in this directory instead of
        /// fetching them from the chart website
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Scrape only this chart, by display name (e.g. "Top 40")
        #[arg(long)]
        chart: Option<String>,
    },

    /// Fill a year playlist with the catalog tracks of that year's charted songs
    Sync {
        /// Chart database written by `scrape`
        db: PathBuf,

        /// Catalog database
        catalog: PathBuf,

        #[arg(long)]
        year: i32,

        /// Persistent query cache; lookups are not cached across runs when omitted
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Write the sync report to this JSON file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Look up a single song in the catalog
    Search {
        /// Catalog database
        catalog: PathBuf,

        #[arg(long)]
        artist: String,

        #[arg(long)]
        title: String,
    },
}

fn fixture_path(dir: &Path, chart: MusicChart, year: i32, week: u8) -> PathBuf {
    dir.join(format!("{}-{year}-week-{week}.html", chart.slug()))
}

fn scrape(db: &Path, fixtures: Option<&Path>, chart: Option<&str>) -> Result<()> {
    let start = Instant::now();

    let mut store = ChartStore::open(db)?;
    if store.create_schema_if_needed()? {
        println!("Created new chart database: {:?}", db);
    }

    let scraper = Top40Scraper;
    let charts: Vec<MusicChart> = match chart {
        Some(name) => vec![MusicChart::from_name(name)
            .with_context(|| format!("unknown chart '{name}'"))?],
        None => scraper.supported_charts().to_vec(),
    };
    let outcome =
        ChartService::new(&scraper, &mut store).update(&charts, |chart, year, week| {
            match fixtures {
                Some(dir) => Box::new(FileFetcher::new(fixture_path(dir, chart, year, week)))
                    as Box<dyn DocumentFetcher>,
                None => Box::new(HttpFetcher::new(scraper.url_for(chart, year, week))),
            }
        })?;

    println!("\n{:=<60}", "");
    println!("Scrape complete!");
    println!("  Weeks visited: {}", outcome.weeks_visited);
    println!("  Entries stored: {}", outcome.entries_stored);
    println!(
        "  Elapsed: {}",
        progress::format_duration(start.elapsed())
    );
    println!("{:=<60}", "");
    Ok(())
}

fn open_cache(path: Option<&Path>) -> Result<Box<dyn QueryCache>> {
    Ok(match path {
        Some(path) => Box::new(SqliteQueryCache::open(path)?),
        None => Box::new(MemoryQueryCache::new()),
    })
}

fn sync(
    db: &Path,
    catalog: &Path,
    year: i32,
    cache: Option<&Path>,
    report_file: Option<&Path>,
) -> Result<()> {
    let store = ChartStore::open(db)?;
    let songs = store.songs_for_year(year)?;
    println!("Found {} charted songs for {}", songs.len(), year);

    let catalog = SqliteCatalog::open(catalog, open_cache(cache)?)?;
    let playlist_name = format!("{year} charted songs");
    let report = PlaylistService::new(&catalog).fill_playlist(&playlist_name, &songs)?;

    println!("\n{:=<60}", "");
    println!("Sync complete for playlist '{}'", report.playlist_name);
    println!("  Songs: {}", report.songs);
    println!("  Already present: {}", report.already_present);
    println!("  Matched: {}", report.matched);
    println!("  Unmatched: {}", report.unmatched);
    println!("  Added: {}", report.added);
    println!("  Match rate: {:.1}%", report.match_rate());
    println!("{:=<60}", "");

    if let Some(path) = report_file {
        report
            .write_to_file(path)
            .with_context(|| format!("writing sync report {}", path.display()))?;
        println!("Report written to {:?}", path);
    }
    Ok(())
}

fn search(catalog: &Path, artist: &str, title: &str) -> Result<()> {
    let catalog = SqliteCatalog::open(catalog, Box::new(MemoryQueryCache::new()))?;
    let song = Song::new(artist, title);
    match catalog.find_song(&song)? {
        Some(found) => println!("{} -> {}", found.song, found.track_id),
        None => println!("No catalog match for {}", song),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    progress::set_log_only(args.log_only);

    match args.command {
        Command::Scrape {
            db,
            fixtures,
            chart,
        } => scrape(&db, fixtures.as_deref(), chart.as_deref()),
        Command::Sync {
            db,
            catalog,
            year,
            cache,
            report,
        } => sync(&db, &catalog, year, cache.as_deref(), report.as_deref()),
        Command::Search {
            catalog,
            artist,
            title,
        } => search(&catalog, &artist, &title),
    }
}

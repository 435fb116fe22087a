//! Extraction of chart entries from weekly top40.nl pages.
//!
//! One page is one (chart, year, week) edition. The page layout identifies
//! entries by a list-item block: the dot icon carries the position (a dash
//! marks songs no longer listed, which are skipped), the song-details block
//! carries artist and title, and the second stat column reads "1" for songs
//! in their first charted week.

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::fetch::DocumentFetcher;
use crate::models::{ChartEntry, MusicChart, Song};

/// Turns a fetched chart page into [`ChartEntry`] records.
pub trait ChartScraper {
    fn supported_charts(&self) -> &[MusicChart];

    fn url_for(&self, chart: MusicChart, year: i32, week: u8) -> String;

    /// An empty vec means the edition does not exist (fetcher returned no
    /// page); a fetch failure propagates.
    fn scrape(&self, fetcher: &dyn DocumentFetcher) -> Result<Vec<ChartEntry>>;
}

static LIST_ITEMS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div#chart-list div:not(.no-longer-listed) > div.listItem").unwrap()
});
static POSITION: Lazy<Selector> = Lazy::new(|| Selector::parse("div.dot-icon").unwrap());
static SONG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.song-details h3.title").unwrap());
static SONG_ARTIST: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.song-details p.artist").unwrap());
static CHART_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.hitlist li.active h1").unwrap());
static STAT_COLUMNS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.statcolumn strong").unwrap());
static PAGE_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// The page title reads like "... week 7, 2018".
static WEEK_IN_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"week (\d{1,2}), ").unwrap());

pub struct Top40Scraper;

impl Top40Scraper {
    /// Parameters: chart slug, year, week number. The earliest edition is
    /// Top 40 1965 week 1; some years start with week 2.
    const URL_TEMPLATE: &'static str = "https://www.top40.nl/{chart}/{year}/week-{week}";

    fn entries(&self, page: &Html) -> Result<Vec<ChartEntry>> {
        let chart_name = chart_name(page)?;
        let chart = MusicChart::from_name(&chart_name)
            .ok_or_else(|| anyhow!("page is for unknown chart '{chart_name}'"))?;
        let year = year_of_chart(page)?;
        let week = week_of_chart(page)?;

        let items: Vec<ElementRef> = page.select(&LIST_ITEMS).collect();
        let mut entries = Vec::with_capacity(items.len());
        // index 0 is the header row
        for (index, item) in items.iter().enumerate().skip(1) {
            if !is_chart_entry(item) {
                continue;
            }
            match chart_entry(item, chart, year, week) {
                Ok(entry) => entries.push(entry),
                // one broken row must not lose the rest of the week
                Err(e) => error!("skipping malformed row {index} of {chart} {year} week {week}: {e:#}"),
            }
        }
        info!("scraped week {week} of {chart_name} {year} ({} entries)", entries.len());
        Ok(entries)
    }
}

impl ChartScraper for Top40Scraper {
    fn supported_charts(&self) -> &[MusicChart] {
        &MusicChart::ALL
    }

    fn url_for(&self, chart: MusicChart, year: i32, week: u8) -> String {
        Self::URL_TEMPLATE
            .replace("{chart}", chart.slug())
            .replace("{year}", &year.to_string())
            .replace("{week}", &week.to_string())
    }

    fn scrape(&self, fetcher: &dyn DocumentFetcher) -> Result<Vec<ChartEntry>> {
        let Some(html) = fetcher.fetch()? else {
            debug!("no chart published at {}", fetcher.location());
            return Ok(Vec::new());
        };
        let page = Html::parse_document(&html);
        self.entries(&page)
    }
}

fn first_text(element: &ElementRef, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|found| found.text().collect::<String>().trim().to_string())
}

fn chart_name(page: &Html) -> Result<String> {
    first_text(&page.root_element(), &CHART_NAME)
        .ok_or_else(|| anyhow!("chart name heading not found"))
}

fn page_title(page: &Html) -> Result<String> {
    first_text(&page.root_element(), &PAGE_TITLE).ok_or_else(|| anyhow!("page has no title"))
}

fn week_of_chart(page: &Html) -> Result<u8> {
    let title = page_title(page)?;
    let captures = WEEK_IN_TITLE
        .captures(&title)
        .ok_or_else(|| anyhow!("week number not found in page title '{title}'"))?;
    captures[1].parse().context("week number")
}

fn year_of_chart(page: &Html) -> Result<i32> {
    // the page title ends with the four-digit year
    let title = page_title(page)?;
    let year = title
        .get(title.len().saturating_sub(4)..)
        .ok_or_else(|| anyhow!("page title '{title}' too short for a year"))?;
    year.parse()
        .with_context(|| format!("year at end of page title '{title}'"))
}

/// A dash in the dot icon marks a song that is no longer listed.
fn is_chart_entry(item: &ElementRef) -> bool {
    matches!(first_text(item, &POSITION), Some(text) if text != "-")
}

fn chart_entry(item: &ElementRef, chart: MusicChart, year: i32, week: u8) -> Result<ChartEntry> {
    let title = first_text(item, &SONG_TITLE).ok_or_else(|| anyhow!("row has no song title"))?;
    let artist = first_text(item, &SONG_ARTIST).ok_or_else(|| anyhow!("row has no artist"))?;
    let position: u8 = first_text(item, &POSITION)
        .ok_or_else(|| anyhow!("row has no position"))?
        .parse()
        .context("chart position")?;
    Ok(ChartEntry {
        chart,
        year,
        week,
        position,
        is_new_release: is_new_in_chart(item),
        song: Song::new(artist, title),
    })
}

fn is_new_in_chart(item: &ElementRef) -> bool {
    // the second stat column holds the number of weeks in the chart
    let stat_columns: Vec<String> = item
        .select(&STAT_COLUMNS)
        .map(|e| e.text().collect::<String>().trim().to_string())
        .collect();
    stat_columns.len() >= 2 && stat_columns[1] == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;

    struct StaticFetcher(Option<&'static str>);

    impl DocumentFetcher for StaticFetcher {
        fn fetch(&self) -> Result<Option<String>, FetchError> {
            Ok(self.0.map(str::to_string))
        }

        fn location(&self) -> &str {
            "static"
        }
    }

    const WEEK_PAGE: &str = r#"<html>
<head><title>Top 40 week 7, 2018</title></head>
<body>
<ul class="hitlist"><li class="active"><h1>Top 40</h1></li></ul>
<div id="chart-list">
  <div><div class="listItem">header row</div></div>
  <div><div class="listItem">
    <div class="dot-icon">1</div>
    <div class="song-details"><h3 class="title">Arms Open</h3><p class="artist">The Script</p></div>
    <div class="statcolumn"><strong>3</strong></div>
    <div class="statcolumn"><strong>1</strong></div>
  </div></div>
  <div><div class="listItem">
    <div class="dot-icon">2</div>
    <div class="song-details"><h3 class="title">Groeten uit Brabant</h3><p class="artist">New Kids</p></div>
    <div class="statcolumn"><strong>1</strong></div>
    <div class="statcolumn"><strong>5</strong></div>
  </div></div>
  <div><div class="listItem">
    <div class="dot-icon">-</div>
    <div class="song-details"><h3 class="title">Gone</h3><p class="artist">Nobody</p></div>
  </div></div>
</div>
</body></html>"#;

    #[test]
    fn scrapes_entries_with_position_artist_and_title() {
        let entries = Top40Scraper.scrape(&StaticFetcher(Some(WEEK_PAGE))).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].chart, MusicChart::Top40);
        assert_eq!(entries[0].year, 2018);
        assert_eq!(entries[0].week, 7);
        assert_eq!(entries[0].position, 1);
        assert_eq!(entries[0].song, Song::new("The Script", "Arms Open"));
        assert!(entries[0].is_new_release);

        assert_eq!(entries[1].position, 2);
        assert!(!entries[1].is_new_release);
    }

    #[test]
    fn unlisted_rows_are_skipped() {
        let entries = Top40Scraper.scrape(&StaticFetcher(Some(WEEK_PAGE))).unwrap();
        assert!(entries.iter().all(|e| e.song.artist != "Nobody"));
    }

    #[test]
    fn missing_page_yields_no_entries() {
        let entries = Top40Scraper.scrape(&StaticFetcher(None)).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn url_is_built_from_chart_slug_year_and_week() {
        assert_eq!(
            Top40Scraper.url_for(MusicChart::Top40, 2018, 7),
            "https://www.top40.nl/top40/2018/week-7"
        );
        assert_eq!(
            Top40Scraper.url_for(MusicChart::Tipparade, 1967, 28),
            "https://www.top40.nl/tipparade/1967/week-28"
        );
    }
}

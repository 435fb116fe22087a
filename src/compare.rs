//! Fuzzy equivalence over songs and catalog songs.
//!
//! Exact string comparison fails constantly on chart data (credits ordering,
//! "feat." noise, stylized spellings), so equivalence is decided with
//! Jaro-Winkler similarity over the normalized keyword strings. A false
//! positive merges two different songs and a false negative re-adds a
//! duplicate, so the thresholds here are deliberate and covered by tests.

use std::cmp::Ordering;

use anyhow::{ensure, Result};
use log::debug;

use crate::models::{CatalogSong, SearchHit, Song};
use crate::normalize::{self, KeywordSet};
use crate::query;

/// Default similarity a field must reach on its own.
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.99;

/// Default similarity the other field may fall back to when one clears
/// [`DEFAULT_HIGH_THRESHOLD`].
pub const DEFAULT_MID_THRESHOLD: f64 = 0.92;

/// Default whole-query threshold for [`CatalogSongComparator`].
pub const DEFAULT_QUERY_THRESHOLD: f64 = 0.99;

/// Jaro-Winkler similarity in `[0, 1]`, symmetric, `1.0` for identical input.
///
/// Empty input is pinned explicitly so the result never depends on a metric
/// implementation detail: two empty strings are identical, an empty and a
/// non-empty string share nothing.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(a, b)
}

fn keywords_joined(words: &KeywordSet) -> String {
    words
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Song comparator
// ============================================================================

/// Decides whether two textual song descriptions refer to the same song.
///
/// `compare` returns `Ordering::Equal` for "same song"; otherwise it falls
/// back to the song's natural order so the comparator stays usable for
/// sorting and set membership. Holds nothing but its two thresholds and is
/// safe for unsynchronized concurrent use.
#[derive(Clone, Copy, Debug)]
pub struct SongComparator {
    high: f64,
    mid: f64,
}

impl SongComparator {
    /// Build a comparator with custom thresholds.
    ///
    /// Fails fast on a nonsensical configuration: both thresholds must lie
    /// in `(0, 1]` with `mid <= high`.
    pub fn new(high: f64, mid: f64) -> Result<Self> {
        ensure!(
            high > 0.0 && high <= 1.0,
            "high threshold {high} outside (0, 1]"
        );
        ensure!(
            mid > 0.0 && mid <= high,
            "mid threshold {mid} outside (0, high={high}]"
        );
        Ok(Self { high, mid })
    }

    /// `Ordering::Equal` means "treat as the same song".
    ///
    /// A pair is equivalent when one field's similarity clears the high
    /// threshold and the other at least the mid threshold: one field may
    /// legitimately score lower due to truncation or credits reordering
    /// while the other is near-perfect. Requiring both to clear the high
    /// bar produced too many false negatives.
    pub fn compare(&self, a: &Song, b: &Song) -> Ordering {
        let artist_similarity = similarity(&artist_of(a), &artist_of(b));
        let title_similarity = similarity(&title_of(a), &title_of(b));

        let assumed_same = artist_similarity >= self.high && title_similarity >= self.mid
            || title_similarity >= self.high && artist_similarity >= self.mid;
        if assumed_same {
            debug!(
                "artist: {artist_similarity:.4}, title: {title_similarity:.4} similar:\n{a}\n{b}"
            );
            Ordering::Equal
        } else {
            a.cmp(b)
        }
    }

    /// Convenience equality test over [`compare`](Self::compare).
    pub fn same(&self, a: &Song, b: &Song) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl Default for SongComparator {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_THRESHOLD,
            mid: DEFAULT_MID_THRESHOLD,
        }
    }
}

fn artist_of(song: &Song) -> String {
    keywords_joined(&normalize::normalize_artist(song))
}

fn title_of(song: &Song) -> String {
    keywords_joined(&normalize::normalize_title(song))
}

// ============================================================================
// Catalog song comparator
// ============================================================================

/// Comparator over catalog-resolved songs.
///
/// Equal track identifiers short-circuit to equality: the catalog is
/// authoritative once a link exists. The textual fallback compares the two
/// full composed query strings against a single, stricter threshold; it is
/// a safety net for songs whose catalog linkage failed to resolve equality.
#[derive(Clone, Copy, Debug)]
pub struct CatalogSongComparator {
    threshold: f64,
}

impl CatalogSongComparator {
    pub fn new(threshold: f64) -> Result<Self> {
        ensure!(
            threshold > 0.0 && threshold <= 1.0,
            "query threshold {threshold} outside (0, 1]"
        );
        Ok(Self { threshold })
    }

    pub fn compare(&self, a: &CatalogSong, b: &CatalogSong) -> Ordering {
        if a.track_id == b.track_id {
            return Ordering::Equal;
        }
        let query_similarity = similarity(
            &query::compose_query(&a.song),
            &query::compose_query(&b.song),
        );
        if query_similarity >= self.threshold {
            debug!("{query_similarity:.4} similar: {} / {}", a.song, b.song);
            Ordering::Equal
        } else {
            a.song.cmp(&b.song)
        }
    }

    pub fn same(&self, a: &CatalogSong, b: &CatalogSong) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl Default for CatalogSongComparator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QUERY_THRESHOLD,
        }
    }
}

// ============================================================================
// Best-candidate selection
// ============================================================================

/// Pick the best catalog candidate for `song`: a single pass keeping the
/// highest popularity, first-seen winning ties (upstream search order is
/// preserved, not re-sorted). The winner is wrapped together with the
/// *original* song, not the candidate's own spelling, so the result stays
/// comparable to the input without re-normalizing catalog text.
pub fn select_best<I>(song: &Song, candidates: I) -> Option<CatalogSong>
where
    I: IntoIterator<Item = SearchHit>,
{
    let mut best: Option<SearchHit> = None;
    for candidate in candidates {
        let better = best
            .as_ref()
            .is_none_or(|current| candidate.popularity > current.popularity);
        if better {
            best = Some(candidate);
        }
    }
    best.map(|hit| CatalogSong::new(song.clone(), hit.track_id))
}

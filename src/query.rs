//! Search query composition from normalized keyword sets.
//!
//! The catalog search understands a `track:` field prefix for title keywords;
//! bare keywords are matched against the artist. When a full query returns
//! nothing, a minimized variant keeps only the longest (assumed most
//! discriminating) keywords for one retry.

use crate::models::Song;
use crate::normalize::{self, KeywordSet};

/// Field prefix that scopes keywords to the track title. Artist keywords
/// carry no prefix.
const TRACK_TITLE_FIELD: &str = "track";

/// Keywords shorter than this are dropped when minimizing a query.
const MIN_KEYWORD_LEN: usize = 4;

/// Cap on keywords kept per clause when minimizing a query.
const MAX_MINIMIZED_KEYWORDS: usize = 2;

/// The normalized keyword sets of one song, ready for composition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryWords {
    pub artist: KeywordSet,
    pub title: KeywordSet,
}

impl QueryWords {
    pub fn for_song(song: &Song) -> Self {
        Self {
            artist: normalize::normalize_artist(song),
            title: normalize::normalize_title(song),
        }
    }

    /// The full query string: `"<artist words> track:<title words>"`, with
    /// either clause omitted entirely when its keyword set is empty.
    pub fn normalized(&self) -> String {
        let artist: Vec<&str> = self.artist.iter().map(String::as_str).collect();
        let title: Vec<&str> = self.title.iter().map(String::as_str).collect();
        as_query_string(&artist, &title)
    }

    /// Fallback query for when [`normalized`](Self::normalized) found nothing.
    ///
    /// Per clause: sets with more than one keyword keep only keywords of at
    /// least [`MIN_KEYWORD_LEN`] characters, longest first, capped at
    /// [`MAX_MINIMIZED_KEYWORDS`]; if that filter empties the set, the
    /// original set is used unchanged. Single-keyword sets pass through.
    pub fn minimized(&self) -> String {
        let artist = filter_and_select_by_word_size(&self.artist);
        let title = filter_and_select_by_word_size(&self.title);
        let artist: Vec<&str> = artist.iter().map(|s| s.as_str()).collect();
        let title: Vec<&str> = title.iter().map(|s| s.as_str()).collect();
        as_query_string(&artist, &title)
    }
}

/// Compose the full search query for a song.
pub fn compose_query(song: &Song) -> String {
    QueryWords::for_song(song).normalized()
}

/// Compose the minimized fallback query from already-normalized keyword sets.
pub fn minimize_query(artist: &KeywordSet, title: &KeywordSet) -> String {
    QueryWords {
        artist: artist.clone(),
        title: title.clone(),
    }
    .minimized()
}

fn filter_and_select_by_word_size(words: &KeywordSet) -> Vec<String> {
    if words.len() <= 1 {
        return words.iter().cloned().collect();
    }
    let mut longer: Vec<String> = words
        .iter()
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .cloned()
        .collect();
    // stable sort: equal lengths stay in the set's alphabetical order
    longer.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    longer.truncate(MAX_MINIMIZED_KEYWORDS);
    if longer.is_empty() {
        // all keywords were short; better a broad retry than none at all
        words.iter().cloned().collect()
    } else {
        longer
    }
}

fn as_query_string(artist_words: &[&str], title_words: &[&str]) -> String {
    let mut query = String::new();
    if !artist_words.is_empty() {
        query.push_str(&artist_words.join(" "));
    }
    if !title_words.is_empty() {
        if !query.is_empty() {
            query.push(' ');
        }
        query.push_str(TRACK_TITLE_FIELD);
        query.push(':');
        query.push_str(&title_words.join(" "));
    }
    query
}

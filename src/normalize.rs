//! Keyword normalization for noisy artist and title strings.
//!
//! Chart pages and the catalog spell the same song differently: credits
//! ordering, "feat." noise, radio-edit suffixes, stylized spellings like
//! "Scr!pt". Everything downstream (query composition and the song
//! comparators) works on the keyword sets produced here, so the tables in
//! this module are the single place where that noise is removed.

use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

use crate::models::Song;

/// Alphabetically ordered set of lower-case keywords for one side of a song.
///
/// The ordering carries no meaning; it makes output deterministic and test
/// assertions easy.
pub type KeywordSet = BTreeSet<String>;

// All table entries are lower case; input is lower-cased before lookup.

/// Credit markers that connect a lead artist to featured artists, including
/// the Dutch "met medewerking van" abbreviations seen on chart pages.
static CREDITS_NOISE_WORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    ["feat", "feat.", "featuring", "ft.", "ft", "mmv", "m.m.v."]
        .into_iter()
        .collect()
});

static ARTIST_NOISE_WORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    ["the", "with", "and", "x", "+", "vs", "vs."]
        .into_iter()
        .collect()
});

static TITLE_NOISE_WORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    ["the", "a", "de", "-", "radio", "edit", "mix", "single"]
        .into_iter()
        .collect()
});

/// Stylized artist spellings mapped to the spelling the catalog uses.
/// Applied per token, after noise-word removal.
static ARTIST_ALIASES: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    m.insert("atc", "a touch of class");
    m.insert("beegees", "bee gees");
    m.insert("scr!pt", "script");
    m.insert("p!nk", "pink");
    m.insert("abba*teens", "a*teens");
    m
});

/// Characters stripped from titles before tokenization. Deliberately a plain
/// character list, not locale-aware punctuation rules.
const TITLE_PUNCTUATION: &str = ",.!?'\"";

/// Normalize the artist field of a song into its keyword set.
///
/// Tokens matching artist or credits noise words are dropped, then each
/// surviving token is run through the alias table. An empty artist field
/// yields an empty set.
pub fn normalize_artist(song: &Song) -> KeywordSet {
    split_to_lowercase_words(&song.artist)
        .into_iter()
        .filter(|word| {
            !ARTIST_NOISE_WORDS.contains(word.as_str())
                && !CREDITS_NOISE_WORDS.contains(word.as_str())
        })
        .map(resolve_alias)
        .collect()
}

/// Normalize the title field of a song into its keyword set.
///
/// Double-A-sides ("Song One/Song Two") keep only the first side. After
/// punctuation stripping and noise-word removal, any token that also appears
/// in the normalized artist set of the same song is removed, so artist names
/// repeated in title credits cannot inflate title similarity.
pub fn normalize_title(song: &Song) -> KeywordSet {
    let title = single_side_of_double_a_side(&song.title);
    let title = strip_punctuation(title);
    let artist_words = normalize_artist(song);
    split_to_lowercase_words(&title)
        .into_iter()
        .filter(|word| {
            !TITLE_NOISE_WORDS.contains(word.as_str())
                && !CREDITS_NOISE_WORDS.contains(word.as_str())
                && !artist_words.contains(word)
        })
        .collect()
}

fn single_side_of_double_a_side(title: &str) -> &str {
    match title.find('/') {
        Some(index) => &title[..index],
        None => title,
    }
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| !TITLE_PUNCTUATION.contains(*c))
        .collect()
}

fn resolve_alias(word: String) -> String {
    match ARTIST_ALIASES.get(word.as_str()) {
        Some(&alias) => alias.to_string(),
        None => word,
    }
}

fn split_to_lowercase_words(field: &str) -> KeywordSet {
    field
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | '&'))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

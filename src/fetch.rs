//! Obtaining chart pages as raw HTML.
//!
//! The scraper never cares where a page came from: [`HttpFetcher`] pulls it
//! from the chart website, [`FileFetcher`] reads a saved copy for tests and
//! offline runs. A page that does not exist (a chart week that was never
//! published) is a valid empty result, not a failure; an unreachable host is
//! a distinct error that callers must see.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("host unavailable while fetching {location}: {reason}")]
    HostUnavailable { location: String, reason: String },
}

pub trait DocumentFetcher {
    /// Retrieve the page at this fetcher's location.
    ///
    /// `Ok(None)` means the page does not exist; errors are reserved for an
    /// unreachable or misbehaving source.
    fn fetch(&self) -> Result<Option<String>, FetchError>;

    /// Human-readable location, for diagnostics.
    fn location(&self) -> &str;
}

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/118.0";

/// Network-backed fetcher for chart pages.
pub struct HttpFetcher {
    url: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn unavailable(&self, reason: impl ToString) -> FetchError {
        FetchError::HostUnavailable {
            location: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch(&self) -> Result<Option<String>, FetchError> {
        match ureq::get(&self.url).set("User-Agent", USER_AGENT).call() {
            Ok(response) => response
                .into_string()
                .map(Some)
                .map_err(|e| self.unavailable(e)),
            // a week that was never published is an empty result, not a failure
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// Fixture-backed fetcher reading a saved chart page from disk.
pub struct FileFetcher {
    path: PathBuf,
    location: String,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }
}

impl DocumentFetcher for FileFetcher {
    fn fetch(&self) -> Result<Option<String>, FetchError> {
        if !self.path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|e| FetchError::HostUnavailable {
                location: self.location.clone(),
                reason: e.to_string(),
            })
    }

    fn location(&self) -> &str {
        &self.location
    }
}

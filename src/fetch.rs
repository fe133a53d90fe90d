//! Byte fetching for paths and URLs
//!
//! Everything the crate reads (descriptors, registries, profiles, CSV data)
//! goes through the [`Fetch`] trait so callers can swap the transport.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::config::FetchSettings;
use crate::error::FetchError;
use crate::location::is_url;

/// Source of raw bytes for a filesystem path or HTTP(S) URL
pub trait Fetch: Send + Sync {
    /// Read the whole document at `location`
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;

    /// Whether `location` can be read
    fn exists(&self, location: &str) -> bool {
        self.fetch(location).is_ok()
    }
}

/// Reads local files from disk and URLs over blocking HTTP
pub struct DefaultFetcher {
    client: Client,
}

impl fmt::Debug for DefaultFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultFetcher").finish_non_exhaustive()
    }
}

impl DefaultFetcher {
    /// Fetcher with no request timeout
    pub fn new() -> Result<Self, FetchError> {
        Self::with_settings(&FetchSettings::default())
    }

    /// Fetcher configured from [`FetchSettings`]
    pub fn with_settings(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(settings.timeout_secs.map(Duration::from_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client { message: e.to_string() })?;

        Ok(Self { client })
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(url, "fetching");
        let response = self.client.get(url).send().map_err(|e| FetchError::Network {
            location: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                location: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network {
                location: url.to_string(),
                message: e.to_string(),
            })
    }

    fn fetch_file(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let path = Path::new(location);
        if !path.is_file() {
            return Err(FetchError::NotFound {
                location: location.to_string(),
            });
        }
        fs::read(path).map_err(|source| FetchError::Io {
            location: location.to_string(),
            source,
        })
    }
}

impl Fetch for DefaultFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        if is_url(location) {
            self.fetch_url(location)
        } else {
            self.fetch_file(location)
        }
    }

    fn exists(&self, location: &str) -> bool {
        if is_url(location) {
            self.client
                .head(location)
                .send()
                .map(|r| r.status().is_success())
                .unwrap_or(false)
        } else {
            Path::new(location).is_file()
        }
    }
}

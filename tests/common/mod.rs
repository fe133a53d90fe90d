//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use datapackage::{Fetch, FetchError, Registry};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route crate logs to the test writer; filter with RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture(relative: &str) -> String {
    fixtures_path().join(relative).to_string_lossy().to_string()
}

/// Serves canned HTTP responses; everything else is read from disk
#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, (u16, Vec<u8>)>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.to_string(), (200, body.into()));
        self
    }

    /// Serve the contents of a fixture file at `url`
    pub fn respond_with_fixture(self, url: &str, relative: &str) -> Self {
        let body = fs::read(fixtures_path().join(relative)).unwrap();
        self.respond(url, body)
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), (status, Vec::new()));
        self
    }

    pub fn into_arc(self) -> Arc<dyn Fetch> {
        Arc::new(self)
    }
}

impl Fetch for FakeFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return match self.responses.get(location) {
                Some((200, body)) => Ok(body.clone()),
                Some((status, _)) => Err(FetchError::Http {
                    location: location.to_string(),
                    status: *status,
                    reason: reason(*status).to_string(),
                }),
                None => Err(FetchError::Http {
                    location: location.to_string(),
                    status: 404,
                    reason: "Not Found".to_string(),
                }),
            };
        }

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

fn reason(status: u16) -> &'static str {
    match status {
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Bundled registry reading everything else through `fetcher`
pub fn registry_with(fetcher: Arc<dyn Fetch>) -> Arc<Registry> {
    Arc::new(Registry::bundled_with(fetcher).unwrap())
}

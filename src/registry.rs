//! Profile Registry
//!
//! A registry is a JSON array of profile records mapping an id such as
//! `tabular-data-resource` to the location of its JSON Schema:
//!
//! ```json
//! [
//!   {
//!     "id": "data-package",
//!     "title": "Data Package",
//!     "schema": "https://specs.frictionlessdata.io/schemas/data-package.json",
//!     "schema_path": "data-package.json",
//!     "specification": "https://specs.frictionlessdata.io/data-package/"
//!   }
//! ]
//! ```
//!
//! A copy of the standard registry and its schemas is embedded in the crate,
//! so the common profiles resolve without network access.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::fetch::{DefaultFetcher, Fetch};
use crate::location::is_url;

static BUNDLED_PROFILES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/profiles");

const BUNDLED_REGISTRY: &str = "registry.json";

/// One record of a registry document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// URL of the schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Schema path relative to the registry file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
}

/// Where the registry document came from
#[derive(Debug, Clone)]
enum Origin {
    Bundled,
    /// Absolute path of the registry file
    Local(PathBuf),
    Remote,
}

/// Catalog of profiles with lazily loaded schemas
pub struct Registry {
    origin: Origin,
    profiles: Vec<ProfileMetadata>,
    fetcher: Arc<dyn Fetch>,
    /// Schemas loaded so far, by profile id
    cache: Mutex<HashMap<String, Arc<Value>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("origin", &self.origin)
            .field("profiles", &self.profiles.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Open a registry from a local path or URL
    pub fn open(source: &str) -> Result<Self, RegistryError> {
        Self::open_with(source, Arc::new(DefaultFetcher::new()?))
    }

    /// Open a registry, reading it and its schemas through `fetcher`
    pub fn open_with(source: &str, fetcher: Arc<dyn Fetch>) -> Result<Self, RegistryError> {
        let origin = if is_url(source) {
            Origin::Remote
        } else {
            let not_found = || RegistryError::NotFound {
                location: source.to_string(),
            };
            if !Path::new(source).is_file() {
                return Err(not_found());
            }
            Origin::Local(fs::canonicalize(source).map_err(|_| not_found())?)
        };

        let bytes = fetcher.fetch(source)?;
        let profiles = parse_records(&bytes, source)?;
        info!(source, profiles = profiles.len(), "loaded profile registry");

        Ok(Self {
            origin,
            profiles,
            fetcher,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// The registry embedded in the crate
    pub fn bundled() -> Result<Self, RegistryError> {
        Self::bundled_with(Arc::new(DefaultFetcher::new()?))
    }

    /// The embedded registry, with `fetcher` used for anything not embedded
    pub fn bundled_with(fetcher: Arc<dyn Fetch>) -> Result<Self, RegistryError> {
        let file = BUNDLED_PROFILES
            .get_file(BUNDLED_REGISTRY)
            .ok_or_else(|| RegistryError::NotFound {
                location: BUNDLED_REGISTRY.to_string(),
            })?;
        let profiles = parse_records(file.contents(), BUNDLED_REGISTRY)?;
        debug!(profiles = profiles.len(), "loaded bundled registry");

        Ok(Self {
            origin: Origin::Bundled,
            profiles,
            fetcher,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Absolute directory of a local registry file. `None` for URL and bundled registries.
    pub fn base_path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Local(path) => path.parent(),
            Origin::Bundled | Origin::Remote => None,
        }
    }

    /// All profile records, in registry order
    pub fn available_profiles(&self) -> &[ProfileMetadata] {
        &self.profiles
    }

    /// The record for `id`, if the registry has one
    pub fn metadata(&self, id: &str) -> Option<&ProfileMetadata> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Fetcher used for registry schemas, shared with profiles that come from here
    pub fn fetcher(&self) -> &Arc<dyn Fetch> {
        &self.fetcher
    }

    /// Schema for profile `id`. `None` when the registry has no such profile.
    pub fn get(&self, id: &str) -> Result<Option<Arc<Value>>, RegistryError> {
        if let Some(schema) = self.cache.lock().ok().and_then(|c| c.get(id).cloned()) {
            return Ok(Some(schema));
        }

        let Some(metadata) = self.metadata(id) else {
            return Ok(None);
        };

        let schema = Arc::new(self.load_schema(metadata)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(id.to_string(), Arc::clone(&schema));
        }
        Ok(Some(schema))
    }

    fn load_schema(&self, metadata: &ProfileMetadata) -> Result<Value, RegistryError> {
        let id = &metadata.id;

        if let Some(schema_path) = &metadata.schema_path {
            match &self.origin {
                Origin::Local(_) => {
                    if let Some(path) = self.base_path().map(|base| base.join(schema_path)) {
                        if path.is_file() {
                            let bytes = self
                                .fetcher
                                .fetch(&path.to_string_lossy())
                                .map_err(|source| RegistryError::SchemaFetch { id: id.clone(), source })?;
                            return parse_schema(&bytes, id);
                        }
                    }
                }
                Origin::Bundled => {
                    if let Some(file) = BUNDLED_PROFILES.get_file(schema_path) {
                        debug!(id = %id, "using bundled schema");
                        return parse_schema(file.contents(), id);
                    }
                }
                Origin::Remote => {}
            }
        }

        let url = metadata
            .schema
            .as_deref()
            .ok_or_else(|| RegistryError::NoSchemaLocation { id: id.clone() })?;
        debug!(id = %id, url, "fetching profile schema");
        let bytes = self
            .fetcher
            .fetch(url)
            .map_err(|source| RegistryError::SchemaFetch { id: id.clone(), source })?;
        parse_schema(&bytes, id)
    }
}

fn parse_records(bytes: &[u8], location: &str) -> Result<Vec<ProfileMetadata>, RegistryError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| RegistryError::Json {
        location: location.to_string(),
        source,
    })?;

    let Value::Array(records) = value else {
        return Err(RegistryError::NotAnArray {
            location: location.to_string(),
        });
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            if record.get("id").and_then(Value::as_str).is_none() {
                return Err(RegistryError::MissingId {
                    location: location.to_string(),
                    index,
                });
            }
            serde_json::from_value(record).map_err(|source| RegistryError::Json {
                location: location.to_string(),
                source,
            })
        })
        .collect()
}

fn parse_schema(bytes: &[u8], id: &str) -> Result<Value, RegistryError> {
    serde_json::from_slice(bytes).map_err(|source| RegistryError::SchemaJson {
        id: id.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_bundled_registry() {
        let registry = Registry::bundled().unwrap();
        assert!(registry.base_path().is_none());

        let ids: Vec<_> = registry.available_profiles().iter().map(|p| p.id.as_str()).collect();
        for id in [
            "data-package",
            "tabular-data-package",
            "data-resource",
            "tabular-data-resource",
            "table-schema",
            "csv-dialect",
        ] {
            assert!(ids.contains(&id), "missing {}", id);
        }

        let schema = registry.get("data-package").unwrap().unwrap();
        assert_eq!(schema["title"], "Data Package");
    }

    #[test]
    fn test_get_unknown_is_none() {
        let registry = Registry::bundled().unwrap();
        assert!(registry.get("non-existent-profile").unwrap().is_none());
    }

    #[test]
    fn test_local_registry_schema_path() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("registry.json"),
            r#"[{"id": "base", "schema_path": "base_profile.json"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("base_profile.json"), r#"{"title": "base_profile"}"#).unwrap();

        let registry = Registry::open(&dir.path().join("registry.json").to_string_lossy()).unwrap();
        assert_eq!(registry.base_path(), Some(fs::canonicalize(dir.path()).unwrap().as_path()));

        let schema = registry.get("base").unwrap().unwrap();
        assert_eq!(schema["title"], "base_profile");

        // Cached copy is returned even if the file goes away
        fs::remove_file(dir.path().join("base_profile.json")).unwrap();
        assert!(registry.get("base").unwrap().is_some());
    }

    #[test]
    fn test_record_without_id_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, r#"[{"id": "ok"}, {"title": "no id"}]"#).unwrap();

        let err = Registry::open(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(err, RegistryError::MissingId { index: 1, .. }));
    }

    #[test]
    fn test_missing_and_malformed_registries() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("nope.json");
        assert!(matches!(
            Registry::open(&missing.to_string_lossy()),
            Err(RegistryError::NotFound { .. })
        ));

        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"id": "data-package"}"#).unwrap();
        assert!(matches!(
            Registry::open(&object.to_string_lossy()),
            Err(RegistryError::NotAnArray { .. })
        ));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            Registry::open(&garbage.to_string_lossy()),
            Err(RegistryError::Json { .. })
        ));
    }
}

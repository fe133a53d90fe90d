//! Data Packages
//!
//! A package is a descriptor with metadata plus an ordered list of resources.
//! Packages load from an in-memory mapping, a descriptor file, a directory,
//! a URL or a zip archive (local or remote).
//!
//! Resources are materialized on first access. An entry that fails to load
//! does not fail the package; it is kept as a [`DeadResource`] and written
//! back unchanged on [`Package::save`].

use std::cell::OnceCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::{self, ExtractedArchive};
use crate::config::{InferSettings, Settings};
use crate::defaults::{DEFAULT_FILENAME, DEFAULT_PACKAGE_PROFILE};
use crate::error::{PackageError, ProfileError, ResourceError, ValidationError};
use crate::fetch::{DefaultFetcher, Fetch};
use crate::location::{is_url, join_resource_path, url_parent};
use crate::profile::{Profile, ValidationIssue};
use crate::reference::Dereferencer;
use crate::registry::Registry;
use crate::resource::{infer_descriptor, Resource};

const TABULAR_PACKAGE_PROFILE: &str = "tabular-data-package";

/// Options for [`Package::new`]
#[derive(Clone)]
pub struct PackageOptions {
    /// Base path or URL for resources, overriding the one derived from the location
    pub base: Option<String>,
    /// Descriptor filename appended to directories and base URLs
    pub default_filename: String,
    /// Registry for profile lookups; the bundled registry when unset
    pub registry: Option<Arc<Registry>>,
    /// Fetcher for descriptors and data; the registry's fetcher when unset
    pub fetcher: Option<Arc<dyn Fetch>>,
    pub infer: InferSettings,
}

impl fmt::Debug for PackageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageOptions")
            .field("base", &self.base)
            .field("default_filename", &self.default_filename)
            .field("registry", &self.registry)
            .field("fetcher", &self.fetcher.is_some())
            .field("infer", &self.infer)
            .finish()
    }
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            base: None,
            default_filename: DEFAULT_FILENAME.to_string(),
            registry: None,
            fetcher: None,
            infer: InferSettings::default(),
        }
    }
}

impl PackageOptions {
    /// Options from loaded [`Settings`]: configured fetcher, registry and defaults
    pub fn from_settings(settings: &Settings) -> Result<Self, PackageError> {
        let fetcher: Arc<dyn Fetch> = Arc::new(DefaultFetcher::with_settings(&settings.fetch)?);
        let registry = match &settings.registry.source {
            Some(source) => Registry::open_with(source, Arc::clone(&fetcher)),
            None => Registry::bundled_with(Arc::clone(&fetcher)),
        }
        .map_err(ProfileError::from)?;

        Ok(Self {
            base: None,
            default_filename: settings.package.default_filename.clone(),
            registry: Some(Arc::new(registry)),
            fetcher: Some(fetcher),
            infer: settings.infer,
        })
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_default_filename(mut self, filename: impl Into<String>) -> Self {
        self.default_filename = filename.into();
        self
    }
}

/// A resource entry that could not be loaded
#[derive(Debug)]
pub struct DeadResource {
    /// Position in the descriptor's `resources` array
    pub index: usize,
    pub descriptor: Value,
    pub error: ResourceError,
}

#[derive(Debug, Default)]
struct ResourceSet {
    live: Vec<Resource>,
    dead: Vec<DeadResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct License {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Raw source the package was built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageSource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Typed view of the package metadata. Anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<License>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PackageSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A data package
pub struct Package {
    /// Metadata, without `resources`
    descriptor: Map<String, Value>,
    /// `resources` as loaded, consumed on first access
    raw_resources: Vec<Value>,
    /// `resources` that isn't an array, kept verbatim so it fails validation
    malformed_resources: Option<Value>,
    resources: OnceCell<ResourceSet>,
    location: Option<String>,
    base_override: Option<String>,
    default_filename: String,
    infer: InferSettings,
    fetcher: Arc<dyn Fetch>,
    registry: Arc<Registry>,
    profile: Profile,
    /// Keeps an extracted zip alive for the package's lifetime
    archive: Option<ExtractedArchive>,
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("location", &self.location)
            .field("profile", &self.profile.name())
            .field("archive", &self.archive.as_ref().map(|a| a.root().to_path_buf()))
            .finish_non_exhaustive()
    }
}

impl Package {
    /// Load a package.
    ///
    /// `input` is `None` for an empty package, a JSON object for an in-memory
    /// descriptor, or a string naming a descriptor file, directory, URL or zip.
    pub fn new(input: Option<Value>, options: PackageOptions) -> Result<Self, PackageError> {
        let fetcher: Arc<dyn Fetch> = match (&options.fetcher, &options.registry) {
            (Some(fetcher), _) => Arc::clone(fetcher),
            (None, Some(registry)) => Arc::clone(registry.fetcher()),
            (None, None) => Arc::new(DefaultFetcher::new()?),
        };
        let registry = match &options.registry {
            Some(registry) => Arc::clone(registry),
            None => Arc::new(Registry::bundled_with(Arc::clone(&fetcher)).map_err(ProfileError::from)?),
        };

        let (mut descriptor, location, archive) = match input {
            None => (Map::new(), None, None),
            Some(Value::Object(map)) => (map, None, None),
            Some(Value::String(source)) => {
                let loaded = read_location(&source, &options.default_filename, fetcher.as_ref())?;
                (loaded.descriptor, Some(loaded.location), loaded.archive)
            }
            Some(_) => return Err(PackageError::InvalidDescriptor),
        };

        descriptor
            .entry("profile")
            .or_insert_with(|| json!(DEFAULT_PACKAGE_PROFILE));
        let profile = Profile::with_registry(&descriptor["profile"], &registry)?;

        let (raw_resources, malformed_resources) = match descriptor.remove("resources") {
            Some(Value::Array(items)) => (items, None),
            Some(other) => {
                warn!("package `resources` is not an array");
                (Vec::new(), Some(other))
            }
            None => (Vec::new(), None),
        };

        info!(
            location = location.as_deref().unwrap_or("<memory>"),
            profile = profile.name(),
            resources = raw_resources.len(),
            "loaded package"
        );

        Ok(Self {
            descriptor,
            raw_resources,
            malformed_resources,
            resources: OnceCell::new(),
            location,
            base_override: options.base,
            default_filename: options.default_filename,
            infer: options.infer,
            fetcher,
            registry,
            profile,
            archive,
        })
    }

    /// Load from a descriptor file, directory, URL or zip with default options
    pub fn open(location: &str) -> Result<Self, PackageError> {
        Self::new(Some(Value::String(location.to_string())), PackageOptions::default())
    }

    /// Wrap an in-memory descriptor
    pub fn from_descriptor(descriptor: Value) -> Result<Self, PackageError> {
        Self::new(Some(descriptor), PackageOptions::default())
    }

    pub fn empty() -> Result<Self, PackageError> {
        Self::new(None, PackageOptions::default())
    }

    /// Where the descriptor was read from
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn fetcher(&self) -> &dyn Fetch {
        self.fetcher.as_ref()
    }

    /// Metadata, without `resources`
    pub fn descriptor(&self) -> &Map<String, Value> {
        &self.descriptor
    }

    /// Base path or URL that resource paths resolve against.
    ///
    /// The `base` option wins; otherwise the descriptor's directory, or its
    /// URL minus the last segment. Empty for in-memory packages.
    pub fn base(&self) -> String {
        if let Some(base) = &self.base_override {
            return base.clone();
        }
        match &self.location {
            None => String::new(),
            Some(location) if is_url(location) => url_parent(location),
            Some(location) => match Path::new(location).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().to_string(),
                _ => ".".to_string(),
            },
        }
    }

    /// Whether the package was loaded from memory or the local filesystem
    pub fn local(&self) -> bool {
        self.location.as_deref().map_or(true, |l| !is_url(l))
    }

    /// `path` resolved against [`Package::base`]
    pub fn resolve(&self, path: &str) -> String {
        join_resource_path(&self.base(), path)
    }

    /// Properties the profile declares, other than `resources` and `profile`
    pub fn declared_properties(&self) -> Vec<String> {
        self.profile
            .properties()
            .into_iter()
            .filter(|p| p != "resources" && p != "profile")
            .collect()
    }

    /// Stored value of `key`, or a default matching the declared type
    /// (`[]` for arrays, `{}` for objects, `null` otherwise)
    pub fn property(&self, key: &str) -> Value {
        if key == "resources" {
            return self.resources_value();
        }
        if let Some(value) = self.descriptor.get(key) {
            return value.clone();
        }

        let declared = self
            .profile
            .schema()
            .get("properties")
            .and_then(|p| p.get(key))
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str);
        match declared {
            Some("array") => json!([]),
            Some("object") => json!({}),
            _ => Value::Null,
        }
    }

    /// Set a metadata property. Setting `profile` re-resolves the profile.
    pub fn set_property(&mut self, key: &str, value: Value) -> Result<(), PackageError> {
        match key {
            "resources" => return Err(PackageError::ReservedProperty(key.to_string())),
            "profile" => {
                self.profile = Profile::with_registry(&value, &self.registry)?;
            }
            _ => {}
        }
        self.descriptor.insert(key.to_string(), value);
        Ok(())
    }

    /// Typed metadata view
    pub fn metadata(&self) -> Result<PackageMetadata, PackageError> {
        serde_json::from_value(Value::Object(self.descriptor.clone())).map_err(PackageError::Metadata)
    }

    /// Resources that loaded, in descriptor order
    pub fn resources(&self) -> &[Resource] {
        &self.resource_set().live
    }

    /// Entries of `resources` that failed to load
    pub fn dead_resources(&self) -> &[DeadResource] {
        &self.resource_set().dead
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources().iter().find(|r| r.name() == Some(name))
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources().iter().filter_map(Resource::name).collect()
    }

    /// Package profile passes and every resource is valid
    pub fn valid(&self) -> bool {
        self.profile.valid(&self.to_value()) && self.resources().iter().all(Resource::valid)
    }

    /// Check the package descriptor itself against the package profile
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.profile.validate(&self.to_value())
    }

    /// Package errors, then each resource's errors under `/resources/<i>`
    pub fn iter_errors(&self) -> Vec<ValidationIssue> {
        let descriptor = self.to_value();
        let mut issues: Vec<_> = self.profile.iter_errors(&descriptor).collect();
        for (index, resource) in self.resource_positions().into_iter().zip(self.resources()) {
            let prefix = format!("/resources/{}", index);
            issues.extend(resource.iter_errors().map(|issue| issue.rebase(&prefix)));
        }
        issues
    }

    /// Append a resource, given as a descriptor or a path/URL to one.
    ///
    /// The package is re-validated afterwards; if it is no longer valid the
    /// addition is rolled back and `None` is returned.
    pub fn add_resource(&mut self, resource: Value) -> Result<Option<&Resource>, PackageError> {
        let base = self.base();
        let descriptor = match resource {
            Value::String(location) => Dereferencer::new(self.fetcher.as_ref())
                .resolve(&location, &base)
                .map_err(ResourceError::from)?,
            other => other,
        };

        let root = self.to_value();
        let resource = Resource::load(descriptor, &base, &self.registry, Some(&root))?;

        let mut set = self.take_resource_set();
        set.live.push(resource);
        self.resources = OnceCell::from(set);

        if !self.valid() {
            let mut set = self.take_resource_set();
            if let Some(rejected) = set.live.pop() {
                info!(name = rejected.name().unwrap_or(""), "resource invalid, rolled back");
            }
            self.resources = OnceCell::from(set);
            return Ok(None);
        }

        Ok(self.resources().last())
    }

    /// Remove the first resource named `name`
    pub fn remove_resource(&mut self, name: &str) -> Option<Resource> {
        let mut set = self.take_resource_set();
        let removed = set
            .live
            .iter()
            .position(|r| r.name() == Some(name))
            .map(|index| set.live.remove(index));
        self.resources = OnceCell::from(set);
        removed
    }

    /// Add a resource for every CSV file under `base_path/directory`.
    ///
    /// Resource paths are relative to `base_path`. Returns the number of
    /// resources added; files that can't be read or are rejected are skipped.
    /// Packages without a base adopt `base_path`.
    pub fn infer(&mut self, base_path: &str, directory: &str) -> Result<usize, PackageError> {
        if self.base().is_empty() {
            self.base_override = Some(base_path.to_string());
        }

        let root = Path::new(base_path).join(directory);
        let mut csv_files: Vec<PathBuf> = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|e| e.eq_ignore_ascii_case("csv")).unwrap_or(false))
            .collect();
        csv_files.sort();

        let mut added = 0;
        for path in csv_files {
            let relative = path
                .strip_prefix(base_path)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let descriptor = match infer_descriptor(base_path, &relative, &self.infer, self.fetcher.as_ref()) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(path = %relative, error = %e, "couldn't infer resource, skipping");
                    continue;
                }
            };
            match self.add_resource(descriptor) {
                Ok(Some(_)) => added += 1,
                Ok(None) => warn!(path = %relative, "inferred resource was rejected"),
                Err(e) => warn!(path = %relative, error = %e, "couldn't add inferred resource"),
            }
        }

        if added > 0 && self.resources().iter().all(Resource::tabular) {
            self.set_property("profile", json!(TABULAR_PACKAGE_PROFILE))?;
        }
        debug!(added, directory, "inferred resources");
        Ok(added)
    }

    /// Full descriptor: metadata plus resources, dead entries at their original positions
    pub fn to_value(&self) -> Value {
        let mut descriptor = self.descriptor.clone();
        descriptor.insert("resources".to_string(), self.resources_value());
        Value::Object(descriptor)
    }

    /// Write the descriptor as pretty JSON.
    ///
    /// Without a target, local packages are written back to their location.
    /// A directory target gets the default filename appended.
    pub fn save(&self, target: Option<&Path>) -> Result<PathBuf, PackageError> {
        let path = match target {
            Some(path) if path.is_dir() => path.join(&self.default_filename),
            Some(path) => path.to_path_buf(),
            None => match &self.location {
                Some(location) if !is_url(location) => PathBuf::from(location),
                _ => return Err(PackageError::NoSaveTarget),
            },
        };

        let content = serde_json::to_string_pretty(&self.to_value())?;
        fs::write(&path, content).map_err(|source| PackageError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        info!(path = %path.display(), "saved package");
        Ok(path)
    }

    /// Index of each live resource within the `resources` array of [`Package::to_value`]
    pub fn resource_positions(&self) -> Vec<usize> {
        let set = self.resource_set();
        let mut live = vec![true; set.live.len()];
        for dead in &set.dead {
            live.insert(dead.index.min(live.len()), false);
        }
        live.iter()
            .enumerate()
            .filter(|(_, is_live)| **is_live)
            .map(|(index, _)| index)
            .collect()
    }

    fn resources_value(&self) -> Value {
        if let Some(malformed) = &self.malformed_resources {
            return malformed.clone();
        }
        let set = self.resource_set();
        let mut items: Vec<Value> = set.live.iter().map(|r| r.descriptor().clone()).collect();
        for dead in &set.dead {
            items.insert(dead.index.min(items.len()), dead.descriptor.clone());
        }
        Value::Array(items)
    }

    fn resource_set(&self) -> &ResourceSet {
        self.resources.get_or_init(|| self.load_resources())
    }

    fn take_resource_set(&mut self) -> ResourceSet {
        match self.resources.take() {
            Some(set) => set,
            None => self.load_resources(),
        }
    }

    fn load_resources(&self) -> ResourceSet {
        let base = self.base();
        let mut root = self.descriptor.clone();
        root.insert("resources".to_string(), Value::Array(self.raw_resources.clone()));
        let root = Value::Object(root);

        let mut set = ResourceSet::default();
        for (index, raw) in self.raw_resources.iter().enumerate() {
            match self.load_resource(raw, &base, &root) {
                Ok(resource) => set.live.push(resource),
                Err(error) => {
                    warn!(index, error = %error, "resource failed to load");
                    set.dead.push(DeadResource {
                        index,
                        descriptor: raw.clone(),
                        error,
                    });
                }
            }
        }
        set
    }

    fn load_resource(&self, raw: &Value, base: &str, root: &Value) -> Result<Resource, ResourceError> {
        let descriptor = match raw {
            Value::String(location) => Dereferencer::new(self.fetcher.as_ref()).resolve(location, base)?,
            other => other.clone(),
        };
        Resource::load(descriptor, base, &self.registry, Some(root))
    }
}

struct LoadedDescriptor {
    descriptor: Map<String, Value>,
    location: String,
    archive: Option<ExtractedArchive>,
}

fn names_json(location: &str) -> bool {
    let path = location.split(|c: char| c == '?' || c == '#').next().unwrap_or(location);
    path.to_ascii_lowercase().ends_with(".json")
}

fn read_location(source: &str, default_filename: &str, fetcher: &dyn Fetch) -> Result<LoadedDescriptor, PackageError> {
    if archive::is_zip(source) {
        let bytes = fetcher.fetch(source)?;
        let extracted = archive::extract(&bytes, source, default_filename)?;
        let location = extracted.descriptor().to_string_lossy().to_string();
        let descriptor = read_descriptor(&location, fetcher)?;
        return Ok(LoadedDescriptor {
            descriptor,
            location,
            archive: Some(extracted),
        });
    }

    let location = if is_url(source) {
        if names_json(source) {
            source.to_string()
        } else {
            format!("{}/{}", source.trim_end_matches('/'), default_filename)
        }
    } else if Path::new(source).is_dir() {
        Path::new(source).join(default_filename).to_string_lossy().to_string()
    } else {
        source.to_string()
    };

    let descriptor = read_descriptor(&location, fetcher)?;
    Ok(LoadedDescriptor {
        descriptor,
        location,
        archive: None,
    })
}

fn read_descriptor(location: &str, fetcher: &dyn Fetch) -> Result<Map<String, Value>, PackageError> {
    let bytes = fetcher.fetch(location)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|source| PackageError::Json {
        location: location.to_string(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(PackageError::NotAnObject(location.to_string())),
    }
}

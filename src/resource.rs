//! Data Resources
//!
//! A resource points at one piece of data: inline JSON (`data`), a file
//! relative to the package (`path`), or a URL (`path` under a remote package,
//! or the legacy `url` property). Resources whose descriptor satisfies the
//! `tabular-data-resource` profile can be read as tables.

use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::InferSettings;
use crate::defaults::{
    self, DEFAULT_ENCODING, DEFAULT_FIELD_FORMAT, DEFAULT_FIELD_TYPE, DEFAULT_RESOURCE_PROFILE,
    TABULAR_RESOURCE_PROFILE,
};
use crate::error::{ProfileError, ResourceError, ValidationError};
use crate::fetch::Fetch;
use crate::interpreter::Interpreter;
use crate::location::{is_safe_path, is_url, join_resource_path};
use crate::profile::{Profile, ValidationIssue};
use crate::reference::Dereferencer;
use crate::registry::Registry;
use crate::table::Table;

static NO_SCHEMA: Value = Value::Null;

/// Where a resource's data lives
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Inline(Value),
    Local(PathBuf),
    Remote(String),
}

impl Source {
    pub fn source_type(&self) -> SourceType {
        match self {
            Source::Inline(_) => SourceType::Inline,
            Source::Local(_) => SourceType::Local,
            Source::Remote(_) => SourceType::Remote,
        }
    }

    /// Path or URL to read from; `None` for inline data
    pub fn location(&self) -> Option<String> {
        match self {
            Source::Inline(_) => None,
            Source::Local(path) => Some(path.to_string_lossy().to_string()),
            Source::Remote(url) => Some(url.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Inline,
    Local,
    Remote,
}

/// Raw resource contents
#[derive(Debug, PartialEq)]
pub enum ResourceData<'a> {
    Inline(&'a Value),
    Bytes(Vec<u8>),
}

/// A resource descriptor with its resolved profile and source
pub struct Resource {
    descriptor: Value,
    base_path: String,
    profile: Profile,
    source: Source,
    tabular: bool,
    registry: Arc<Registry>,
    table: OnceCell<Table>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name())
            .field("source", &self.source)
            .field("profile", &self.profile.name())
            .field("tabular", &self.tabular)
            .finish_non_exhaustive()
    }
}

impl Resource {
    /// Build a resource, resolving profiles against the bundled registry
    pub fn new(descriptor: Value, base_path: &str) -> Result<Self, ResourceError> {
        let registry = Arc::new(Registry::bundled().map_err(ProfileError::from)?);
        Self::load(descriptor, base_path, &registry, None)
    }

    /// Build a resource, resolving profiles against `registry`
    pub fn with_registry(descriptor: Value, base_path: &str, registry: &Arc<Registry>) -> Result<Self, ResourceError> {
        Self::load(descriptor, base_path, registry, None)
    }

    /// Build a resource inside a package. `root` is the package descriptor,
    /// which `#/...` references in `schema` and `dialect` resolve against.
    pub(crate) fn load(
        descriptor: Value,
        base_path: &str,
        registry: &Arc<Registry>,
        root: Option<&Value>,
    ) -> Result<Self, ResourceError> {
        if !descriptor.is_object() {
            return Err(ResourceError::NotAnObject);
        }
        let fetcher = registry.fetcher().as_ref();

        let mut dereferencer = Dereferencer::new(fetcher).reference_fields(["schema", "dialect"]);
        if let Some(root) = root {
            dereferencer = dereferencer.document(root);
        }
        let mut descriptor = dereferencer.dereference(&descriptor, base_path)?;

        if let Value::Object(map) = &mut descriptor {
            map.entry("profile").or_insert_with(|| json!(DEFAULT_RESOURCE_PROFILE));
            map.entry("encoding").or_insert_with(|| json!(DEFAULT_ENCODING));
        }

        let profile = Profile::with_registry(&descriptor["profile"], registry)?;
        let source = resolve_source(&descriptor, base_path)?;
        let tabular = is_tabular(&profile, &descriptor, registry);
        if tabular {
            apply_table_defaults(&mut descriptor);
        }

        let name = descriptor.get("name").and_then(Value::as_str).unwrap_or("");
        debug!(
            name,
            source = ?source.source_type(),
            tabular,
            "loaded resource"
        );

        Ok(Self {
            descriptor,
            base_path: base_path.to_string(),
            profile,
            source,
            tabular,
            registry: Arc::clone(registry),
            table: OnceCell::new(),
        })
    }

    /// Infer a tabular resource from a local CSV file
    pub fn infer(filepath: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let registry = Arc::new(Registry::bundled().map_err(ProfileError::from)?);
        Self::infer_with(filepath, &registry, &InferSettings::default())
    }

    pub fn infer_with(
        filepath: impl AsRef<Path>,
        registry: &Arc<Registry>,
        settings: &InferSettings,
    ) -> Result<Self, ResourceError> {
        let filepath = filepath.as_ref();
        let base = filepath
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let relative = filepath
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ResourceError::NotCsv(filepath.to_string_lossy().to_string()))?;

        let descriptor = infer_descriptor(&base, &relative, settings, registry.fetcher().as_ref())?;
        Self::load(descriptor, &base, registry, None)
    }

    /// The full descriptor, including applied defaults
    pub fn descriptor(&self) -> &Value {
        &self.descriptor
    }

    pub fn name(&self) -> Option<&str> {
        self.descriptor.get("name").and_then(Value::as_str)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn source_type(&self) -> SourceType {
        self.source.source_type()
    }

    /// Base path or URL that `path` was resolved against
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn inline(&self) -> bool {
        self.source_type() == SourceType::Inline
    }

    pub fn local(&self) -> bool {
        self.source_type() == SourceType::Local
    }

    pub fn remote(&self) -> bool {
        self.source_type() == SourceType::Remote
    }

    pub fn tabular(&self) -> bool {
        self.tabular
    }

    /// Whether the data behind the resource can be read
    pub fn exists(&self) -> bool {
        match &self.source {
            Source::Inline(_) => true,
            Source::Local(path) => path.is_file(),
            Source::Remote(url) => self.fetcher().exists(url),
        }
    }

    pub fn valid(&self) -> bool {
        self.profile.valid(&self.descriptor)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.profile.validate(&self.descriptor)
    }

    pub fn iter_errors(&self) -> impl Iterator<Item = ValidationIssue> + '_ {
        self.profile.iter_errors(&self.descriptor)
    }

    /// Inline value, or the bytes at the resource location
    pub fn data(&self) -> Result<ResourceData<'_>, ResourceError> {
        match &self.source {
            Source::Inline(value) => Ok(ResourceData::Inline(value)),
            Source::Local(path) => Ok(ResourceData::Bytes(self.fetcher().fetch(&path.to_string_lossy())?)),
            Source::Remote(url) => Ok(ResourceData::Bytes(self.fetcher().fetch(url)?)),
        }
    }

    /// The table, loaded on first access
    pub fn table(&self) -> Result<&Table, ResourceError> {
        self.require_tabular("table")?;
        if let Some(table) = self.table.get() {
            return Ok(table);
        }

        let dialect = self.descriptor.get("dialect").and_then(Value::as_object);
        let schema = self.descriptor.get("schema");
        let table = Table::open(&self.source, dialect, schema, self.fetcher())?;
        Ok(self.table.get_or_init(|| table))
    }

    pub fn headers(&self) -> Result<&[String], ResourceError> {
        self.require_tabular("headers")?;
        Ok(self.table()?.headers())
    }

    /// The table schema
    pub fn schema(&self) -> Result<&Value, ResourceError> {
        self.require_tabular("schema")?;
        Ok(self.descriptor.get("schema").unwrap_or(&NO_SCHEMA))
    }

    pub fn iter(&self, keyed: bool) -> Result<impl Iterator<Item = Value> + '_, ResourceError> {
        self.require_tabular("iter")?;
        Ok(self.table()?.iter(keyed))
    }

    pub fn read(&self, keyed: bool) -> Result<Vec<Value>, ResourceError> {
        self.require_tabular("read")?;
        Ok(self.table()?.read(keyed))
    }

    fn require_tabular(&self, operation: &'static str) -> Result<(), ResourceError> {
        if self.tabular {
            Ok(())
        } else {
            Err(ResourceError::NotTabular(operation))
        }
    }

    fn fetcher(&self) -> &dyn Fetch {
        self.registry.fetcher().as_ref()
    }
}

fn resolve_source(descriptor: &Value, base_path: &str) -> Result<Source, ResourceError> {
    if let Some(data) = descriptor.get("data").filter(|d| !d.is_null()) {
        return Ok(Source::Inline(data.clone()));
    }

    if let Some(path) = descriptor.get("path").filter(|p| !p.is_null()) {
        let Value::String(path) = path else {
            return Err(ResourceError::InvalidPath(path.to_string()));
        };
        if !is_safe_path(path) {
            return Err(ResourceError::UnsafePath(path.clone()));
        }
        let joined = join_resource_path(base_path, path);
        return Ok(if is_url(&joined) {
            Source::Remote(joined)
        } else {
            Source::Local(PathBuf::from(joined))
        });
    }

    if let Some(Value::String(url)) = descriptor.get("url") {
        return Ok(Source::Remote(url.clone()));
    }

    Err(ResourceError::MissingSource)
}

fn is_tabular(profile: &Profile, descriptor: &Value, registry: &Arc<Registry>) -> bool {
    if profile.name() == TABULAR_RESOURCE_PROFILE {
        return true;
    }
    match Profile::with_registry(&json!(TABULAR_RESOURCE_PROFILE), registry) {
        Ok(tabular) => tabular.valid(descriptor),
        Err(e) => {
            debug!(error = %e, "tabular profile unavailable");
            false
        }
    }
}

fn apply_table_defaults(descriptor: &mut Value) {
    let Value::Object(map) = descriptor else {
        return;
    };

    if let Some(Value::Object(schema)) = map.get_mut("schema") {
        schema
            .entry("missingValues")
            .or_insert_with(defaults::missing_values);
        if let Some(Value::Array(fields)) = schema.get_mut("fields") {
            for field in fields.iter_mut().filter_map(Value::as_object_mut) {
                field.entry("type").or_insert_with(|| json!(DEFAULT_FIELD_TYPE));
                field.entry("format").or_insert_with(|| json!(DEFAULT_FIELD_FORMAT));
            }
        }
    }

    if let Some(Value::Object(dialect)) = map.get_mut("dialect") {
        for (key, value) in defaults::dialect() {
            dialect.entry(key).or_insert(value);
        }
    }
}

/// Resource name derived from a file name: lower case, restricted characters
fn resource_name(relative: &str) -> String {
    let stem = Path::new(relative)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Descriptor for the CSV file at `relative` under `base_path`
pub fn infer_descriptor(
    base_path: &str,
    relative: &str,
    settings: &InferSettings,
    fetcher: &dyn Fetch,
) -> Result<Value, ResourceError> {
    let is_csv = Path::new(relative)
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(ResourceError::NotCsv(relative.to_string()));
    }

    let location = PathBuf::from(join_resource_path(base_path, relative));
    let dialect: Map<String, Value> = defaults::dialect();
    let table = Table::open(&Source::Local(location), Some(&dialect), None, fetcher)?;
    let fields = Interpreter::with_settings(&table, settings).fields();

    Ok(json!({
        "name": resource_name(relative),
        "path": relative,
        "profile": TABULAR_RESOURCE_PROFILE,
        "encoding": DEFAULT_ENCODING,
        "format": "csv",
        "mediatype": "text/csv",
        "schema": {"fields": fields},
    }))
}

//! Error types for descriptor loading and validation

use thiserror::Error;

use crate::profile::ValidationIssue;

/// Errors raised by a [`Fetch`](crate::fetch::Fetch) implementation
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{location} does not exist")]
    NotFound { location: String },

    #[error("{location} returned {status} {reason}")]
    Http {
        location: String,
        status: u16,
        reason: String,
    },

    #[error("Network error fetching {location}: {message}")]
    Network { location: String, message: String },

    #[error("IO error reading {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't build HTTP client: {message}")]
    Client { message: String },
}

impl FetchError {
    /// Whether the location simply does not exist (missing file or HTTP 404)
    pub fn is_not_found(&self) -> bool {
        match self {
            FetchError::NotFound { .. } => true,
            FetchError::Http { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// The path or URL that failed, empty when no request was made
    pub fn location(&self) -> &str {
        match self {
            FetchError::NotFound { location }
            | FetchError::Http { location, .. }
            | FetchError::Network { location, .. }
            | FetchError::Io { location, .. } => location,
            FetchError::Client { .. } => "",
        }
    }
}

/// Errors raised while dereferencing `$ref` and string references
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Unable to load reference: {0}")]
    Fetch(#[from] FetchError),

    #[error("Reference {location} is not valid JSON: {source}")]
    Json {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Couldn't resolve `{reference}`: segment `{segment}` not found")]
    Pointer { reference: String, segment: String },

    #[error("Reference `{reference}` resolved to nothing")]
    Empty { reference: String },

    #[error("Reference `{reference}` is cyclic")]
    Cycle { reference: String },
}

/// Errors raised while loading a profile registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry {location} does not exist")]
    NotFound { location: String },

    #[error("Couldn't fetch registry: {0}")]
    Fetch(#[from] FetchError),

    #[error("Registry {location} is not valid JSON: {source}")]
    Json {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Registry {location} must be a JSON array of profile records")]
    NotAnArray { location: String },

    #[error("Registry {location} has a record without an `id` (record {index})")]
    MissingId { location: String, index: usize },

    #[error("Profile `{id}` has neither a `schema` nor a `schema_path`")]
    NoSchemaLocation { id: String },

    #[error("Couldn't fetch schema for profile `{id}`: {source}")]
    SchemaFetch {
        id: String,
        #[source]
        source: FetchError,
    },

    #[error("Schema for profile `{id}` is not valid JSON: {source}")]
    SchemaJson {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while resolving a profile
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Profile must be a URL or registry identifier")]
    InvalidDescriptor,

    #[error("Couldn't find profile with id `{0}` in registry")]
    UnknownProfile(String),

    #[error("Profile URL returned {status} {reason} ({url})")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("Profile URL returned {message} ({url})")]
    Unreachable { url: String, message: String },

    #[error("Profile is not valid JSON ({location}): {source}")]
    NotJson {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Profile `{name}` is not a valid JSON Schema: {message}")]
    InvalidSchema { name: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A descriptor failed validation against its profile
#[derive(Error, Debug)]
#[error("Descriptor is not valid against profile `{profile}`: {message}")]
pub struct ValidationError {
    pub profile: String,
    /// Summary of the first violation
    pub message: String,
    pub issues: Vec<ValidationIssue>,
}

/// Errors raised while constructing or reading a resource
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Resource descriptor must be a JSON object")]
    NotAnObject,

    #[error("A resource descriptor must have a `path` or `data` property")]
    MissingSource,

    #[error("Resource path must be a string, got {0}")]
    InvalidPath(String),

    #[error("Resource path `{0}` is not safe: absolute paths and parent traversal are not allowed")]
    UnsafePath(String),

    #[error("{0} is not supported for non-tabular data")]
    NotTabular(&'static str),

    #[error("Only CSV files can be inferred: {0}")]
    NotCsv(String),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Couldn't read CSV from {location}: {source}")]
    Csv {
        location: String,
        #[source]
        source: csv::Error,
    },

    #[error("Inline data for resource `{0}` is not tabular")]
    InlineNotTabular(String),
}

/// Errors raised while loading, mutating or saving a package
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Package descriptor must be a JSON object, path or URL")]
    InvalidDescriptor,

    #[error("Couldn't load package: {0}")]
    Fetch(#[from] FetchError),

    #[error("Package {location} is not valid JSON: {source}")]
    Json {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Package {0} does not contain a JSON object")]
    NotAnObject(String),

    #[error("Couldn't extract package archive {location}: {source}")]
    Archive {
        location: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Package archive {archive} has no {filename}")]
    MissingDescriptor { archive: String, filename: String },

    #[error("Property `{0}` can't be set directly")]
    ReservedProperty(String),

    #[error("Package has no local location to save to")]
    NoSaveTarget,

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't serialize package: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Package metadata has an unexpected shape: {0}")]
    Metadata(#[source] serde_json::Error),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

//! Profiles
//!
//! A profile is a JSON Schema a descriptor claims to conform to. Profiles are
//! named either by registry id (`tabular-data-resource`) or by URL.

use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{FetchError, ProfileError, ValidationError};
use crate::location::is_url;
use crate::registry::Registry;

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub message: String,
    /// JSON pointer to the offending value, `""` for the root
    pub instance_path: String,
    /// JSON pointer to the failing schema keyword
    pub schema_path: String,
}

impl ValidationIssue {
    /// `#/…` fragment pointing at the offending value
    pub fn fragment(&self) -> String {
        format!("#{}", self.instance_path)
    }

    /// Move the issue under `prefix`, e.g. `/resources/2`
    pub fn rebase(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim_start_matches('#').trim_end_matches('/');
        self.instance_path = format!("{}{}", prefix, self.instance_path);
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.fragment(), self.message)
    }
}

impl From<jsonschema::ValidationError<'_>> for ValidationIssue {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        Self {
            message: error.to_string(),
            instance_path: error.instance_path.to_string(),
            schema_path: error.schema_path.to_string(),
        }
    }
}

/// A compiled JSON Schema plus the name it was resolved from
#[derive(Clone)]
pub struct Profile {
    name: String,
    schema: Value,
    validator: Arc<JSONSchema>,
    registry: Option<Arc<Registry>>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Resolve `descriptor` (a URL or id) against the bundled registry
    pub fn new(descriptor: &Value) -> Result<Self, ProfileError> {
        let registry = Arc::new(Registry::bundled()?);
        Self::with_registry(descriptor, &registry)
    }

    /// Resolve `descriptor` (a URL or id) against `registry`.
    ///
    /// URLs are fetched directly with the registry's fetcher.
    pub fn with_registry(descriptor: &Value, registry: &Arc<Registry>) -> Result<Self, ProfileError> {
        let Value::String(name) = descriptor else {
            return Err(ProfileError::InvalidDescriptor);
        };

        let schema = if is_url(name) {
            fetch_schema(registry, name)?
        } else {
            let schema = registry
                .get(name)?
                .ok_or_else(|| ProfileError::UnknownProfile(name.clone()))?;
            Value::clone(&schema)
        };

        let mut profile = Self::from_schema(name.clone(), schema)?;
        profile.registry = Some(Arc::clone(registry));
        debug!(profile = %name, "resolved profile");
        Ok(profile)
    }

    /// Profile over an in-memory schema
    pub fn from_schema(name: impl Into<String>, schema: Value) -> Result<Self, ProfileError> {
        let name = name.into();
        let validator = JSONSchema::compile(&schema).map_err(|e| ProfileError::InvalidSchema {
            name: name.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            name,
            schema,
            validator: Arc::new(validator),
            registry: None,
        })
    }

    /// Registry id or URL the profile was resolved from
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Registry the profile was resolved through, if any
    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    /// Whether `instance` conforms
    pub fn valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Check `instance`, summarising the first violation on failure
    pub fn validate(&self, instance: &Value) -> Result<(), ValidationError> {
        let issues: Vec<_> = self.iter_errors(instance).collect();
        match issues.first() {
            None => Ok(()),
            Some(first) => Err(ValidationError {
                profile: self.name.clone(),
                message: first.to_string(),
                issues,
            }),
        }
    }

    /// Every violation, produced lazily
    pub fn iter_errors<'a>(&'a self, instance: &'a Value) -> Box<dyn Iterator<Item = ValidationIssue> + 'a> {
        match self.validator.validate(instance) {
            Ok(()) => Box::new(std::iter::empty()),
            Err(errors) => Box::new(errors.map(ValidationIssue::from)),
        }
    }

    /// Top-level property names the schema declares
    pub fn properties(&self) -> Vec<String> {
        self.schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn fetch_schema(registry: &Registry, url: &str) -> Result<Value, ProfileError> {
    let bytes = registry.fetcher().fetch(url).map_err(|e| match e {
        FetchError::Http { status, reason, .. } => ProfileError::HttpStatus {
            url: url.to_string(),
            status,
            reason,
        },
        FetchError::NotFound { .. } => ProfileError::HttpStatus {
            url: url.to_string(),
            status: 404,
            reason: "Not Found".to_string(),
        },
        other => ProfileError::Unreachable {
            url: url.to_string(),
            message: other.to_string(),
        },
    })?;

    serde_json::from_slice(&bytes).map_err(|source| ProfileError::NotJson {
        location: url.to_string(),
        source,
    })
}

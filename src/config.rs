//! Configuration management for package loading
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (datapackage.toml)
//! - Environment variables (DATAPACKAGE__*)
//!
//! ## Example config file (datapackage.toml):
//! ```toml
//! [registry]
//! source = "https://specs.frictionlessdata.io/schemas/registry.json"
//!
//! [fetch]
//! timeout_secs = 30
//! user_agent = "datapackage-rs"
//!
//! [package]
//! default_filename = "datapackage.json"
//!
//! [infer]
//! threshold = 10
//! confidence = 0.75
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_FILENAME, INFER_CONFIDENCE, INFER_THRESHOLD};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Profile registry settings
    #[serde(default)]
    pub registry: RegistrySettings,

    /// HTTP fetch settings
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Package loading settings
    #[serde(default)]
    pub package: PackageSettings,

    /// Type inference settings
    #[serde(default)]
    pub infer: InferSettings,
}

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Path or URL of a registry document. The bundled registry is used when unset.
    #[serde(default)]
    pub source: Option<String>,
}

/// Fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Request timeout. Requests block indefinitely when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSettings {
    /// Descriptor filename appended to directories and base URLs
    #[serde(default = "default_filename")]
    pub default_filename: String,
}

/// Interpreter configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InferSettings {
    /// Maximum number of values inspected before a verdict can be reached
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Share of inspected values a type needs to be chosen
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

// Default value functions
fn default_user_agent() -> String {
    format!("datapackage-rs/{}", env!("CARGO_PKG_VERSION"))
}

fn default_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

fn default_threshold() -> usize {
    INFER_THRESHOLD
}

fn default_confidence() -> f64 {
    INFER_CONFIDENCE
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            default_filename: default_filename(),
        }
    }
}

impl Default for InferSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            confidence: default_confidence(),
        }
    }
}

impl Settings {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "datapackage.toml",
            ".datapackage.toml",
            "config/datapackage.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("io", "frictionlessdata", "datapackage") {
            let xdg_config = config_dir.config_dir().join("datapackage.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DATAPACKAGE__REGISTRY__SOURCE, DATAPACKAGE__INFER__THRESHOLD, ...
        builder = builder.add_source(
            Environment::with_prefix("DATAPACKAGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

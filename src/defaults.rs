//! Default values applied to descriptors

use serde_json::{json, Map, Value};

pub const DEFAULT_FILENAME: &str = "datapackage.json";
pub const DEFAULT_REGISTRY_URL: &str = "https://specs.frictionlessdata.io/schemas/registry.json";

pub const DEFAULT_PACKAGE_PROFILE: &str = "data-package";
pub const DEFAULT_RESOURCE_PROFILE: &str = "data-resource";
pub const TABULAR_RESOURCE_PROFILE: &str = "tabular-data-resource";
pub const DEFAULT_ENCODING: &str = "utf-8";

pub const DEFAULT_FIELD_TYPE: &str = "string";
pub const DEFAULT_FIELD_FORMAT: &str = "default";

pub const INFER_THRESHOLD: usize = 10;
pub const INFER_CONFIDENCE: f64 = 0.75;

/// Missing values assumed when a table schema declares none
pub fn missing_values() -> Value {
    json!([""])
}

/// CSV dialect defaults, merged into any dialect a tabular resource declares
pub fn dialect() -> Map<String, Value> {
    let mut dialect = Map::new();
    dialect.insert("delimiter".to_string(), json!(","));
    dialect.insert("doubleQuote".to_string(), json!(true));
    dialect.insert("lineTerminator".to_string(), json!("\r\n"));
    dialect.insert("quoteChar".to_string(), json!("\""));
    dialect.insert("escapeChar".to_string(), json!("\\"));
    dialect.insert("skipInitialSpace".to_string(), json!(true));
    dialect.insert("header".to_string(), json!(true));
    dialect.insert("caseSensitiveHeader".to_string(), json!(false));
    dialect
}

//! Package Validation Report
//!
//! Goes beyond profile validation to report on the package as a whole:
//!
//! 1. **Metadata**: profile violations of the package and every resource,
//!    CSV resources without a schema, and a warning when no licenses are declared
//! 2. **Integrity**: resources that failed to load, data that isn't there,
//!    a missing README.md, and CSV headers that disagree with the schema

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::package::Package;
use crate::resource::Resource;

/// What a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Descriptor content
    Metadata,
    /// Data the descriptor points at
    Integrity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub kind: MessageKind,
    pub message: String,
    /// `#/…` pointer into the package descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

/// Result of checking a package
#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    /// Whether warnings count against validity
    pub strict: bool,
}

impl ValidationReport {
    /// No errors, and in strict mode no warnings either
    pub fn valid(&self, strict: bool) -> bool {
        self.errors.is_empty() && (!strict || self.warnings.is_empty())
    }

    /// [`ValidationReport::valid`] in the mode the report was produced with
    pub fn is_valid(&self) -> bool {
        self.valid(self.strict)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, kind: MessageKind, message: impl Into<String>, fragment: Option<String>) {
        self.errors.push(Message {
            kind,
            message: message.into(),
            fragment,
        });
    }

    fn warning(&mut self, kind: MessageKind, message: impl Into<String>, fragment: Option<String>) {
        self.warnings.push(Message {
            kind,
            message: message.into(),
            fragment,
        });
    }
}

const MISSING_PREFIX: &str = "The package does not include a";

/// Check `package` and collect every error and warning
pub fn check(package: &Package, strict: bool) -> ValidationReport {
    let mut report = ValidationReport {
        strict,
        ..Default::default()
    };

    check_metadata(package, &mut report);

    for dead in package.dead_resources() {
        report.error(
            MessageKind::Integrity,
            format!("Resource could not be loaded: {}", dead.error),
            Some(format!("#/resources/{}", dead.index)),
        );
    }

    for (index, resource) in package.resource_positions().into_iter().zip(package.resources()) {
        check_resource(resource, &format!("#/resources/{}", index), &mut report);
    }

    debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        strict,
        "checked package"
    );
    report
}

fn check_metadata(package: &Package, report: &mut ValidationReport) {
    let descriptor = package.to_value();
    for issue in package.profile().iter_errors(&descriptor) {
        report.error(MessageKind::Metadata, issue.message.clone(), Some(issue.fragment()));
    }

    let has_licenses = package
        .property("licenses")
        .as_array()
        .map(|l| !l.is_empty())
        .unwrap_or(false);
    if !has_licenses {
        report.warning(
            MessageKind::Metadata,
            format!("{} 'licenses' property", MISSING_PREFIX),
            Some("#/".to_string()),
        );
    }

    if package.location().is_some() && !package.fetcher().exists(&package.resolve("README.md")) {
        report.warning(MessageKind::Integrity, format!("{} README.md file", MISSING_PREFIX), None);
    }
}

fn check_resource(resource: &Resource, path: &str, report: &mut ValidationReport) {
    for issue in resource.iter_errors() {
        let issue = issue.rebase(path);
        report.error(MessageKind::Metadata, issue.message.clone(), Some(issue.fragment()));
    }

    let csv = is_csv(resource);
    if csv && resource.descriptor().get("schema").is_none() {
        report.error(
            MessageKind::Metadata,
            format!("{} does not have a schema", resource.name().unwrap_or("Resource")),
            Some(path.to_string()),
        );
    }

    if resource.inline() {
        return;
    }
    if !resource.exists() {
        let location = resource.source().location().unwrap_or_default();
        report.error(
            MessageKind::Integrity,
            format!("Missing resource {}", location),
            Some(path.to_string()),
        );
        return;
    }

    if csv && resource.tabular() {
        check_headers(resource, path, report);
    }
}

fn is_csv(resource: &Resource) -> bool {
    let descriptor = resource.descriptor();
    descriptor.get("mediatype").and_then(Value::as_str) == Some("text/csv")
        || descriptor.get("format").and_then(Value::as_str) == Some("csv")
        || descriptor
            .get("path")
            .and_then(Value::as_str)
            .map(|p| p.to_ascii_lowercase().ends_with(".csv"))
            .unwrap_or(false)
}

fn check_headers(resource: &Resource, path: &str, report: &mut ValidationReport) {
    let fragment = Some(format!("{}/schema/fields", path));

    let declared: Vec<String> = match resource.schema().ok().and_then(|s| s.get("fields")).and_then(Value::as_array) {
        Some(fields) => fields
            .iter()
            .filter_map(|f| f.get("name").and_then(Value::as_str).map(str::to_string))
            .collect(),
        None => return,
    };

    let headers = match resource.headers() {
        Ok(headers) => headers,
        Err(e) => {
            report.error(MessageKind::Integrity, format!("Couldn't read CSV headers: {}", e), fragment);
            return;
        }
    };

    let header_set: HashSet<&str> = headers.iter().map(String::as_str).collect();
    let declared_set: HashSet<&str> = declared.iter().map(String::as_str).collect();

    let missing: Vec<&str> = declared
        .iter()
        .map(String::as_str)
        .filter(|f| !header_set.contains(f))
        .collect();
    if !missing.is_empty() {
        report.error(
            MessageKind::Integrity,
            format!("Declared schema has fields not present in CSV file ({})", missing.join(",")),
            fragment.clone(),
        );
    }

    let undeclared: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .filter(|h| !declared_set.contains(h))
        .collect();
    if !undeclared.is_empty() {
        report.error(
            MessageKind::Integrity,
            format!("CSV file has fields missing from schema ({})", undeclared.join(",")),
            fragment,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_clean_inline_package_warns_about_licenses() {
        let package = Package::from_descriptor(json!({
            "name": "clean",
            "resources": [{"name": "inline", "data": [1, 2]}]
        }))
        .unwrap();

        let report = check(&package, false);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].message, "The package does not include a 'licenses' property");
        assert!(report.is_valid());
        assert!(!report.valid(true));
    }

    #[test]
    fn test_missing_data_and_readme() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("datapackage.json"),
            r#"{
                "name": "missing",
                "licenses": [{"name": "ODC-PDDL-1.0"}],
                "resources": [{"name": "gone", "path": "gone.csv", "schema": {"fields": [{"name": "a"}]}}]
            }"#,
        )
        .unwrap();

        let package = Package::open(&dir.path().to_string_lossy()).unwrap();
        let report = check(&package, true);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, MessageKind::Integrity);
        assert!(report.errors[0].message.starts_with("Missing resource"));
        assert_eq!(report.errors[0].fragment.as_deref(), Some("#/resources/0"));

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].message, "The package does not include a README.md file");
        assert!(!report.is_valid());
    }

    #[test]
    fn test_header_mismatch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "# Prices").unwrap();
        fs::write(dir.path().join("prices.csv"), "date,price\n2020-01-01,10\n").unwrap();
        fs::write(
            dir.path().join("datapackage.json"),
            r#"{
                "name": "prices",
                "licenses": [{"name": "ODC-PDDL-1.0"}],
                "resources": [{
                    "name": "prices",
                    "path": "prices.csv",
                    "format": "csv",
                    "schema": {"fields": [{"name": "date", "type": "date"}, {"name": "volume", "type": "integer"}]}
                }]
            }"#,
        )
        .unwrap();

        let package = Package::open(&dir.path().to_string_lossy()).unwrap();
        let report = check(&package, true);

        let messages: Vec<_> = report.errors.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Declared schema has fields not present in CSV file (volume)",
                "CSV file has fields missing from schema (price)",
            ]
        );
        assert!(report
            .errors
            .iter()
            .all(|m| m.fragment.as_deref() == Some("#/resources/0/schema/fields")));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_csv_without_schema() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "# Bare").unwrap();
        fs::write(dir.path().join("bare.csv"), "a,b\n1,2\n").unwrap();
        fs::write(
            dir.path().join("datapackage.json"),
            r#"{
                "name": "bare",
                "licenses": [{"name": "ODC-PDDL-1.0"}],
                "resources": [{"name": "bare", "path": "bare.csv"}]
            }"#,
        )
        .unwrap();

        let package = Package::open(&dir.path().to_string_lossy()).unwrap();
        let report = check(&package, true);

        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        assert_eq!(report.errors[0].kind, MessageKind::Metadata);
        assert_eq!(report.errors[0].message, "bare does not have a schema");
        assert_eq!(report.errors[0].fragment.as_deref(), Some("#/resources/0"));
    }

    #[test]
    fn test_dead_resource_is_integrity_error() {
        let package = Package::from_descriptor(json!({
            "licenses": [{"name": "ODC-PDDL-1.0"}],
            "resources": [{"name": "nothing"}]
        }))
        .unwrap();

        let report = check(&package, false);
        let dead: Vec<_> = report
            .errors
            .iter()
            .filter(|m| m.kind == MessageKind::Integrity)
            .collect();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].fragment.as_deref(), Some("#/resources/0"));
    }
}

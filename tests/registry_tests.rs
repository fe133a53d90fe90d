//! Registry loading, schema lookup and profile resolution

mod common;

use std::fs;
use std::sync::Arc;

use common::{fixture, init_tracing, FakeFetcher};
use datapackage::{Profile, ProfileError, Registry, RegistryError};
use serde_json::json;

#[test]
fn test_local_registry_prefers_schema_path() {
    init_tracing();
    let registry = Registry::open(&fixture("registries/registry.json")).unwrap();

    assert_eq!(
        registry.base_path().map(|p| p.to_path_buf()),
        Some(fs::canonicalize(common::fixtures_path().join("registries")).unwrap())
    );
    assert_eq!(registry.available_profiles().len(), 2);
    assert_eq!(registry.available_profiles()[0].title.as_deref(), Some("Base Profile"));

    let schema = registry.get("base").unwrap().unwrap();
    assert_eq!(schema["title"], "base_profile");
}

#[test]
fn test_relative_registry_path_has_absolute_base() {
    init_tracing();
    // Integration tests run from the crate root
    let registry = Registry::open("tests/fixtures/registries/registry.json").unwrap();

    let base = registry.base_path().unwrap();
    assert!(base.is_absolute());
    assert_eq!(base, fs::canonicalize(common::fixtures_path().join("registries")).unwrap());
    assert_eq!(registry.get("base").unwrap().unwrap()["title"], "base_profile");
}

#[test]
fn test_schema_url_fallback() {
    init_tracing();
    let fetcher = FakeFetcher::new()
        .respond("http://example.com/remote_profile.json", r#"{"title": "remote"}"#)
        .into_arc();
    let registry = Registry::open_with(&fixture("registries/registry.json"), fetcher).unwrap();

    let schema = registry.get("remote-only").unwrap().unwrap();
    assert_eq!(schema["title"], "remote");
}

#[test]
fn test_schema_fetch_failure() {
    init_tracing();
    let fetcher = FakeFetcher::new().into_arc();
    let registry = Registry::open_with(&fixture("registries/registry.json"), fetcher).unwrap();

    let err = registry.get("remote-only").unwrap_err();
    assert!(matches!(err, RegistryError::SchemaFetch { ref id, .. } if id == "remote-only"));
}

#[test]
fn test_remote_registry() {
    init_tracing();
    let fetcher = FakeFetcher::new()
        .respond(
            "http://example.com/registry.json",
            r#"[{"id": "base", "schema": "http://example.com/base_profile.json"}]"#,
        )
        .respond_with_fixture("http://example.com/base_profile.json", "registries/base_profile.json")
        .into_arc();

    let registry = Registry::open_with("http://example.com/registry.json", fetcher).unwrap();
    assert!(registry.base_path().is_none());
    assert_eq!(registry.get("base").unwrap().unwrap()["title"], "base_profile");
    assert!(registry.get("unknown").unwrap().is_none());
}

#[test]
fn test_registry_failures() {
    init_tracing();

    let err = Registry::open(&fixture("registries/no_id.json")).unwrap_err();
    assert!(matches!(err, RegistryError::MissingId { index: 1, .. }));

    let err = Registry::open(&fixture("registries/missing.json")).unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));

    let err = Registry::open(&fixture("not_a_json")).unwrap_err();
    assert!(matches!(err, RegistryError::Json { .. }));

    let fetcher = FakeFetcher::new().status("http://example.com/registry.json", 503).into_arc();
    let err = Registry::open_with("http://example.com/registry.json", fetcher).unwrap_err();
    assert!(matches!(err, RegistryError::Fetch(_)));
}

#[test]
fn test_bundled_schemas_are_cached() {
    init_tracing();
    let registry = Arc::new(Registry::bundled().unwrap());

    let first = registry.get("table-schema").unwrap().unwrap();
    let second = registry.get("table-schema").unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_profile_from_url() {
    init_tracing();
    let fetcher = FakeFetcher::new()
        .respond_with_fixture("http://example.com/profile.json", "registries/base_profile.json")
        .respond("http://example.com/broken.json", "not json at all")
        .status("http://example.com/down.json", 500)
        .into_arc();
    let registry = common::registry_with(fetcher);

    let profile = Profile::with_registry(&json!("http://example.com/profile.json"), &registry).unwrap();
    assert_eq!(profile.name(), "http://example.com/profile.json");
    assert!(profile.valid(&json!({"name": "x"})));
    assert!(!profile.valid(&json!({})));

    let err = Profile::with_registry(&json!("http://example.com/missing.json"), &registry).unwrap_err();
    assert!(matches!(err, ProfileError::HttpStatus { status: 404, .. }));

    let err = Profile::with_registry(&json!("http://example.com/down.json"), &registry).unwrap_err();
    assert!(matches!(err, ProfileError::HttpStatus { status: 500, .. }));

    let err = Profile::with_registry(&json!("http://example.com/broken.json"), &registry).unwrap_err();
    assert!(matches!(err, ProfileError::NotJson { .. }));
}

#[test]
fn test_profile_from_local_registry() {
    init_tracing();
    let registry = Arc::new(Registry::open(&fixture("registries/registry.json")).unwrap());

    let profile = Profile::with_registry(&json!("base"), &registry).unwrap();
    assert_eq!(profile.properties(), vec!["name".to_string()]);

    let err = profile.validate(&json!({"name": 1})).unwrap_err();
    assert_eq!(err.profile, "base");
    assert_eq!(err.issues[0].instance_path, "/name");

    let err = Profile::with_registry(&json!("nope"), &registry).unwrap_err();
    assert!(matches!(err, ProfileError::UnknownProfile(ref id) if id == "nope"));
}

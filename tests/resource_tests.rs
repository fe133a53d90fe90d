//! Resources read from disk, over HTTP and inferred from CSV files

mod common;

use common::{fixture, fixtures_path, init_tracing, registry_with, FakeFetcher};
use datapackage::config::InferSettings;
use datapackage::{Resource, ResourceData, ResourceError};
use serde_json::json;

#[test]
fn test_local_tabular_resource() {
    init_tracing();
    let resource = Resource::new(
        json!({
            "name": "test",
            "path": "test.csv",
            "schema": {"fields": [{"name": "id", "type": "integer"}, {"name": "name"}]}
        }),
        &fixture("test-pkg"),
    )
    .unwrap();

    assert!(resource.local());
    assert!(resource.tabular());
    assert!(resource.exists());
    assert_eq!(resource.schema().unwrap()["missingValues"], json!([""]));

    let keyed = resource.read(true).unwrap();
    assert_eq!(keyed[0], json!({"id": "1", "name": "english"}));
    assert_eq!(keyed[1], json!({"id": "2", "name": "中国人"}));

    let ResourceData::Bytes(bytes) = resource.data().unwrap() else {
        panic!("expected bytes");
    };
    assert!(bytes.starts_with(b"id,name"));
}

#[test]
fn test_remote_tabular_resource() {
    init_tracing();
    let fetcher = FakeFetcher::new()
        .respond("http://example.com/data/langs.csv", "id,name\n1,english\n,unknown\n")
        .into_arc();
    let registry = registry_with(fetcher);

    let resource = Resource::with_registry(
        json!({
            "name": "langs",
            "path": "langs.csv",
            "profile": "tabular-data-resource",
            "schema": {"fields": [{"name": "id"}, {"name": "name"}]}
        }),
        "http://example.com/data",
        &registry,
    )
    .unwrap();

    assert!(resource.remote());
    assert!(resource.exists());
    assert_eq!(resource.headers().unwrap(), ["id", "name"]);
    // Empty cells are missing values
    assert_eq!(
        resource.read(false).unwrap(),
        vec![json!(["1", "english"]), json!([null, "unknown"])]
    );
}

#[test]
fn test_missing_remote_data() {
    init_tracing();
    let registry = registry_with(FakeFetcher::new().into_arc());

    let resource = Resource::with_registry(
        json!({"name": "gone", "path": "gone.csv", "schema": {"fields": [{"name": "a"}]}}),
        "http://example.com",
        &registry,
    )
    .unwrap();

    assert!(!resource.exists());
    let err = resource.read(false).unwrap_err();
    assert!(matches!(err, ResourceError::Fetch(ref e) if e.is_not_found()));
}

#[test]
fn test_infer_csv() {
    init_tracing();
    let resource = Resource::infer(fixtures_path().join("data/prices.csv")).unwrap();

    assert_eq!(resource.name(), Some("prices"));
    assert_eq!(resource.descriptor()["path"], "prices.csv");
    assert_eq!(resource.descriptor()["mediatype"], "text/csv");
    assert!(resource.tabular());
    assert!(resource.valid(), "{:?}", resource.iter_errors().collect::<Vec<_>>());

    let fields = &resource.schema().unwrap()["fields"];
    assert_eq!(fields[0], json!({"name": "date", "type": "date", "format": "default"}));
    assert_eq!(fields[1], json!({"name": "price", "type": "integer", "format": "default"}));
    assert_eq!(fields[2], json!({"name": "time", "type": "time", "format": "default"}));
}

#[test]
fn test_infer_with_low_confidence() {
    init_tracing();
    let registry = registry_with(FakeFetcher::new().into_arc());
    let settings = InferSettings {
        threshold: 2,
        confidence: 1.0,
    };

    let resource = Resource::infer_with(fixtures_path().join("data/names.csv"), &registry, &settings).unwrap();
    let fields = &resource.schema().unwrap()["fields"];
    assert_eq!(fields[0]["type"], "integer");
    assert_eq!(fields[2]["type"], "year");
}

#[test]
fn test_infer_rejects_other_formats() {
    init_tracing();
    let err = Resource::infer(fixtures_path().join("test-pkg/README.md")).unwrap_err();
    assert!(matches!(err, ResourceError::NotCsv(_)));
}

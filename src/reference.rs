//! Reference Resolution
//!
//! Walks a descriptor and replaces references with the JSON they point at:
//!
//! - `{"$ref": "other.json#/definitions/x"}` is a JSON Reference. The target
//!   is loaded (or taken from the current document when the file part is
//!   empty), the pointer is followed and an object result is merged into the
//!   parent mapping.
//! - A bare string is tried as a path or URL relative to the base. When it
//!   loads as JSON it is replaced; when nothing is there it was literal data.
//!
//! Loaded documents are dereferenced relative to their own location, so a
//! schema in `http://host/a/schema.json` resolves `fields.json` to
//! `http://host/a/fields.json`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ReferenceError;
use crate::fetch::Fetch;
use crate::location::{base_of, join_location};

/// Configurable reference walker
pub struct Dereferencer<'a> {
    fetcher: &'a dyn Fetch,
    reference_fields: Option<Vec<String>>,
    document: Option<&'a Value>,
}

impl<'a> Dereferencer<'a> {
    pub fn new(fetcher: &'a dyn Fetch) -> Self {
        Self {
            fetcher,
            reference_fields: None,
            document: None,
        }
    }

    /// Only descend into these top-level keys; everything else passes through verbatim
    pub fn reference_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Document that `#/pointer` references resolve against (defaults to the walked value)
    pub fn document(mut self, document: &'a Value) -> Self {
        self.document = Some(document);
        self
    }

    /// Dereference `value` relative to `base_path`
    pub fn dereference(&self, value: &Value, base_path: &str) -> Result<Value, ReferenceError> {
        let document = Document {
            location: String::new(),
            value: self.document.unwrap_or(value),
        };
        let mut walk = Walk {
            fetcher: self.fetcher,
            chain: Vec::new(),
        };
        walk.value(value, base_path, &document, self.reference_fields.as_deref())
    }

    /// Load the document at `reference` (relative to `base_path`) and dereference it
    pub fn resolve(&self, reference: &str, base_path: &str) -> Result<Value, ReferenceError> {
        let location = join_location(base_path, reference);
        let loaded = load_json(self.fetcher, &location)?;
        let base = base_of(&location).unwrap_or_default();
        let document = Document {
            location: location.clone(),
            value: &loaded,
        };
        let mut walk = Walk {
            fetcher: self.fetcher,
            chain: vec![location],
        };
        walk.value(&loaded, &base, &document, None)
    }
}

/// Dereference every reference in `value` relative to `base_path`
pub fn dereference(fetcher: &dyn Fetch, value: &Value, base_path: &str) -> Result<Value, ReferenceError> {
    Dereferencer::new(fetcher).dereference(value, base_path)
}

/// Load `location` and parse it as JSON
pub fn load_json(fetcher: &dyn Fetch, location: &str) -> Result<Value, ReferenceError> {
    let bytes = fetcher.fetch(location)?;
    serde_json::from_slice(&bytes).map_err(|source| ReferenceError::Json {
        location: location.to_string(),
        source,
    })
}

/// Follow a JSON pointer (`/a/0/b` or `a/0/b`) through `document`
pub fn resolve_pointer<'v>(document: &'v Value, pointer: &str) -> Result<&'v Value, ReferenceError> {
    let mut current = document;
    for raw in pointer.split('/').filter(|s| !s.is_empty()) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| ReferenceError::Pointer {
            reference: format!("#{}", pointer),
            segment: segment.clone(),
        })?;
    }

    if current.is_null() {
        return Err(ReferenceError::Empty {
            reference: format!("#{}", pointer),
        });
    }
    Ok(current)
}

/// The document a walk is currently inside of
struct Document<'d> {
    location: String,
    value: &'d Value,
}

struct Walk<'f> {
    fetcher: &'f dyn Fetch,
    /// Locations currently being resolved, outermost first
    chain: Vec<String>,
}

impl Walk<'_> {
    fn value(
        &mut self,
        value: &Value,
        base: &str,
        document: &Document<'_>,
        fields: Option<&[String]>,
    ) -> Result<Value, ReferenceError> {
        match value {
            Value::Object(map) => self.object(map, base, document, fields),
            Value::Array(items) => items
                .iter()
                .map(|item| self.value(item, base, document, None))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::String(s) => self.string(s, base),
            other => Ok(other.clone()),
        }
    }

    fn object(
        &mut self,
        map: &Map<String, Value>,
        base: &str,
        document: &Document<'_>,
        fields: Option<&[String]>,
    ) -> Result<Value, ReferenceError> {
        let mut out = Map::with_capacity(map.len());
        let mut replacement = None;

        for (key, val) in map {
            match (key.as_str(), val) {
                ("$schema", _) => {
                    out.insert(key.clone(), val.clone());
                }
                ("$ref", Value::String(reference)) => match self.reference(reference, base, document)? {
                    Value::Object(resolved) => {
                        for (k, v) in resolved {
                            // Sibling keys win over the referenced content
                            if !map.contains_key(&k) {
                                out.insert(k, v);
                            }
                        }
                    }
                    other => replacement = Some(other),
                },
                _ => {
                    let wanted = fields.map_or(true, |f| f.iter().any(|name| name == key));
                    let resolved = if wanted {
                        self.value(val, base, document, None)?
                    } else {
                        val.clone()
                    };
                    out.insert(key.clone(), resolved);
                }
            }
        }

        Ok(replacement.unwrap_or(Value::Object(out)))
    }

    fn reference(&mut self, reference: &str, base: &str, document: &Document<'_>) -> Result<Value, ReferenceError> {
        let (file, pointer) = match reference.split_once('#') {
            Some((file, pointer)) => (file, Some(pointer)),
            None => (reference, None),
        };

        if file.is_empty() {
            let pointer = pointer.unwrap_or("");
            let target = resolve_pointer(document.value, pointer)?;
            let key = format!("{}#{}", document.location, pointer);
            self.enter(key, reference)?;
            let result = self.value(target, base, document, None);
            self.chain.pop();
            return result;
        }

        let location = join_location(base, file);
        let loaded = load_json(self.fetcher, &location)?;
        let target = match pointer {
            Some(p) => resolve_pointer(&loaded, p)?,
            None => &loaded,
        };

        let key = match pointer {
            Some(p) => format!("{}#{}", location, p),
            None => location.clone(),
        };
        self.enter(key, reference)?;
        debug!(reference, location = %location, "resolved $ref");

        let nested_base = base_of(&location).unwrap_or_default();
        let nested = Document {
            location,
            value: &loaded,
        };
        let result = self.value(target, &nested_base, &nested, None);
        self.chain.pop();
        result
    }

    fn string(&mut self, s: &str, base: &str) -> Result<Value, ReferenceError> {
        let literal = || Ok(Value::String(s.to_string()));
        if s.trim().is_empty() {
            return literal();
        }

        let location = join_location(base, s);
        if self.chain.contains(&location) {
            debug!(location = %location, "skipping cyclic string reference");
            return literal();
        }

        let loaded = match load_json(self.fetcher, &location) {
            Ok(v) => v,
            Err(ReferenceError::Fetch(e)) if e.is_not_found() => return literal(),
            // Something is there but it isn't JSON, so this was data all along
            Err(ReferenceError::Json { .. }) => return literal(),
            Err(e) => return Err(e),
        };

        debug!(location = %location, "resolved string reference");
        self.chain.push(location.clone());
        let nested_base = base_of(&location).unwrap_or_default();
        let nested = Document {
            location,
            value: &loaded,
        };
        let result = self.value(&loaded, &nested_base, &nested, None);
        self.chain.pop();
        result
    }

    fn enter(&mut self, key: String, reference: &str) -> Result<(), ReferenceError> {
        if self.chain.contains(&key) {
            return Err(ReferenceError::Cycle {
                reference: reference.to_string(),
            });
        }
        self.chain.push(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Serves a fixed set of URLs and nothing else
    #[derive(Default)]
    struct StubFetcher {
        bodies: HashMap<String, String>,
    }

    impl StubFetcher {
        fn with(mut self, location: &str, body: Value) -> Self {
            self.bodies.insert(location.to_string(), body.to_string());
            self
        }
    }

    impl Fetch for StubFetcher {
        fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
            self.bodies
                .get(location)
                .map(|b| b.clone().into_bytes())
                .ok_or_else(|| FetchError::NotFound {
                    location: location.to_string(),
                })
        }
    }

    #[test]
    fn test_non_referential_values_are_unchanged() {
        let fetcher = StubFetcher::default();
        let value = json!({"string": "string", "integer": 6, "list": [true, null, 1.5]});
        assert_eq!(dereference(&fetcher, &value, "").unwrap(), value);
    }

    #[test]
    fn test_dereferences_nested_urls() {
        let fetcher = StubFetcher::default()
            .with("http://example.org/thing.json", json!({"ref_to_nested_url": "http://example.org/nested_thing.json"}))
            .with("http://example.org/nested_thing.json", json!({"nested_attr": 3}));

        let resolved = dereference(&fetcher, &json!("http://example.org/thing.json"), "").unwrap();
        assert_eq!(resolved, json!({"ref_to_nested_url": {"nested_attr": 3}}));
    }

    #[test]
    fn test_reference_fields_restrict_top_level() {
        let fetcher = StubFetcher::default()
            .with("http://example.org/schema.json", json!({"fields": [{"name": "Price", "type": "integer"}]}))
            .with("http://example.org/random.json", json!({"field_name": 3}));

        let descriptor = json!({
            "schema": "http://example.org/schema.json",
            "random": "http://example.org/random.json"
        });
        let resolved = Dereferencer::new(&fetcher)
            .reference_fields(["schema"])
            .dereference(&descriptor, "")
            .unwrap();

        assert_eq!(
            resolved,
            json!({
                "schema": {"fields": [{"name": "Price", "type": "integer"}]},
                "random": "http://example.org/random.json"
            })
        );
    }

    #[test]
    fn test_pointer_into_current_document() {
        let fetcher = StubFetcher::default();
        let descriptor = json!({
            "resources": [{"fields": {"$ref": "#schemas/main/fields"}}],
            "schemas": {"main": {"fields": [{"name": "name"}]}}
        });

        let resolved = dereference(&fetcher, &descriptor, "").unwrap();
        assert_eq!(resolved["resources"][0]["fields"], json!([{"name": "name"}]));
        assert_eq!(resolved["schemas"]["main"]["fields"], json!([{"name": "name"}]));
    }

    #[test]
    fn test_ref_object_merges_into_parent() {
        let fetcher = StubFetcher::default()
            .with("http://example.org/schema/definitions.json", json!({"name": {"title": "Name", "type": "string"}}));

        let schema = json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "properties": {"name": {"$ref": "definitions.json#/name", "propertyOrder": 10}}
        });
        let resolved = dereference(&fetcher, &schema, "http://example.org/schema").unwrap();

        assert_eq!(
            resolved["properties"]["name"],
            json!({"propertyOrder": 10, "title": "Name", "type": "string"})
        );
        assert_eq!(resolved["$schema"], schema["$schema"]);
    }

    #[test]
    fn test_missing_pointer_segment_fails() {
        let fetcher = StubFetcher::default();
        let descriptor = json!({"a": {"$ref": "#/definitions/missing"}, "definitions": {}});

        let err = dereference(&fetcher, &descriptor, "").unwrap_err();
        assert!(matches!(err, ReferenceError::Pointer { ref segment, .. } if segment == "missing"));
    }

    #[test]
    fn test_cyclic_ref_fails() {
        let fetcher = StubFetcher::default();
        let descriptor = json!({"a": {"$ref": "#/b"}, "b": {"$ref": "#/a"}});

        let err = dereference(&fetcher, &descriptor, "").unwrap_err();
        assert!(matches!(err, ReferenceError::Cycle { .. }));
    }

    #[test]
    fn test_paths_relative_to_base_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("base_profile.json"), r#"{"title": "base_profile"}"#).unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let fetcher = crate::fetch::DefaultFetcher::new().unwrap();
        let descriptor = json!({"resources": [{"resource_attrs": "base_profile.json"}]});
        let resolved = dereference(&fetcher, &descriptor, &base).unwrap();

        assert_eq!(
            resolved,
            json!({"resources": [{"resource_attrs": {"title": "base_profile"}}]})
        );
    }

    #[test]
    fn test_resolve_pointer_escapes_and_indices() {
        let doc = json!({"a/b": [{"c~d": 1}]});
        assert_eq!(resolve_pointer(&doc, "/a~1b/0/c~0d").unwrap(), &json!(1));
        assert!(resolve_pointer(&doc, "/a~1b/3").is_err());
    }
}

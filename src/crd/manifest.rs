//! # Manifests
//!
//! Opaque resource documents carried in `spec.syncItems`.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// A single resource template
///
/// Arbitrary nested document with at least `apiVersion`, `kind` and
/// `metadata.name`. The template itself is never mutated; every target
/// namespace works on its own copy (see [`Manifest::instantiate`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Manifest(pub Map<String, Value>);

/// Identity of a manifest: enough to address it in the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIdentity {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl JsonSchema for Manifest {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Manifest")
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        // Manifests are arbitrary resources, the API server must keep every field
        schemars::json_schema!({
            "type": "object",
            "description": "Resource manifest synced into every selected namespace. Must carry apiVersion, kind and metadata.name.",
            "x-kubernetes-preserve-unknown-fields": true
        })
    }
}

impl Manifest {
    /// Read `apiVersion`, `kind` and `metadata.name`
    ///
    /// Returns the name of the first missing or empty field on failure.
    pub fn identity(&self) -> Result<ManifestIdentity, &'static str> {
        let api_version = non_empty_str(self.0.get("apiVersion")).ok_or("apiVersion")?;
        let kind = non_empty_str(self.0.get("kind")).ok_or("kind")?;
        let name = non_empty_str(
            self.0
                .get("metadata")
                .and_then(Value::as_object)
                .and_then(|m| m.get("name")),
        )
        .ok_or("metadata.name")?;

        Ok(ManifestIdentity {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        })
    }

    /// Copy the template and point the copy at `namespace`
    ///
    /// Any namespace set in the template is overwritten.
    #[must_use]
    pub fn instantiate(&self, namespace: &str) -> Value {
        let mut object = self.0.clone();
        let metadata = object
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = metadata {
            metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
        Value::Object(object)
    }
}

impl From<Value> for Manifest {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Manifest(map),
            _ => Manifest::default(),
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

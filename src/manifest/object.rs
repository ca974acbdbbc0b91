//! Decoded manifest documents
//!
//! A document is kept as an order-preserving JSON tree. Only the handful of
//! fields the reconciler needs get typed accessors.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Identity fields the API server owns, copied from the live object on update
const IDENTITY_FIELDS: &[&str] = &[
    "creationTimestamp",
    "generateName",
    "generation",
    "resourceVersion",
];

/// One decoded YAML document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObject {
    value: Value,
}

impl ParsedObject {
    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    /// Decode one YAML document
    ///
    /// Returns `Ok(None)` when the document decodes to `null`, which is what
    /// a stray separator or a comment-only document produces.
    pub fn from_yaml(document: &str) -> Result<Option<Self>, serde_yaml::Error> {
        let value: Value = serde_yaml::from_str(document)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(Self { value }))
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Null, or a mapping/sequence with nothing in it
    pub fn is_empty(&self) -> bool {
        match &self.value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.value.pointer(pointer).and_then(Value::as_str)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.str_at("/apiVersion")
    }

    pub fn kind(&self) -> Option<&str> {
        self.str_at("/kind")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_at("/metadata/name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at("/metadata/namespace")
            .filter(|ns| !ns.is_empty())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.str_at("/metadata/resourceVersion")
    }

    pub fn creation_timestamp(&self) -> Option<&str> {
        self.str_at("/metadata/creationTimestamp")
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.value
            .pointer("/metadata/labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn replicas(&self) -> Option<i64> {
        self.value.pointer("/spec/replicas").and_then(Value::as_i64)
    }

    /// `kind: List` (or any `*List`) wrapping other objects in `items`
    pub fn is_list(&self) -> bool {
        self.kind().is_some_and(|kind| kind.ends_with("List"))
            && self.value.get("items").is_some_and(Value::is_array)
    }

    /// Items of a list document, skipping empty entries
    pub fn list_items(&self) -> Vec<ParsedObject> {
        self.value
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| ParsedObject::from_value(item.clone()))
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let root = self.value.as_object_mut()?;
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        metadata.as_object_mut()
    }

    /// Set or clear `metadata.namespace`
    pub fn set_namespace(&mut self, namespace: Option<&str>) {
        if let Some(metadata) = self.metadata_mut() {
            match namespace {
                Some(ns) => {
                    metadata.insert("namespace".to_string(), Value::String(ns.to_string()));
                }
                None => {
                    metadata.remove("namespace");
                }
            }
        }
    }

    /// Copy of this object addressed at the cluster scope
    pub fn without_namespace(&self) -> Self {
        let mut copy = self.clone();
        copy.set_namespace(None);
        copy
    }

    pub fn set_replicas(&mut self, replicas: i64) {
        let Some(root) = self.value.as_object_mut() else {
            return;
        };
        let spec = root
            .entry("spec")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(spec) = spec.as_object_mut() {
            spec.insert("replicas".to_string(), Value::from(replicas));
        }
    }

    /// Carry the live object's server-owned identity onto this desired state
    pub fn adopt_identity(&mut self, existing: &ParsedObject) {
        let Some(live) = existing
            .value
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
        else {
            return;
        };
        if let Some(metadata) = self.metadata_mut() {
            for field in IDENTITY_FIELDS {
                if let Some(value) = live.get(*field) {
                    metadata.insert((*field).to_string(), value.clone());
                }
            }
        }
    }
}

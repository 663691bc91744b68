//! Layer fingerprints
//!
//! A fingerprint is the flattened, sorted mapping of every input that
//! determines a layer's content. Stages describe their inputs as plain
//! serializable structs; [`Fingerprint::of`] turns one into the canonical
//! mapping. Two fingerprints are equal iff their mappings are equal.

use crate::error::{RustupLayersError, RustupLayersResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonical input mapping for one layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(BTreeMap<String, String>);

impl Fingerprint {
    /// Build a fingerprint from a struct of inputs
    ///
    /// Nested structs flatten to dotted keys, `None` fields are omitted and
    /// strings are whitespace-trimmed so unchanged inputs always compare
    /// equal.
    pub fn of<T: Serialize>(inputs: &T) -> RustupLayersResult<Self> {
        let value = serde_json::to_value(inputs)?;
        let Value::Object(map) = value else {
            return Err(RustupLayersError::Internal(
                "fingerprint inputs must serialize to a map".to_string(),
            ));
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            flatten(&key, value, &mut entries);
        }
        Ok(Self(entries))
    }

    /// Add or replace one input
    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        self.0.insert(key.into(), value.as_ref().trim().to_string());
    }

    /// Look up one input
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Keys whose values differ between `self` and `other`, including
    /// keys present on only one side
    pub fn diff<'a>(&'a self, other: &'a Fingerprint) -> Vec<&'a str> {
        let mut keys: Vec<&str> = self
            .0
            .keys()
            .chain(other.0.keys())
            .map(String::as_str)
            .filter(|k| self.0.get(*k) != other.0.get(*k))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// SHA-256 over the canonical JSON encoding
    pub fn digest(&self) -> String {
        // BTreeMap serializes in key order and string maps cannot fail
        let canonical = serde_json::to_vec(&self.0).unwrap_or_default();
        hex::encode(Sha256::digest(canonical))
    }
}

fn flatten(prefix: &str, value: Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.insert(prefix.to_string(), s.trim().to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Array(items) => {
            for (i, item) in items.into_iter().enumerate() {
                flatten(&format!("{}.{}", prefix, i), item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                flatten(&format!("{}.{}", prefix, key), item, out);
            }
        }
    }
}

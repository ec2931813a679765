//! Preference fingerprints.
//!
//! A fingerprint is SHA-256 over the canonical JSON encoding of a normalized
//! [`Preferences`] value (object keys sorted), truncated to 128 bits and
//! hex-encoded. It is only ever compared for equality.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::preferences::Preferences;

/// Number of digest bytes kept.
const FINGERPRINT_BYTES: usize = 16;

/// Opaque change-detection token for a preference set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a normalized preference set.
    pub fn of(preferences: &Preferences) -> Self {
        let digest = Sha256::digest(canonical_json(preferences).as_bytes());
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Wrap a stored fingerprint string.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with lexicographically sorted keys.
///
/// Built from a `BTreeMap` so the order holds even if another crate in the
/// build turns on serde_json's `preserve_order`.
pub fn canonical_json(preferences: &Preferences) -> String {
    let mut map: BTreeMap<&str, Value> = BTreeMap::new();
    map.insert("allergens", Value::from_iter(preferences.allergens.iter().cloned()));
    map.insert(
        "country",
        preferences
            .country
            .clone()
            .map_or(Value::Null, Value::String),
    );
    map.insert("diet", Value::String(preferences.diet.clone()));
    map.insert("goal", Value::String(preferences.goal.clone()));
    map.insert("portion", Value::String(preferences.portion.clone()));

    // Serializing a map of strings and JSON values cannot fail.
    serde_json::to_string(&map).unwrap_or_default()
}

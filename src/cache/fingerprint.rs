//! Deterministic request fingerprints used as cache keys.
//!
//! A [`Fingerprint`] is the hex-encoded SHA-256 of a resource identifier
//! and a canonical JSON rendering of the request options. Object keys are
//! sorted before hashing so two structurally equal option sets always
//! produce the same key, independent of field or insertion order.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::Result;

/// Stable, collision-resistant cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a resource plus serializable options.
    pub fn of<T: Serialize + ?Sized>(resource: &str, options: &T) -> Result<Self> {
        let value = serde_json::to_value(options)?;
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);
        Ok(Self::from_parts(&[resource, &canonical]))
    }

    /// Fingerprint an ordered list of string parts.
    ///
    /// Parts are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex form of the digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for logs.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// Types that can address a cache entry.
pub trait CacheKey {
    fn fingerprint(&self) -> Fingerprint;
}

/// Render JSON with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_deterministic() {
        let a = Fingerprint::of("sst", &json!({"lat": 25.7, "lon": -80.1})).unwrap();
        let b = Fingerprint::of("sst", &json!({"lat": 25.7, "lon": -80.1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let mut first = serde_json::Map::new();
        first.insert("b".into(), json!(2));
        first.insert("a".into(), json!({"y": 1, "x": [1, 2]}));
        let mut second = serde_json::Map::new();
        second.insert("a".into(), json!({"x": [1, 2], "y": 1}));
        second.insert("b".into(), json!(2));

        assert_eq!(
            Fingerprint::of("r", &first).unwrap(),
            Fingerprint::of("r", &second).unwrap()
        );
    }

    #[test]
    fn fingerprint_differs_on_resource() {
        let opts = json!({"lat": 1});
        assert_ne!(
            Fingerprint::of("sst", &opts).unwrap(),
            Fingerprint::of("wind", &opts).unwrap()
        );
    }

    #[test]
    fn fingerprint_differs_on_options() {
        assert_ne!(
            Fingerprint::of("sst", &json!({"lat": 1})).unwrap(),
            Fingerprint::of("sst", &json!({"lat": 2})).unwrap()
        );
    }

    #[test]
    fn parts_are_length_prefixed() {
        assert_ne!(
            Fingerprint::from_parts(&["ab", "c"]),
            Fingerprint::from_parts(&["a", "bc"])
        );
    }

    #[test]
    fn display_is_short_prefix() {
        let fp = Fingerprint::from_parts(&["x"]);
        assert_eq!(fp.to_string().len(), 12);
        assert!(fp.as_str().starts_with(&fp.to_string()));
    }
}

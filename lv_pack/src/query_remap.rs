//! §4.6 step 4: dashboard query remapping. Every dashboard element that
//! embeds a query definition is canonicalized and hashed; elements whose
//! hash is unchanged from unpack time keep their original `query_id`,
//! elements with a new hash share a single newly-created query id
//! (dedup), and the whole table is persisted as an advisory side file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

const EXCLUDED_KEYS: &[&str] = &[
    "id",
    "created_at",
    "updated_at",
    "permissions",
    "url",
    "share_url",
    "expanded_share_url",
];

/// Computes a canonical hash over a query definition: excluded keys are
/// dropped, object keys serialize in sorted order (the default for
/// `serde_json::Map` without the `preserve_order` feature), and string
/// arrays are sorted so element order doesn't perturb the hash.
pub fn canonical_query_hash(query: &serde_json::Value) -> String {
    let canonical = canonicalize(query);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if EXCLUDED_KEYS.contains(&k.as_str()) {
                    continue;
                }
                out.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            let mut normalized: Vec<serde_json::Value> = items.iter().map(canonicalize).collect();
            if normalized.iter().all(|v| v.is_string()) {
                normalized.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
            }
            serde_json::Value::Array(normalized)
        }
        other => other.clone(),
    }
}

/// Maps a canonical query hash to the id it should be written under on
/// this pack run: either the original id (hash unchanged since unpack) or
/// a freshly minted one shared by every element with that hash.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QueryRemappingTable {
    /// hash -> resolved query id.
    entries: BTreeMap<String, String>,
    next_id: u64,
}

impl QueryRemappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Resolves `hash` to a query id. If `original_hash` matches `hash`,
    /// the original id is kept and recorded; otherwise a new id is minted
    /// (or reused, for a `hash` already seen earlier in this run).
    pub fn resolve(&mut self, hash: &str, original_hash: Option<&str>, original_id: &str) -> String {
        if let Some(existing) = self.entries.get(hash) {
            return existing.clone();
        }
        let id = if original_hash == Some(hash) {
            original_id.to_string()
        } else {
            self.next_id += 1;
            format!("new_query_{}", self.next_id)
        };
        self.entries.insert(hash.to_string(), id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn excluded_keys_dont_affect_hash() {
        let a = json!({"id": "1", "model": "m", "fields": ["a", "b"]});
        let b = json!({"id": "2", "model": "m", "fields": ["a", "b"]});
        assert_eq!(canonical_query_hash(&a), canonical_query_hash(&b));
    }

    #[test]
    fn field_order_in_lists_is_normalized() {
        let a = json!({"model": "m", "fields": ["b", "a"]});
        let b = json!({"model": "m", "fields": ["a", "b"]});
        assert_eq!(canonical_query_hash(&a), canonical_query_hash(&b));
    }

    #[test]
    fn changed_payload_changes_hash() {
        let a = json!({"model": "m", "fields": ["a"]});
        let b = json!({"model": "m", "fields": ["a", "b"]});
        assert_ne!(canonical_query_hash(&a), canonical_query_hash(&b));
    }

    #[test]
    fn unchanged_hash_keeps_original_id() {
        let mut table = QueryRemappingTable::new();
        let id = table.resolve("h1", Some("h1"), "q42");
        assert_eq!(id, "q42");
    }

    #[test]
    fn changed_hash_mints_new_shared_id() {
        let mut table = QueryRemappingTable::new();
        let id1 = table.resolve("h2", Some("h1"), "q42");
        let id2 = table.resolve("h2", Some("h1"), "q42");
        assert_eq!(id1, id2);
        assert_ne!(id1, "q42");
    }
}

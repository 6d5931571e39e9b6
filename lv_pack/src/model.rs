//! On-disk shapes for the export tree (§6 YAML file format).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnpackStrategy {
    Full,
    Folder,
}

/// The `_metadata` block embedded in every exported item file. Closed
/// schema: an unknown key is a pack-time validation failure, not a
/// silently dropped field (§9 Design Notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemMetadata {
    pub db_id: String,
    pub content_type: lv_types::ContentType,
    pub exported_at: DateTime<Utc>,
    pub content_size: i64,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
}

/// `<output_dir>/<type>/<id>.yaml`'s top-level shape: the item's own fields
/// alongside the reserved `_metadata` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFile {
    #[serde(flatten)]
    pub fields: serde_json::Value,
    #[serde(rename = "_metadata")]
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderMapEntry {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub path: String,
    pub depth: u32,
    pub child_count: u32,
}

/// `metadata.json` at the export root (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub version: String,
    pub strategy: UnpackStrategy,
    pub database_schema_version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_database: Option<String>,
    pub total_items: i64,
    pub content_counts: BTreeMap<String, i64>,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_map: Option<BTreeMap<String, FolderMapEntry>>,
}

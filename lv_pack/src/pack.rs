//! Component C6 (import half): validates an export tree and writes
//! modified/new items back into the repository (§4.6 Pack).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use lv_repository::Repository;
use lv_types::{ContentItem, ContentType};
use observability_deps::tracing::warn;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result, ValidationFailure};
use crate::model::{ExportMetadata, ItemFile, SCHEMA_VERSION};
use crate::query_remap::{canonical_query_hash, QueryRemappingTable};

const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub input_dir: PathBuf,
    /// Mark items present in the repository but absent from the export as
    /// deleted (§4.6 step 5).
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PackSummary {
    pub scanned: usize,
    pub unchanged: usize,
    pub modified: usize,
    pub created: usize,
    pub deleted: usize,
    pub validation_failures: Vec<String>,
}

struct ParsedFile {
    relative_path: PathBuf,
    content_type: ContentType,
    file: ItemFile,
}

pub async fn pack(repository: &Repository, options: &PackOptions) -> Result<PackSummary> {
    let metadata_path = options.input_dir.join("metadata.json");
    let metadata: ExportMetadata = serde_json::from_slice(&std::fs::read(&metadata_path)?)?;
    if metadata.database_schema_version > SCHEMA_VERSION {
        return Err(Error::SchemaVersionMismatch {
            expected: SCHEMA_VERSION,
            found: metadata.database_schema_version,
        });
    }

    let files = discover_yaml_files(&options.input_dir)?;
    let mut failures = Vec::new();
    let mut parsed = Vec::new();

    for path in files {
        match parse_and_validate(&options.input_dir, &path) {
            Ok(p) => parsed.push(p),
            Err(message) => failures.push(ValidationFailure {
                path: path.to_string_lossy().to_string(),
                message,
            }),
        }
    }

    let remap_path = options.input_dir.join(".pack_state").join("query_remapping.json");
    let mut remap_table = QueryRemappingTable::load(&remap_path)?;

    let mut summary = PackSummary { scanned: parsed.len(), ..Default::default() };
    let mut to_write = Vec::new();
    let mut seen_ids: BTreeMap<ContentType, Vec<String>> = BTreeMap::new();
    let now = Utc::now();

    for p in &parsed {
        seen_ids.entry(p.content_type).or_default().push(p.file.metadata.db_id.clone());

        // Compare against the same byte basis `_metadata.checksum` was computed
        // over at unpack time: the content fields re-encoded to msgpack, not
        // the surrounding YAML file (whose formatting a round trip can change
        // without the content itself changing).
        let current_checksum = checksum_hex(&rmp_serde::to_vec(&p.file.fields)?);
        let unchanged = current_checksum == p.file.metadata.checksum;

        let existing = repository.get_content(p.content_type, &p.file.metadata.db_id).await?;
        let mut fields = p.file.fields.clone();

        if p.content_type == ContentType::Dashboard {
            remap_dashboard_queries(&mut fields, existing.as_ref(), &mut remap_table);
        }

        if unchanged && existing.is_some() {
            summary.unchanged += 1;
            continue;
        }

        let content_data = rmp_serde::to_vec(&fields)?;
        let name = fields
            .get("title")
            .or_else(|| fields.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mut item = ContentItem::new(p.file.metadata.db_id.clone(), p.content_type, name, content_data, now);
        item.folder_id = fields.get("folder_id").and_then(|v| v.as_str()).map(String::from);
        item.parent_id = fields.get("parent_id").and_then(|v| v.as_str()).map(String::from);
        if existing.is_some() {
            summary.modified += 1;
        } else {
            summary.created += 1;
        }
        to_write.push(item);
    }

    if !failures.is_empty() {
        summary.validation_failures = failures.iter().map(|f| f.to_string()).collect();
        return Err(Error::ValidationFailed(failures));
    }

    if options.dry_run {
        return Ok(summary);
    }

    for chunk in to_write.chunks(BATCH_SIZE) {
        repository
            .save_content_batch(chunk)
            .await
            .map_err(|e| Error::TransactionFailed(e.to_string()))?;
    }

    if options.force {
        summary.deleted = mark_missing_as_deleted(repository, &seen_ids, now).await?;
    }

    remap_table.save(&remap_path)?;
    Ok(summary)
}

async fn mark_missing_as_deleted(
    repository: &Repository,
    seen_ids: &BTreeMap<ContentType, Vec<String>>,
    now: chrono::DateTime<Utc>,
) -> Result<usize> {
    let mut deleted = 0;
    for (content_type, ids) in seen_ids {
        let existing = repository
            .list_content(*content_type, &lv_types::ContentFilter::default())
            .await?;
        for mut item in existing {
            if ids.contains(&item.id) {
                continue;
            }
            item.deleted = true;
            item.updated_at = now;
            repository.save_content(&item).await?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

fn remap_dashboard_queries(
    fields: &mut serde_json::Value,
    existing: Option<&ContentItem>,
    table: &mut QueryRemappingTable,
) {
    let old_elements: Vec<serde_json::Value> = existing
        .and_then(|item| rmp_serde::from_slice::<serde_json::Value>(&item.content_data).ok())
        .and_then(|v| v.get("elements").cloned())
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();

    let Some(elements) = fields.get_mut("elements").and_then(|v| v.as_array_mut()) else {
        return;
    };

    for (idx, element) in elements.iter_mut().enumerate() {
        let Some(query) = element.get("query").cloned() else {
            continue;
        };
        let new_hash = canonical_query_hash(&query);
        let original_query = old_elements.get(idx).and_then(|e| e.get("query"));
        let original_hash = original_query.map(canonical_query_hash);
        let original_id = element
            .get("query_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let resolved = table.resolve(&new_hash, original_hash.as_deref(), &original_id);
        if let Some(obj) = element.as_object_mut() {
            obj.insert("query_id".to_string(), serde_json::Value::String(resolved));
        }
    }
}

fn discover_yaml_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".pack_state") {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            out.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(())
}

fn parse_and_validate(root: &Path, relative_path: &Path) -> std::result::Result<ParsedFile, String> {
    let raw = std::fs::read(root.join(relative_path)).map_err(|e| e.to_string())?;
    let file: ItemFile = serde_yaml::from_slice(&raw).map_err(|e| format!("invalid yaml: {e}"))?;
    reject_duplicate_keys(&raw)?;

    let content_type = file.file_content_type();
    validate_schema(content_type, &file.fields)?;

    if !file.fields.is_object() {
        return Err("write model must be a JSON object (SDK-shape validation)".to_string());
    }

    Ok(ParsedFile { relative_path: relative_path.to_path_buf(), content_type, file })
}

impl ItemFile {
    fn file_content_type(&self) -> ContentType {
        self.metadata.content_type
    }
}

fn reject_duplicate_keys(raw: &[u8]) -> std::result::Result<(), String> {
    let text = String::from_utf8_lossy(raw);
    let value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| e.to_string())?;
    if let serde_yaml::Value::Mapping(map) = value {
        let mut seen = std::collections::HashSet::new();
        for (key, _) in map.iter() {
            let rendered = serde_yaml::to_string(key).unwrap_or_default();
            if !seen.insert(rendered.clone()) {
                return Err(format!("duplicate key: {rendered}"));
            }
        }
    }
    Ok(())
}

const VALID_ELEMENT_TYPES: &[&str] = &["vis", "text", "look", "button"];
const VALID_REFRESH_INTERVALS: &[&str] = &["off", "30 seconds", "1 minute", "5 minutes", "15 minutes", "30 minutes", "1 hour"];

fn validate_schema(content_type: ContentType, fields: &serde_json::Value) -> std::result::Result<(), String> {
    if fields.get("id").and_then(|v| v.as_str()).is_none() {
        return Err("missing required field: id".to_string());
    }
    match content_type {
        ContentType::Dashboard => {
            if let Some(elements) = fields.get("elements").and_then(|v| v.as_array()) {
                for element in elements {
                    if let Some(ty) = element.get("type").and_then(|v| v.as_str()) {
                        if !VALID_ELEMENT_TYPES.contains(&ty) {
                            return Err(format!("invalid dashboard element type: {ty}"));
                        }
                    }
                }
            }
            if let Some(interval) = fields.get("refresh_interval").and_then(|v| v.as_str()) {
                if !VALID_REFRESH_INTERVALS.contains(&interval) {
                    return Err(format!("invalid refresh_interval: {interval}"));
                }
            }
        }
        ContentType::Look => {
            if fields.get("query_id").is_none() && fields.get("query").is_none() {
                warn!("look missing both query_id and query");
            }
        }
        _ => {}
    }
    Ok(())
}

fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256:{}", digest.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnpackStrategy;
    use crate::unpack::{unpack, UnpackOptions};

    #[tokio::test]
    async fn round_trip_unpack_then_pack_reports_no_changes() {
        let repo = Repository::open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let item = ContentItem::new(
            "1",
            ContentType::ScheduledPlan,
            "p1",
            rmp_serde::to_vec(&serde_json::json!({"id": "1", "name": "p1"})).unwrap(),
            now,
        );
        repo.save_content(&item).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let unpack_options = UnpackOptions {
            output_dir: dir.path().to_path_buf(),
            strategy: UnpackStrategy::Full,
            content_types: vec![ContentType::ScheduledPlan],
        };
        unpack(&repo, &unpack_options).await.unwrap();

        let pack_options = PackOptions { input_dir: dir.path().to_path_buf(), force: false, dry_run: false };
        let summary = pack(&repo, &pack_options).await.unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.modified, 0);
    }

    #[tokio::test]
    async fn edited_file_is_detected_as_modified() {
        let repo = Repository::open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let item = ContentItem::new(
            "1",
            ContentType::ScheduledPlan,
            "p1",
            rmp_serde::to_vec(&serde_json::json!({"id": "1", "name": "p1"})).unwrap(),
            now,
        );
        repo.save_content(&item).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let unpack_options = UnpackOptions {
            output_dir: dir.path().to_path_buf(),
            strategy: UnpackStrategy::Full,
            content_types: vec![ContentType::ScheduledPlan],
        };
        unpack(&repo, &unpack_options).await.unwrap();

        let path = dir.path().join("SCHEDULED_PLAN/1.yaml");
        let mut file: ItemFile = serde_yaml::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        file.fields["name"] = serde_json::Value::String("renamed".to_string());
        std::fs::write(&path, serde_yaml::to_string(&file).unwrap()).unwrap();

        let pack_options = PackOptions { input_dir: dir.path().to_path_buf(), force: false, dry_run: false };
        let summary = pack(&repo, &pack_options).await.unwrap();
        assert_eq!(summary.modified, 1);

        let updated = repo.get_content(ContentType::ScheduledPlan, "1").await.unwrap().unwrap();
        let decoded: serde_json::Value = rmp_serde::from_slice(&updated.content_data).unwrap();
        assert_eq!(decoded["name"], "renamed");
    }

    #[tokio::test]
    async fn invalid_element_type_is_reported_as_validation_failure() {
        let repo = Repository::open("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("DASHBOARD")).unwrap();
        let bad = serde_json::json!({
            "id": "1",
            "elements": [{"type": "not_a_real_type"}],
            "_metadata": {
                "db_id": "1", "content_type": "Dashboard", "exported_at": now_rfc3339(),
                "content_size": 0, "checksum": "sha256:deadbeef"
            }
        });
        std::fs::write(
            dir.path().join("DASHBOARD/1.yaml"),
            serde_yaml::to_string(&bad).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("metadata.json"),
            serde_json::to_vec(&serde_json::json!({
                "version": "1.0", "strategy": "full", "database_schema_version": 1,
                "exported_at": now_rfc3339(), "total_items": 1, "content_counts": {}, "checksum": "sha256:0"
            }))
            .unwrap(),
        )
        .unwrap();

        let pack_options = PackOptions { input_dir: dir.path().to_path_buf(), force: false, dry_run: false };
        let result = pack(&repo, &pack_options).await;
        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }

    fn now_rfc3339() -> String {
        Utc::now().to_rfc3339()
    }
}

//! Component C6 (export half): renders the repository's content items into
//! a directory tree of YAML files (§4.6 Unpack).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::Utc;
use lv_repository::Repository;
use lv_types::{ContentFilter, ContentItem, ContentType};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::{ExportMetadata, FolderMapEntry, ItemFile, ItemMetadata, UnpackStrategy, SCHEMA_VERSION};
use crate::sanitize::{sanitize_segment, CollisionResolver};

const ORPHANED_DIR: &str = "_orphaned";

#[derive(Debug, Clone)]
pub struct UnpackOptions {
    pub output_dir: PathBuf,
    pub strategy: UnpackStrategy,
    /// Content types to export; defaults to every restorable type plus
    /// `Explore` when empty.
    pub content_types: Vec<ContentType>,
}

fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256:{}", hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub async fn unpack(repository: &Repository, options: &UnpackOptions) -> Result<ExportMetadata> {
    std::fs::create_dir_all(&options.output_dir)?;

    let content_types: Vec<ContentType> = if options.content_types.is_empty() {
        ContentType::RESTORABLE_ORDER.to_vec()
    } else {
        options.content_types.clone()
    };

    let mut written_paths: Vec<PathBuf> = Vec::new();
    let mut content_counts = BTreeMap::new();
    let mut total_items = 0i64;
    let exported_at = Utc::now();

    let folder_map = match options.strategy {
        UnpackStrategy::Folder => Some(build_folder_map(repository).await?),
        UnpackStrategy::Full => None,
    };

    for content_type in &content_types {
        let items = repository
            .list_content(*content_type, &ContentFilter::default())
            .await?;
        content_counts.insert(content_type.as_str().to_string(), items.len() as i64);
        total_items += items.len() as i64;

        for item in items {
            let relative = match (&folder_map, folder_relevant(*content_type)) {
                (Some(map), true) => folder_destination(map, &item),
                _ => PathBuf::from(content_type.as_str()).join(format!("{}.yaml", item.id)),
            };
            let full_path = options.output_dir.join(&relative);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let folder_path = if folder_relevant(*content_type) {
                folder_map.as_ref().and_then(|map| {
                    item.folder_id
                        .as_deref()
                        .and_then(|fid| map.get(fid))
                        .map(|entry| entry.path.clone())
                })
            } else {
                None
            };

            let bytes = render_item(&item, exported_at, folder_path)?;
            std::fs::write(&full_path, &bytes)?;
            written_paths.push(relative);
        }
    }

    written_paths.sort();
    let mut hasher = Sha256::new();
    for path in &written_paths {
        let bytes = std::fs::read(options.output_dir.join(path))?;
        hasher.update(&bytes);
    }
    let checksum = format!("sha256:{}", hex_encode(&hasher.finalize()));

    let metadata = ExportMetadata {
        version: "1.0".to_string(),
        strategy: options.strategy,
        database_schema_version: SCHEMA_VERSION,
        exported_at,
        source_database: None,
        total_items,
        content_counts,
        checksum,
        folder_map: folder_map.map(|m| m.into_iter().collect()),
    };
    let metadata_path = options.output_dir.join("metadata.json");
    std::fs::write(&metadata_path, serde_json::to_vec_pretty(&metadata)?)?;

    Ok(metadata)
}

fn folder_relevant(content_type: ContentType) -> bool {
    matches!(content_type, ContentType::Dashboard | ContentType::Look)
}

fn render_item(
    item: &ContentItem,
    exported_at: chrono::DateTime<Utc>,
    folder_path: Option<String>,
) -> Result<Vec<u8>> {
    let fields: serde_json::Value = rmp_serde::from_slice(&item.content_data)?;
    let metadata = ItemMetadata {
        db_id: item.id.clone(),
        content_type: item.content_type,
        exported_at,
        content_size: item.content_size,
        checksum: checksum_hex(&item.content_data),
        folder_path,
    };
    let file = ItemFile { fields, metadata };
    Ok(serde_yaml::to_string(&file)?.into_bytes())
}

/// Builds the Looker-folder path for every known folder, by BFS from roots
/// (folders with no parent or an unresolvable parent). A folder whose
/// ancestor chain loops back on itself is a hard error (§4.6, §6 exit code
/// 4): the tree can't be flattened into a filesystem path.
async fn build_folder_map(repository: &Repository) -> Result<HashMap<String, FolderMapEntry>> {
    let folders = repository
        .list_content(ContentType::Folder, &ContentFilter::default())
        .await?;
    let by_id: HashMap<String, &ContentItem> = folders.iter().map(|f| (f.id.clone(), f)).collect();

    for folder in &folders {
        detect_cycle(&by_id, folder)?;
    }

    let mut children: HashMap<Option<String>, Vec<&ContentItem>> = HashMap::new();
    for folder in &folders {
        let parent = folder
            .parent_id
            .clone()
            .filter(|p| by_id.contains_key(p));
        children.entry(parent).or_default().push(folder);
    }

    let mut map = HashMap::new();
    let mut queue: VecDeque<(Option<String>, PathBuf, u32)> = VecDeque::new();
    queue.push_back((None, PathBuf::new(), 0));

    while let Some((parent, parent_path, depth)) = queue.pop_front() {
        let Some(siblings) = children.get(&parent) else {
            continue;
        };
        let mut resolver = CollisionResolver::new();
        for folder in siblings {
            let segment = resolver.resolve(&sanitize_segment(&folder.name));
            let path = parent_path.join(&segment);
            let child_count = children
                .get(&Some(folder.id.clone()))
                .map(|c| c.len() as u32)
                .unwrap_or(0);
            map.insert(
                folder.id.clone(),
                FolderMapEntry {
                    id: folder.id.clone(),
                    name: folder.name.clone(),
                    parent_id: folder.parent_id.clone(),
                    path: path.to_string_lossy().replace('\\', "/"),
                    depth,
                    child_count,
                },
            );
            queue.push_back((Some(folder.id.clone()), path, depth + 1));
        }
    }

    Ok(map)
}

fn detect_cycle(by_id: &HashMap<String, &ContentItem>, start: &ContentItem) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    seen.insert(start.id.clone());
    let mut current = start;
    loop {
        let Some(parent_id) = &current.parent_id else {
            return Ok(());
        };
        let Some(parent) = by_id.get(parent_id) else {
            return Ok(());
        };
        if !seen.insert(parent.id.clone()) {
            return Err(Error::CircularFolderReference(start.id.clone()));
        }
        current = parent;
    }
}

fn folder_destination(map: &HashMap<String, FolderMapEntry>, item: &ContentItem) -> PathBuf {
    match item.folder_id.as_deref().and_then(|fid| map.get(fid)) {
        Some(entry) => Path::new(&entry.path).join(format!("{}.yaml", item.id)),
        None => Path::new(ORPHANED_DIR).join(format!("{}.yaml", item.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lv_types::ContentType;

    fn folder(id: &str, name: &str, parent_id: Option<&str>) -> ContentItem {
        let now = Utc::now();
        let mut item = ContentItem::new(id, ContentType::Folder, name, rmp_serde::to_vec(&serde_json::json!({"id": id, "name": name})).unwrap(), now);
        item.parent_id = parent_id.map(String::from);
        item
    }

    #[tokio::test]
    async fn full_strategy_writes_one_file_per_item() {
        let repo = Repository::open("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let item = ContentItem::new("1", ContentType::ScheduledPlan, "p1", rmp_serde::to_vec(&serde_json::json!({"id": "1"})).unwrap(), now);
        repo.save_content(&item).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let options = UnpackOptions {
            output_dir: dir.path().to_path_buf(),
            strategy: UnpackStrategy::Full,
            content_types: vec![ContentType::ScheduledPlan],
        };
        let metadata = unpack(&repo, &options).await.unwrap();
        assert_eq!(metadata.total_items, 1);
        assert!(dir.path().join("SCHEDULED_PLAN/1.yaml").exists());
        assert!(dir.path().join("metadata.json").exists());
    }

    #[tokio::test]
    async fn folder_strategy_places_dashboards_in_nested_paths() {
        let repo = Repository::open("sqlite::memory:").await.unwrap();
        repo.save_content(&folder("f1", "Sales", None)).await.unwrap();
        repo.save_content(&folder("f2", "Regional", Some("f1"))).await.unwrap();

        let now = Utc::now();
        let mut dash = ContentItem::new("d1", ContentType::Dashboard, "dash", rmp_serde::to_vec(&serde_json::json!({"id": "d1"})).unwrap(), now);
        dash.folder_id = Some("f2".to_string());
        repo.save_content(&dash).await.unwrap();

        let mut orphan = ContentItem::new("d2", ContentType::Dashboard, "orphan", rmp_serde::to_vec(&serde_json::json!({"id": "d2"})).unwrap(), now);
        orphan.folder_id = Some("missing".to_string());
        repo.save_content(&orphan).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let options = UnpackOptions {
            output_dir: dir.path().to_path_buf(),
            strategy: UnpackStrategy::Folder,
            content_types: vec![ContentType::Dashboard],
        };
        unpack(&repo, &options).await.unwrap();
        assert!(dir.path().join("Sales/Regional/d1.yaml").exists());
        assert!(dir.path().join("_orphaned/d2.yaml").exists());
    }

    #[tokio::test]
    async fn circular_folder_reference_is_rejected() {
        let repo = Repository::open("sqlite::memory:").await.unwrap();
        repo.save_content(&folder("f1", "A", Some("f2"))).await.unwrap();
        repo.save_content(&folder("f2", "B", Some("f1"))).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let options = UnpackOptions {
            output_dir: dir.path().to_path_buf(),
            strategy: UnpackStrategy::Folder,
            content_types: vec![ContentType::Dashboard],
        };
        let result = unpack(&repo, &options).await;
        assert!(matches!(result, Err(Error::CircularFolderReference(_))));
    }
}

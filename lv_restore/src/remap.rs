//! §4.5.1 ID remapping: rewrites foreign-key fields in a decoded write
//! model from source-instance ids to destination-instance ids before the
//! item is sent to the destination Looker client.

use lv_repository::Repository;
use lv_types::ContentType;

use crate::error::RestoreItemError;

struct FkField {
    name: &'static str,
    target: ContentType,
    list: bool,
}

/// The foreign-key fields restoration knows how to translate. Scalar
/// fields hold a single id; list fields hold an array of ids (e.g. a
/// dashboard's `user_ids` ACL).
const FK_FIELDS: &[FkField] = &[
    FkField { name: "folder_id", target: ContentType::Folder, list: false },
    FkField { name: "parent_id", target: ContentType::Folder, list: false },
    FkField { name: "user_id", target: ContentType::User, list: false },
    FkField { name: "look_id", target: ContentType::Look, list: false },
    FkField { name: "dashboard_id", target: ContentType::Dashboard, list: false },
    FkField { name: "role_id", target: ContentType::Role, list: false },
    FkField { name: "user_ids", target: ContentType::User, list: true },
    FkField { name: "group_ids", target: ContentType::Group, list: true },
    FkField { name: "role_ids", target: ContentType::Role, list: true },
];

/// Walks `value`'s known foreign-key fields, replacing each source id with
/// its destination counterpart where a mapping has been recorded (§4.5.1).
///
/// `strict` controls what happens when no mapping is recorded for an id:
/// in cross-instance restoration (a `source_instance` was given explicitly)
/// that means the referenced object was never created on the destination,
/// a [`RestoreItemError::Dependency`] the caller routes to the DLQ. In the
/// same-instance case (ordinary bulk-edit restores, no mapping table is
/// ever populated because ids don't change) the id is left as-is.
pub(crate) async fn remap_foreign_keys(
    repository: &Repository,
    source_instance: &str,
    strict: bool,
    value: &mut serde_json::Value,
) -> Result<(), RestoreItemError> {
    let serde_json::Value::Object(map) = value else {
        return Ok(());
    };

    for field in FK_FIELDS {
        let Some(entry) = map.get_mut(field.name) else {
            continue;
        };
        if field.list {
            let Some(items) = entry.as_array_mut() else {
                continue;
            };
            for item in items.iter_mut() {
                remap_one(repository, source_instance, strict, field, item).await?;
            }
        } else {
            remap_one(repository, source_instance, strict, field, entry).await?;
        }
    }
    Ok(())
}

async fn remap_one(
    repository: &Repository,
    source_instance: &str,
    strict: bool,
    field: &FkField,
    slot: &mut serde_json::Value,
) -> Result<(), RestoreItemError> {
    let Some(source_id) = slot.as_str().map(str::to_string) else {
        return Ok(());
    };
    if source_id.is_empty() {
        return Ok(());
    }
    match repository
        .get_destination_id(source_instance, field.target, &source_id)
        .await?
    {
        Some(destination_id) => {
            *slot = serde_json::Value::String(destination_id);
            Ok(())
        }
        None if strict => Err(RestoreItemError::Dependency {
            field: field.name,
            source_id,
        }),
        None => Ok(()),
    }
}

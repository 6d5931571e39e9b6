use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of Looker entity kinds LookerVault knows how to move.
///
/// Declaration order is the authoritative restoration dependency order
/// (§3): a type never begins restoration until every strictly-earlier type
/// has reached a terminal state. `Explore` is recognized for extraction but
/// is read-only and never restorable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ContentType {
    User,
    Group,
    Role,
    PermissionSet,
    ModelSet,
    Folder,
    LookmlModel,
    Look,
    Dashboard,
    Board,
    ScheduledPlan,
    Explore,
}

impl ContentType {
    /// All restorable types, in dependency order.
    pub const RESTORABLE_ORDER: &'static [ContentType] = &[
        ContentType::User,
        ContentType::Group,
        ContentType::Role,
        ContentType::PermissionSet,
        ContentType::ModelSet,
        ContentType::Folder,
        ContentType::LookmlModel,
        ContentType::Look,
        ContentType::Dashboard,
        ContentType::Board,
        ContentType::ScheduledPlan,
    ];

    pub fn is_restorable(&self) -> bool {
        !matches!(self, ContentType::Explore)
    }

    /// Types whose fetch is SDK-paginated and search-capable, making them
    /// eligible for the parallel fetch strategy (§4.4).
    pub fn supports_parallel_fetch(&self) -> bool {
        matches!(
            self,
            ContentType::Dashboard
                | ContentType::Look
                | ContentType::User
                | ContentType::Group
                | ContentType::Role
        )
    }

    /// Types the Looker API lets callers filter by folder at the SDK level
    /// (§4.4 folder filter, §9 open question 3).
    pub fn supports_folder_filter(&self) -> bool {
        matches!(self, ContentType::Dashboard | ContentType::Look)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::User => "USER",
            ContentType::Group => "GROUP",
            ContentType::Role => "ROLE",
            ContentType::PermissionSet => "PERMISSION_SET",
            ContentType::ModelSet => "MODEL_SET",
            ContentType::Folder => "FOLDER",
            ContentType::LookmlModel => "LOOKML_MODEL",
            ContentType::Look => "LOOK",
            ContentType::Dashboard => "DASHBOARD",
            ContentType::Board => "BOARD",
            ContentType::ScheduledPlan => "SCHEDULED_PLAN",
            ContentType::Explore => "EXPLORE",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "USER" => ContentType::User,
            "GROUP" => ContentType::Group,
            "ROLE" => ContentType::Role,
            "PERMISSION_SET" => ContentType::PermissionSet,
            "MODEL_SET" => ContentType::ModelSet,
            "FOLDER" => ContentType::Folder,
            "LOOKML_MODEL" => ContentType::LookmlModel,
            "LOOK" => ContentType::Look,
            "DASHBOARD" => ContentType::Dashboard,
            "BOARD" => ContentType::Board,
            "SCHEDULED_PLAN" => ContentType::ScheduledPlan,
            "EXPLORE" => ContentType::Explore,
            other => return Err(format!("unknown content type: {other}")),
        })
    }
}

/// A single persisted Looker object plus its bookkeeping metadata.
///
/// `content_data` holds a deterministic binary encoding of the Looker
/// object (msgpack); `id` is the Looker-assigned ID and is unique within
/// `content_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub content_type: ContentType,
    pub name: String,
    pub owner_id: Option<String>,
    pub folder_id: Option<String>,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub content_data: Vec<u8>,
    pub content_size: i64,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        content_type: ContentType,
        name: impl Into<String>,
        content_data: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Self {
        let content_size = content_data.len() as i64;
        Self {
            id: id.into(),
            content_type,
            name: name.into(),
            owner_id: None,
            folder_id: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
            deleted: false,
            content_data,
            content_size,
        }
    }
}

/// Filter criteria for `list_content`/`count_content` (§4.2).
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub folder_ids: Option<Vec<String>>,
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restorable_order_matches_declaration_order() {
        let mut sorted = ContentType::RESTORABLE_ORDER.to_vec();
        sorted.sort();
        assert_eq!(sorted, ContentType::RESTORABLE_ORDER);
    }

    #[test]
    fn explore_is_not_restorable() {
        assert!(!ContentType::Explore.is_restorable());
        assert!(ContentType::Dashboard.is_restorable());
    }

    #[test]
    fn round_trips_through_str() {
        for ct in ContentType::RESTORABLE_ORDER {
            let s = ct.as_str();
            let parsed: ContentType = s.parse().unwrap();
            assert_eq!(*ct, parsed);
        }
    }
}

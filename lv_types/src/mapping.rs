use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentType;

/// A persisted source-ID to destination-ID record supporting cross-instance
/// restoration (§3, §4.5.1). Primary key: `(source_instance, content_type,
/// source_id)`. Never mutated after creation except by overwrite with the
/// latest `destination_id` on re-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IDMapping {
    pub source_instance: String,
    pub content_type: ContentType,
    pub source_id: String,
    pub destination_id: String,
    pub created_at: DateTime<Utc>,
    pub session_id: Option<Uuid>,
}

impl IDMapping {
    pub fn new(
        source_instance: impl Into<String>,
        content_type: ContentType,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            source_instance: source_instance.into(),
            content_type,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            created_at: now,
            session_id: None,
        }
    }
}

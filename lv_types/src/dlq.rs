use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentType;
use crate::error::ErrorKind;

/// A content item that failed restoration after exhausting retries (§3,
/// §4.5). Uniqueness is `(session_id, content_id, content_type,
/// retry_count)`, which deduplicates a retry landing at the same level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content_id: String,
    pub content_type: ContentType,
    pub content_data: Vec<u8>,
    pub error_message: String,
    pub error_type: ErrorKind,
    pub stack_trace: Option<String>,
    pub retry_count: i64,
    pub failed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl DeadLetterItem {
    pub fn new(
        session_id: Uuid,
        content_id: impl Into<String>,
        content_type: ContentType,
        content_data: Vec<u8>,
        error_type: ErrorKind,
        error_message: impl Into<String>,
        retry_count: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            content_id: content_id.into(),
            content_type,
            content_data,
            error_message: error_message.into(),
            error_type,
            stack_trace: None,
            retry_count,
            failed_at: now,
            metadata: serde_json::Value::Null,
        }
    }
}

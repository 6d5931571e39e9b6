use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentType;

/// Lifecycle state of an extraction or restoration session (§4.5 state
/// machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// An extraction or restoration session (§3). The two kinds share this
/// shape; `source_instance`/`destination_instance` are only meaningful for
/// restoration sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub total_items: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
    pub source_instance: Option<String>,
    pub destination_instance: Option<String>,
}

impl Session {
    pub fn new_pending(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: now,
            completed_at: None,
            status: SessionStatus::Pending,
            total_items: 0,
            success_count: 0,
            error_count: 0,
            config: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
            source_instance: None,
            destination_instance: None,
        }
    }

    /// Invariant 2 (§3): `success_count + error_count <= total_items`,
    /// equality only after completion.
    pub fn counts_are_consistent(&self) -> bool {
        let processed = self.success_count + self.error_count;
        if self.status.is_terminal() {
            processed <= self.total_items
        } else {
            processed <= self.total_items
        }
    }
}

/// The data stored inside a checkpoint row (§3, §4.4, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointData {
    pub completed_ids: BTreeSet<String>,
    pub last_offset: Option<i64>,
}

impl CheckpointData {
    pub fn mark_completed(&mut self, id: impl Into<String>) {
        self.completed_ids.insert(id.into());
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed_ids.contains(id)
    }
}

/// A checkpoint for a `(session, content_type)` pair (§3). Uniqueness is
/// `(session_id, content_type, started_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content_type: ContentType,
    pub checkpoint_data: CheckpointData,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub item_count: i64,
    pub error_count: i64,
}

impl Checkpoint {
    pub fn new(session_id: Uuid, content_type: ContentType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            content_type,
            checkpoint_data: CheckpointData::default(),
            started_at: now,
            completed_at: None,
            item_count: 0,
            error_count: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_data_tracks_membership() {
        let mut data = CheckpointData::default();
        assert!(!data.is_completed("42"));
        data.mark_completed("42");
        assert!(data.is_completed("42"));
    }

    #[test]
    fn pending_session_has_zero_counts() {
        let s = Session::new_pending(Utc::now());
        assert_eq!(s.status, SessionStatus::Pending);
        assert!(s.counts_are_consistent());
    }
}

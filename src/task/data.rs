use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

use std::fmt;

/// Opaque task identifier, assigned once at creation and never reused.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> TaskId {
        TaskId(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority, stored as `"HIGH"` / `"MEDIUM"` / `"LOW"`.
///
/// Deserializing an unrecognized value falls back to `Medium`. This is
/// deliberate policy, not leniency for its own sake: snapshots written by
/// older revisions must keep loading.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl From<String> for Priority {
    fn from(raw: String) -> Priority {
        match raw.as_str() {
            "HIGH" => Priority::High,
            "LOW" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

impl Priority {
    /// Sort rank, most urgent first.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// Task category, stored lowercase. Unrecognized values fall back to
/// `Other`, same policy as [`Priority`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Category {
    Work,
    Personal,
    Health,
    Shopping,
    #[default]
    Other,
}

impl From<String> for Category {
    fn from(raw: String) -> Category {
        match raw.as_str() {
            "work" => Category::Work,
            "personal" => Category::Personal,
            "health" => Category::Health,
            "shopping" => Category::Shopping,
            _ => Category::Other,
        }
    }
}

/// A single task record. Field names follow the persisted JSON snapshot.
///
/// Invariants, maintained by the store:
/// - `title` is never empty or whitespace-only;
/// - `completed_at` is `Some` exactly when `is_completed` is true;
/// - `created_at` never changes after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_pinned: bool,
}

/// Input for [`crate::task::store::TaskStore::add`]. Only the title is
/// required; everything else defaults.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            ..TaskDraft::default()
        }
    }
}

/// Partial edit for [`crate::task::store::TaskStore::update`]. Every field
/// is independently optional; `due_date` is doubly optional so `Some(None)`
/// clears the deadline while `None` leaves it alone. The id and creation
/// timestamp are not expressible here by construction.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

pub(crate) fn encode_snapshot(tasks: &[Task]) -> Result<String, StorageError> {
    serde_json::to_string(tasks).map_err(|e| StorageError::Backend(e.to_string()))
}

pub(crate) fn decode_snapshot(raw: &str) -> Result<Vec<Task>, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Corrupt(e.to_string()))
}

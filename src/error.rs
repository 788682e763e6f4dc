use thiserror::Error;

use crate::task::data::TaskId;

/// Errors reported by store operations. None of these are fatal; a failed
/// call leaves the task sequence exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The supplied title was empty or whitespace-only.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The referenced task is not in the store, e.g. a stale UI reference.
    #[error("no task with id {0}")]
    UnknownTask(TaskId),

    /// The requested reorder would put a pinned task after an unpinned one
    /// (or the reverse). A policy signal for user feedback, not a fault.
    #[error("reorder would move a task across the pinned boundary")]
    PinnedBoundary,
}

/// Failures of the persistent snapshot slot. In-memory state stays
/// authoritative for the session whenever one of these occurs; the worst
/// case is loss of durability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The slot held data that could not be decoded as a task snapshot.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> StorageError {
        StorageError::Backend(e.to_string())
    }
}

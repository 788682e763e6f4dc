//! Core task-list state for the planner UI: an in-memory task sequence,
//! its mutating operations, derived Today/Upcoming/Completed views, and
//! full-snapshot persistence to a named storage slot. The rendering and
//! notification layers live outside this crate; they call the store and
//! subscribe to its change events.

pub mod error;
pub mod storage;
pub mod task;

pub use error::{StorageError, TaskError};
pub use storage::{MemorySlot, SnapshotSlot, SqliteSlot};
pub use task::data::{Category, Priority, Task, TaskChanges, TaskDraft, TaskId};
pub use task::store::{Change, Direction, StoreEvent, SubscriberId, TaskStore, TASKS_SLOT};
pub use task::views::{bucket, filter, is_overdue, Buckets, TaskFilter};

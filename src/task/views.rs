//! Derived views over the task sequence: bucketing into the Today /
//! Upcoming / Completed sections, the in-bucket sort orders, and the
//! filter bar predicates. Everything here is a pure function of the
//! sequence; the manual order owned by the store is never touched.

use chrono::{DateTime, Local, Utc};

use super::data::{Category, Priority, Task};

use std::cmp::Reverse;

/// The three sections the UI renders.
#[derive(Debug, Default)]
pub struct Buckets<'a> {
    pub today: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
    pub completed: Vec<&'a Task>,
}

impl<'a> Buckets<'a> {
    /// Per-section counts in (today, upcoming, completed) order, for the
    /// section header chips.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.today.len(), self.upcoming.len(), self.completed.len())
    }
}

/// Optional predicates over the task list, combined with AND. An empty
/// filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Case-insensitive substring match against title and description.
    pub search: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    /// Completion visibility: `Some(false)` hides completed tasks.
    pub completed: Option<bool>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !task.title.to_lowercase().contains(&needle)
                && !task.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(category) = self.category {
            if task.category != category {
                return false;
            }
        }
        if let Some(completed) = self.completed {
            if task.is_completed != completed {
                return false;
            }
        }
        true
    }
}

/// Apply a filter, keeping the underlying order. Runs before bucketing.
pub fn filter<'a>(tasks: &'a [Task], filter: &TaskFilter) -> Vec<&'a Task> {
    tasks.iter().filter(|task| filter.matches(task)).collect()
}

/// Partition tasks into the three sections relative to `reference`, then
/// sort each section.
///
/// Completed tasks land in Completed regardless of due date. Uncompleted
/// tasks with no due date, or due on or before the reference calendar day
/// (both truncated to local midnight), land in Today, so overdue tasks
/// surface as due rather than vanishing. The rest are Upcoming.
///
/// Sort orders, pinned tasks hoisted first in every section and ties left
/// in manual order:
/// - Today: ascending due date (no due date sorts earliest), then
///   priority High before Medium before Low;
/// - Upcoming: ascending due date;
/// - Completed: most recently completed first, missing `completed_at`
///   sorting as oldest.
pub fn bucket<'a, I>(tasks: I, reference: DateTime<Local>) -> Buckets<'a>
where
    I: IntoIterator<Item = &'a Task>,
{
    let reference_day = reference.date_naive();
    let mut buckets = Buckets::default();

    for task in tasks {
        if task.is_completed {
            buckets.completed.push(task);
        } else {
            match task.due_date {
                Some(due) if due.with_timezone(&Local).date_naive() > reference_day => {
                    buckets.upcoming.push(task)
                }
                _ => buckets.today.push(task),
            }
        }
    }

    let earliest = DateTime::<Utc>::MIN_UTC;
    buckets.today.sort_by_key(|task| {
        (
            !task.is_pinned,
            task.due_date.unwrap_or(earliest),
            task.priority.rank(),
        )
    });
    buckets
        .upcoming
        .sort_by_key(|task| (!task.is_pinned, task.due_date));
    buckets.completed.sort_by_key(|task| {
        (
            !task.is_pinned,
            Reverse(task.completed_at.unwrap_or(earliest)),
        )
    });

    buckets
}

/// Whether a task shows as overdue: still open and past its due instant.
pub fn is_overdue(task: &Task, reference: DateTime<Utc>) -> bool {
    match task.due_date {
        Some(due) => !task.is_completed && due < reference,
        None => false,
    }
}

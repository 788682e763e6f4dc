use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{StorageError, TaskError};
use crate::storage::SnapshotSlot;

use super::data::{decode_snapshot, encode_snapshot, Task, TaskChanges, TaskDraft, TaskId};

/// Name of the persistent slot holding the task snapshot.
pub const TASKS_SLOT: &str = "tasks";

/// Which way [`TaskStore::reorder`] moves a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// What a [`StoreEvent::Changed`] broadcast was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(TaskId),
    Updated(TaskId),
    Removed(TaskId),
    Toggled(TaskId),
    Cleared { removed: usize },
    Pinned(TaskId),
    Reordered(TaskId),
}

/// Broadcast to subscribers after store activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The sequence changed; subscribers should re-pull derived views.
    Changed(Change),
    /// A snapshot write failed. Memory is still current, durability is not.
    PersistFailed(String),
}

/// Handle returned by [`TaskStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

type Callback = Box<dyn FnMut(&StoreEvent)>;

/// The authoritative in-memory task list.
///
/// Owns the manual ordering (mutated only by [`TaskStore::reorder`]) and
/// snapshots the full sequence to the `"tasks"` slot after every mutation.
/// Single-writer discipline: the owning UI layer calls mutating operations
/// strictly one at a time, so there is no locking here; subscriber
/// callbacks run synchronously inside the mutating call.
pub struct TaskStore<S: SnapshotSlot> {
    tasks: Vec<Task>,
    slot: S,
    load_warning: Option<StorageError>,
    subscribers: Vec<(SubscriberId, Callback)>,
    next_subscriber: u64,
}

impl<S: SnapshotSlot> TaskStore<S> {
    /// Open the store over `slot`, loading any existing snapshot. A missing
    /// or cleared slot yields an empty list. A snapshot that cannot be read
    /// or decoded also yields an empty list, with the failure retained for
    /// [`TaskStore::load_warning`] rather than aborting the session.
    pub fn open(slot: S) -> TaskStore<S> {
        let (tasks, load_warning) = match TaskStore::load(&slot) {
            Ok(tasks) => (tasks, None),
            Err(error) => {
                warn!(%error, "discarding unreadable task snapshot");
                (Vec::new(), Some(error))
            }
        };
        TaskStore {
            tasks,
            slot,
            load_warning,
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    fn load(slot: &S) -> Result<Vec<Task>, StorageError> {
        match slot.read(TASKS_SLOT)? {
            Some(raw) if !raw.is_empty() => decode_snapshot(&raw),
            _ => Ok(Vec::new()),
        }
    }

    /// The failure, if any, that made [`TaskStore::open`] start empty.
    pub fn load_warning(&self) -> Option<&StorageError> {
        self.load_warning.as_ref()
    }

    /// The live sequence in manual order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether any task is completed; drives clear-completed enablement.
    pub fn has_completed(&self) -> bool {
        self.tasks.iter().any(|task| task.is_completed)
    }

    /// Register a callback invoked after every broadcastable outcome.
    pub fn subscribe(&mut self, callback: Callback) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, callback));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.subscribers.retain(|(sid, _)| *sid != id);
    }

    fn broadcast(&mut self, event: StoreEvent) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&event);
        }
    }

    /// Snapshot the full sequence. An empty sequence clears the slot so a
    /// deliberately emptied list and a never-initialized one read back the
    /// same way.
    fn persist(&mut self) -> Result<(), StorageError> {
        if self.tasks.is_empty() {
            self.slot.clear(TASKS_SLOT)
        } else {
            let snapshot = encode_snapshot(&self.tasks)?;
            self.slot.write(TASKS_SLOT, &snapshot)
        }
    }

    /// Persist and notify after a successful mutation. A failed write is a
    /// durability warning, never a rollback: memory stays authoritative.
    fn commit(&mut self, change: Change) {
        if let Err(error) = self.persist() {
            warn!(%error, "task snapshot write failed, keeping in-memory state");
            self.broadcast(StoreEvent::PersistFailed(error.to_string()));
        }
        self.broadcast(StoreEvent::Changed(change));
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Create a task from `draft` and append it to the sequence.
    pub fn add(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }
        let task = Task {
            id: TaskId::new(),
            title: title.to_string(),
            description: draft.description.trim().to_string(),
            is_completed: false,
            priority: draft.priority,
            category: draft.category,
            due_date: draft.due_date,
            created_at: Utc::now(),
            updated_at: None,
            completed_at: None,
            is_pinned: false,
        };
        debug!(id = %task.id, "adding task");
        self.tasks.push(task.clone());
        self.commit(Change::Added(task.id));
        Ok(task)
    }

    /// Apply a partial edit. The id and `created_at` are untouchable by
    /// construction; completed tasks are editable (blocking that is a UI
    /// policy, not a store invariant).
    pub fn update(&mut self, id: TaskId, changes: TaskChanges) -> Result<Task, TaskError> {
        let index = self.index_of(id).ok_or(TaskError::UnknownTask(id))?;
        if let Some(raw) = &changes.title {
            if raw.trim().is_empty() {
                return Err(TaskError::EmptyTitle);
            }
        }

        let task = &mut self.tasks[index];
        if let Some(title) = changes.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            task.description = description.trim().to_string();
        }
        if let Some(priority) = changes.priority {
            task.priority = priority;
        }
        if let Some(category) = changes.category {
            task.category = category;
        }
        if let Some(due_date) = changes.due_date {
            task.due_date = due_date;
        }
        task.updated_at = Some(Utc::now());

        let task = task.clone();
        debug!(id = %id, "updated task");
        self.commit(Change::Updated(id));
        Ok(task)
    }

    /// Delete a task. An absent id is a no-op returning false, not an
    /// error; persistence is triggered either way.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = self.tasks.len() != before;
        self.commit(Change::Removed(id));
        removed
    }

    /// Flip completion. Transitioning to complete stamps `completed_at`;
    /// transitioning back clears it, so the operation is its own inverse.
    pub fn toggle_completion(&mut self, id: TaskId) -> Result<Task, TaskError> {
        let index = self.index_of(id).ok_or(TaskError::UnknownTask(id))?;
        let task = &mut self.tasks[index];
        task.is_completed = !task.is_completed;
        task.completed_at = if task.is_completed {
            Some(Utc::now())
        } else {
            None
        };
        let task = task.clone();
        self.commit(Change::Toggled(id));
        Ok(task)
    }

    /// Remove every completed task in one step, returning the count.
    /// Persists even when nothing was removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.is_completed);
        let removed = before - self.tasks.len();
        debug!(removed, "cleared completed tasks");
        self.commit(Change::Cleared { removed });
        removed
    }

    /// Set the pin flag. Sequence position is untouched; hoisting happens
    /// in the derived views.
    pub fn set_pinned(&mut self, id: TaskId, pinned: bool) -> Result<Task, TaskError> {
        let index = self.index_of(id).ok_or(TaskError::UnknownTask(id))?;
        self.tasks[index].is_pinned = pinned;
        let task = self.tasks[index].clone();
        self.commit(Change::Pinned(id));
        Ok(task)
    }

    /// Move a task one position in the manual order, wrapping around at
    /// either end. The pin constraint is checked against the would-be
    /// result before anything is applied: a pinned task may not end up
    /// after an unpinned one, and an unpinned task may not end up before a
    /// pinned one. A rejected move leaves the sequence untouched.
    pub fn reorder(&mut self, id: TaskId, direction: Direction) -> Result<(), TaskError> {
        let index = self.index_of(id).ok_or(TaskError::UnknownTask(id))?;
        let last = self.tasks.len() - 1;
        let pinned = self.tasks[index].is_pinned;

        match direction {
            Direction::Up if index == 0 => {
                // wraps to the end, behind every other task
                if pinned && self.tasks[1..].iter().any(|task| !task.is_pinned) {
                    return Err(TaskError::PinnedBoundary);
                }
                let task = self.tasks.remove(0);
                self.tasks.push(task);
            }
            Direction::Up => {
                if !pinned && self.tasks[index - 1].is_pinned {
                    return Err(TaskError::PinnedBoundary);
                }
                self.tasks.swap(index, index - 1);
            }
            Direction::Down if index == last => {
                // wraps to the front, ahead of every other task
                if !pinned && self.tasks[..last].iter().any(|task| task.is_pinned) {
                    return Err(TaskError::PinnedBoundary);
                }
                let task = self.tasks.remove(last);
                self.tasks.insert(0, task);
            }
            Direction::Down => {
                if pinned && !self.tasks[index + 1].is_pinned {
                    return Err(TaskError::PinnedBoundary);
                }
                self.tasks.swap(index, index + 1);
            }
        }

        self.commit(Change::Reordered(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlot;
    use crate::task::data::Priority;

    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn store() -> TaskStore<MemorySlot> {
        TaskStore::open(MemorySlot::new())
    }

    fn invariant_holds(store: &TaskStore<MemorySlot>) -> bool {
        store
            .tasks()
            .iter()
            .all(|task| task.is_completed == task.completed_at.is_some())
    }

    #[test]
    fn add_assigns_unique_ids() {
        let mut store = store();
        let mut seen = HashSet::new();
        for i in 0..50 {
            let task = store.add(TaskDraft::titled(format!("task {i}"))).unwrap();
            assert!(seen.insert(task.id));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn add_trims_and_rejects_blank_titles() {
        let mut store = store();
        assert_eq!(store.add(TaskDraft::titled("")), Err(TaskError::EmptyTitle));
        assert_eq!(
            store.add(TaskDraft::titled("   ")),
            Err(TaskError::EmptyTitle)
        );
        assert!(store.is_empty());

        let task = store.add(TaskDraft::titled("  padded  ")).unwrap();
        assert_eq!(task.title, "padded");
        assert!(!task.is_completed);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.updated_at, None);
    }

    #[test]
    fn toggle_completion_is_its_own_inverse() {
        let mut store = store();
        let id = store.add(TaskDraft::titled("flip me")).unwrap().id;

        let done = store.toggle_completion(id).unwrap();
        assert!(done.is_completed);
        assert!(done.completed_at.is_some());
        assert!(invariant_holds(&store));

        let undone = store.toggle_completion(id).unwrap();
        assert!(!undone.is_completed);
        assert_eq!(undone.completed_at, None);
        assert!(invariant_holds(&store));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut store = store();
        let ghost = store.add(TaskDraft::titled("ghost")).unwrap().id;
        assert!(store.remove(ghost));

        assert_eq!(
            store.toggle_completion(ghost),
            Err(TaskError::UnknownTask(ghost))
        );
        assert_eq!(
            store.update(ghost, TaskChanges::default()),
            Err(TaskError::UnknownTask(ghost))
        );
        assert_eq!(
            store.set_pinned(ghost, true),
            Err(TaskError::UnknownTask(ghost))
        );
        assert_eq!(
            store.reorder(ghost, Direction::Up),
            Err(TaskError::UnknownTask(ghost))
        );
        assert!(!store.remove(ghost));
    }

    #[test]
    fn update_edits_fields_but_never_created_at() {
        let mut store = store();
        let original = store.add(TaskDraft::titled("draft")).unwrap();

        let updated = store
            .update(
                original.id,
                TaskChanges {
                    title: Some("  final  ".to_string()),
                    description: Some("notes".to_string()),
                    priority: Some(Priority::High),
                    due_date: Some(Some(Utc::now())),
                    ..TaskChanges::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "final");
        assert_eq!(updated.description, "notes");
        assert_eq!(updated.priority, Priority::High);
        assert!(updated.due_date.is_some());
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.created_at, original.created_at);

        // doubled Option clears the deadline
        let cleared = store
            .update(
                original.id,
                TaskChanges {
                    due_date: Some(None),
                    ..TaskChanges::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.due_date, None);

        // a blank title rejects the whole edit
        let result = store.update(
            original.id,
            TaskChanges {
                title: Some("  ".to_string()),
                description: Some("should not land".to_string()),
                ..TaskChanges::default()
            },
        );
        assert_eq!(result, Err(TaskError::EmptyTitle));
        assert_eq!(store.get(original.id).unwrap().description, "notes");
    }

    #[test]
    fn completed_tasks_are_editable() {
        let mut store = store();
        let id = store.add(TaskDraft::titled("done deal")).unwrap().id;
        store.toggle_completion(id).unwrap();

        let updated = store
            .update(
                id,
                TaskChanges {
                    title: Some("still editable".to_string()),
                    ..TaskChanges::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "still editable");
        assert!(updated.is_completed);
    }

    #[test]
    fn clear_completed_removes_all_and_counts() {
        let mut store = store();
        let a = store.add(TaskDraft::titled("a")).unwrap().id;
        let b = store.add(TaskDraft::titled("b")).unwrap().id;
        store.add(TaskDraft::titled("c")).unwrap();
        store.toggle_completion(a).unwrap();
        store.toggle_completion(b).unwrap();

        assert!(store.has_completed());
        assert_eq!(store.clear_completed(), 2);
        assert!(!store.has_completed());
        assert_eq!(store.len(), 1);
        assert!(invariant_holds(&store));

        // no-op clear is safe
        assert_eq!(store.clear_completed(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_round_trips_through_reopen() {
        let mut slot = MemorySlot::new();
        let first_id;
        {
            let mut store = TaskStore::open(&mut slot);
            first_id = store.add(TaskDraft::titled("survives")).unwrap().id;
            store.add(TaskDraft::titled("also survives")).unwrap();
            store.toggle_completion(first_id).unwrap();
        }

        let store = TaskStore::open(&mut slot);
        assert!(store.load_warning().is_none());
        assert_eq!(store.len(), 2);
        let restored = store.get(first_id).unwrap();
        assert_eq!(restored.title, "survives");
        assert!(restored.is_completed);
        assert!(restored.completed_at.is_some());
    }

    #[test]
    fn emptying_the_store_clears_the_slot() {
        let mut slot = MemorySlot::new();
        {
            let mut store = TaskStore::open(&mut slot);
            store.add(TaskDraft::titled("transient")).unwrap();
        }
        assert!(slot.read(TASKS_SLOT).unwrap().is_some());

        {
            let mut store = TaskStore::open(&mut slot);
            let id = store.tasks()[0].id;
            store.remove(id);
        }
        // cleared, not an empty "[]" payload
        assert_eq!(slot.read(TASKS_SLOT).unwrap(), None);

        let store = TaskStore::open(&mut slot);
        assert!(store.is_empty());
        assert!(store.load_warning().is_none());
    }

    #[test]
    fn corrupt_snapshot_yields_empty_store_and_warning() {
        let mut slot = MemorySlot::new();
        slot.write(TASKS_SLOT, "{{{ definitely not json").unwrap();

        let store = TaskStore::open(&mut slot);
        assert!(store.is_empty());
        assert!(matches!(
            store.load_warning(),
            Some(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn failed_writes_keep_memory_authoritative() {
        let mut slot = MemorySlot::new();
        slot.fail_writes = true;

        let mut store = TaskStore::open(slot);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        store.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));

        let task = store.add(TaskDraft::titled("kept in memory")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(task.id).unwrap().title, "kept in memory");

        let events = events.borrow();
        assert!(matches!(events[0], StoreEvent::PersistFailed(_)));
        assert_eq!(events[1], StoreEvent::Changed(Change::Added(task.id)));
    }

    #[test]
    fn subscribers_hear_changes_until_unsubscribed() {
        let mut store = store();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let sub = store.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));

        let id = store.add(TaskDraft::titled("watched")).unwrap().id;
        store.set_pinned(id, true).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![
                StoreEvent::Changed(Change::Added(id)),
                StoreEvent::Changed(Change::Pinned(id)),
            ]
        );

        store.unsubscribe(sub);
        store.toggle_completion(id).unwrap();
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn reorder_moves_one_position() {
        let mut store = store();
        let a = store.add(TaskDraft::titled("a")).unwrap().id;
        let b = store.add(TaskDraft::titled("b")).unwrap().id;
        let c = store.add(TaskDraft::titled("c")).unwrap().id;

        store.reorder(b, Direction::Up).unwrap();
        assert_eq!(order(&store), vec![b, a, c]);

        store.reorder(b, Direction::Down).unwrap();
        assert_eq!(order(&store), vec![a, b, c]);
    }

    #[test]
    fn reorder_wraps_around_at_the_ends() {
        let mut store = store();
        let a = store.add(TaskDraft::titled("a")).unwrap().id;
        let b = store.add(TaskDraft::titled("b")).unwrap().id;
        let c = store.add(TaskDraft::titled("c")).unwrap().id;

        // up from the front wraps to the back
        store.reorder(a, Direction::Up).unwrap();
        assert_eq!(order(&store), vec![b, c, a]);

        // down from the back wraps to the front
        store.reorder(a, Direction::Down).unwrap();
        assert_eq!(order(&store), vec![a, b, c]);
    }

    #[test]
    fn reorder_respects_the_pinned_boundary() {
        let mut store = store();
        let p1 = store.add(TaskDraft::titled("p1")).unwrap().id;
        let p2 = store.add(TaskDraft::titled("p2")).unwrap().id;
        let u1 = store.add(TaskDraft::titled("u1")).unwrap().id;
        let u2 = store.add(TaskDraft::titled("u2")).unwrap().id;
        store.set_pinned(p1, true).unwrap();
        store.set_pinned(p2, true).unwrap();

        // an unpinned task may not climb above a pinned one
        assert_eq!(
            store.reorder(u1, Direction::Up),
            Err(TaskError::PinnedBoundary)
        );
        assert_eq!(order(&store), vec![p1, p2, u1, u2]);

        // a pinned task may not sink below an unpinned one
        assert_eq!(
            store.reorder(p2, Direction::Down),
            Err(TaskError::PinnedBoundary)
        );
        assert_eq!(order(&store), vec![p1, p2, u1, u2]);

        // a pinned task at the front may not wrap behind unpinned tasks
        assert_eq!(
            store.reorder(p1, Direction::Up),
            Err(TaskError::PinnedBoundary)
        );
        // an unpinned task at the back may not wrap ahead of pinned tasks
        assert_eq!(
            store.reorder(u2, Direction::Down),
            Err(TaskError::PinnedBoundary)
        );
        assert_eq!(order(&store), vec![p1, p2, u1, u2]);

        // moves within each side stay legal
        store.reorder(p2, Direction::Up).unwrap();
        store.reorder(u1, Direction::Down).unwrap();
        assert_eq!(order(&store), vec![p2, p1, u2, u1]);
    }

    #[test]
    fn pinned_boundary_never_broken_by_reorder_sequences() {
        let mut store = store();
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(store.add(TaskDraft::titled(format!("t{i}"))).unwrap().id);
        }
        for id in &ids[..3] {
            store.set_pinned(*id, true).unwrap();
        }

        let moves = [
            (0, Direction::Up),
            (5, Direction::Down),
            (2, Direction::Down),
            (3, Direction::Up),
            (1, Direction::Up),
            (4, Direction::Down),
            (0, Direction::Down),
            (5, Direction::Up),
        ];
        for (slot, direction) in moves {
            // rejected moves are fine; broken invariants are not
            let _ = store.reorder(ids[slot], direction);
            let first_unpinned = store
                .tasks()
                .iter()
                .position(|task| !task.is_pinned)
                .unwrap();
            assert!(store.tasks()[first_unpinned..]
                .iter()
                .all(|task| !task.is_pinned));
        }
    }

    #[test]
    fn reorder_single_task_is_a_harmless_rotation() {
        let mut store = store();
        let only = store.add(TaskDraft::titled("only")).unwrap().id;
        store.reorder(only, Direction::Up).unwrap();
        store.reorder(only, Direction::Down).unwrap();
        assert_eq!(order(&store), vec![only]);
    }

    fn order(store: &TaskStore<MemorySlot>) -> Vec<TaskId> {
        store.tasks().iter().map(|task| task.id).collect()
    }
}

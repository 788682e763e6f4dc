use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;

use std::collections::HashMap;
use std::path::Path;

/// A named slot of persistent text storage, shaped like the browser's
/// key-value storage: whole values read and written atomically by name.
///
/// The store keeps its snapshot in the `"tasks"` slot; presentation-layer
/// slots (`"theme"`, `"font"`) belong to the UI and are never touched here.
pub trait SnapshotSlot {
    /// Read a slot. `None` means the slot has never been written or was
    /// cleared; the two are indistinguishable on purpose.
    fn read(&self, name: &str) -> Result<Option<String>, StorageError>;

    fn write(&mut self, name: &str, value: &str) -> Result<(), StorageError>;

    fn clear(&mut self, name: &str) -> Result<(), StorageError>;
}

impl<T: SnapshotSlot + ?Sized> SnapshotSlot for &mut T {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        (**self).read(name)
    }

    fn write(&mut self, name: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(name, value)
    }

    fn clear(&mut self, name: &str) -> Result<(), StorageError> {
        (**self).clear(name)
    }
}

/// SQLite-backed slot storage, one row per slot name.
pub struct SqliteSlot {
    connection: Connection,
}

impl SqliteSlot {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SqliteSlot, StorageError> {
        SqliteSlot::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<SqliteSlot, StorageError> {
        SqliteSlot::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<SqliteSlot, StorageError> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS slots (name TEXT PRIMARY KEY, value TEXT)",
            params![],
        )?;
        Ok(SqliteSlot { connection })
    }
}

impl SnapshotSlot for SqliteSlot {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .connection
            .query_row(
                "SELECT value FROM slots WHERE name = ?1",
                params![name],
                |row| row.get::<usize, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&mut self, name: &str, value: &str) -> Result<(), StorageError> {
        self.connection.execute(
            "INSERT OR REPLACE INTO slots (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        Ok(())
    }

    fn clear(&mut self, name: &str) -> Result<(), StorageError> {
        self.connection
            .execute("DELETE FROM slots WHERE name = ?1", params![name])?;
        Ok(())
    }
}

/// In-memory slot storage for tests and throwaway sessions. Setting
/// `fail_writes` makes every write and clear report a backend error
/// without touching the map, so durability-loss policy can be exercised.
#[derive(Debug, Default)]
pub struct MemorySlot {
    slots: HashMap<String, String>,
    pub fail_writes: bool,
}

impl MemorySlot {
    pub fn new() -> MemorySlot {
        MemorySlot::default()
    }
}

impl SnapshotSlot for MemorySlot {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(name).cloned())
    }

    fn write(&mut self, name: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Backend("memory slot writes disabled".into()));
        }
        self.slots.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self, name: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Backend("memory slot writes disabled".into()));
        }
        self.slots.remove(name);
        Ok(())
    }
}

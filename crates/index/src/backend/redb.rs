//! Redb (Rust embedded database) backend for embedding storage.
//!
//! Every method runs in its own redb transaction, so each mutation is atomic
//! and durable once it returns. Redb serializes write transactions, which is
//! what makes `put_if_absent` race-free across threads.
//!
//! # Configuration Example
//! ```yaml
//! index:
//!   backend: "redb"
//!   path: "/var/lib/visage/faces.redb"
//! ```

use crate::{IndexBackend, IndexError};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

/// Table holding one encoded `EmbeddingRecord` per identity key.
const EMBEDDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("face_embeddings");

/// Redb backend implementation for persistent key-value storage.
///
/// The database handle is owned here and released on drop; nothing else in
/// the process keeps the file open.
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    ///
    /// # Example
    /// ```no_run
    /// use index::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/faces.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(IndexError::backend)?;
            }
        }

        let db = Database::create(path).map_err(IndexError::backend)?;

        // Accessing the table creates it if it doesn't exist
        let write_txn = db.begin_write().map_err(IndexError::backend)?;
        {
            let _table = write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;

        Ok(Self { db })
    }
}

impl IndexBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<bool, IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        let existed = {
            let mut table = write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(IndexError::backend)?;
            let previous = table.insert(key, value).map_err(IndexError::backend)?;
            previous.is_some()
        };
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(existed)
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        {
            let mut table = write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(IndexError::backend)?;
            let exists = table.get(key).map_err(IndexError::backend)?.is_some();
            if exists {
                // Dropping the transaction without commit aborts it.
                return Ok(false);
            }
            table.insert(key, value).map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(IndexError::backend)?;

        let value = table.get(key).map_err(IndexError::backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn delete(&self, key: &str) -> Result<bool, IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        let existed = {
            let mut table = write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(IndexError::backend)?;
            let removed = table.remove(key).map_err(IndexError::backend)?;
            removed.is_some()
        };
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(existed)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(IndexError::backend)?;

        for item in table.iter().map_err(IndexError::backend)? {
            let (_, value) = item.map_err(IndexError::backend)?;
            visitor(value.value())?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<(), IndexError> {
        // Drop and recreate the table in one transaction; the database file
        // and its lock stay with this handle.
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        write_txn
            .delete_table(EMBEDDINGS_TABLE)
            .map_err(IndexError::backend)?;
        {
            let _table = write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), IndexError> {
        // Redb commits are durable on return; nothing is buffered.
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::{PersonRecord, RecordStoreError};

/// System-of-record for person attributes.
///
/// The face index only holds keys and vectors; everything a caller is shown
/// about a person comes from here.
pub trait RecordStore: Send + Sync {
    /// Look a person up by canonical id.
    fn get_by_id(&self, id: &str) -> Result<Option<PersonRecord>, RecordStoreError>;
    /// Look a person up by the alias their embedding is indexed under.
    fn get_by_alias(&self, alias: &str) -> Result<Option<PersonRecord>, RecordStoreError>;
    /// Persist a new record. Fails with `Conflict` if the id or alias is taken.
    fn create(&self, record: PersonRecord) -> Result<(), RecordStoreError>;
    /// Overwrite an existing record. Fails with `NotFound` if absent.
    fn update(&self, record: PersonRecord) -> Result<(), RecordStoreError>;
    /// Remove a record. Returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool, RecordStoreError>;
    fn count(&self) -> Result<usize, RecordStoreError>;
    /// Every stored id, sorted.
    fn ids(&self) -> Result<Vec<String>, RecordStoreError>;
    /// Remove every record.
    fn clear(&self) -> Result<(), RecordStoreError>;
}

/// An in-memory store using a `RwLock` around a `HashMap`.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, PersonRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, PersonRecord>>, RecordStoreError>
    {
        self.records
            .read()
            .map_err(|_| RecordStoreError::backend("poisoned lock"))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, PersonRecord>>, RecordStoreError>
    {
        self.records
            .write()
            .map_err(|_| RecordStoreError::backend("poisoned lock"))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get_by_id(&self, id: &str) -> Result<Option<PersonRecord>, RecordStoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    fn get_by_alias(&self, alias: &str) -> Result<Option<PersonRecord>, RecordStoreError> {
        Ok(self
            .read()?
            .values()
            .find(|r| r.vector_id.as_deref() == Some(alias))
            .cloned())
    }

    fn create(&self, record: PersonRecord) -> Result<(), RecordStoreError> {
        let mut guard = self.write()?;
        if guard.contains_key(&record.id) {
            return Err(RecordStoreError::Conflict(record.id));
        }
        if let Some(alias) = record.vector_id.as_deref() {
            if guard.values().any(|r| r.vector_id.as_deref() == Some(alias)) {
                return Err(RecordStoreError::Conflict(alias.to_string()));
            }
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    fn update(&self, mut record: PersonRecord) -> Result<(), RecordStoreError> {
        let mut guard = self.write()?;
        let Some(slot) = guard.get_mut(&record.id) else {
            return Err(RecordStoreError::NotFound(record.id));
        };
        record.created_at = slot.created_at;
        record.updated_at = Utc::now();
        *slot = record;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, RecordStoreError> {
        Ok(self.write()?.remove(id).is_some())
    }

    fn count(&self) -> Result<usize, RecordStoreError> {
        Ok(self.read()?.len())
    }

    fn ids(&self) -> Result<Vec<String>, RecordStoreError> {
        let mut ids: Vec<String> = self.read()?.keys().cloned().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn clear(&self) -> Result<(), RecordStoreError> {
        self.write()?.clear();
        Ok(())
    }
}

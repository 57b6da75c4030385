//! # Visage Registry
//!
//! The person record store that face matches are resolved against.
//!
//! Storage of person attributes is owned by the embedding application (a
//! relational database in most deployments). This crate defines the
//! [`RecordStore`] contract the rest of visage relies on, the
//! [`PersonRecord`] it exchanges, and an [`InMemoryRecordStore`] for tests
//! and single-process use.

mod store;
mod types;

pub use store::{InMemoryRecordStore, RecordStore};
pub use types::{PersonAttributes, PersonRecord, MAX_AGE};

use thiserror::Error;

/// Errors raised by a [`RecordStore`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordStoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("invalid record: {0}")]
    Validation(String),
    #[error("record store unavailable: {0}")]
    Backend(String),
}

impl RecordStoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

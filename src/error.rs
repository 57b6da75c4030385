use index::IndexError;
use matcher::MatchError;
use registry::RecordStoreError;
use serde::{Deserialize, Serialize};

use crate::extractor::ExtractError;
use crate::service::ResetReport;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure class of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any store was touched. Safe to retry with fixed input.
    InvalidInput,
    /// The identity does not exist. A normal outcome, not a fault.
    NotFound,
    /// A backing component (index engine, record store, embedding model)
    /// failed.
    Storage,
    /// The index and the record store disagree and could not be brought
    /// back in line.
    ReconciliationDrift,
}

/// Errors returned by [`crate::IdentityService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),

    #[error("image payload is empty")]
    EmptyImage,

    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("threshold must be between 0.0 and 1.0, got {0}")]
    InvalidThreshold(f32),

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("embedding extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("record store error: {0}")]
    Store(RecordStoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Enrollment failed after the embedding was written and the embedding
    /// could not be removed again.
    #[error(
        "enrollment of {identity_key} failed ({cause}) and its embedding could not be removed: {compensation}"
    )]
    CompensationFailed {
        identity_key: String,
        cause: String,
        compensation: String,
    },

    /// The index was reset but the record store was not.
    #[error("index reset but record store was not cleared: {source}")]
    PartialReset {
        report: ResetReport,
        source: RecordStoreError,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidAttributes(_)
            | ServiceError::EmptyImage
            | ServiceError::NoFaceDetected
            | ServiceError::InvalidEmbedding(_)
            | ServiceError::InvalidThreshold(_) => ErrorKind::InvalidInput,
            ServiceError::Extraction(ExtractError::Decode(_)) => ErrorKind::InvalidInput,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Index(err) if !err.is_storage() => ErrorKind::InvalidInput,
            ServiceError::Store(RecordStoreError::NotFound(_)) => ErrorKind::NotFound,
            ServiceError::Store(RecordStoreError::Validation(_)) => ErrorKind::InvalidInput,
            ServiceError::CompensationFailed { .. } | ServiceError::PartialReset { .. } => {
                ErrorKind::ReconciliationDrift
            }
            ServiceError::Extraction(_)
            | ServiceError::Index(_)
            | ServiceError::Store(_)
            | ServiceError::Config(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidAttributes(_) => "INVALID_ATTRIBUTES",
            ServiceError::EmptyImage => "EMPTY_IMAGE",
            ServiceError::NoFaceDetected => "NO_FACE_DETECTED",
            ServiceError::InvalidEmbedding(_) => "INVALID_EMBEDDING",
            ServiceError::InvalidThreshold(_) => "INVALID_THRESHOLD",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Extraction(_) => "EXTRACTION_ERROR",
            ServiceError::Index(IndexError::DuplicateKey(_)) => "DUPLICATE_KEY",
            ServiceError::Index(_) => "INDEX_ERROR",
            ServiceError::Store(_) => "RECORD_STORE_ERROR",
            ServiceError::Config(_) => "CONFIG_ERROR",
            ServiceError::CompensationFailed { .. } => "COMPENSATION_FAILED",
            ServiceError::PartialReset { .. } => "PARTIAL_RESET",
        }
    }

    /// Serializable summary for callers that report errors over a wire.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.error_code().to_string(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured error body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<IndexError> for ServiceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidVector(e) => ServiceError::InvalidEmbedding(e.to_string()),
            other => ServiceError::Index(other),
        }
    }
}

impl From<RecordStoreError> for ServiceError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::Validation(msg) => ServiceError::InvalidAttributes(msg),
            other => ServiceError::Store(other),
        }
    }
}

impl From<MatchError> for ServiceError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::InvalidThreshold(t) => ServiceError::InvalidThreshold(t),
            MatchError::InvalidConfig(msg) => ServiceError::Config(msg),
            MatchError::Index(e) => e.into(),
            MatchError::Store(e) => e.into(),
        }
    }
}

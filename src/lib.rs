//! Face identification over a persistent embedding similarity index.
//!
//! `visage` ties together the workspace crates:
//!
//! - `index`: durable identity-keyed embedding storage with cosine search.
//! - `registry`: the person record store interface.
//! - `matcher`: thresholded search and candidate-to-record resolution.
//!
//! [`IdentityService`] is the entry point. It enrolls people from photos,
//! identifies them, and keeps the index and the record store consistent
//! across enroll, delete, face replacement and reset.
//!
//! ```
//! use std::sync::Arc;
//! use index::{BackendConfig, EmbeddingIndex, IndexConfig};
//! use registry::{InMemoryRecordStore, PersonAttributes};
//! use visage::config::MatcherYamlConfig;
//! use visage::{EmbeddingExtractor, ExtractError, Extraction, IdentityService};
//!
//! // Stand-in model: the image bytes are the embedding.
//! struct BytesAsVector;
//!
//! impl EmbeddingExtractor for BytesAsVector {
//!     fn extract(&self, image: &[u8]) -> Result<Option<Extraction>, ExtractError> {
//!         Ok(Some(Extraction {
//!             vector: image.iter().map(|b| *b as f32).collect(),
//!             confidence: 0.99,
//!         }))
//!     }
//! }
//!
//! let index = EmbeddingIndex::open(
//!     IndexConfig::new()
//!         .with_dimension(3)
//!         .with_backend(BackendConfig::in_memory()),
//! )
//! .unwrap();
//! let service = IdentityService::new(
//!     Arc::new(index),
//!     Arc::new(InMemoryRecordStore::new()),
//!     Arc::new(BytesAsVector),
//!     &MatcherYamlConfig::with_threshold(0.7),
//! )
//! .unwrap();
//!
//! let ada = service
//!     .enroll(PersonAttributes::new("Ada", 36, "female", "GB"), &[1, 0, 0])
//!     .unwrap();
//! let outcome = service.identify(&[9, 1, 0], None).unwrap();
//! assert!(outcome.found);
//! assert_eq!(outcome.identity.unwrap().id, ada.record.id);
//! ```

pub mod config;
mod error;
mod extractor;
mod service;
pub mod telemetry;

pub use crate::config::{ConfigLoadError, VisageConfig};
pub use crate::error::{ErrorDetail, ErrorKind, ServiceError, ServiceResult};
pub use crate::extractor::{EmbeddingExtractor, ExtractError, Extraction};
pub use crate::service::{
    DeleteOutcome, DriftReport, Enrollment, IdentifyOutcome, IdentityService, ResetReport, Stats,
};
pub use crate::telemetry::init_tracing;

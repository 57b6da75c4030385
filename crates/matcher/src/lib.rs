//! # Visage Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` sits between the embedding index (`index`) and the person record
//! store (`registry`). It turns a probe embedding into thresholded, ranked
//! candidates and then maps those candidates onto stored records.
//!
//! ## Core Types
//!
//! - [`SimilaritySearch`]: normalizes the probe, queries the index and keeps
//!   candidates whose cosine similarity clears a [`Threshold`].
//! - [`IdentityResolver`]: walks candidates in rank order and returns the
//!   first one that maps to a record in a [`registry::RecordStore`].
//! - [`Resolution`]: `Matched`, `NoCandidates`, or `Drift` when candidates
//!   exist but none of them has a record.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use index::{BackendConfig, EmbeddingIndex, IndexConfig};
//! use matcher::{IdentityResolver, Resolution, ResolverConfig, SearchConfig, SimilaritySearch, Threshold};
//! use registry::{InMemoryRecordStore, PersonAttributes, PersonRecord, RecordStore};
//! use serde_json::json;
//!
//! let index = EmbeddingIndex::open(
//!     IndexConfig::new()
//!         .with_dimension(3)
//!         .with_backend(BackendConfig::in_memory()),
//! )
//! .unwrap();
//! index.insert("p-1", &[1.0, 0.0, 0.0], json!({})).unwrap();
//!
//! let store = Arc::new(InMemoryRecordStore::new());
//! store
//!     .create(PersonRecord::new("p-1", PersonAttributes::new("Ada", 36, "female", "GB")))
//!     .unwrap();
//!
//! let search = SimilaritySearch::new(Arc::new(index), SearchConfig::default()).unwrap();
//! let resolver = IdentityResolver::new(store, ResolverConfig::default());
//!
//! let candidates = search.search(&[0.9, 0.1, 0.0], Threshold::new(0.7).unwrap()).unwrap();
//! match resolver.resolve(&candidates).unwrap() {
//!     Resolution::Matched { record, similarity, .. } => {
//!         assert_eq!(record.name, "Ada");
//!         assert!(similarity > 0.99);
//!     }
//!     other => panic!("expected a match, got {other:?}"),
//! }
//! ```
//!
//! ## Observability
//!
//! Drift is logged at `warn` on the `visage::drift` target. Pass a
//! [`ResolveMetrics`] implementation to [`IdentityResolver::with_metrics`] to
//! count resolutions and drift.

pub mod metrics;
mod resolver;
mod search;
pub mod types;

pub use crate::metrics::ResolveMetrics;
pub use crate::resolver::IdentityResolver;
pub use crate::search::SimilaritySearch;
pub use crate::types::{
    Candidate, LookupTier, MatchError, Resolution, ResolverConfig, SearchConfig, Threshold,
};

use std::sync::Arc;
use std::time::Instant;

use registry::{PersonRecord, RecordStore};
use tracing::{debug, warn};

use crate::metrics::ResolveMetrics;
use crate::types::{Candidate, LookupTier, MatchError, Resolution, ResolverConfig};

/// Metadata fields that may carry the record id of a legacy embedding,
/// in lookup order.
const METADATA_ID_FIELDS: [&str; 2] = ["person_id", "identity_key"];

/// Maps ranked candidates onto records in a [`RecordStore`].
pub struct IdentityResolver {
    store: Arc<dyn RecordStore>,
    cfg: ResolverConfig,
    metrics: Option<Arc<dyn ResolveMetrics>>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn RecordStore>, cfg: ResolverConfig) -> Self {
        Self {
            store,
            cfg,
            metrics: None,
        }
    }

    /// Report resolutions and drift to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn ResolveMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.cfg
    }

    /// Walk `candidates` in order and return the first one that maps to a
    /// record.
    ///
    /// Candidates that map to nothing are skipped and reported as drift. A
    /// store failure aborts resolution.
    pub fn resolve(&self, candidates: &[Candidate]) -> Result<Resolution, MatchError> {
        let start = Instant::now();
        let mut unresolved = Vec::new();
        let mut resolution = None;

        for candidate in candidates {
            match self.lookup(candidate)? {
                Some((record, tier)) => {
                    debug!(
                        identity_key = %candidate.identity_key,
                        record_id = %record.id,
                        ?tier,
                        similarity = candidate.similarity,
                        "candidate resolved"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_tier(tier);
                    }
                    resolution = Some(Resolution::Matched {
                        record,
                        identity_key: candidate.identity_key.clone(),
                        similarity: candidate.similarity,
                        tier,
                    });
                    break;
                }
                None => {
                    warn!(
                        target: "visage::drift",
                        identity_key = %candidate.identity_key,
                        similarity = candidate.similarity,
                        "indexed embedding has no matching record"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_drift(&candidate.identity_key);
                    }
                    unresolved.push(candidate.identity_key.clone());
                }
            }
        }

        let resolution = match resolution {
            Some(matched) => matched,
            None if unresolved.is_empty() => Resolution::NoCandidates,
            None => Resolution::Drift { unresolved },
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_resolution(&resolution, candidates.len(), start.elapsed());
        }
        Ok(resolution)
    }

    fn lookup(&self, candidate: &Candidate) -> Result<Option<(PersonRecord, LookupTier)>, MatchError> {
        let key = candidate.identity_key.as_str();
        if let Some(record) = self.store.get_by_id(key)? {
            return Ok(Some((record, LookupTier::PrimaryId)));
        }
        if !self.cfg.legacy_key_fallback {
            return Ok(None);
        }

        if let Some(record) = self.store.get_by_alias(key)? {
            return Ok(Some((record, LookupTier::Alias)));
        }

        let metadata_id = METADATA_ID_FIELDS
            .iter()
            .filter_map(|field| candidate.metadata.get(field).and_then(|v| v.as_str()))
            .find(|id| !id.is_empty() && *id != key);
        if let Some(id) = metadata_id {
            if let Some(record) = self.store.get_by_id(id)? {
                return Ok(Some((record, LookupTier::MetadataId)));
            }
        }
        Ok(None)
    }
}

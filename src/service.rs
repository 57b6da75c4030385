use std::collections::HashSet;
use std::sync::Arc;

use index::EmbeddingIndex;
use matcher::{
    IdentityResolver, LookupTier, Resolution, ResolveMetrics, SimilaritySearch, Threshold,
};
use registry::{PersonAttributes, PersonRecord, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigLoadError, MatcherYamlConfig, VisageConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::extractor::{EmbeddingExtractor, Extraction};

/// A freshly enrolled (or re-enrolled) person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub record: PersonRecord,
    /// Detector confidence of the face that was indexed.
    pub confidence: f32,
}

/// Answer to an identification request.
///
/// A miss is not an error: `found` is false and `message` says why. `drift`
/// is set when the probe did match indexed embeddings that have no record,
/// which a plain "no similar face" never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyOutcome {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<PersonRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<LookupTier>,
    pub message: String,
    #[serde(default)]
    pub drift: bool,
}

impl IdentifyOutcome {
    fn from_resolution(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Matched {
                record,
                similarity,
                tier,
                ..
            } => Self {
                found: true,
                identity: Some(record),
                similarity: Some(similarity),
                tier: Some(tier),
                message: "match found".to_string(),
                drift: false,
            },
            Resolution::NoCandidates => Self {
                found: false,
                identity: None,
                similarity: None,
                tier: None,
                message: "no similar face above threshold".to_string(),
                drift: false,
            },
            Resolution::Drift { unresolved } => Self {
                found: false,
                identity: None,
                similarity: None,
                tier: None,
                message: format!(
                    "{} matching embedding(s) have no person record",
                    unresolved.len()
                ),
                drift: true,
            },
        }
    }
}

/// What a delete removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub identity_key: String,
    pub embedding_removed: bool,
    pub record_removed: bool,
}

/// What a full reset cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub index_cleared: bool,
    pub records_cleared: bool,
    pub embeddings_removed: usize,
    pub records_removed: usize,
}

impl ResetReport {
    pub fn is_complete(&self) -> bool {
        self.index_cleared && self.records_cleared
    }
}

/// Disagreements between the index and the record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Index keys with no record behind them.
    pub orphaned_embeddings: Vec<String>,
    /// Record ids whose embedding is missing from the index.
    pub unindexed_records: Vec<String>,
}

impl DriftReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_embeddings.is_empty() && self.unindexed_records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub embeddings: usize,
    pub records: usize,
    pub dimension: usize,
}

/// Enrollment and identification over an embedding index and a record store.
///
/// Every mutation touches the index and the record store in a fixed order
/// and undoes or reports the first step when the second fails, so the two
/// never silently diverge.
pub struct IdentityService {
    index: Arc<EmbeddingIndex>,
    store: Arc<dyn RecordStore>,
    extractor: Arc<dyn EmbeddingExtractor>,
    search: SimilaritySearch,
    resolver: IdentityResolver,
    threshold: Threshold,
}

impl IdentityService {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        store: Arc<dyn RecordStore>,
        extractor: Arc<dyn EmbeddingExtractor>,
        cfg: &MatcherYamlConfig,
    ) -> ServiceResult<Self> {
        let threshold = cfg.threshold().map_err(config_error)?;
        let max_results = index.config().ann.max_results;
        if cfg.limit > max_results {
            return Err(ServiceError::Config(format!(
                "matcher.limit ({}) exceeds the index's ann.max_results ({max_results})",
                cfg.limit
            )));
        }
        let search = SimilaritySearch::new(Arc::clone(&index), cfg.to_search_config())?;
        let resolver = IdentityResolver::new(Arc::clone(&store), cfg.to_resolver_config());
        Ok(Self {
            index,
            store,
            extractor,
            search,
            resolver,
            threshold,
        })
    }

    /// Open the configured index and build a service over it.
    pub fn from_config(
        cfg: &VisageConfig,
        store: Arc<dyn RecordStore>,
        extractor: Arc<dyn EmbeddingExtractor>,
    ) -> ServiceResult<Self> {
        cfg.validate().map_err(config_error)?;
        let index = EmbeddingIndex::open(cfg.index.to_index_config())?;
        Self::new(Arc::new(index), store, extractor, &cfg.matcher)
    }

    /// Report resolutions and drift to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn ResolveMetrics>) -> Self {
        self.resolver = self.resolver.with_metrics(metrics);
        self
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Threshold used when a request does not bring its own.
    pub fn default_threshold(&self) -> Threshold {
        self.threshold
    }

    /// Enroll a new person from a photo.
    ///
    /// The embedding is indexed first under a fresh key, then the record is
    /// created under the same key. If the record cannot be created the
    /// embedding is removed again.
    pub fn enroll(&self, attributes: PersonAttributes, image: &[u8]) -> ServiceResult<Enrollment> {
        attributes.validate()?;
        let extraction = self.extract(image)?;

        let key = Uuid::new_v4().to_string();
        let record = PersonRecord::new(key.clone(), attributes);
        self.index
            .insert(&key, &extraction.vector, record.index_metadata())?;

        if let Err(cause) = self.store.create(record.clone()) {
            warn!(
                identity_key = %key,
                error = %cause,
                "record commit failed; removing indexed embedding"
            );
            if let Err(compensation) = self.index.delete(&key) {
                error!(
                    target: "visage::drift",
                    identity_key = %key,
                    error = %compensation,
                    "failed to remove embedding after record commit failure"
                );
                return Err(ServiceError::CompensationFailed {
                    identity_key: key,
                    cause: cause.to_string(),
                    compensation: compensation.to_string(),
                });
            }
            return Err(cause.into());
        }

        info!(
            identity_key = %key,
            confidence = extraction.confidence,
            "person enrolled"
        );
        Ok(Enrollment {
            record,
            confidence: extraction.confidence,
        })
    }

    /// Identify the person in `image`. `threshold` falls back to the
    /// configured one.
    pub fn identify(&self, image: &[u8], threshold: Option<f32>) -> ServiceResult<IdentifyOutcome> {
        let threshold = self.resolve_threshold(threshold)?;
        let extraction = self.extract(image)?;
        self.identify_with(&extraction.vector, threshold)
    }

    /// Identify from an embedding computed elsewhere.
    pub fn identify_embedding(
        &self,
        vector: &[f32],
        threshold: Option<f32>,
    ) -> ServiceResult<IdentifyOutcome> {
        let threshold = self.resolve_threshold(threshold)?;
        self.identify_with(vector, threshold)
    }

    fn identify_with(&self, vector: &[f32], threshold: Threshold) -> ServiceResult<IdentifyOutcome> {
        let candidates = self.search.search(vector, threshold)?;
        let resolution = self.resolver.resolve(&candidates)?;
        debug!(
            threshold = threshold.value(),
            candidates = candidates.len(),
            outcome = resolution.label(),
            "identification"
        );
        Ok(IdentifyOutcome::from_resolution(resolution))
    }

    /// Delete a person and their embedding.
    ///
    /// The embedding goes first. If the index fails, nothing else is
    /// touched. A legacy alias (the record's `vector_id`) is accepted when
    /// legacy lookup is enabled. Deleting an identity that exists in
    /// neither store is not an error; both flags come back false.
    pub fn delete(&self, identity_key: &str) -> ServiceResult<DeleteOutcome> {
        let mut record = self.store.get_by_id(identity_key)?;
        if record.is_none() && self.resolver.config().legacy_key_fallback {
            record = self.store.get_by_alias(identity_key)?;
        }
        let index_key = record
            .as_ref()
            .map_or(identity_key, |r| r.index_key())
            .to_string();

        let embedding_removed = self.index.delete(&index_key)?;

        let record_removed = match &record {
            Some(r) => match self.store.delete(&r.id) {
                Ok(removed) => removed,
                Err(err) => {
                    warn!(
                        target: "visage::drift",
                        identity_key,
                        error = %err,
                        "embedding removed but record delete failed"
                    );
                    return Err(err.into());
                }
            },
            None => false,
        };

        match (embedding_removed, record_removed) {
            (false, false) => {
                debug!(identity_key, "nothing to delete");
                return Ok(DeleteOutcome {
                    identity_key: identity_key.to_string(),
                    embedding_removed: false,
                    record_removed: false,
                });
            }
            (true, false) => warn!(
                target: "visage::drift",
                identity_key,
                "removed orphaned embedding with no record"
            ),
            (false, true) => warn!(
                target: "visage::drift",
                identity_key,
                "removed record that had no indexed embedding"
            ),
            (true, true) => {}
        }

        info!(identity_key, embedding_removed, record_removed, "person deleted");
        Ok(DeleteOutcome {
            identity_key: identity_key.to_string(),
            embedding_removed,
            record_removed,
        })
    }

    /// Re-enroll an existing person with a new photo.
    ///
    /// The embedding is swapped in one atomic write; a failure leaves the
    /// previous embedding in place.
    pub fn replace_face(&self, identity_key: &str, image: &[u8]) -> ServiceResult<Enrollment> {
        let mut record = self
            .store
            .get_by_id(identity_key)?
            .ok_or_else(|| ServiceError::NotFound(identity_key.to_string()))?;
        let extraction = self.extract(image)?;

        let existed =
            self.index
                .replace(record.index_key(), &extraction.vector, record.index_metadata())?;
        if !existed {
            warn!(
                target: "visage::drift",
                identity_key,
                "record had no indexed embedding; replace created one"
            );
        }

        self.store.update(record.clone())?;
        if let Some(updated) = self.store.get_by_id(identity_key)? {
            record = updated;
        }

        info!(identity_key, confidence = extraction.confidence, "face replaced");
        Ok(Enrollment {
            record,
            confidence: extraction.confidence,
        })
    }

    /// Clear both stores: the index first, then the records.
    ///
    /// An index failure aborts before the records are touched.
    pub fn reset(&self) -> ServiceResult<ResetReport> {
        let records = self.store.count()?;
        let mut report = ResetReport {
            embeddings_removed: self.index.len(),
            ..ResetReport::default()
        };
        self.index.reset()?;
        report.index_cleared = true;

        if let Err(source) = self.store.clear() {
            error!(
                target: "visage::drift",
                error = %source,
                "index reset but record store could not be cleared"
            );
            return Err(ServiceError::PartialReset { report, source });
        }
        report.records_cleared = true;
        report.records_removed = records;

        info!(
            embeddings = report.embeddings_removed,
            records = report.records_removed,
            "identity stores reset"
        );
        Ok(report)
    }

    /// Compare index keys against record ids.
    pub fn audit(&self) -> ServiceResult<DriftReport> {
        let indexed: HashSet<String> = self.index.keys()?.into_iter().collect();

        let mut backed = HashSet::new();
        let mut unindexed_records = Vec::new();
        for id in self.store.ids()? {
            let Some(record) = self.store.get_by_id(&id)? else {
                continue;
            };
            let key = record.index_key().to_string();
            if !indexed.contains(&key) {
                unindexed_records.push(id);
            }
            backed.insert(key);
        }

        let mut orphaned_embeddings: Vec<String> = indexed
            .into_iter()
            .filter(|key| !backed.contains(key))
            .collect();
        orphaned_embeddings.sort_unstable();
        unindexed_records.sort_unstable();

        let report = DriftReport {
            orphaned_embeddings,
            unindexed_records,
        };
        if !report.is_consistent() {
            warn!(
                target: "visage::drift",
                orphaned = report.orphaned_embeddings.len(),
                unindexed = report.unindexed_records.len(),
                "index and record store disagree"
            );
        }
        Ok(report)
    }

    pub fn stats(&self) -> ServiceResult<Stats> {
        Ok(Stats {
            embeddings: self.index.len(),
            records: self.store.count()?,
            dimension: self.index.dimension(),
        })
    }

    /// Fetch a person by identity key.
    pub fn get(&self, identity_key: &str) -> ServiceResult<PersonRecord> {
        self.store
            .get_by_id(identity_key)?
            .ok_or_else(|| ServiceError::NotFound(identity_key.to_string()))
    }

    fn resolve_threshold(&self, threshold: Option<f32>) -> ServiceResult<Threshold> {
        match threshold {
            Some(value) => Ok(Threshold::new(value)?),
            None => Ok(self.threshold),
        }
    }

    fn extract(&self, image: &[u8]) -> ServiceResult<Extraction> {
        if image.is_empty() {
            return Err(ServiceError::EmptyImage);
        }
        self.extractor
            .extract(image)?
            .ok_or(ServiceError::NoFaceDetected)
    }
}

fn config_error(err: ConfigLoadError) -> ServiceError {
    ServiceError::Config(err.to_string())
}

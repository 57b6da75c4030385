use index::IndexError;
use registry::{PersonRecord, RecordStoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Minimum similarity a candidate needs to count as a match.
///
/// Always within `[0.0, 1.0]`; construct with [`Threshold::new`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Threshold(f32);

impl Threshold {
    pub fn new(value: f32) -> Result<Self, MatchError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(MatchError::InvalidThreshold(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Whether `similarity` clears this threshold (inclusive).
    pub fn admits(self, similarity: f32) -> bool {
        similarity >= self.0
    }
}

impl TryFrom<f32> for Threshold {
    type Error = MatchError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Threshold::new(value)
    }
}

impl From<Threshold> for f32 {
    fn from(t: Threshold) -> Self {
        t.0
    }
}

/// Tuning for [`crate::SimilaritySearch`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Number of nearest neighbours fetched from the index before the
    /// threshold is applied.
    #[serde(default = "SearchConfig::default_limit")]
    pub limit: usize,
}

impl SearchConfig {
    pub(crate) fn default_limit() -> usize {
        5
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.limit == 0 {
            return Err(MatchError::InvalidConfig(
                "limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
        }
    }
}

/// An index hit that cleared the threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Key the embedding is indexed under.
    pub identity_key: String,
    /// Cosine similarity to the probe.
    pub similarity: f32,
    /// Denormalized metadata stored with the embedding.
    pub metadata: JsonValue,
}

/// Tuning for [`crate::IdentityResolver`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Also try the alias and metadata lookups for embeddings enrolled
    /// before keys were unified.
    #[serde(default = "ResolverConfig::default_legacy_key_fallback")]
    pub legacy_key_fallback: bool,
}

impl ResolverConfig {
    pub(crate) fn default_legacy_key_fallback() -> bool {
        true
    }

    pub fn with_legacy_key_fallback(mut self, enabled: bool) -> Self {
        self.legacy_key_fallback = enabled;
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            legacy_key_fallback: Self::default_legacy_key_fallback(),
        }
    }
}

/// Which lookup found the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupTier {
    /// The identity key is the record id.
    PrimaryId,
    /// The identity key is the record's `vector_id` alias.
    Alias,
    /// The record id was taken from the embedding metadata.
    MetadataId,
}

/// Result of resolving ranked candidates to a stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// First candidate (in rank order) that maps to a record.
    Matched {
        record: PersonRecord,
        identity_key: String,
        similarity: f32,
        tier: LookupTier,
    },
    /// Nothing cleared the threshold.
    NoCandidates,
    /// Candidates cleared the threshold but none maps to a record.
    Drift {
        /// Identity keys that could not be resolved, in rank order.
        unresolved: Vec<String>,
    },
}

impl Resolution {
    pub fn is_match(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }

    pub fn is_drift(&self) -> bool {
        matches!(self, Resolution::Drift { .. })
    }

    /// Stable label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Matched { .. } => "matched",
            Resolution::NoCandidates => "no_candidates",
            Resolution::Drift { .. } => "drift",
        }
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("threshold must be between 0.0 and 1.0, got {0}")]
    InvalidThreshold(f32),
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
    /// Index read or search failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    /// Record lookup failed.
    #[error("record store error: {0}")]
    Store(#[from] RecordStoreError),
}

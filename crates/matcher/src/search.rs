use std::cmp::Ordering;
use std::sync::Arc;

use index::{vector, EmbeddingIndex};
use tracing::debug;

use crate::types::{Candidate, MatchError, SearchConfig, Threshold};

/// Thresholded nearest-neighbour search over an [`EmbeddingIndex`].
pub struct SimilaritySearch {
    index: Arc<EmbeddingIndex>,
    cfg: SearchConfig,
}

impl SimilaritySearch {
    pub fn new(index: Arc<EmbeddingIndex>, cfg: SearchConfig) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self { index, cfg })
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// Candidates whose similarity to `probe` is at least `threshold`,
    /// most similar first. Equal similarities are ordered by key.
    ///
    /// The probe is normalized first; a zero vector is passed through as-is.
    /// An empty result means "no match".
    pub fn search(&self, probe: &[f32], threshold: Threshold) -> Result<Vec<Candidate>, MatchError> {
        let probe = vector::normalized(probe);
        let neighbors = self.index.query(&probe, self.cfg.limit)?;
        let fetched = neighbors.len();

        let mut candidates: Vec<Candidate> = neighbors
            .into_iter()
            .map(|n| Candidate {
                similarity: n.similarity(),
                identity_key: n.identity_key,
                metadata: n.metadata,
            })
            .filter(|c| threshold.admits(c.similarity))
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });

        debug!(
            threshold = threshold.value(),
            fetched,
            admitted = candidates.len(),
            "similarity search"
        );
        Ok(candidates)
    }
}

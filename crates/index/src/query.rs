use crate::vector::{self, similarity_from_distance};
use crate::{EmbeddingIndex, IndexError};
use tracing::debug;

/// One nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Identity key of the matched embedding.
    pub identity_key: String,
    /// Cosine distance to the probe, in `[0, 2]` (lower is closer).
    pub distance: f32,
    /// Metadata stored alongside the embedding.
    pub metadata: serde_json::Value,
}

impl Neighbor {
    /// `1 - distance`, in `[-1, 1]`.
    pub fn similarity(&self) -> f32 {
        similarity_from_distance(self.distance)
    }
}

impl EmbeddingIndex {
    /// Return up to `limit` records closest to `probe`, ascending by cosine
    /// distance. An empty collection yields an empty vec.
    pub fn query(&self, probe: &[f32], limit: usize) -> Result<Vec<Neighbor>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        vector::validate(probe, self.cfg.dimension)?;
        let probe = vector::normalized(probe);

        self.rebuild_ann_if_needed()?;

        let hits: Vec<(String, f32)> = {
            let vectors = self.read_vectors()?;
            vectors
                .search(&probe, limit)
                .map_err(|e| IndexError::SchemaMismatch(e.to_string()))?
                .into_iter()
                .filter_map(|hit| {
                    vectors
                        .get_id(hit.index)
                        .map(|key| (key.clone(), hit.distance))
                })
                .collect()
        };

        let mut results = Vec::with_capacity(hits.len());
        for (key, distance) in hits {
            // A concurrent delete may land between the search and this read.
            match self.get(&key)? {
                Some(record) => results.push(Neighbor {
                    identity_key: key,
                    distance,
                    metadata: record.metadata,
                }),
                None => debug!(key = %key, "neighbour vanished before it could be read"),
            }
        }

        debug!(limit, returned = results.len(), "embedding query");
        Ok(results)
    }

    /// Build the HNSW graph if the collection is large enough and the graph
    /// is stale.
    fn rebuild_ann_if_needed(&self) -> Result<(), IndexError> {
        if !self.read_vectors()?.needs_build() {
            return Ok(());
        }
        let mut vectors = self.write_vectors()?;
        // Another caller may have rebuilt while we waited for the lock.
        if vectors.needs_build() {
            vectors.build();
            debug!(vectors = vectors.len(), "hnsw graph rebuilt");
        }
        Ok(())
    }
}

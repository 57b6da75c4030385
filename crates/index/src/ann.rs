//! In-memory vector set with exact and HNSW nearest-neighbour search.
//!
//! Every persisted embedding is mirrored here so queries never have to
//! decode the whole backend. Small collections are scanned exactly; once the
//! set grows past [`AnnConfig::min_vectors_for_ann`] an HNSW graph
//! (`hnsw_rs`, cosine distance) is built and used instead.
//!
//! ## Trade-offs
//!
//! - **Recall**: HNSW typically finds 95-99% of the true nearest neighbours.
//! - **Mutations**: new ids are inserted into the live graph. `hnsw_rs` has
//!   no removal, so removals and overwrites mark the graph stale and the
//!   next query rebuilds it.
//! - **Zero vectors** are kept for exact scans but left out of the graph.

use crate::vector::{cosine_distance, l2_norm};
use hnsw_rs::prelude::*;
use std::collections::HashMap;

/// Configuration for ANN index construction.
#[derive(Debug, Clone, Copy)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    /// Default: 16
    pub m: usize,
    /// Size of dynamic candidate list during construction.
    /// Default: 200
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search.
    /// Default: 50
    pub ef_search: usize,
    /// Hard cap on neighbours returned by a single search.
    /// Default: 100
    pub max_results: usize,
    /// Whether to use HNSW at all.
    /// Default: true
    pub enabled: bool,
    /// Minimum number of vectors before HNSW is used.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_results: 100,
            enabled: true,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    /// Check if ANN should be used given the current dataset size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// Result from a nearest-neighbour search.
#[derive(Debug, Clone)]
pub struct AnnResult {
    /// Slot of the vector inside the [`AnnIndex`].
    pub index: usize,
    /// Cosine distance to the query (lower = closer).
    pub distance: f32,
}

/// Keyed vector set plus an optional HNSW graph over it.
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    id_to_index: HashMap<String, usize>,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl AnnIndex {
    /// Create a new empty set.
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            id_to_index: HashMap::new(),
            ids: Vec::new(),
            vectors: Vec::new(),
            built: false,
        }
    }

    /// Insert a vector under `id`, overwriting any previous vector for it.
    pub fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<(), AnnError> {
        if vector.len() != self.dimension {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        match self.id_to_index.get(&id) {
            Some(&slot) => {
                self.vectors[slot] = vector;
                self.invalidate();
            }
            None => {
                let slot = self.vectors.len();
                self.vectors.push(vector);
                self.ids.push(id.clone());
                self.id_to_index.insert(id, slot);
                self.extend_graph(slot);
            }
        }
        Ok(())
    }

    /// Add a freshly appended slot to the live graph. Without a graph the
    /// next query decides whether one is worth building.
    fn extend_graph(&mut self, slot: usize) {
        if !self.built {
            return;
        }
        if self.hnsw.is_none() {
            self.invalidate();
            return;
        }
        let vector = &self.vectors[slot];
        // Zero vectors stay out of the graph; the exact scan covers them.
        if let Some(hnsw) = &self.hnsw {
            if l2_norm(vector) > 0.0 {
                hnsw.insert((vector, slot));
            }
        }
    }

    /// Remove the vector stored under `id`. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.id_to_index.remove(id) else {
            return false;
        };

        // swap_remove moves the last slot into `slot`; repoint its id.
        self.vectors.swap_remove(slot);
        self.ids.swap_remove(slot);
        if let Some(moved) = self.ids.get(slot) {
            self.id_to_index.insert(moved.clone(), slot);
        }

        self.invalidate();
        true
    }

    /// Drop every vector and the graph.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.ids.clear();
        self.id_to_index.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.hnsw = None;
        self.built = false;
    }

    /// Search for the `k` nearest neighbours of `query`, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<AnnResult>, AnnError> {
        if query.len() != self.dimension {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let k = k.min(self.config.max_results);
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        if self.built && self.hnsw.is_some() && l2_norm(query) > 0.0 {
            let results = self.hnsw_search(query, k)?;
            if !results.is_empty() {
                return Ok(results);
            }
        }

        Ok(self.linear_search(query, k))
    }

    fn hnsw_search(&self, query: &[f32], k: usize) -> Result<Vec<AnnResult>, AnnError> {
        let hnsw = self.hnsw.as_ref().ok_or(AnnError::NotBuilt)?;
        let ef = self.config.ef_search.max(k);
        let neighbours: Vec<Neighbour> = hnsw.search(query, k, ef);

        let mut results: Vec<AnnResult> = neighbours
            .into_iter()
            .filter(|n| n.get_origin_id() < self.vectors.len())
            .map(|n| AnnResult {
                index: n.get_origin_id(),
                distance: n.distance.clamp(0.0, 2.0),
            })
            .collect();
        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    /// Exact scan over every stored vector.
    fn linear_search(&self, query: &[f32], k: usize) -> Vec<AnnResult> {
        let mut distances: Vec<AnnResult> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(index, vec)| AnnResult {
                index,
                distance: cosine_distance(query, vec),
            })
            .collect();

        // Ties are broken by id so results are deterministic.
        distances.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.ids[a.index].cmp(&self.ids[b.index]))
        });
        distances.truncate(k);
        distances
    }

    /// Get ID by slot.
    pub fn get_id(&self, index: usize) -> Option<&String> {
        self.ids.get(index)
    }

    /// Get slot by ID.
    pub fn get_index(&self, id: &str) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    /// Stored vector for `id`.
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.get_index(id).map(|slot| self.vectors[slot].as_slice())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_index.contains_key(id)
    }

    /// All ids, in slot order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Check if the HNSW graph reflects the current vector set.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Whether the next search wants a (re)built graph.
    pub fn needs_build(&self) -> bool {
        !self.built && self.config.should_use_ann(self.vectors.len())
    }

    /// Build the HNSW graph over the current vectors.
    /// Fewer than 10 (non-zero) vectors are served by the exact scan only.
    pub fn build(&mut self) {
        self.hnsw = None;

        let data_for_insertion: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(_, vec)| l2_norm(vec) > 0.0)
            .map(|(idx, vec)| (vec, idx))
            .collect();

        let nb_elem = data_for_insertion.len();
        if nb_elem >= 10 {
            let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
            // Head room for the inserts that land before the next rebuild.
            let hnsw = Hnsw::<f32, DistCosine>::new(
                self.config.m,
                nb_elem.saturating_mul(2),
                nb_layer,
                self.config.ef_construction,
                DistCosine {},
            );
            hnsw.parallel_insert(&data_for_insertion);
            self.hnsw = Some(hnsw);
        }

        self.built = true;
    }

    /// Force a rebuild regardless of the stale flag.
    pub fn rebuild(&mut self) {
        self.built = false;
        self.build();
    }

    pub fn config(&self) -> &AnnConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Error type for ANN operations.
#[derive(Debug, thiserror::Error)]
pub enum AnnError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Index not built")]
    NotBuilt,
}

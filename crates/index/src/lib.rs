//! # Visage Index
//!
//! Durable storage for face embeddings keyed by identity, with cosine
//! nearest-neighbour search.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: storage goes through the [`IndexBackend`] trait.
//!   Out of the box there is an in-memory `HashMap` backend (tests, ephemeral
//!   use) and a Redb backend for a durable single-file store
//!   (`backend-redb` feature, on by default).
//! - **Owned handle**: an [`EmbeddingIndex`] owns its backend. There is no
//!   process-wide connection; open one with [`EmbeddingIndex::open`] and
//!   release it with [`EmbeddingIndex::close`] or by dropping it.
//! - **Cosine search**: vectors are L2-normalized on the way in and queried
//!   by cosine distance (`0` = same direction, `2` = opposite). Small
//!   collections are scanned exactly; large ones go through HNSW (see
//!   [`ann`]).
//! - **Read-your-writes**: a successful `insert` is visible to the very next
//!   `query`.
//!
//! ## Example Usage
//!
//! ```
//! use index::{BackendConfig, EmbeddingIndex, IndexConfig};
//! use serde_json::json;
//!
//! let cfg = IndexConfig::new()
//!     .with_dimension(3)
//!     .with_backend(BackendConfig::in_memory());
//! let index = EmbeddingIndex::open(cfg).unwrap();
//!
//! index
//!     .insert("person-1", &[1.0, 0.0, 0.0], json!({ "name": "Ada" }))
//!     .unwrap();
//!
//! let hits = index.query(&[0.9, 0.1, 0.0], 5).unwrap();
//! assert_eq!(hits[0].identity_key, "person-1");
//! assert!(hits[0].similarity() > 0.99);
//! ```

pub mod ann;
mod backend;
mod query;
pub mod vector;

use crate::ann::{AnnConfig, AnnIndex};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

mod metadata_serde {
    use serde::de::Error as DeError;
    use serde::ser::Error as SerError;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub(super) fn serialize<S>(value: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = serde_json::to_vec(value).map_err(SerError::custom)?;
        serializer.serialize_bytes(&bytes)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        serde_json::from_slice(&bytes).map_err(DeError::custom)
    }
}

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, IndexBackend};
pub use query::Neighbor;
pub use vector::VectorError;

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use zstd::{decode_all, encode_all};

/// Bump this value whenever the on-disk `EmbeddingRecord` layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

/// Output dimension of the usual face recognition models (ArcFace family).
pub const DEFAULT_DIMENSION: usize = 512;

/// One enrolled face: identity key, unit vector and denormalized metadata.
///
/// The metadata is kept for inspection only; the record store owns the
/// authoritative attributes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmbeddingRecord {
    /// Schema version for backward compatibility when deserializing.
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    /// Unique key of the enrolled identity.
    pub identity_key: String,
    /// L2-normalized embedding (zero vectors are stored unchanged).
    pub vector: Vec<f32>,
    /// Denormalized attributes (JSON).
    #[serde(with = "metadata_serde")]
    pub metadata: serde_json::Value,
}

const fn default_schema_version() -> u16 {
    INDEX_SCHEMA_VERSION
}

/// Compression codec options for index storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    /// No compression.
    None,
    /// Zstd compression (default).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    /// The compression codec to use (None or Zstd).
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for initializing the index.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Fixed vector dimension of the collection.
    pub dimension: usize,
    /// Backend storage configuration (in-memory or Redb).
    pub backend: BackendConfig,
    /// Compression settings for stored records.
    pub compression: CompressionConfig,
    /// HNSW settings for large collections.
    pub ann: AnnConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            backend: BackendConfig::default(),
            compression: CompressionConfig::default(),
            ann: AnnConfig::default(),
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }
}

/// Errors raised by [`EmbeddingIndex`].
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("identity key already indexed: {0}")]
    DuplicateKey(String),
    #[error("identity key is empty")]
    EmptyKey,
    #[error("invalid vector: {0}")]
    InvalidVector(#[from] VectorError),
    #[error("stored data does not match the index: {0}")]
    SchemaMismatch(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Compression error: {0}")]
    Compression(String),
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Compression(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// True for failures of the storage engine or the stored bytes, as
    /// opposed to rejected input.
    pub fn is_storage(&self) -> bool {
        !matches!(
            self,
            IndexError::DuplicateKey(_) | IndexError::EmptyKey | IndexError::InvalidVector(_)
        )
    }
}

/// Persistent identity-keyed embedding index.
pub struct EmbeddingIndex {
    /// Durable storage, owned by this index.
    backend: Box<dyn IndexBackend>,
    cfg: IndexConfig,
    /// Mirror of every stored vector, used for search.
    vectors: RwLock<AnnIndex>,
}

impl EmbeddingIndex {
    /// Open (or create) the index described by `cfg`.
    pub fn open(cfg: IndexConfig) -> Result<Self, IndexError> {
        let backend = cfg.backend.build()?;
        Self::with_backend(cfg, backend)
    }

    /// Build an index over an existing backend handle and load its records.
    pub fn with_backend(
        cfg: IndexConfig,
        backend: Box<dyn IndexBackend>,
    ) -> Result<Self, IndexError> {
        if cfg.dimension == 0 {
            return Err(IndexError::SchemaMismatch(
                "index dimension must be >= 1".into(),
            ));
        }

        let index = Self {
            vectors: RwLock::new(AnnIndex::new(cfg.dimension, cfg.ann)),
            backend,
            cfg,
        };
        index.load()?;
        Ok(index)
    }

    /// Flush and release the storage handle.
    pub fn close(self) -> Result<(), IndexError> {
        self.backend.flush()?;
        info!(records = self.len(), "embedding index closed");
        Ok(())
    }

    fn load(&self) -> Result<(), IndexError> {
        let mut vectors = self.write_vectors()?;
        let dimension = self.cfg.dimension;
        self.backend.scan(&mut |data: &[u8]| {
            let record = self.decode_record(data)?;
            if record.vector.len() != dimension {
                return Err(IndexError::SchemaMismatch(format!(
                    "record {} has dimension {}, index expects {dimension}",
                    record.identity_key,
                    record.vector.len()
                )));
            }
            vectors
                .insert(record.identity_key, record.vector)
                .map_err(|e| IndexError::SchemaMismatch(e.to_string()))
        })?;
        info!(
            records = vectors.len(),
            dimension, "embedding index opened"
        );
        Ok(())
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    pub fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    /// Enroll a new embedding under `key`.
    ///
    /// Fails with [`IndexError::DuplicateKey`] if the key is already indexed
    /// (the stored vector is left untouched) and with
    /// [`IndexError::InvalidVector`] before touching storage if the vector is
    /// malformed. The stored record is read back before reporting success.
    pub fn insert(
        &self,
        key: &str,
        vector: &[f32],
        metadata: serde_json::Value,
    ) -> Result<(), IndexError> {
        let record = self.prepare(key, vector, metadata)?;
        let payload = self.encode_record(&record)?;

        let mut vectors = self.write_vectors()?;
        if !self.backend.put_if_absent(key, &payload)? {
            return Err(IndexError::DuplicateKey(key.to_string()));
        }

        if let Err(err) = self.verify_stored(key) {
            warn!(key, error = %err, "stored embedding failed read-back; removing it");
            if let Err(cleanup) = self.backend.delete(key) {
                warn!(key, error = %cleanup, "failed to remove unverifiable embedding");
            }
            return Err(err);
        }

        vectors
            .insert(record.identity_key, record.vector)
            .map_err(|e| IndexError::SchemaMismatch(e.to_string()))?;
        debug!(key, "embedding inserted");
        Ok(())
    }

    /// Remove the embedding stored under `key`. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool, IndexError> {
        let mut vectors = self.write_vectors()?;
        let existed = self.backend.delete(key)?;
        vectors.remove(key);
        debug!(key, existed, "embedding deleted");
        Ok(existed)
    }

    /// Replace the embedding under `key` wholesale, creating it if absent.
    ///
    /// The overwrite is a single backend write: if it fails, the previous
    /// record is still in place. Returns whether a previous record existed.
    pub fn replace(
        &self,
        key: &str,
        vector: &[f32],
        metadata: serde_json::Value,
    ) -> Result<bool, IndexError> {
        let record = self.prepare(key, vector, metadata)?;
        let payload = self.encode_record(&record)?;

        let mut vectors = self.write_vectors()?;
        let existed = self.backend.put(key, &payload)?;
        vectors
            .insert(record.identity_key, record.vector)
            .map_err(|e| IndexError::SchemaMismatch(e.to_string()))?;
        debug!(key, existed, "embedding replaced");
        Ok(existed)
    }

    /// Drop every embedding and start over with an empty collection.
    pub fn reset(&self) -> Result<(), IndexError> {
        let mut vectors = self.write_vectors()?;
        let dropped = vectors.len();
        self.backend.clear()?;
        vectors.clear();
        info!(dropped, "embedding index reset");
        Ok(())
    }

    /// Retrieve a record by key.
    pub fn get(&self, key: &str) -> Result<Option<EmbeddingRecord>, IndexError> {
        match self.backend.get(key)? {
            Some(data) => Ok(Some(self.decode_record(&data)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, IndexError> {
        Ok(self.read_vectors()?.contains(key))
    }

    /// Every indexed key, sorted.
    pub fn keys(&self) -> Result<Vec<String>, IndexError> {
        let mut keys = self.read_vectors()?.ids().to_vec();
        keys.sort_unstable();
        Ok(keys)
    }

    /// Number of indexed embeddings.
    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild the HNSW graph now instead of on the next query.
    pub fn rebuild_ann(&self) -> Result<(), IndexError> {
        self.write_vectors()?.rebuild();
        Ok(())
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }

    /// Validate and normalize an incoming vector into a record.
    fn prepare(
        &self,
        key: &str,
        vector: &[f32],
        metadata: serde_json::Value,
    ) -> Result<EmbeddingRecord, IndexError> {
        if key.is_empty() {
            return Err(IndexError::EmptyKey);
        }
        vector::validate(vector, self.cfg.dimension)?;
        Ok(EmbeddingRecord {
            schema_version: INDEX_SCHEMA_VERSION,
            identity_key: key.to_string(),
            vector: vector::normalized(vector),
            metadata,
        })
    }

    fn verify_stored(&self, key: &str) -> Result<(), IndexError> {
        match self.get(key)? {
            Some(stored) if stored.vector.len() == self.cfg.dimension => Ok(()),
            Some(stored) => Err(IndexError::Backend(format!(
                "stored vector for {key} has {} values",
                stored.vector.len()
            ))),
            None => Err(IndexError::Backend(format!(
                "embedding for {key} not visible after write"
            ))),
        }
    }

    pub(crate) fn read_vectors(&self) -> Result<RwLockReadGuard<'_, AnnIndex>, IndexError> {
        self.vectors
            .read()
            .map_err(|_| IndexError::backend("poisoned vector lock"))
    }

    pub(crate) fn write_vectors(&self) -> Result<RwLockWriteGuard<'_, AnnIndex>, IndexError> {
        self.vectors
            .write()
            .map_err(|_| IndexError::backend("poisoned vector lock"))
    }

    /// Decodes and decompresses a record from the backend.
    pub(crate) fn decode_record(&self, data: &[u8]) -> Result<EmbeddingRecord, IndexError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (record, _) = decode_from_slice(&decompressed, standard())?;
        Ok(record)
    }

    /// Encodes and compresses a record for storage in the backend.
    fn encode_record(&self, rec: &EmbeddingRecord) -> Result<Vec<u8>, IndexError> {
        let encoded = encode_to_vec(rec, standard())?;
        self.cfg.compression.compress(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn test_config() -> IndexConfig {
        IndexConfig::new()
            .with_dimension(4)
            .with_backend(BackendConfig::InMemory)
    }

    fn open() -> EmbeddingIndex {
        EmbeddingIndex::open(test_config()).expect("index opens")
    }

    #[test]
    fn insert_normalizes_and_roundtrips() {
        let index = open();
        index
            .insert("p-1", &[3.0, 4.0, 0.0, 0.0], json!({ "name": "Ada" }))
            .expect("insert succeeds");

        let fetched = index.get("p-1").expect("get ok").expect("record exists");
        assert_eq!(fetched.identity_key, "p-1");
        assert_eq!(fetched.metadata, json!({ "name": "Ada" }));
        assert!((vector::l2_norm(&fetched.vector) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn extreme_magnitudes_roundtrip_with_unit_similarity() {
        let index = open();
        let huge = [1e20, -2e20, 0.0, 5e19];
        let tiny = [0.0, 1e-30, 3e-30, 0.0];
        index.insert("huge", &huge, json!({})).unwrap();
        index.insert("tiny", &tiny, json!({})).unwrap();

        for (key, probe) in [("huge", huge), ("tiny", tiny)] {
            let stored = index.get(key).unwrap().unwrap();
            assert!((vector::l2_norm(&stored.vector) - 1.0).abs() < 1e-6, "{key}");

            let hits = index.query(&probe, 1).unwrap();
            assert_eq!(hits[0].identity_key, key);
            assert!((hits[0].similarity() - 1.0).abs() < 1e-5, "{key}");
        }
    }

    #[test]
    fn zero_vector_is_stored_as_is() {
        let index = open();
        index.insert("zero", &[0.0; 4], json!({})).unwrap();
        let fetched = index.get("zero").unwrap().unwrap();
        assert_eq!(fetched.vector, vec![0.0; 4]);
    }

    #[test]
    fn duplicate_insert_keeps_first_vector() {
        let index = open();
        index.insert("p-1", &[1.0, 0.0, 0.0, 0.0], json!({})).unwrap();

        let err = index
            .insert("p-1", &[0.0, 1.0, 0.0, 0.0], json!({}))
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey(ref k) if k == "p-1"));

        let stored = index.get("p-1").unwrap().unwrap();
        assert_eq!(stored.vector, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn invalid_vectors_never_reach_storage() {
        let index = open();
        let err = index.insert("p-1", &[1.0, 0.0], json!({})).unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidVector(VectorError::DimensionMismatch { .. })
        ));

        let err = index
            .insert("p-1", &[1.0, f32::NAN, 0.0, 0.0], json!({}))
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidVector(VectorError::NonFinite { position: 1 })
        ));
        assert!(!err.is_storage());

        assert!(index.get("p-1").unwrap().is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let index = open();
        index.insert("p-1", &[1.0, 0.0, 0.0, 0.0], json!({})).unwrap();

        assert!(index.delete("p-1").unwrap());
        assert!(!index.delete("p-1").unwrap());
        assert!(!index.contains("p-1").unwrap());
    }

    #[test]
    fn replace_overwrites_and_reports_previous() {
        let index = open();
        assert!(!index
            .replace("p-1", &[1.0, 0.0, 0.0, 0.0], json!({ "v": 1 }))
            .unwrap());
        assert!(index
            .replace("p-1", &[0.0, 1.0, 0.0, 0.0], json!({ "v": 2 }))
            .unwrap());

        let stored = index.get("p-1").unwrap().unwrap();
        assert_eq!(stored.vector, vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(stored.metadata, json!({ "v": 2 }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn replace_with_invalid_vector_keeps_previous() {
        let index = open();
        index.insert("p-1", &[1.0, 0.0, 0.0, 0.0], json!({})).unwrap();
        assert!(index.replace("p-1", &[1.0, 0.0], json!({})).is_err());

        let stored = index.get("p-1").unwrap().unwrap();
        assert_eq!(stored.vector, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn reset_clears_everything() {
        let index = open();
        index.insert("a", &[1.0, 0.0, 0.0, 0.0], json!({})).unwrap();
        index.insert("b", &[0.0, 1.0, 0.0, 0.0], json!({})).unwrap();

        index.reset().unwrap();
        assert!(index.is_empty());
        assert!(index.get("a").unwrap().is_none());
        assert!(index.query(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());

        index.insert("a", &[1.0, 0.0, 0.0, 0.0], json!({})).unwrap();
        assert_eq!(index.keys().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let cfg = test_config().with_dimension(0);
        assert!(matches!(
            EmbeddingIndex::open(cfg),
            Err(IndexError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn uncompressed_records_roundtrip() {
        let cfg = test_config()
            .with_compression(CompressionConfig::default().with_codec(CompressionCodec::None));
        let index = EmbeddingIndex::open(cfg).unwrap();
        index
            .insert("p-1", &[0.0, 0.0, 2.0, 0.0], json!({ "age": 41 }))
            .unwrap();
        let stored = index.get("p-1").unwrap().unwrap();
        assert_eq!(stored.vector, vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(stored.metadata["age"], 41);
    }

    #[test]
    fn concurrent_inserts_on_same_key_leave_one_record() {
        let index = Arc::new(open());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    let mut v = vec![0.0; 4];
                    v[i % 4] = 1.0;
                    index.insert("shared", &v, json!({ "writer": i })).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(index.len(), 1);

        let stored = index.get("shared").unwrap().unwrap();
        assert_eq!(index.read_vectors().unwrap().vector("shared"), Some(stored.vector.as_slice()));
    }

    #[cfg(feature = "backend-redb")]
    #[test]
    fn redb_index_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("faces.redb");
        let cfg = test_config().with_backend(BackendConfig::redb(path.to_string_lossy()));

        let index = EmbeddingIndex::open(cfg.clone()).unwrap();
        index
            .insert("p-1", &[1.0, 0.0, 0.0, 0.0], json!({ "name": "Ada" }))
            .unwrap();
        index.close().unwrap();

        let reopened = EmbeddingIndex::open(cfg).unwrap();
        assert_eq!(reopened.len(), 1);
        let hits = reopened.query(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].identity_key, "p-1");
    }

    #[cfg(feature = "backend-redb")]
    #[test]
    fn reopening_with_other_dimension_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("faces.redb");
        let cfg = test_config().with_backend(BackendConfig::redb(path.to_string_lossy()));

        let index = EmbeddingIndex::open(cfg.clone()).unwrap();
        index.insert("p-1", &[1.0, 0.0, 0.0, 0.0], json!({})).unwrap();
        index.close().unwrap();

        let result = EmbeddingIndex::open(cfg.with_dimension(8));
        assert!(matches!(result, Err(IndexError::SchemaMismatch(_))));
    }
}

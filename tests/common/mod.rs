#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use index::{BackendConfig, EmbeddingIndex, InMemoryBackend, IndexBackend, IndexConfig, IndexError};
use registry::{InMemoryRecordStore, PersonAttributes, PersonRecord, RecordStore, RecordStoreError};
use visage::config::MatcherYamlConfig;
use visage::{EmbeddingExtractor, ExtractError, Extraction, IdentityService};

pub const DIM: usize = 8;

/// Photo whose "face" embeds to `vector`.
pub fn photo(vector: &[f32]) -> Vec<u8> {
    let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("face:{}", values.join(",")).into_bytes()
}

/// Photo of the unit axis `axis`, with optional weight on the next axis.
pub fn axis_photo(axis: usize, lean: f32) -> Vec<u8> {
    photo(&axis_vector(axis, lean))
}

pub fn axis_vector(axis: usize, lean: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v[(axis + 1) % DIM] += lean;
    v
}

pub fn attributes(name: &str) -> PersonAttributes {
    PersonAttributes::new(name, 34, "female", "FR")
}

/// Model stand-in: `face:<comma separated floats>` embeds to those floats,
/// `blank` has no face and anything else fails to decode.
pub struct TextFaceExtractor;

impl EmbeddingExtractor for TextFaceExtractor {
    fn extract(&self, image: &[u8]) -> Result<Option<Extraction>, ExtractError> {
        let text = std::str::from_utf8(image).map_err(|e| ExtractError::Decode(e.to_string()))?;
        if text == "blank" {
            return Ok(None);
        }
        let Some(body) = text.strip_prefix("face:") else {
            return Err(ExtractError::Decode(format!("unrecognised image '{text}'")));
        };
        let vector = body
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExtractError::Decode(e.to_string()))?;
        Ok(Some(Extraction {
            vector,
            confidence: 0.98,
        }))
    }
}

/// Switches to make a backend call fail on demand.
#[derive(Default)]
pub struct Faults {
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_clear: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
}

impl Faults {
    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    fn tripped(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

/// In-memory index backend whose writes can be made to fail.
pub struct FlakyBackend {
    inner: InMemoryBackend,
    faults: Arc<Faults>,
}

impl FlakyBackend {
    pub fn new(faults: Arc<Faults>) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            faults,
        }
    }
}

impl IndexBackend for FlakyBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<bool, IndexError> {
        if Faults::tripped(&self.faults.fail_put) {
            return Err(IndexError::backend("injected put failure"));
        }
        self.inner.put(key, value)
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, IndexError> {
        if Faults::tripped(&self.faults.fail_put) {
            return Err(IndexError::backend("injected put failure"));
        }
        self.inner.put_if_absent(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, IndexError> {
        if Faults::tripped(&self.faults.fail_delete) {
            return Err(IndexError::backend("injected delete failure"));
        }
        self.inner.delete(key)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        self.inner.scan(visitor)
    }

    fn clear(&self) -> Result<(), IndexError> {
        if Faults::tripped(&self.faults.fail_clear) {
            return Err(IndexError::backend("injected clear failure"));
        }
        self.inner.clear()
    }
}

/// In-memory record store whose writes can be made to fail.
pub struct FlakyStore {
    inner: InMemoryRecordStore,
    faults: Arc<Faults>,
}

impl FlakyStore {
    pub fn new(faults: Arc<Faults>) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            faults,
        }
    }
}

impl RecordStore for FlakyStore {
    fn get_by_id(&self, id: &str) -> Result<Option<PersonRecord>, RecordStoreError> {
        self.inner.get_by_id(id)
    }

    fn get_by_alias(&self, alias: &str) -> Result<Option<PersonRecord>, RecordStoreError> {
        self.inner.get_by_alias(alias)
    }

    fn create(&self, record: PersonRecord) -> Result<(), RecordStoreError> {
        if Faults::tripped(&self.faults.fail_create) {
            return Err(RecordStoreError::backend("injected create failure"));
        }
        self.inner.create(record)
    }

    fn update(&self, record: PersonRecord) -> Result<(), RecordStoreError> {
        if Faults::tripped(&self.faults.fail_update) {
            return Err(RecordStoreError::backend("injected update failure"));
        }
        self.inner.update(record)
    }

    fn delete(&self, id: &str) -> Result<bool, RecordStoreError> {
        if Faults::tripped(&self.faults.fail_delete) {
            return Err(RecordStoreError::backend("injected delete failure"));
        }
        self.inner.delete(id)
    }

    fn count(&self) -> Result<usize, RecordStoreError> {
        self.inner.count()
    }

    fn ids(&self) -> Result<Vec<String>, RecordStoreError> {
        self.inner.ids()
    }

    fn clear(&self) -> Result<(), RecordStoreError> {
        if Faults::tripped(&self.faults.fail_clear) {
            return Err(RecordStoreError::backend("injected clear failure"));
        }
        self.inner.clear()
    }
}

pub fn index_config() -> IndexConfig {
    IndexConfig::new()
        .with_dimension(DIM)
        .with_backend(BackendConfig::in_memory())
}

/// Service over in-memory stores with the given threshold.
pub fn service(threshold: f32) -> (IdentityService, Arc<EmbeddingIndex>, Arc<InMemoryRecordStore>) {
    let index = Arc::new(EmbeddingIndex::open(index_config()).expect("index"));
    let store = Arc::new(InMemoryRecordStore::new());
    let service = IdentityService::new(
        Arc::clone(&index),
        store.clone(),
        Arc::new(TextFaceExtractor),
        &MatcherYamlConfig::with_threshold(threshold),
    )
    .expect("service");
    (service, index, store)
}

/// Service whose index backend faults are driven by `index_faults` and
/// whose record store faults are driven by `store_faults`.
pub fn flaky_service(
    threshold: f32,
    index_faults: Arc<Faults>,
    store_faults: Arc<Faults>,
) -> (IdentityService, Arc<EmbeddingIndex>, Arc<FlakyStore>) {
    let backend = Box::new(FlakyBackend::new(index_faults));
    let index = Arc::new(EmbeddingIndex::with_backend(index_config(), backend).expect("index"));
    let store = Arc::new(FlakyStore::new(store_faults));
    let service = IdentityService::new(
        Arc::clone(&index),
        store.clone(),
        Arc::new(TextFaceExtractor),
        &MatcherYamlConfig::with_threshold(threshold),
    )
    .expect("service");
    (service, index, store)
}

//! YAML configuration file support for visage.
//!
//! One file configures the embedding index, the matcher and logging.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! index:
//!   backend: "redb"
//!   path: "data/faces.redb"
//!   dimension: 512
//!   compression: "zstd"
//!   compression_level: 3
//!   ann:
//!     enabled: true
//!     min_vectors_for_ann: 1000
//!     m: 16
//!     ef_construction: 200
//!     ef_search: 50
//!     max_results: 100
//!
//! matcher:
//!   threshold: 0.7
//!   limit: 5
//!   legacy_key_fallback: true
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```
//!
//! `matcher.threshold` has no default and must be set.

use std::fs;
use std::path::Path;

use index::ann::AnnConfig;
use index::{BackendConfig, CompressionCodec, CompressionConfig, IndexConfig, DEFAULT_DIMENSION};
use matcher::{ResolverConfig, SearchConfig, Threshold};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VisageConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub matcher: MatcherYamlConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VisageConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: VisageConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.index.validate()?;
        self.matcher.validate()?;
        self.logging.validate()?;

        if self.matcher.limit > self.index.ann.max_results {
            return Err(ConfigLoadError::Validation(format!(
                "matcher.limit ({}) exceeds index.ann.max_results ({})",
                self.matcher.limit, self.index.ann.max_results
            )));
        }
        Ok(())
    }
}

/// Index YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file; required when `backend` is `redb`.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    #[serde(default)]
    pub ann: AnnYamlConfig,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::Validation(
                "index.path is required when backend is 'redb'".to_string(),
            ));
        }

        if self.dimension == 0 {
            return Err(ConfigLoadError::Validation(
                "index.dimension must be >= 1".to_string(),
            ));
        }

        let valid_compression = ["none", "zstd"];
        if !valid_compression.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.compression must be one of: {valid_compression:?}"
            )));
        }
        if self.compression == "zstd" && !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "index.compression_level must be between 1 and 22".to_string(),
            ));
        }

        self.ann.validate()
    }

    /// Build the runtime [`IndexConfig`].
    pub fn to_index_config(&self) -> IndexConfig {
        let backend = match (self.backend.as_str(), &self.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            _ => BackendConfig::in_memory(),
        };
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        IndexConfig::new()
            .with_dimension(self.dimension)
            .with_backend(backend)
            .with_compression(CompressionConfig::new(codec, self.compression_level))
            .with_ann(self.ann.to_ann_config())
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            dimension: default_dimension(),
            compression: default_compression(),
            compression_level: default_compression_level(),
            ann: AnnYamlConfig::default(),
        }
    }
}

/// HNSW YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnYamlConfig {
    #[serde(default = "true_value")]
    pub enabled: bool,

    #[serde(default = "default_min_vectors_for_ann")]
    pub min_vectors_for_ann: usize,

    #[serde(default = "default_m")]
    pub m: usize,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    #[serde(default = "default_ann_max_results")]
    pub max_results: usize,
}

impl AnnYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.m == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.m must be >= 1".to_string(),
            ));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.ef_construction and ef_search must be >= 1".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(ConfigLoadError::Validation(
                "index.ann.max_results must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_ann_config(&self) -> AnnConfig {
        AnnConfig::default()
            .with_enabled(self.enabled)
            .with_min_vectors_for_ann(self.min_vectors_for_ann)
            .with_m(self.m)
            .with_ef_construction(self.ef_construction)
            .with_ef_search(self.ef_search)
            .with_max_results(self.max_results)
    }
}

impl Default for AnnYamlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_vectors_for_ann: default_min_vectors_for_ann(),
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            max_results: default_ann_max_results(),
        }
    }
}

/// Matcher YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherYamlConfig {
    /// Minimum cosine similarity for a match, in `[0, 1]`. Required.
    #[serde(default)]
    pub threshold: Option<f32>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "true_value")]
    pub legacy_key_fallback: bool,
}

impl MatcherYamlConfig {
    /// Config with the given threshold and defaults elsewhere.
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold: Some(threshold),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        self.threshold()?;
        if self.limit == 0 {
            return Err(ConfigLoadError::Validation(
                "matcher.limit must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured threshold, validated.
    pub fn threshold(&self) -> Result<Threshold, ConfigLoadError> {
        let value = self
            .threshold
            .ok_or_else(|| ConfigLoadError::MissingField("matcher.threshold".to_string()))?;
        Threshold::new(value).map_err(|e| ConfigLoadError::Validation(format!("matcher.{e}")))
    }

    pub fn to_search_config(&self) -> SearchConfig {
        SearchConfig::default().with_limit(self.limit)
    }

    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default().with_legacy_key_fallback(self.legacy_key_fallback)
    }
}

impl Default for MatcherYamlConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            limit: default_limit(),
            legacy_key_fallback: true,
        }
    }
}

/// Logging YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `visage=debug,index=info`.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Helper functions for serde defaults
fn true_value() -> bool {
    true
}
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}
fn default_compression() -> String {
    "zstd".to_string()
}
fn default_compression_level() -> i32 {
    3
}
fn default_min_vectors_for_ann() -> usize {
    1000
}
fn default_m() -> usize {
    16
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    50
}
fn default_ann_max_results() -> usize {
    100
}
fn default_limit() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

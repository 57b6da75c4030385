//! Boundary to the face detection and embedding model.
//!
//! The model itself lives outside this crate. Implement
//! [`EmbeddingExtractor`] over whatever runtime hosts it (ONNX, a sidecar
//! process, a remote service) and hand it to [`crate::IdentityService`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Face embedding. Need not be normalized; the index does that.
    pub vector: Vec<f32>,
    /// Detector confidence for the chosen face, in `[0, 1]`.
    pub confidence: f32,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractError {
    /// The bytes are not an image the model can read.
    #[error("could not decode image: {0}")]
    Decode(String),
    /// The model itself failed.
    #[error("embedding model failed: {0}")]
    Model(String),
}

/// Turns image bytes into a face embedding.
///
/// When several faces are present, implementations return the one with the
/// highest detection confidence. `Ok(None)` means no face was found.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, image: &[u8]) -> Result<Option<Extraction>, ExtractError>;
}

//! Vector validation and cosine helpers shared by the index and the search layer.

use thiserror::Error;

/// Reasons a vector is rejected before it reaches storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error("vector is empty")]
    Empty,
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("non-finite value at position {position}")]
    NonFinite { position: usize },
}

/// Check that `vector` has exactly `dimension` finite components.
pub fn validate(vector: &[f32], dimension: usize) -> Result<(), VectorError> {
    if vector.is_empty() {
        return Err(VectorError::Empty);
    }
    if vector.len() != dimension {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            got: vector.len(),
        });
    }
    if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
        return Err(VectorError::NonFinite { position });
    }
    Ok(())
}

/// Euclidean norm.
///
/// Squares are summed in f64: an f32 sum overflows above ~1e19 and
/// underflows below ~1e-23 per component even though the input is finite.
#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    norm_f64(vector) as f32
}

#[inline]
fn norm_f64(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

/// Scale `vector` to unit length in place.
///
/// Zero vectors are left untouched: they are stored as-is and never match
/// anything meaningfully.
pub fn normalize(vector: &mut [f32]) {
    let norm = norm_f64(vector);
    if norm > 0.0 {
        vector
            .iter_mut()
            .for_each(|v| *v = (f64::from(*v) / norm) as f32);
    }
}

/// Owned variant of [`normalize`].
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut out = vector.to_vec();
    normalize(&mut out);
    out
}

/// Cosine distance (1 - cosine similarity), in `[0, 2]`.
/// A zero vector on either side yields 1.0, i.e. similarity 0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    let norm_a = norm_f64(a);
    let norm_b = norm_f64(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = dot / (norm_a * norm_b);
    (1.0 - similarity.clamp(-1.0, 1.0)) as f32
}

/// Map a cosine distance back onto a similarity score.
#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

//! Embedding seam
//!
//! The store treats the embedding model as an opaque [`Embedder`] producing
//! fixed-dimension unit vectors. Two implementations ship:
//!
//! - [`FastembedEmbedder`] (feature `embeddings`): local ONNX inference via
//!   fastembed, Matryoshka-truncated to the configured dimension.
//! - [`HashingEmbedder`]: a deterministic feature-hashing embedder with no
//!   model download. Used by the test suite and by deployments that want
//!   hybrid search without pulling model weights.

mod hashing;

#[cfg(feature = "embeddings")]
mod local;

pub use hashing::HashingEmbedder;

#[cfg(feature = "embeddings")]
pub use local::FastembedEmbedder;

/// Default embedding width. Matryoshka-truncated models keep their first N
/// dimensions as the N-dim representation, so 256 trades ~2% quality for
/// 3x smaller vector rows.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Maximum text length passed to a model; longer input is truncated
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Why a text could not be turned into a vector
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EmbeddingError {
    /// No usable model: weights missing, load failed, or the shared
    /// handle is poisoned
    Unavailable(String),
    /// The model ran but produced no usable vector for this text
    Inference(String),
    /// The text itself cannot be embedded (e.g. empty after trimming)
    UnusableInput(String),
}

impl std::fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingError::Unavailable(why) => write!(f, "embedding model unavailable: {why}"),
            EmbeddingError::Inference(why) => write!(f, "embedding inference failed: {why}"),
            EmbeddingError::UnusableInput(why) => write!(f, "text cannot be embedded: {why}"),
        }
    }
}

impl std::error::Error for EmbeddingError {}

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// Text to fixed-dimension unit vector
pub trait Embedder: Send + Sync {
    /// Vector width this embedder produces. Immutable per instance; the
    /// index refuses to open against a database with a different width.
    fn dimensions(&self) -> usize;

    /// Embed a text. The returned vector has exactly [`Self::dimensions`]
    /// components and unit L2 norm.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ============================================================================
// VECTOR HELPERS
// ============================================================================

/// Cosine similarity between two vectors; 0.0 on length mismatch
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Scale a vector to unit L2 norm in place. A zero vector gets a 1.0 in its
/// first component so downstream cosine math never sees NaN.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        if let Some(first) = v.first_mut() {
            *first = 1.0;
        }
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Keep the first `dims` components and renormalize (Matryoshka truncation)
pub fn matryoshka_truncate(mut v: Vec<f32>, dims: usize) -> Vec<f32> {
    v.truncate(dims);
    l2_normalize(&mut v);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_yield_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn normalize_produces_unit_norm() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_gets_a_basis_component() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v[0], 1.0);
    }

    #[test]
    fn truncation_renormalizes() {
        let v = vec![0.5f32; 8];
        let t = matryoshka_truncate(v, 4);
        assert_eq!(t.len(), 4);
        let norm: f32 = t.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}

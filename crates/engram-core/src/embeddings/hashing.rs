//! Deterministic feature-hashing embedder
//!
//! Maps token unigrams and character trigrams into a fixed number of signed
//! buckets (FNV-1a), then L2-normalizes. Texts sharing vocabulary land near
//! each other under cosine similarity, which is what the hybrid searcher
//! needs from its dense signal when no model is available. Output is fully
//! deterministic across processes and platforms.

use super::{l2_normalize, Embedder, EmbeddingError, DEFAULT_DIMENSIONS, MAX_TEXT_LENGTH};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Model-free embedder producing deterministic unit vectors
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    /// Create an embedder with the given output width
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, hash: u64) -> (usize, f32) {
        let idx = (hash % self.dimensions as u64) as usize;
        // one hash bit decides the sign, halving collision damage
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text: String = text.chars().take(MAX_TEXT_LENGTH).collect::<String>();
        let lowered = text.to_lowercase();

        let mut v = vec![0.0f32; self.dimensions];

        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let (idx, sign) = self.bucket(fnv1a(token.as_bytes()));
            v[idx] += sign;

            // character trigrams give partial-word overlap a signal
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for win in chars.windows(3) {
                    let tri: String = win.iter().collect();
                    let (idx, sign) = self.bucket(fnv1a(tri.as_bytes()) ^ 0x5bd1e995);
                    v[idx] += 0.5 * sign;
                }
            }
        }

        l2_normalize(&mut v);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn deterministic_output() {
        let e = HashingEmbedder::default();
        let a = e.embed("reciprocal rank fusion").unwrap();
        let b = e.embed("reciprocal rank fusion").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unit_norm() {
        let e = HashingEmbedder::default();
        let v = e.embed("some text to embed").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let e = HashingEmbedder::default();
        let q = e.embed("DSGVO Compliance Healthcare Datenschutz").unwrap();
        let close = e
            .embed("DSGVO und Datenschutz im Healthcare Umfeld: Compliance Anforderungen")
            .unwrap();
        let far = e.embed("sqlite write-ahead logging performance tuning").unwrap();
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
    }

    #[test]
    fn empty_text_still_unit() {
        let e = HashingEmbedder::default();
        let v = e.embed("").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn respects_configured_dimensions() {
        let e = HashingEmbedder::new(64);
        assert_eq!(e.dimensions(), 64);
        assert_eq!(e.embed("x").unwrap().len(), 64);
    }
}

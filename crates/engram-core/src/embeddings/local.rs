//! fastembed-backed embedder
//!
//! Runs Nomic Embed Text v1.5 locally through ONNX. The 768-dimension
//! model output is Matryoshka-truncated to the store's configured width.
//!
//! Weights are fetched once and shared process-wide: `TextEmbedding`
//! needs `&mut self` to run inference, so the single loaded model sits
//! behind a mutex inside a `OnceLock`. A failed load is cached too -
//! every later call reports the same cause instead of re-downloading.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{matryoshka_truncate, Embedder, EmbeddingError, DEFAULT_DIMENSIONS, MAX_TEXT_LENGTH};

static MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Where the model weights live. `ENGRAM_MODEL_CACHE` wins; otherwise the
/// platform cache dir, with a relative directory as the last resort.
fn weights_dir() -> PathBuf {
    std::env::var_os("ENGRAM_MODEL_CACHE")
        .map(PathBuf::from)
        .or_else(|| {
            directories::ProjectDirs::from("dev", "engram", "engram")
                .map(|dirs| dirs.cache_dir().join("fastembed"))
        })
        .unwrap_or_else(|| PathBuf::from(".engram-models"))
}

fn shared_model() -> Result<MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let slot = MODEL.get_or_init(|| {
        let dir = weights_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("cannot create weights dir {}: {e}", dir.display()))?;

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_cache_dir(dir)
            .with_show_download_progress(false);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("nomic-embed-text-v1.5 did not load: {e}"))
    });

    match slot {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::Unavailable(e.to_string())),
        Err(why) => Err(EmbeddingError::Unavailable(why.clone())),
    }
}

/// fastembed-backed [`Embedder`]
#[derive(Debug, Clone)]
pub struct FastembedEmbedder {
    dimensions: usize,
}

impl Default for FastembedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl FastembedEmbedder {
    /// Create an embedder truncating model output to `dimensions`
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Embedder for FastembedEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let clipped: String = text.chars().take(MAX_TEXT_LENGTH).collect();
        if clipped.trim().is_empty() {
            return Err(EmbeddingError::UnusableInput("empty text".to_string()));
        }

        let raw = shared_model()?
            .embed(vec![clipped], None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?
            .pop()
            .ok_or_else(|| EmbeddingError::Inference("model returned no vector".to_string()))?;

        Ok(matryoshka_truncate(raw, self.dimensions))
    }
}

//! Search module
//!
//! - Vector search over an HNSW index (usearch, cosine)
//! - Keyword candidates from FTS5/BM25 (served by the SQLite index)
//! - Hybrid fusion: weighted reciprocal ranks plus recency

pub mod hybrid;
pub mod vector;

pub use hybrid::{fuse, HybridConfig, RankedEntry, POOL_MULTIPLIER};
pub use vector::VectorIndex;

use chrono::Utc;

use crate::error::{Result, StoreError};
use crate::index::SqliteIndex;

/// Result of one hybrid search pass
#[derive(Debug, Clone)]
pub struct HybridOutcome {
    /// Ranked entries, truncated to the configured limit
    pub ranked: Vec<RankedEntry>,
    /// Candidates that survived the score floor, before truncation
    pub total_found: usize,
    /// True when the FTS pass was skipped because the tokenizer rejected
    /// the query and scoring fell back to vector ranks alone
    pub vector_only: bool,
}

/// Hybrid searcher joining FTS, ANN and recency
pub struct HybridSearcher {
    config: HybridConfig,
}

impl Default for HybridSearcher {
    fn default() -> Self {
        Self::new(HybridConfig::default())
    }
}

impl HybridSearcher {
    /// Create a searcher with the given default configuration
    pub fn new(config: HybridConfig) -> Self {
        Self { config }
    }

    /// Default configuration
    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Run a hybrid query. `config` overrides the searcher defaults for
    /// this call. A query the FTS tokenizer rejects degrades to
    /// vector-only scoring instead of failing; an empty candidate pool
    /// yields an empty result.
    pub fn search(
        &self,
        index: &SqliteIndex,
        vectors: &VectorIndex,
        query_text: &str,
        query_vector: &[f32],
        config: Option<&HybridConfig>,
    ) -> Result<HybridOutcome> {
        let base = config.unwrap_or(&self.config);
        let pool = base.pool_size();

        let (fts_list, vector_only) = match index.fts_candidates(query_text, pool) {
            Ok(list) => (list, false),
            Err(StoreError::FtsSyntax(_)) => {
                tracing::warn!(query = query_text, "FTS rejected query, using vector-only scoring");
                (Vec::new(), true)
            }
            Err(e) => return Err(e),
        };

        let vector_list = vectors.search(query_vector, pool)?;

        if fts_list.is_empty() && vector_list.is_empty() {
            return Ok(HybridOutcome {
                ranked: Vec::new(),
                total_found: 0,
                vector_only,
            });
        }

        // vector-only scoring drops the lexical term entirely; an empty
        // fts list would otherwise hand every candidate the sentinel-rank
        // bonus for free
        let effective = if vector_only {
            HybridConfig {
                weight_fts: 0.0,
                ..base.clone()
            }
        } else {
            base.clone()
        };

        let mut ids: Vec<String> = fts_list.iter().map(|(id, _)| id.clone()).collect();
        ids.extend(vector_list.iter().map(|(id, _)| id.clone()));
        ids.dedup();
        let updated = index.updated_map(&ids)?;

        let ranked = fuse(&fts_list, &vector_list, &updated, Utc::now(), &effective);
        let total_found = ranked.len();
        let ranked = ranked.into_iter().take(effective.limit).collect();

        Ok(HybridOutcome {
            ranked,
            total_found,
            vector_only,
        })
    }
}

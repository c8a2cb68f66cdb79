//! Hybrid search fusion
//!
//! Combines lexical (FTS5/BM25) and dense-vector candidate lists with a
//! weighted reciprocal-rank scheme plus a recency boost:
//!
//! ```text
//! score(e) = w_fts · nrr(rank_fts) + w_vec · nrr(rank_vec) + w_rec · recency(e)
//! nrr(r)   = (k + 1) / (k + r)            -- 1.0 at rank 1
//! recency  = 1 / (1 + days_since_update / 365)
//! ```
//!
//! Each reciprocal-rank component is scaled onto (0, 1] so all three terms
//! share a scale and the minimum-score cut-off is meaningful. Entries absent
//! from one list take the sentinel rank `|list| + 1`. Rank fusion is robust
//! to the score-scale mismatch between BM25 and cosine similarity; the raw
//! list scores only establish the ordering.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::types::MatchType;

/// Candidate pool multiplier: each source list is fetched at 3x the limit
pub const POOL_MULTIPLIER: usize = 3;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Hybrid search weights and cut-offs; every field overridable per call
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Maximum results returned
    pub limit: usize,
    /// Fused-score floor; lower-scoring entries are dropped
    pub min_score: f64,
    /// Weight of the lexical rank component
    pub weight_fts: f64,
    /// Weight of the vector rank component
    pub weight_vector: f64,
    /// Weight of the recency component
    pub weight_recency: f64,
    /// Rank dampening constant
    pub rrf_k: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            min_score: 0.3,
            weight_fts: 0.3,
            weight_vector: 0.5,
            weight_recency: 0.2,
            rrf_k: 60.0,
        }
    }
}

impl HybridConfig {
    /// Candidates fetched from each source list
    pub fn pool_size(&self) -> usize {
        self.limit * POOL_MULTIPLIER
    }
}

// ============================================================================
// FUSION
// ============================================================================

/// A fused, ranked candidate
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    /// Entry id
    pub id: String,
    /// Fused score
    pub score: f64,
    /// Which source lists the entry appeared in
    pub match_type: MatchType,
}

/// Normalised reciprocal rank: 1.0 at rank 1, decaying with `k`
fn nrr(rank: usize, k: f64) -> f64 {
    (k + 1.0) / (k + rank as f64)
}

/// Recency factor from the entry's update time; unknown times score 0
fn recency(updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match updated {
        Some(ts) => {
            let days = (now - ts).num_seconds().max(0) as f64 / 86_400.0;
            1.0 / (1.0 + days / 365.0)
        }
        None => 0.0,
    }
}

/// Fuse two ranked candidate lists. `fts` and `vector` are best-first
/// `(id, score)` lists; only their ordering matters here. Returns every
/// candidate at or above `min_score`, best first, ties broken by update
/// time descending then id ascending. Truncation to the limit is the
/// caller's step so it can report the pre-truncation total.
pub fn fuse(
    fts: &[(String, f64)],
    vector: &[(String, f64)],
    updated: &HashMap<String, Option<DateTime<Utc>>>,
    now: DateTime<Utc>,
    config: &HybridConfig,
) -> Vec<RankedEntry> {
    let fts_rank: HashMap<&str, usize> = fts
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i + 1))
        .collect();
    let vec_rank: HashMap<&str, usize> = vector
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i + 1))
        .collect();

    let fts_sentinel = fts.len() + 1;
    let vec_sentinel = vector.len() + 1;

    let mut seen = HashSet::new();
    let candidates: Vec<&str> = fts
        .iter()
        .chain(vector.iter())
        .map(|(id, _)| id.as_str())
        .filter(|id| seen.insert(*id))
        .collect();

    let mut ranked: Vec<(RankedEntry, Option<DateTime<Utc>>)> = candidates
        .into_iter()
        .map(|id| {
            let in_fts = fts_rank.contains_key(id);
            let in_vec = vec_rank.contains_key(id);
            let rank_fts = fts_rank.get(id).copied().unwrap_or(fts_sentinel);
            let rank_vec = vec_rank.get(id).copied().unwrap_or(vec_sentinel);

            let updated_at = updated.get(id).copied().flatten();
            let score = config.weight_fts * nrr(rank_fts, config.rrf_k)
                + config.weight_vector * nrr(rank_vec, config.rrf_k)
                + config.weight_recency * recency(updated_at, now);

            let match_type = match (in_fts, in_vec) {
                (true, true) => MatchType::Hybrid,
                (true, false) => MatchType::Fts,
                _ => MatchType::Vector,
            };

            (
                RankedEntry {
                    id: id.to_string(),
                    score,
                    match_type,
                },
                updated_at,
            )
        })
        .filter(|(entry, _)| entry.score >= config.min_score)
        .collect();

    ranked.sort_by(|(a, a_upd), (b, b_upd)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b_upd.cmp(a_upd))
            .then_with(|| a.id.cmp(&b.id))
    });

    ranked.into_iter().map(|(entry, _)| entry).collect()
}

// ============================================================================
// TESTS
// ============================================================================

//! Decay scan
//!
//! Proposes stale entries as archive candidates. The score combines age
//! beyond a type-specific grace period, how often the entry is retrieved,
//! its importance, and how connected it still is. Supersession edges are
//! archival lineage and do not count as connections here, so a superseded
//! entry decays even while its replacement points at it.
//!
//! The scan only proposes; nothing is deleted or moved.

use chrono::Utc;

use crate::error::Result;
use crate::graph::GraphStore;
use crate::types::{DecayCandidate, KnowledgeType};

use super::KnowledgeStore;

/// Decay scan configuration
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Maximum candidates returned
    pub max_candidates: usize,
    /// Minimum staleness for a candidate to be reported
    pub min_staleness: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            max_candidates: 20,
            min_staleness: 0.05,
        }
    }
}

/// Days an entry of this type is left alone before decay applies
fn grace_days(ty: KnowledgeType) -> i64 {
    match ty {
        KnowledgeType::Session => 30,
        KnowledgeType::Incident => 90,
        KnowledgeType::Note => 120,
        KnowledgeType::Decision | KnowledgeType::Pattern | KnowledgeType::Workflow => 240,
        KnowledgeType::Entity => 365,
    }
}

pub(super) fn decay_candidates(
    store: &KnowledgeStore,
    config: &DecayConfig,
) -> Result<Vec<DecayCandidate>> {
    let now = Utc::now();
    let graph = GraphStore::new(store.index());
    let entries = store.index().list(None, i64::MAX as usize)?;

    let mut candidates = Vec::new();
    for entry in entries {
        let age_days = (now - entry.updated_at).num_days();
        let grace = grace_days(entry.entry_type);
        if age_days <= grace {
            continue;
        }

        let active = graph.active_connection_count(&entry.id)?;
        let importance: f64 = store
            .index()
            .reader()?
            .query_row(
                "SELECT importance FROM entries WHERE id = ?1",
                [entry.id.as_str()],
                |row| row.get(0),
            )
            .unwrap_or(0.5);

        let age_factor = (((age_days - grace) as f64) / 365.0).clamp(0.0, 1.0);
        let access_damp = 1.0 / (1.0 + entry.access_count as f64);
        let connection_damp = 1.0 / (1.0 + active as f64);
        let importance_damp = 1.0 - importance / 2.0;

        let staleness = age_factor * access_damp * connection_damp * importance_damp;
        if staleness < config.min_staleness {
            continue;
        }

        candidates.push(DecayCandidate {
            id: entry.id,
            title: entry.title,
            entry_type: entry.entry_type,
            age_days,
            access_count: entry.access_count,
            active_connections: active,
            staleness,
        });
    }

    candidates.sort_by(|a, b| {
        b.staleness
            .partial_cmp(&a.staleness)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(config.max_candidates);
    Ok(candidates)
}

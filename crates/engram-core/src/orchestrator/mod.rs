//! Orchestrator
//!
//! The public tool surface over one or two knowledge stores. The engine
//! underneath is synchronous with interior mutability; the orchestrator
//! exposes `async` operations so callers get suspension points at the
//! embedding and I/O boundaries without any event-loop assumption.
//!
//! Dual-store mode multiplexes a project store and a global store behind
//! one value: searches merge both result sets (each hit labelled with its
//! origin), writes go to the project store. There is no ambient state; the
//! stores are plain values passed in at construction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::consolidate::{ConsolidationPlan, Consolidator, ExistingEntry, PlanAction, SessionNote};
use crate::error::Result;
use crate::store::{DecayConfig, EntryDocument, KnowledgeStore};
use crate::types::{
    Connection, ConnectionInput, ConnectionType, CreateInput, CreateResult, DecayCandidate,
    Direction, KnowledgeEntry, KnowledgeType, RebuildReport, SearchRequest, SearchResponse,
    StoreSource, StoreStats, TraverseHit, UpdateResult,
};
use crate::versioning::CommitInfo;

/// Outcome of executing a consolidation plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    /// The plan that was executed
    pub plan: ConsolidationPlan,
    /// Ids of entries created
    pub created: Vec<String>,
    /// `(new_id, superseded_id)` pairs linked with a supersedes edge
    pub superseded: Vec<(String, String)>,
    /// Notes skipped as duplicates
    pub duplicates_skipped: usize,
    /// Notes that contributed only tag normalisation
    pub tags_only: usize,
}

fn flatten_task<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.map_err(|e| crate::error::StoreError::Init(format!("search task failed: {e}")))?
}

/// Public tool surface over one or two stores
pub struct Orchestrator {
    project: Arc<KnowledgeStore>,
    global: Option<Arc<KnowledgeStore>>,
}

impl Orchestrator {
    /// Single-store orchestrator
    pub fn single(project: Arc<KnowledgeStore>) -> Self {
        Self {
            project,
            global: None,
        }
    }

    /// Dual-store orchestrator: project-local plus shared global store
    pub fn dual(project: Arc<KnowledgeStore>, global: Arc<KnowledgeStore>) -> Self {
        Self {
            project,
            global: Some(global),
        }
    }

    /// The store writes go to
    pub fn project(&self) -> &KnowledgeStore {
        &self.project
    }

    // ========================================================================
    // WRITES (project store)
    // ========================================================================

    /// Store a new entry
    pub async fn note(&self, input: CreateInput) -> Result<CreateResult> {
        self.project.create(input)
    }

    /// Rewrite an entry's body by path
    pub async fn update(&self, rel_path: &str, content: &str, reason: &str) -> Result<UpdateResult> {
        self.project.update(rel_path, content, reason)
    }

    /// Delete an entry
    pub async fn forget(&self, id: &str) -> Result<()> {
        self.project.delete(id)
    }

    /// Link two entries
    pub async fn connect(
        &self,
        source: &str,
        target: &str,
        ty: ConnectionType,
        note: Option<&str>,
    ) -> Result<()> {
        self.project.connect(source, target, ty, note)
    }

    /// Commit outstanding file changes to the embedded repository
    pub async fn commit(&self, message: &str) -> Result<Option<String>> {
        self.project.commit(message)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Entry by id; the project store wins when both stores know the id
    pub async fn read(&self, id: &str) -> Result<EntryDocument> {
        match self.project.read(id) {
            Ok(doc) => Ok(doc),
            Err(crate::error::StoreError::NotFound(_)) => match &self.global {
                Some(global) => global.read(id),
                None => Err(crate::error::StoreError::NotFound(id.to_string())),
            },
            Err(e) => Err(e),
        }
    }

    /// Entry by relative path (project store)
    pub async fn read_path(&self, rel_path: &str) -> Result<EntryDocument> {
        self.project.read_by_path(rel_path)
    }

    /// List entries from the project store
    pub async fn list(
        &self,
        ty: Option<KnowledgeType>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>> {
        self.project.list(ty, limit)
    }

    /// Connections of an entry (project store)
    pub async fn connections(
        &self,
        id: &str,
        direction: Direction,
        types: Option<&[ConnectionType]>,
    ) -> Result<Vec<Connection>> {
        self.project.connections(id, direction, types)
    }

    /// Graph walk from an entry (project store)
    pub async fn traverse(
        &self,
        start: &str,
        direction: Direction,
        depth: u32,
        types: Option<&[ConnectionType]>,
    ) -> Result<Vec<TraverseHit>> {
        self.project.traverse(start, direction, depth, types)
    }

    /// Hybrid search, merged across both stores in dual mode. Hits carry
    /// their origin in `store_source`; ranking is by fused score. In dual
    /// mode the two stores are queried concurrently on blocking tasks.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let Some(global) = &self.global else {
            return self.project.search(&request);
        };

        let limit = request.limit.unwrap_or(5);
        let project = Arc::clone(&self.project);
        let global = Arc::clone(global);
        let project_req = request.clone();
        let global_req = request;

        let (mine, theirs) = tokio::join!(
            tokio::task::spawn_blocking(move || project.search(&project_req)),
            tokio::task::spawn_blocking(move || global.search(&global_req)),
        );
        let mut merged = flatten_task(mine)?;
        let theirs = flatten_task(theirs)?;

        merged.total_found += theirs.total_found;
        merged.results.extend(theirs.results.into_iter().map(|mut hit| {
            hit.store_source = StoreSource::Global;
            hit
        }));
        merged.results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        merged.results.truncate(limit);

        Ok(merged)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Rebuild the project index from its file tree
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        self.project.rebuild()
    }

    /// Project store statistics
    pub async fn stats(&self) -> Result<StoreStats> {
        self.project.stats()
    }

    /// Commit history of the project store
    pub async fn history(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        self.project.history(limit)
    }

    /// Stale-entry scan on the project store
    pub async fn decay_candidates(&self, config: &DecayConfig) -> Result<Vec<DecayCandidate>> {
        self.project.decay_candidates(config)
    }

    // ========================================================================
    // CONSOLIDATION
    // ========================================================================

    /// Plan and execute consolidation of a batch of session notes against
    /// the project store. The plan itself is pure; this executes it.
    pub async fn consolidate(&self, notes: &[SessionNote]) -> Result<ConsolidationReport> {
        let existing: Vec<ExistingEntry> = {
            let entries = self.project.list(None, i64::MAX as usize)?;
            let mut out = Vec::with_capacity(entries.len());
            for entry in entries {
                let content = self.project.read(&entry.id)?.content;
                out.push(ExistingEntry {
                    id: entry.id,
                    title: entry.title,
                    content,
                });
            }
            out
        };

        let plan = Consolidator::default().plan(notes, &existing);
        let mut report = ConsolidationReport {
            plan: plan.clone(),
            ..Default::default()
        };

        for action in &plan.actions {
            match action {
                PlanAction::CreateFile {
                    title,
                    entry_type,
                    content,
                    tags,
                    ..
                } => {
                    let result = self
                        .project
                        .create(CreateInput {
                            title: title.clone(),
                            entry_type: *entry_type,
                            content: content.clone(),
                            tags: tags.clone(),
                            connections: Vec::new(),
                            source: Some("consolidation".to_string()),
                        })?;
                    report.created.push(result.id);
                }
                PlanAction::Subsume {
                    supersedes,
                    title,
                    entry_type,
                    content,
                    tags,
                    ..
                } => {
                    let result = self
                        .project
                        .create(CreateInput {
                            title: title.clone(),
                            entry_type: *entry_type,
                            content: content.clone(),
                            tags: tags.clone(),
                            connections: vec![ConnectionInput {
                                target: supersedes.clone(),
                                connection_type: ConnectionType::Supersedes,
                                note: None,
                            }],
                            source: Some("consolidation".to_string()),
                        })?;
                    report
                        .superseded
                        .push((result.id.clone(), supersedes.clone()));
                    report.created.push(result.id);
                }
                PlanAction::SkipDuplicate { .. } => report.duplicates_skipped += 1,
                PlanAction::NormalizeTags { .. } => report.tags_only += 1,
            }
        }

        Ok(report)
    }
}

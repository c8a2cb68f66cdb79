//! Knowledge store coordinator
//!
//! Owns the base directory, the SQLite index, the in-memory vector index,
//! the embedder and the version store, and keeps them coherent across
//! create/update/delete/rebuild. Files are ground truth: every derived row
//! can be regenerated from the Markdown tree, so a write that fails between
//! the file write and the index commit leaves a stale index that the next
//! rebuild reconciles.
//!
//! Write ordering per operation: the file write precedes the SQLite
//! transaction for create/update and follows it for delete. The SQLite
//! transaction covering entries + knowledge + tags + connections is atomic.
//! Id allocation and insert happen under a store-wide write lock.

mod decay;
mod rebuild;

pub use decay::DecayConfig;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::embeddings::{Embedder, DEFAULT_DIMENSIONS};
use crate::error::{Result, StoreError};
use crate::graph::{normalize_tag, GraphStore};
use crate::ids;
use crate::index::{EntryRecord, SqliteIndex};
use crate::markdown::{self, Document};
use crate::paths;
use crate::search::{HybridConfig, HybridSearcher, VectorIndex};
use crate::types::{
    Connection, ConnectionType, CreateInput, CreateResult, DecayCandidate, Direction,
    KnowledgeEntry, KnowledgeType, RebuildReport, SearchHit, SearchRequest, SearchResponse,
    StoreSource, StoreStats, SuggestedConnection, TraverseHit, UpdateResult,
};
use crate::versioning::{
    ensure_enclosing_gitignore, ensure_internal_gitignore, CommitInfo, VersionStore,
};

/// Relative location of the SQLite index under the base dir
const INDEX_SUBPATH: &str = ".index/search.sqlite";

/// Body-length change ratio that triggers connection suggestions on update
const SUGGESTION_CHANGE_RATIO: f64 = 0.20;

/// Default number of suggested connections returned by create/update
const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Query-embedding cache capacity
const QUERY_CACHE_SIZE: usize = 100;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory for the Markdown tree; platform data dir when None
    pub base_dir: Option<PathBuf>,
    /// SQLite path; `<base>/.index/search.sqlite` when None
    pub sqlite_path: Option<PathBuf>,
    /// Vector width; must match the embedder and any existing database
    pub embedding_dimensions: usize,
    /// Default hybrid search weights
    pub search: HybridConfig,
    /// Suggested connections returned by create and substantial updates
    pub suggestion_limit: usize,
    /// Whether to keep the file tree in an embedded Git repository
    pub versioning: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            sqlite_path: None,
            embedding_dimensions: DEFAULT_DIMENSIONS,
            search: HybridConfig::default(),
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            versioning: true,
        }
    }
}

/// An entry together with its body text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDocument {
    /// Index view of the entry
    #[serde(flatten)]
    pub entry: KnowledgeEntry,
    /// Body text from the Markdown file
    pub content: String,
}

// ============================================================================
// STORE
// ============================================================================

/// File-backed knowledge store with a SQLite search/graph index
///
/// All methods take `&self`; interior mutability keeps the store
/// `Send + Sync` so an orchestrator can share it across tasks.
pub struct KnowledgeStore {
    base_dir: PathBuf,
    index: SqliteIndex,
    vectors: Mutex<VectorIndex>,
    embedder: Box<dyn Embedder>,
    searcher: HybridSearcher,
    versions: Option<Mutex<VersionStore>>,
    suggestion_limit: usize,
    write_lock: Mutex<()>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl KnowledgeStore {
    /// Open a store with the default embedder for the build: fastembed when
    /// the `embeddings` feature is enabled, the hashing embedder otherwise.
    pub fn open(config: StoreConfig) -> Result<Self> {
        #[cfg(feature = "embeddings")]
        let embedder: Box<dyn Embedder> = Box::new(
            crate::embeddings::FastembedEmbedder::new(config.embedding_dimensions),
        );
        #[cfg(not(feature = "embeddings"))]
        let embedder: Box<dyn Embedder> = Box::new(crate::embeddings::HashingEmbedder::new(
            config.embedding_dimensions,
        ));

        Self::open_with_embedder(config, embedder)
    }

    /// Open a store around a caller-supplied embedder
    pub fn open_with_embedder(config: StoreConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        if embedder.dimensions() != config.embedding_dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: config.embedding_dimensions,
                got: embedder.dimensions(),
            });
        }

        let base_dir = match &config.base_dir {
            Some(dir) => dir.clone(),
            None => {
                let proj = directories::ProjectDirs::from("dev", "engram", "engram")
                    .ok_or_else(|| {
                        StoreError::Init("could not determine data directory".to_string())
                    })?;
                proj.data_dir().join("memory")
            }
        };
        std::fs::create_dir_all(&base_dir)?;
        let base_dir = base_dir.canonicalize()?;

        let sqlite_path = config
            .sqlite_path
            .clone()
            .unwrap_or_else(|| base_dir.join(INDEX_SUBPATH));
        let index = SqliteIndex::open(&sqlite_path, config.embedding_dimensions)?;

        // hydrate the ANN index from the persisted vector rows
        let mut vectors = VectorIndex::new(config.embedding_dimensions)?;
        for (id, vector) in index.all_vectors()? {
            if vector.len() != config.embedding_dimensions {
                tracing::warn!(id, "skipping vector with stale dimensions");
                continue;
            }
            vectors.add(&id, &vector)?;
        }

        let versions = if config.versioning {
            let store = VersionStore::open_or_init(&base_dir)?;
            ensure_internal_gitignore(&base_dir)?;
            if let Err(e) = ensure_enclosing_gitignore(&base_dir) {
                tracing::warn!("could not update enclosing .gitignore: {e}");
            }
            Some(Mutex::new(store))
        } else {
            None
        };

        Ok(Self {
            base_dir,
            index,
            vectors: Mutex::new(vectors),
            embedder,
            searcher: HybridSearcher::new(config.search),
            versions,
            suggestion_limit: config.suggestion_limit,
            write_lock: Mutex::new(()),
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        })
    }

    /// Base directory of the Markdown tree
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The underlying index (read-only views)
    pub fn index(&self) -> &SqliteIndex {
        &self.index
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Create an entry: allocate an id, write the Markdown file, index it,
    /// bind tags and connections, embed the body.
    pub fn create(&self, input: CreateInput) -> Result<CreateResult> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Init("write lock poisoned".to_string()))?;

        let now = Utc::now();
        let existing = self.index.ids_of_type(input.entry_type)?;
        let id = ids::next_id(existing.iter().map(String::as_str), input.entry_type);
        let rel_path = paths::relative_path(input.entry_type, &id, &input.title);

        let tags: Vec<String> = input
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();

        // file first: ground truth before derived state
        let mut doc = Document::new_entry(
            &id,
            &input.title,
            input.entry_type.as_str(),
            &tags,
            now,
            &input.content,
        );
        for conn in &input.connections {
            doc.add_connection(&conn.target, conn.connection_type, conn.note.as_deref());
        }
        self.write_file(&rel_path, &markdown::serialize(&doc))?;

        // one transaction for entries + knowledge + tags + connections
        {
            let mut writer = self.index.writer()?;
            let txn = writer.transaction()?;

            let rec = EntryRecord {
                id: id.clone(),
                title: input.title.clone(),
                entry_type: input.entry_type,
                file_path: rel_path.clone(),
                content: input.content.clone(),
                importance: 0.5,
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                source: input.source.clone(),
            };
            SqliteIndex::write_entry_rows(&txn, &rec, &tags)?;
            GraphStore::insert_tags(&txn, &id, &tags)?;

            for conn in &input.connections {
                let exists: Option<i64> = txn
                    .prepare_cached("SELECT 1 FROM knowledge WHERE id = ?1")?
                    .query_row([conn.target.as_str()], |row| row.get(0))
                    .ok();
                if exists.is_none() {
                    return Err(StoreError::NotFound(conn.target.clone()));
                }
                GraphStore::insert_connection_pair(
                    &txn,
                    &id,
                    &conn.target,
                    conn.connection_type,
                    conn.note.as_deref(),
                    now,
                )?;
            }
            txn.commit()?;
        }

        // mirror the inverse edge into each target's frontmatter
        for conn in &input.connections {
            self.mirror_connection_in_file(
                &conn.target,
                &id,
                conn.connection_type.inverse(),
                conn.note.as_deref(),
            )?;
        }

        // embed and index the vector
        let vector = self
            .embedder
            .embed(&input.content)
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        {
            let writer = self.index.writer()?;
            self.index.put_vector(&writer, &id, &vector)?;
        }
        self.lock_vectors()?.add(&id, &vector)?;

        let suggested_connections = self.suggest_connections(&input.content, &id)?;
        let existing_tags = self.index.all_tags()?;

        self.commit_version(&format!("create {id}: {}", input.title));
        tracing::debug!(id, path = rel_path, "created entry");

        Ok(CreateResult {
            id,
            file_path: rel_path,
            suggested_connections,
            existing_tags,
        })
    }

    // ========================================================================
    // READ
    // ========================================================================

    /// Entry by id, with body text
    pub fn read(&self, id: &str) -> Result<EntryDocument> {
        let entry = self
            .index
            .get_entry(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let content = self
            .index
            .get_content(id)?
            .unwrap_or_default();
        Ok(EntryDocument { entry, content })
    }

    /// Entry by relative path. The path is validated against the base dir
    /// before anything touches the filesystem or index.
    pub fn read_by_path(&self, rel_path: &str) -> Result<EntryDocument> {
        let abs = paths::resolve_under(&self.base_dir, rel_path)?;
        let rel = self.relativize(&abs)?;

        if let Some(entry) = self.index.get_entry_by_path(&rel)? {
            let content = self.index.get_content(&entry.id)?.unwrap_or_default();
            return Ok(EntryDocument { entry, content });
        }

        // not indexed (yet): files are truth, fall back to the file itself
        let text = std::fs::read_to_string(&abs)
            .map_err(|_| StoreError::NotFound(rel_path.to_string()))?;
        let doc = markdown::parse(&text);
        let id = doc
            .id()
            .ok_or_else(|| StoreError::NotFound(rel_path.to_string()))?
            .to_string();
        let entry = KnowledgeEntry {
            id: id.clone(),
            title: doc.title().unwrap_or("").to_string(),
            entry_type: doc
                .entry_type()
                .and_then(|t| KnowledgeType::parse(t).ok())
                .unwrap_or_default(),
            file_path: rel,
            created_at: doc.created().unwrap_or_else(Utc::now),
            updated_at: doc.updated().unwrap_or_else(Utc::now),
            last_accessed: None,
            access_count: 0,
            tags: doc.tags(),
            connections: doc.connections(&id),
        };
        Ok(EntryDocument {
            entry,
            content: doc.body,
        })
    }

    /// List entries, optionally narrowed to a type
    pub fn list(&self, ty: Option<KnowledgeType>, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        self.index.list(ty, limit)
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Rewrite an entry's body. Bumps the update timestamp in whichever
    /// form the file already uses, re-indexes FTS and the vector, and
    /// suggests connections when the body changed by at least 20%.
    pub fn update(&self, rel_path: &str, new_content: &str, reason: &str) -> Result<UpdateResult> {
        let abs = paths::resolve_under(&self.base_dir, rel_path)?;
        let rel = self.relativize(&abs)?;

        let text = std::fs::read_to_string(&abs)
            .map_err(|_| StoreError::NotFound(rel_path.to_string()))?;
        let mut doc = markdown::parse(&text);
        let id = doc
            .id()
            .ok_or_else(|| StoreError::NotFound(rel_path.to_string()))?
            .to_string();

        let now = Utc::now();
        let old_content = doc.body.clone();
        doc.touch_updated(now);
        doc.body = new_content.to_string();

        // file first, index after
        self.write_file(&rel, &markdown::serialize(&doc))?;

        let entry_type = doc
            .entry_type()
            .and_then(|t| KnowledgeType::parse(t).ok())
            .unwrap_or_default();
        let tags = doc.tags();
        {
            let mut writer = self.index.writer()?;
            let txn = writer.transaction()?;
            let prior = self.prior_record(&txn, &id)?;
            let rec = EntryRecord {
                id: id.clone(),
                title: doc.title().unwrap_or("").to_string(),
                entry_type,
                file_path: rel.clone(),
                content: new_content.to_string(),
                importance: prior.as_ref().map(|p| p.importance).unwrap_or(0.5),
                created_at: doc.created().unwrap_or(now),
                updated_at: now,
                last_accessed: prior.as_ref().and_then(|p| p.last_accessed),
                access_count: prior.as_ref().map(|p| p.access_count).unwrap_or(0),
                source: prior.and_then(|p| p.source),
            };
            SqliteIndex::write_entry_rows(&txn, &rec, &tags)?;
            GraphStore::insert_tags(&txn, &id, &tags)?;
            txn.commit()?;
        }

        let vector = self
            .embedder
            .embed(new_content)
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        {
            let writer = self.index.writer()?;
            self.index.put_vector(&writer, &id, &vector)?;
        }
        self.lock_vectors()?.add(&id, &vector)?;

        // a substantial rewrite is worth re-linking
        let old_len = old_content.len().max(1);
        let change = (new_content.len() as f64 - old_content.len() as f64).abs() / old_len as f64;
        let suggested_connections = if change >= SUGGESTION_CHANGE_RATIO {
            self.suggest_connections(new_content, &id)?
        } else {
            Vec::new()
        };

        let diff = self.describe_change(&rel, reason, old_content.len(), new_content.len());
        self.commit_version(&format!("update {id}: {reason}"));

        Ok(UpdateResult {
            success: true,
            diff,
            indexed: true,
            suggested_connections,
        })
    }

    fn prior_record(
        &self,
        conn: &rusqlite::Connection,
        id: &str,
    ) -> Result<Option<PriorRow>> {
        use rusqlite::OptionalExtension;
        let row = conn
            .prepare_cached(
                "SELECT e.importance, e.source, k.access_count, k.last_accessed
                 FROM entries e JOIN knowledge k ON k.id = e.id
                 WHERE e.id = ?1",
            )?
            .query_row([id], |row| {
                Ok(PriorRow {
                    importance: row.get(0)?,
                    source: row.get(1)?,
                    access_count: row.get(2)?,
                    last_accessed: row
                        .get::<_, Option<String>>(3)?
                        .as_deref()
                        .and_then(crate::index::parse_ts),
                })
            })
            .optional()?;
        Ok(row)
    }

    fn describe_change(&self, rel: &str, reason: &str, old_len: usize, new_len: usize) -> String {
        let mut diff = format!("reason: {reason}\n");
        match self.version_store().map(|vs| vs.diff_workdir(Some(rel))) {
            Some(Ok(patch)) if !patch.is_empty() => diff.push_str(&patch),
            _ => diff.push_str(&format!("body: {old_len} -> {new_len} chars\n")),
        }
        diff
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    /// Remove an entry: cascade its graph rows, drop FTS and vector rows,
    /// then unlink the file. Unknown ids raise `NotFound`.
    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Init("write lock poisoned".to_string()))?;

        let entry = self
            .index
            .get_entry(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // strip the mirrored edges out of the neighbours' files first
        let graph = GraphStore::new(&self.index);
        let neighbours = graph.connected_entry_ids(id)?;

        {
            let mut writer = self.index.writer()?;
            let txn = writer.transaction()?;
            GraphStore::cascade_delete(&txn, id)?;
            SqliteIndex::delete_entry_rows(&txn, id)?;
            txn.commit()?;
        }

        self.lock_vectors()?.remove(id)?;

        for other in neighbours {
            if let Ok(Some(other_entry)) = self.index.get_entry(&other) {
                let _ = self.rewrite_file_connections(&other_entry.file_path, id);
            }
        }

        // file removal comes after the transaction; a crash in between
        // leaves an orphan file that rebuild re-adopts
        let abs = self.base_dir.join(&entry.file_path);
        if abs.exists() {
            std::fs::remove_file(&abs)?;
        }

        self.commit_version(&format!("delete {id}"));
        tracing::debug!(id, "deleted entry");
        Ok(())
    }

    fn rewrite_file_connections(&self, rel_path: &str, removed_id: &str) -> Result<()> {
        let abs = self.base_dir.join(rel_path);
        let Ok(text) = std::fs::read_to_string(&abs) else {
            return Ok(());
        };
        let mut doc = markdown::parse(&text);
        doc.remove_connections_to(removed_id);
        self.write_file(rel_path, &markdown::serialize(&doc))
    }

    // ========================================================================
    // CONNECT & TRAVERSE
    // ========================================================================

    /// Link two entries. Writes both physical rows in one transaction and
    /// mirrors the edge into both frontmatter files.
    pub fn connect(
        &self,
        source: &str,
        target: &str,
        ty: ConnectionType,
        note: Option<&str>,
    ) -> Result<()> {
        GraphStore::new(&self.index).connect(source, target, ty, note)?;

        self.mirror_connection_in_file(source, target, ty, note)?;
        self.mirror_connection_in_file(target, source, ty.inverse(), note)?;

        self.commit_version(&format!("connect {source} -[{ty}]-> {target}"));
        Ok(())
    }

    fn mirror_connection_in_file(
        &self,
        owner: &str,
        other: &str,
        ty: ConnectionType,
        note: Option<&str>,
    ) -> Result<()> {
        let Some(entry) = self.index.get_entry(owner)? else {
            return Ok(());
        };
        let abs = self.base_dir.join(&entry.file_path);
        let Ok(text) = std::fs::read_to_string(&abs) else {
            return Ok(());
        };
        let mut doc = markdown::parse(&text);
        doc.add_connection(other, ty, note);
        self.write_file(&entry.file_path, &markdown::serialize(&doc))
    }

    /// Connections of an entry
    pub fn connections(
        &self,
        id: &str,
        direction: Direction,
        types: Option<&[ConnectionType]>,
    ) -> Result<Vec<Connection>> {
        GraphStore::new(&self.index).connections_of(id, direction, types)
    }

    /// Breadth-first graph walk (depth clamped at 2)
    pub fn traverse(
        &self,
        start: &str,
        direction: Direction,
        depth: u32,
        types: Option<&[ConnectionType]>,
    ) -> Result<Vec<TraverseHit>> {
        GraphStore::new(&self.index).traverse(start, direction, depth, types)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Hybrid search with graph enrichment. Tag and connected-to filters
    /// intersect the ranked results; every returned entry gets its access
    /// count bumped.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let query_vector = self.query_embedding(&request.query)?;

        let config = HybridConfig {
            limit: request.limit.unwrap_or(self.searcher.config().limit),
            min_score: request.min_score.unwrap_or(self.searcher.config().min_score),
            ..self.searcher.config().clone()
        };

        let vectors = self.lock_vectors()?;
        let outcome =
            self.searcher
                .search(&self.index, &vectors, &request.query, &query_vector, Some(&config))?;
        drop(vectors);

        let mut ranked = outcome.ranked;
        let mut total_found = outcome.total_found;

        if !request.tags.is_empty() {
            let allowed: std::collections::HashSet<String> = GraphStore::new(&self.index)
                .entries_by_tags(&request.tags)?
                .into_iter()
                .collect();
            ranked.retain(|r| allowed.contains(&r.id));
            total_found = ranked.len();
        }

        if let Some(hub) = &request.connected_to {
            let graph = GraphStore::new(&self.index);
            if self.index.get_entry(hub)?.is_none() {
                return Err(StoreError::NotFound(hub.clone()));
            }
            let allowed: std::collections::HashSet<String> =
                graph.connected_entry_ids(hub)?.into_iter().collect();
            ranked.retain(|r| allowed.contains(&r.id));
            total_found = ranked.len();
        }

        let mut results = Vec::with_capacity(ranked.len());
        for r in &ranked {
            let Some(entry) = self.index.get_entry(&r.id)? else {
                continue;
            };
            let content = self.index.get_content(&r.id)?.unwrap_or_default();
            results.push(SearchHit {
                id: entry.id,
                title: entry.title,
                content,
                tags: entry.tags,
                connections: entry.connections,
                score: r.score,
                match_type: r.match_type,
                store_source: StoreSource::Project,
            });
        }

        // only entries actually returned count as accessed
        let returned: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        self.index.bump_access(&returned, Utc::now())?;

        Ok(SearchResponse {
            results,
            total_found,
        })
    }

    fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(hit) = cache.get(query) {
                return Ok(hit.clone());
            }
        }
        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }

    fn suggest_connections(&self, text: &str, exclude: &str) -> Result<Vec<SuggestedConnection>> {
        let query_vector = self
            .embedder
            .embed(text)
            .map_err(|e| StoreError::Embedding(e.to_string()))?;

        let config = HybridConfig {
            limit: self.suggestion_limit + 1,
            min_score: 0.0,
            ..self.searcher.config().clone()
        };
        let vectors = self.lock_vectors()?;
        let outcome = self
            .searcher
            .search(&self.index, &vectors, text, &query_vector, Some(&config))?;
        drop(vectors);

        let mut out = Vec::new();
        for r in outcome.ranked {
            if r.id == exclude {
                continue;
            }
            if let Some(entry) = self.index.get_entry(&r.id)? {
                out.push(SuggestedConnection {
                    id: entry.id,
                    title: entry.title,
                    relevance: r.score,
                });
            }
            if out.len() >= self.suggestion_limit {
                break;
            }
        }
        Ok(out)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Rebuild the index from the Markdown tree (files are ground truth)
    pub fn rebuild(&self) -> Result<RebuildReport> {
        rebuild::rebuild(self)
    }

    /// Aggregate statistics
    pub fn stats(&self) -> Result<StoreStats> {
        self.index.stats()
    }

    /// Stale entries proposed for archival; never deletes anything
    pub fn decay_candidates(&self, config: &DecayConfig) -> Result<Vec<DecayCandidate>> {
        decay::decay_candidates(self, config)
    }

    /// Commit any outstanding file changes to the embedded repository
    pub fn commit(&self, message: &str) -> Result<Option<String>> {
        match self.version_store() {
            Some(vs) => vs.commit_all(message),
            None => Ok(None),
        }
    }

    /// Commit history, newest first
    pub fn history(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        match self.version_store() {
            Some(vs) => vs.log(limit),
            None => Ok(Vec::new()),
        }
    }

    /// Verify index integrity; `IndexCorruption` means a rebuild is due
    pub fn verify(&self) -> Result<()> {
        self.index.integrity_check()
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn lock_vectors(&self) -> Result<std::sync::MutexGuard<'_, VectorIndex>> {
        self.vectors
            .lock()
            .map_err(|_| StoreError::Init("vector index lock poisoned".to_string()))
    }

    fn version_store(&self) -> Option<std::sync::MutexGuard<'_, VersionStore>> {
        self.versions.as_ref().and_then(|m| m.lock().ok())
    }

    pub(crate) fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    fn relativize(&self, abs: &Path) -> Result<String> {
        let rel = abs
            .strip_prefix(&self.base_dir)
            .map_err(|_| StoreError::PathTraversal(abs.display().to_string()))?;
        Ok(rel.to_string_lossy().replace('\\', "/"))
    }

    fn write_file(&self, rel_path: &str, content: &str) -> Result<()> {
        let abs = self.base_dir.join(rel_path);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&abs, content)?;
        Ok(())
    }

    fn commit_version(&self, message: &str) {
        if let Some(vs) = self.version_store() {
            if let Err(e) = vs.commit_all(message) {
                tracing::warn!("version commit failed: {e}");
            }
        }
    }
}

struct PriorRow {
    importance: f64,
    source: Option<String>,
    access_count: i64,
    last_accessed: Option<chrono::DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use tempfile::TempDir;

    fn open_store(tmp: &TempDir) -> KnowledgeStore {
        let config = StoreConfig {
            base_dir: Some(tmp.path().to_path_buf()),
            embedding_dimensions: 32,
            versioning: true,
            ..Default::default()
        };
        KnowledgeStore::open_with_embedder(config, Box::new(HashingEmbedder::new(32))).unwrap()
    }

    fn decision(title: &str, content: &str) -> CreateInput {
        CreateInput {
            title: title.to_string(),
            entry_type: KnowledgeType::Decision,
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_writes_file_and_rows() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        let result = store
            .create(decision("Use Bun", "We decided to use Bun for the runtime."))
            .unwrap();
        assert_eq!(result.id, "dec-001");
        assert_eq!(result.file_path, "semantic/decisions/dec-001-use-bun.md");

        let on_disk = std::fs::read_to_string(tmp.path().join(&result.file_path)).unwrap();
        let doc = markdown::parse(&on_disk);
        assert_eq!(doc.id(), Some("dec-001"));
        assert_eq!(doc.entry_type(), Some("decision"));

        let read = store.read("dec-001").unwrap();
        assert_eq!(read.entry.title, "Use Bun");
        assert!(read.content.contains("Bun"));
    }

    #[test]
    fn ids_allocate_sequentially_per_type() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);

        assert_eq!(store.create(decision("One", "first")).unwrap().id, "dec-001");
        assert_eq!(store.create(decision("Two", "second")).unwrap().id, "dec-002");
        let note = store
            .create(CreateInput {
                title: "A note".to_string(),
                entry_type: KnowledgeType::Note,
                content: "text".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(note.id, "note-001");
    }

    #[test]
    fn connect_mirrors_frontmatter_both_ways() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store.create(decision("Use Bun", "runtime decision")).unwrap();
        store
            .create(CreateInput {
                title: "Fast startup".to_string(),
                entry_type: KnowledgeType::Pattern,
                content: "keep startup lean".to_string(),
                ..Default::default()
            })
            .unwrap();

        store
            .connect("dec-001", "pat-001", ConnectionType::BuildsOn, None)
            .unwrap();

        let dec = store.read("dec-001").unwrap();
        let dec_doc = markdown::parse(
            &std::fs::read_to_string(tmp.path().join(&dec.entry.file_path)).unwrap(),
        );
        let dec_conns = dec_doc.connections("dec-001");
        assert!(dec_conns
            .iter()
            .any(|c| c.target == "pat-001" && c.connection_type == ConnectionType::BuildsOn));

        let pat = store.read("pat-001").unwrap();
        let pat_doc = markdown::parse(
            &std::fs::read_to_string(tmp.path().join(&pat.entry.file_path)).unwrap(),
        );
        let pat_conns = pat_doc.connections("pat-001");
        assert!(pat_conns
            .iter()
            .any(|c| c.target == "dec-001" && c.connection_type == ConnectionType::ExtendedBy));
    }

    #[test]
    fn delete_cascades_and_unlinks() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store.create(decision("One", "first decision")).unwrap();
        store.create(decision("Two", "second decision")).unwrap();
        store
            .connect("dec-001", "dec-002", ConnectionType::Related, None)
            .unwrap();

        let path = store.read("dec-001").unwrap().entry.file_path;
        store.delete("dec-001").unwrap();

        assert!(matches!(
            store.read("dec-001").unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(!tmp.path().join(&path).exists());
        // the survivor has no dangling edges, in rows or frontmatter
        let two = store.read("dec-002").unwrap();
        assert!(two.entry.connections.is_empty());
        let two_doc = markdown::parse(
            &std::fs::read_to_string(tmp.path().join(&two.entry.file_path)).unwrap(),
        );
        assert!(two_doc.connections("dec-002").is_empty());

        // repeated delete raises NotFound again
        assert!(matches!(
            store.delete("dec-001").unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn search_returns_and_bumps_access() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store
            .create(decision("Use Bun", "We decided to use Bun as the runtime."))
            .unwrap();
        store
            .create(decision("Database", "We keep SQLite as the index engine."))
            .unwrap();

        let response = store
            .search(&SearchRequest {
                query: "bun runtime".to_string(),
                min_score: Some(0.0),
                ..Default::default()
            })
            .unwrap();
        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].id, "dec-001");

        let entry = store.read("dec-001").unwrap().entry;
        assert_eq!(entry.access_count, 1);
        assert!(entry.last_accessed.is_some());
    }

    #[test]
    fn search_tag_filter_intersects() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store
            .create(CreateInput {
                title: "Claude notes".to_string(),
                entry_type: KnowledgeType::Note,
                content: "agent memory experiments".to_string(),
                tags: vec!["tech/ai/claude".to_string()],
                ..Default::default()
            })
            .unwrap();
        store
            .create(CreateInput {
                title: "SQLite notes".to_string(),
                entry_type: KnowledgeType::Note,
                content: "agent memory experiments".to_string(),
                tags: vec!["tech/data/sqlite".to_string()],
                ..Default::default()
            })
            .unwrap();

        let response = store
            .search(&SearchRequest {
                query: "agent memory".to_string(),
                tags: vec!["tech/ai".to_string()],
                min_score: Some(0.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].id, "note-001");
    }

    #[test]
    fn substantial_update_suggests_connections() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store
            .create(decision(
                "Adopt SQLite",
                "SQLite with FTS5 and vectors is our index layer of choice.",
            ))
            .unwrap();
        let result = store
            .create(decision("Index plan", "Short stub body."))
            .unwrap();

        let update = store
            .update(
                &result.file_path,
                "A considerably longer body describing how the SQLite index layer, \
                 its FTS5 tables and vector rows cooperate with the Markdown tree, \
                 and why rebuildability from files keeps the whole store honest.",
                "expand the plan",
            )
            .unwrap();
        assert!(update.success);
        assert!(update.indexed);
        assert!(update.diff.contains("reason: expand the plan"));
        assert!(!update.suggested_connections.is_empty());
        assert!(update.suggested_connections.iter().all(|s| s.id != "dec-002"));
    }

    #[test]
    fn small_update_suggests_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        let result = store
            .create(decision("Stable", "A body that will barely change over time."))
            .unwrap();

        let update = store
            .update(
                &result.file_path,
                "A body that will barely change over time!!",
                "cosmetics",
            )
            .unwrap();
        assert!(update.suggested_connections.is_empty());
    }

    #[test]
    fn read_by_path_rejects_escapes() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        assert!(matches!(
            store.read_by_path("../etc/passwd").unwrap_err(),
            StoreError::PathTraversal(_)
        ));
    }

    #[test]
    fn version_history_records_writes() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store.create(decision("One", "first")).unwrap();
        store.create(decision("Two", "second")).unwrap();

        let history = store.history(10).unwrap();
        assert!(history.len() >= 2);
        assert!(history.iter().any(|c| c.message.starts_with("create dec-001")));
    }
}

//! # Engram Core
//!
//! Local-first, file-backed knowledge memory engine for AI agents.
//!
//! Durable state is a directory tree of Markdown files with YAML
//! frontmatter - human-readable and git-friendly. A SQLite index derived
//! from those files provides:
//!
//! - **Hybrid search**: FTS5/BM25 keyword candidates fused with HNSW
//!   vector neighbours via weighted reciprocal ranks plus a recency boost
//! - **Knowledge graph**: typed bidirectional connections with inverse
//!   semantics, hierarchical namespace tags, cascading removal
//! - **Version history**: an embedded Git repository over the file tree
//!   for history, diff and read-at-revision
//!
//! Files are ground truth. The index can always be rebuilt by scanning the
//! tree and re-embedding, which is also how interrupted writes reconcile.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use engram_core::{CreateInput, KnowledgeStore, KnowledgeType, SearchRequest, StoreConfig};
//!
//! let store = KnowledgeStore::open(StoreConfig::default())?;
//!
//! store.create(CreateInput {
//!     title: "Use Bun".into(),
//!     entry_type: KnowledgeType::Decision,
//!     content: "We decided to use Bun as the runtime.".into(),
//!     ..Default::default()
//! })?;
//!
//! let results = store.search(&SearchRequest {
//!     query: "runtime decision".into(),
//!     ..Default::default()
//! })?;
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings`: local model inference via fastembed; without it the
//!   deterministic hashing embedder keeps hybrid search functional

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod consolidate;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod ids;
pub mod index;
pub mod markdown;
pub mod orchestrator;
pub mod paths;
pub mod search;
pub mod store;
pub mod types;
pub mod versioning;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use error::{Result, StoreError};

pub use types::{
    Connection, ConnectionInput, ConnectionType, CreateInput, CreateResult, DecayCandidate,
    Direction, KnowledgeEntry, KnowledgeType, MatchType, RebuildReport, SearchHit, SearchRequest,
    SearchResponse, StoreSource, StoreStats, SuggestedConnection, TraverseHit, UpdateResult,
};

pub use store::{DecayConfig, EntryDocument, KnowledgeStore, StoreConfig};

pub use orchestrator::{ConsolidationReport, Orchestrator};

pub use consolidate::{
    Category, ConsolidationPlan, Consolidator, ExistingEntry, PlanAction, SessionNote,
};

pub use search::{fuse, HybridConfig, HybridSearcher, RankedEntry, VectorIndex};

pub use graph::{normalize_tag, GraphStore, MAX_TRAVERSE_DEPTH};

pub use index::SqliteIndex;

pub use markdown::Document;

pub use embeddings::{
    cosine_similarity, Embedder, EmbeddingError, HashingEmbedder, DEFAULT_DIMENSIONS,
};

#[cfg(feature = "embeddings")]
pub use embeddings::FastembedEmbedder;

pub use versioning::{CommitInfo, VersionStore};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Connection, ConnectionInput, ConnectionType, CreateInput, CreateResult, Direction,
        EntryDocument, KnowledgeEntry, KnowledgeStore, KnowledgeType, Orchestrator, Result,
        SearchRequest, SearchResponse, SessionNote, StoreConfig, StoreError, TraverseHit,
    };

    pub use crate::{Embedder, HashingEmbedder};

    #[cfg(feature = "embeddings")]
    pub use crate::FastembedEmbedder;
}

//! Entry, connection and search types
//!
//! An entry is a tagged record: its type is data, not inheritance. The
//! directory an entry lands in, its id prefix, and connection inverses are
//! all table lookups on these enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ============================================================================
// KNOWLEDGE TYPES
// ============================================================================

/// The seven knowledge types an entry can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeType {
    /// A recorded decision with rationale
    Decision,
    /// Something that went wrong and how it was handled
    Incident,
    /// A person, system or thing referenced by other entries
    Entity,
    /// A reusable approach or rule of thumb
    Pattern,
    /// A multi-step procedure
    Workflow,
    /// Free-form knowledge that fits nothing else
    #[default]
    Note,
    /// A work-session log
    Session,
}

impl KnowledgeType {
    /// All types, in stable order
    pub const ALL: [KnowledgeType; 7] = [
        KnowledgeType::Decision,
        KnowledgeType::Incident,
        KnowledgeType::Entity,
        KnowledgeType::Pattern,
        KnowledgeType::Workflow,
        KnowledgeType::Note,
        KnowledgeType::Session,
    ];

    /// String representation stored in frontmatter and SQLite
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeType::Decision => "decision",
            KnowledgeType::Incident => "incident",
            KnowledgeType::Entity => "entity",
            KnowledgeType::Pattern => "pattern",
            KnowledgeType::Workflow => "workflow",
            KnowledgeType::Note => "note",
            KnowledgeType::Session => "session",
        }
    }

    /// Sequential-id prefix (`dec-001`, `wf-002`, ...)
    pub fn id_prefix(&self) -> &'static str {
        match self {
            KnowledgeType::Decision => "dec",
            KnowledgeType::Incident => "inc",
            KnowledgeType::Entity => "entity",
            KnowledgeType::Pattern => "pat",
            KnowledgeType::Workflow => "wf",
            KnowledgeType::Note => "note",
            KnowledgeType::Session => "session",
        }
    }

    /// Parse from the stored string form
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s.trim().to_lowercase().as_str() {
            "decision" => Ok(KnowledgeType::Decision),
            "incident" => Ok(KnowledgeType::Incident),
            "entity" => Ok(KnowledgeType::Entity),
            "pattern" => Ok(KnowledgeType::Pattern),
            "workflow" => Ok(KnowledgeType::Workflow),
            "note" => Ok(KnowledgeType::Note),
            "session" => Ok(KnowledgeType::Session),
            other => Err(StoreError::InvalidType(other.to_string())),
        }
    }
}

impl std::fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONNECTION TYPES
// ============================================================================

/// Typed edge labels. The first five are user-facing; the last three only
/// appear as the materialised inverse of a forward edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Symmetric association
    Related,
    /// Source extends or refines the target
    BuildsOn,
    /// Source disagrees with the target
    Contradicts,
    /// Source is a component of the target
    PartOf,
    /// Source replaces the target
    Supersedes,
    /// Inverse of `builds_on`
    ExtendedBy,
    /// Inverse of `part_of`
    Contains,
    /// Inverse of `supersedes`
    SupersededBy,
}

impl ConnectionType {
    /// String representation stored in frontmatter and SQLite
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Related => "related",
            ConnectionType::BuildsOn => "builds_on",
            ConnectionType::Contradicts => "contradicts",
            ConnectionType::PartOf => "part_of",
            ConnectionType::Supersedes => "supersedes",
            ConnectionType::ExtendedBy => "extended_by",
            ConnectionType::Contains => "contains",
            ConnectionType::SupersededBy => "superseded_by",
        }
    }

    /// The label written on the mirrored physical row
    pub fn inverse(&self) -> ConnectionType {
        match self {
            ConnectionType::Related => ConnectionType::Related,
            ConnectionType::Contradicts => ConnectionType::Contradicts,
            ConnectionType::BuildsOn => ConnectionType::ExtendedBy,
            ConnectionType::ExtendedBy => ConnectionType::BuildsOn,
            ConnectionType::PartOf => ConnectionType::Contains,
            ConnectionType::Contains => ConnectionType::PartOf,
            ConnectionType::Supersedes => ConnectionType::SupersededBy,
            ConnectionType::SupersededBy => ConnectionType::Supersedes,
        }
    }

    /// Supersession rows record archival lineage and are excluded from
    /// active-connection counts used by decay decisions.
    pub fn is_archival(&self) -> bool {
        matches!(
            self,
            ConnectionType::Supersedes | ConnectionType::SupersededBy
        )
    }

    /// Parse from the stored string form
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s.trim().to_lowercase().as_str() {
            "related" => Ok(ConnectionType::Related),
            "builds_on" => Ok(ConnectionType::BuildsOn),
            "contradicts" => Ok(ConnectionType::Contradicts),
            "part_of" => Ok(ConnectionType::PartOf),
            "supersedes" => Ok(ConnectionType::Supersedes),
            "extended_by" => Ok(ConnectionType::ExtendedBy),
            "contains" => Ok(ConnectionType::Contains),
            "superseded_by" => Ok(ConnectionType::SupersededBy),
            other => Err(StoreError::InvalidType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONNECTIONS
// ============================================================================

/// A directed typed edge between two entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Source entry id
    pub source: String,
    /// Target entry id
    pub target: String,
    /// Edge label
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Optional free-text annotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// When the edge was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Connection request as supplied by a caller (source implied)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInput {
    /// Target entry id
    pub target: String,
    /// Edge label
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Optional free-text annotation
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub note: Option<String>,
}

/// Edge direction filter for graph queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges where the entry is the source
    Outgoing,
    /// Edges where the entry is the target
    Incoming,
    /// Union of both
    #[default]
    Both,
}

// ============================================================================
// ENTRIES
// ============================================================================

/// A knowledge entry as seen through the index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntry {
    /// Immutable identity
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Knowledge type
    #[serde(rename = "type")]
    pub entry_type: KnowledgeType,
    /// Path of the backing Markdown file, relative to the base directory
    pub file_path: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last-modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Last time the entry was returned from a search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// How many times the entry was returned from a search
    pub access_count: i64,
    /// Normalised hierarchical tags, insertion-ordered
    pub tags: Vec<String>,
    /// Outgoing typed edges
    pub connections: Vec<Connection>,
}

/// Input for creating an entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInput {
    /// Entry title
    pub title: String,
    /// Knowledge type
    #[serde(rename = "type")]
    pub entry_type: KnowledgeType,
    /// Body text
    pub content: String,
    /// Tags (normalised on insert)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Connections to create together with the entry
    #[serde(default)]
    pub connections: Vec<ConnectionInput>,
    /// Optional provenance marker
    #[serde(default)]
    pub source: Option<String>,
}

/// A search-ranked candidate connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedConnection {
    /// Candidate entry id
    pub id: String,
    /// Candidate title
    pub title: String,
    /// Hybrid score of the candidate against the new body
    pub relevance: f64,
}

/// Result of `create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    /// Allocated id
    pub id: String,
    /// Relative path of the written file
    pub file_path: String,
    /// Entries the new body is close to
    pub suggested_connections: Vec<SuggestedConnection>,
    /// Tags already present in the store (for tag reuse by callers)
    pub existing_tags: Vec<String>,
}

/// Result of `update`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Whether the file and index were rewritten
    pub success: bool,
    /// Unified summary of the change; includes the caller-supplied reason
    pub diff: String,
    /// Whether FTS and vector rows were refreshed
    pub indexed: bool,
    /// Connection suggestions when the body changed substantially
    pub suggested_connections: Vec<SuggestedConnection>,
}

// ============================================================================
// SEARCH & TRAVERSAL
// ============================================================================

/// Which retrieval lists a result appeared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Lexical match only
    Fts,
    /// Vector match only (also set for the vector-only fallback)
    Vector,
    /// Present in both lists
    Hybrid,
}

/// Which store of a dual-store orchestrator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreSource {
    /// The project-local store (the default write target)
    #[default]
    Project,
    /// The shared global store
    Global,
}

/// A single enriched search result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Entry id
    pub id: String,
    /// Entry title
    pub title: String,
    /// Full body text
    pub content: String,
    /// Entry tags
    pub tags: Vec<String>,
    /// Outgoing connections
    pub connections: Vec<Connection>,
    /// Fused hybrid score
    pub score: f64,
    /// Which lists the entry appeared in
    pub match_type: MatchType,
    /// Which store produced the hit
    pub store_source: StoreSource,
}

/// Search response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Ranked, enriched results
    pub results: Vec<SearchHit>,
    /// Number of results before limit truncation
    pub total_found: usize,
}

/// Search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Restrict to entries carrying any of these tags (hierarchical prefix match)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Restrict to entries one edge away from this id
    #[serde(default)]
    pub connected_to: Option<String>,
    /// Maximum results
    #[serde(default)]
    pub limit: Option<usize>,
    /// Minimum fused score
    #[serde(default)]
    pub min_score: Option<f64>,
}

/// A node discovered by graph traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraverseHit {
    /// Discovered entry id
    pub id: String,
    /// Entry title
    pub title: String,
    /// Entry type
    #[serde(rename = "type")]
    pub entry_type: KnowledgeType,
    /// Label of the edge on which the node was first discovered
    pub connection_type: ConnectionType,
    /// Shortest discovered distance from the start node
    pub distance: u32,
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Aggregate store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Total entries
    pub total_entries: usize,
    /// Entry counts keyed by type string
    pub entries_by_type: std::collections::BTreeMap<String, usize>,
    /// Distinct tag bindings
    pub tag_bindings: usize,
    /// Physical connection rows
    pub connection_rows: usize,
    /// Entries with an indexed vector
    pub entries_with_vectors: usize,
    /// Oldest entry creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Newest entry creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Result of an index rebuild from the file tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    /// Markdown files discovered under the base directory
    pub files_seen: usize,
    /// Files successfully parsed and indexed
    pub indexed: usize,
    /// Files skipped (unparseable frontmatter, unknown type)
    pub skipped: usize,
}

/// A stale entry proposed for archival
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayCandidate {
    /// Entry id
    pub id: String,
    /// Entry title
    pub title: String,
    /// Entry type
    #[serde(rename = "type")]
    pub entry_type: KnowledgeType,
    /// Days since the last update
    pub age_days: i64,
    /// Search hits over the entry's lifetime
    pub access_count: i64,
    /// Connection rows excluding supersession lineage
    pub active_connections: usize,
    /// Staleness score in [0, 1]; higher means a stronger archive candidate
    pub staleness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_type_round_trip() {
        for ty in KnowledgeType::ALL {
            assert_eq!(KnowledgeType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(KnowledgeType::parse("poem").is_err());
    }

    #[test]
    fn inverse_map_is_involutive() {
        use ConnectionType::*;
        for ty in [
            Related,
            BuildsOn,
            Contradicts,
            PartOf,
            Supersedes,
            ExtendedBy,
            Contains,
            SupersededBy,
        ] {
            assert_eq!(ty.inverse().inverse(), ty);
        }
        assert_eq!(Related.inverse(), Related);
        assert_eq!(Contradicts.inverse(), Contradicts);
        assert_eq!(BuildsOn.inverse(), ExtendedBy);
        assert_eq!(PartOf.inverse(), Contains);
        assert_eq!(Supersedes.inverse(), SupersededBy);
    }

    #[test]
    fn archival_edges() {
        assert!(ConnectionType::Supersedes.is_archival());
        assert!(ConnectionType::SupersededBy.is_archival());
        assert!(!ConnectionType::Related.is_archival());
        assert!(!ConnectionType::Contains.is_archival());
    }
}

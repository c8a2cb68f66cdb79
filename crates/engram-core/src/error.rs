//! Error taxonomy for the store
//!
//! Semantic error categories carried across every layer. Errors always hold
//! the offending identifier verbatim so callers can report it unchanged.

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unknown entry id or file path
    #[error("Not found: {0}")]
    NotFound(String),
    /// Unknown knowledge type
    #[error("Invalid knowledge type: {0}")]
    InvalidType(String),
    /// A user-supplied path escapes the base directory
    #[error("Path escapes base directory: {0}")]
    PathTraversal(String),
    /// Embedding width differs from the schema width fixed at open time
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension the database was opened with
        expected: usize,
        /// Dimension of the offending vector
        got: usize,
    },
    /// The FTS5 tokenizer rejected the query text
    #[error("FTS query rejected: {0}")]
    FtsSyntax(String),
    /// Schema or foreign-key integrity violation; callers should rebuild
    #[error("Index corruption: {0}")]
    IndexCorruption(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Version store error
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),
    /// Initialization / configuration error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

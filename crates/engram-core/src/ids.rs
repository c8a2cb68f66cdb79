//! Sequential typed identifiers
//!
//! Ids look like `dec-001`, `wf-012`, `entity-104`. Allocation takes the
//! maximum numeric suffix among existing ids of the requested type and adds
//! one - never a row count, so gaps left by deletions are tolerated and the
//! sequence stays monotonic for the lifetime of the store.
//!
//! Allocation itself is non-transactional. The coordinator holds its
//! store-wide write lock across allocate-and-insert so concurrent tasks
//! cannot race the same id.

use crate::types::KnowledgeType;

/// Zero-pad width for the numeric suffix
const SUFFIX_WIDTH: usize = 3;

/// Numeric suffix of `id` when it belongs to `ty`'s prefix, e.g.
/// `suffix_of("dec-007", Decision) == Some(7)`.
pub fn suffix_of(id: &str, ty: KnowledgeType) -> Option<u64> {
    let rest = id.strip_prefix(ty.id_prefix())?.strip_prefix('-')?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Next id for `ty` given the ids already present in the store. Ids of
/// other types (and legacy UUID ids) are ignored.
pub fn next_id<'a>(existing: impl IntoIterator<Item = &'a str>, ty: KnowledgeType) -> String {
    let max = existing
        .into_iter()
        .filter_map(|id| suffix_of(id, ty))
        .max()
        .unwrap_or(0);
    format_id(ty, max + 1)
}

/// Render `{prefix}-{n}` with the canonical zero padding
pub fn format_id(ty: KnowledgeType, n: u64) -> String {
    format!("{}-{:0width$}", ty.id_prefix(), n, width = SUFFIX_WIDTH)
}

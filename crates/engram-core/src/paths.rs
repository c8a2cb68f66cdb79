//! Path policy
//!
//! Maps knowledge types to their directory under the base dir, renders file
//! names from id + title, and guards every user-supplied path against
//! escaping the base directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::types::KnowledgeType;

/// Maximum slug length in characters
const MAX_SLUG_LEN: usize = 50;

/// Directory (relative to the base dir) an entry of `ty` lives in
pub fn directory_for(ty: KnowledgeType) -> &'static str {
    match ty {
        KnowledgeType::Decision => "semantic/decisions",
        KnowledgeType::Entity => "semantic/entities",
        KnowledgeType::Note => "semantic/notes",
        KnowledgeType::Incident => "episodic/incidents",
        KnowledgeType::Session => "episodic/sessions",
        KnowledgeType::Pattern => "procedural/patterns",
        KnowledgeType::Workflow => "procedural/workflows",
    }
}

/// Relative file path for an entry: `<dir>/<id>-<slug>.md`
pub fn relative_path(ty: KnowledgeType, id: &str, title: &str) -> String {
    let slug = slug(title);
    if slug.is_empty() {
        format!("{}/{}.md", directory_for(ty), id)
    } else {
        format!("{}/{}-{}.md", directory_for(ty), id, slug)
    }
}

/// Lowercase ASCII slug of a title. German umlauts are expanded, everything
/// non-alphanumeric collapses to a single `-`, and the result is trimmed
/// and capped at 50 characters.
pub fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true; // suppress a leading dash

    for ch in title.chars() {
        let mapped: &str = match ch {
            'ä' | 'Ä' => "ae",
            'ö' | 'Ö' => "oe",
            'ü' | 'Ü' => "ue",
            'ß' => "ss",
            c if c.is_ascii_alphanumeric() => {
                out.extend(c.to_lowercase());
                last_dash = false;
                continue;
            }
            _ => {
                if !last_dash {
                    out.push('-');
                    last_dash = true;
                }
                continue;
            }
        };
        out.push_str(mapped);
        last_dash = false;
    }

    out.truncate(MAX_SLUG_LEN);
    out.trim_matches('-').to_string()
}

/// Resolve a user-supplied path against `base` and reject it when the
/// normalised result escapes `base`. `base` must already be canonical
/// (the store canonicalises it at open).
pub fn resolve_under(base: &Path, user_path: &str) -> Result<PathBuf> {
    let raw = Path::new(user_path);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base.join(raw)
    };

    let normalized = lexical_normalize(&joined)
        .ok_or_else(|| StoreError::PathTraversal(user_path.to_string()))?;

    if !normalized.starts_with(base) {
        return Err(StoreError::PathTraversal(user_path.to_string()));
    }
    Ok(normalized)
}

/// Collapse `.` and `..` components without touching the filesystem.
/// Returns `None` when `..` would climb past the root.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_table() {
        assert_eq!(directory_for(KnowledgeType::Decision), "semantic/decisions");
        assert_eq!(directory_for(KnowledgeType::Incident), "episodic/incidents");
        assert_eq!(directory_for(KnowledgeType::Workflow), "procedural/workflows");
    }

    #[test]
    fn slug_basics() {
        assert_eq!(slug("Use Bun"), "use-bun");
        assert_eq!(slug("  Spaces   and---dashes "), "spaces-and-dashes");
        assert_eq!(slug("C++ & Rust!"), "c-rust");
    }

    #[test]
    fn slug_umlauts() {
        assert_eq!(slug("Größenänderung prüfen"), "groessenaenderung-pruefen");
        assert_eq!(slug("Übermaß"), "uebermass");
    }

    #[test]
    fn slug_caps_at_fifty() {
        let long = "a".repeat(80);
        assert_eq!(slug(&long).len(), 50);
        // a dash landing on the cut is trimmed
        let tricky = format!("{} {}", "b".repeat(49), "tail");
        assert!(!slug(&tricky).ends_with('-'));
    }

    #[test]
    fn relative_path_shape() {
        assert_eq!(
            relative_path(KnowledgeType::Decision, "dec-001", "Use Bun"),
            "semantic/decisions/dec-001-use-bun.md"
        );
        // empty slug falls back to the bare id
        assert_eq!(
            relative_path(KnowledgeType::Note, "note-002", "!!!"),
            "semantic/notes/note-002.md"
        );
    }

    #[test]
    fn traversal_rejected() {
        let base = Path::new("/srv/memory");
        assert!(matches!(
            resolve_under(base, "../etc/passwd"),
            Err(StoreError::PathTraversal(_))
        ));
        assert!(matches!(
            resolve_under(base, "semantic/../../etc/shadow"),
            Err(StoreError::PathTraversal(_))
        ));
        assert!(matches!(
            resolve_under(base, "/etc/passwd"),
            Err(StoreError::PathTraversal(_))
        ));
    }

    #[test]
    fn inside_paths_resolve() {
        let base = Path::new("/srv/memory");
        let p = resolve_under(base, "semantic/decisions/dec-001-use-bun.md").unwrap();
        assert_eq!(p, base.join("semantic/decisions/dec-001-use-bun.md"));
        // dot segments that stay inside are fine
        let q = resolve_under(base, "semantic/./notes/../decisions/dec-002.md").unwrap();
        assert_eq!(q, base.join("semantic/decisions/dec-002.md"));
    }
}

//! Index rebuild
//!
//! Regenerates every derived row from the Markdown tree. Files are ground
//! truth: the SQLite index, FTS rows, graph rows and vectors are wiped and
//! repopulated from what is actually on disk. Rebuild is idempotent and is
//! the reconciliation path for orphan files left by interrupted writes.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;
use crate::graph::GraphStore;
use crate::index::{EntryRecord, SqliteIndex};
use crate::markdown;
use crate::types::{KnowledgeType, RebuildReport};

use super::KnowledgeStore;

/// One parsed file, ready for indexing
struct ScannedFile {
    rel_path: String,
    doc: markdown::Document,
    id: String,
    entry_type: KnowledgeType,
}

pub(super) fn rebuild(store: &KnowledgeStore) -> Result<RebuildReport> {
    let mut report = RebuildReport::default();

    let mut files = Vec::new();
    collect_markdown_files(store.base_dir(), store.base_dir(), &mut files)?;
    report.files_seen = files.len();

    let mut scanned = Vec::new();
    for abs in files {
        let rel = abs
            .strip_prefix(store.base_dir())
            .unwrap_or(&abs)
            .to_string_lossy()
            .replace('\\', "/");

        let Ok(text) = std::fs::read_to_string(&abs) else {
            report.skipped += 1;
            continue;
        };
        let doc = markdown::parse(&text);

        let (Some(id), Some(ty)) = (doc.id(), doc.entry_type()) else {
            tracing::warn!(path = rel, "skipping file without id/type frontmatter");
            report.skipped += 1;
            continue;
        };
        let Ok(entry_type) = KnowledgeType::parse(ty) else {
            tracing::warn!(path = rel, ty, "skipping file with unknown type");
            report.skipped += 1;
            continue;
        };

        scanned.push(ScannedFile {
            rel_path: rel,
            id: id.to_string(),
            entry_type,
            doc,
        });
    }

    store.index().wipe()?;

    // pass 1: entries, knowledge rows, tags
    {
        let mut writer = store.index().writer()?;
        let txn = writer.transaction()?;
        for file in &scanned {
            let now = Utc::now();
            let rec = EntryRecord {
                id: file.id.clone(),
                title: file.doc.title().unwrap_or("").to_string(),
                entry_type: file.entry_type,
                file_path: file.rel_path.clone(),
                content: file.doc.body.clone(),
                importance: 0.5,
                created_at: file.doc.created().unwrap_or(now),
                updated_at: file.doc.updated().unwrap_or(now),
                last_accessed: None,
                access_count: 0,
                source: None,
            };
            let tags = file.doc.tags();
            SqliteIndex::write_entry_rows(&txn, &rec, &tags)?;
            GraphStore::insert_tags(&txn, &file.id, &tags)?;
        }
        txn.commit()?;
    }

    // pass 2: connections, after every endpoint row exists. Each file lists
    // its outgoing edges; the pair upsert makes mirrored listings converge.
    {
        let mut writer = store.index().writer()?;
        let txn = writer.transaction()?;
        for file in &scanned {
            for edge in file.doc.connections(&file.id) {
                let target_known = scanned.iter().any(|f| f.id == edge.target);
                if !target_known {
                    tracing::warn!(
                        source = file.id,
                        target = edge.target,
                        "dropping edge to missing entry during rebuild"
                    );
                    continue;
                }
                GraphStore::insert_connection_pair(
                    &txn,
                    &file.id,
                    &edge.target,
                    edge.connection_type,
                    edge.note.as_deref(),
                    edge.created_at.unwrap_or_else(Utc::now),
                )?;
            }
        }
        txn.commit()?;
    }

    // pass 3: re-embed and rebuild the ANN index
    let mut vectors = crate::search::VectorIndex::new(store.index().dimensions())?;
    for file in &scanned {
        match store.embedder().embed(&file.doc.body) {
            Ok(vector) => {
                let writer = store.index().writer()?;
                store.index().put_vector(&writer, &file.id, &vector)?;
                drop(writer);
                vectors.add(&file.id, &vector)?;
            }
            Err(e) => {
                tracing::warn!(id = file.id, "embedding failed during rebuild: {e}");
            }
        }
        report.indexed += 1;
    }
    *store.lock_vectors()? = vectors;

    tracing::info!(
        files = report.files_seen,
        indexed = report.indexed,
        skipped = report.skipped,
        "index rebuilt from file tree"
    );
    Ok(report)
}

/// Recursively collect `.md` files, skipping the index dir and the
/// embedded repository.
fn collect_markdown_files(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if path.is_dir() {
            if name == ".git" || name == ".index" {
                continue;
            }
            collect_markdown_files(base, &path, out)?;
        } else if path.extension().is_some_and(|e| e == "md") {
            out.push(path);
        }
    }
    Ok(())
}

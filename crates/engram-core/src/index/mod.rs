//! SQLite index
//!
//! The derived-state half of the store: a single-process SQLite database
//! holding the search face (`entries` + FTS5 + vectors) and the graph face
//! (`knowledge` + tags + connections) of the same Markdown files. Files are
//! ground truth; everything in here can be rebuilt from them.
//!
//! Connection handling follows a writer/reader split with interior
//! mutability: all methods take `&self`, making the index `Send + Sync`.
//! Writes serialise on the writer mutex so at most one transaction is in
//! flight; reads go through the reader connection and observe the last
//! committed snapshot.

pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, StoreError};
use crate::types::{Connection as Edge, ConnectionType, KnowledgeEntry, KnowledgeType, StoreStats};

/// Meta key pinning the vector width to the database
const META_DIMENSIONS: &str = "embedding_dimensions";

// ============================================================================
// RECORDS
// ============================================================================

/// Full row set for one entry, as written into `entries` and `knowledge`
#[derive(Debug, Clone)]
pub struct EntryRecord {
    /// Entry id
    pub id: String,
    /// Entry title
    pub title: String,
    /// Knowledge type
    pub entry_type: KnowledgeType,
    /// Path relative to the base directory
    pub file_path: String,
    /// Body text (indexed by FTS)
    pub content: String,
    /// Importance weight in [0, 1]
    pub importance: f64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last-modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Last search access
    pub last_accessed: Option<DateTime<Utc>>,
    /// Search access count
    pub access_count: i64,
    /// Provenance marker
    pub source: Option<String>,
}

// ============================================================================
// INDEX
// ============================================================================

/// SQLite-backed index over the entry files
#[derive(Debug)]
pub struct SqliteIndex {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    dimensions: usize,
    path: PathBuf,
}

impl SqliteIndex {
    /// Open (or create) the database at `path` with the given vector width.
    /// A database previously opened with a different width is refused.
    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        Self::configure_connection(&writer)?;
        schema::apply_migrations(&writer)?;

        // pin the vector width on first open, verify on every later one
        let stored: Option<String> = writer
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                [META_DIMENSIONS],
                |row| row.get(0),
            )
            .optional()?;
        match stored.and_then(|s| s.parse::<usize>().ok()) {
            Some(existing) if existing != dimensions => {
                return Err(StoreError::DimensionMismatch {
                    expected: existing,
                    got: dimensions,
                });
            }
            Some(_) => {}
            None => {
                writer.execute(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                    params![META_DIMENSIONS, dimensions.to_string()],
                )?;
            }
        }

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            dimensions,
            path: path.to_path_buf(),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Vector width the database was opened with
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("writer lock poisoned".to_string()))
    }

    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("reader lock poisoned".to_string()))
    }

    // ========================================================================
    // ROW WRITES (callable inside a caller-held transaction)
    // ========================================================================

    /// Insert or refresh both faces of an entry. Uses explicit
    /// update-then-insert so the FTS triggers fire correctly (REPLACE would
    /// bypass the delete trigger without recursive_triggers).
    pub fn write_entry_rows(
        conn: &Connection,
        rec: &EntryRecord,
        tags: &[String],
    ) -> Result<()> {
        let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());
        let created = rec.created_at.to_rfc3339();
        let updated = rec.updated_at.to_rfc3339();
        let accessed = rec.last_accessed.map(|t| t.to_rfc3339());

        let changed = conn.execute(
            "UPDATE entries SET
                file_path = ?2, content = ?3, type = ?4, importance = ?5,
                created_at = ?6, updated_at = ?7, last_accessed = ?8,
                title = ?9, tags_json = ?10, source = ?11
             WHERE id = ?1",
            params![
                rec.id,
                rec.file_path,
                rec.content,
                rec.entry_type.as_str(),
                rec.importance,
                created,
                updated,
                accessed,
                rec.title,
                tags_json,
                rec.source,
            ],
        )?;
        if changed == 0 {
            conn.execute(
                "INSERT INTO entries (
                    id, file_path, content, type, importance,
                    created_at, updated_at, last_accessed, title, tags_json, source
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    rec.id,
                    rec.file_path,
                    rec.content,
                    rec.entry_type.as_str(),
                    rec.importance,
                    created,
                    updated,
                    accessed,
                    rec.title,
                    tags_json,
                    rec.source,
                ],
            )?;
        }

        conn.execute(
            "INSERT INTO knowledge (
                id, title, type, file_path, created_at, updated_at,
                last_accessed, access_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                type = excluded.type,
                file_path = excluded.file_path,
                updated_at = excluded.updated_at",
            params![
                rec.id,
                rec.title,
                rec.entry_type.as_str(),
                rec.file_path,
                created,
                updated,
                accessed,
                rec.access_count,
            ],
        )?;

        Ok(())
    }

    /// Delete both faces of an entry. Foreign keys cascade the tag rows,
    /// connection rows (either endpoint) and vector row; the FTS trigger
    /// drops the text row.
    pub fn delete_entry_rows(conn: &Connection, id: &str) -> Result<()> {
        conn.execute("DELETE FROM knowledge WHERE id = ?1", [id])?;
        conn.execute("DELETE FROM entries WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Persist a vector for an entry. Refused unless its length matches the
    /// width fixed at open time.
    pub fn put_vector(&self, conn: &Connection, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        conn.execute(
            "INSERT OR REPLACE INTO entries_vec (entry_id, embedding, dimensions)
             VALUES (?1, ?2, ?3)",
            params![id, encode_vector(vector), vector.len() as i64],
        )?;
        Ok(())
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Entry by id, with tags and outgoing connections attached
    pub fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let reader = self.reader()?;
        let entry = reader
            .prepare_cached(
                "SELECT k.id, k.title, k.type, k.file_path, k.created_at,
                        k.updated_at, k.last_accessed, k.access_count
                 FROM knowledge k WHERE k.id = ?1",
            )?
            .query_row([id], Self::row_to_entry)
            .optional()?;

        let Some(mut entry) = entry else {
            return Ok(None);
        };
        entry.tags = self.tags_of(&reader, id)?;
        entry.connections = self.connections_of(&reader, id)?;
        Ok(Some(entry))
    }

    /// Entry by relative file path
    pub fn get_entry_by_path(&self, rel_path: &str) -> Result<Option<KnowledgeEntry>> {
        let id: Option<String> = self
            .reader()?
            .prepare_cached("SELECT id FROM knowledge WHERE file_path = ?1")?
            .query_row([rel_path], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => self.get_entry(&id),
            None => Ok(None),
        }
    }

    /// Body text of an entry
    pub fn get_content(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .reader()?
            .prepare_cached("SELECT content FROM entries WHERE id = ?1")?
            .query_row([id], |row| row.get(0))
            .optional()?)
    }

    /// List entries, optionally narrowed to a type, newest updates first
    pub fn list(&self, ty: Option<KnowledgeType>, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        let reader = self.reader()?;

        let mut entries = match ty {
            Some(ty) => {
                let mut stmt = reader.prepare_cached(
                    "SELECT id, title, type, file_path, created_at, updated_at,
                            last_accessed, access_count
                     FROM knowledge WHERE type = ?1
                     ORDER BY updated_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![ty.as_str(), limit as i64], Self::row_to_entry)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = reader.prepare_cached(
                    "SELECT id, title, type, file_path, created_at, updated_at,
                            last_accessed, access_count
                     FROM knowledge ORDER BY updated_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], Self::row_to_entry)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        for entry in &mut entries {
            entry.tags = self.tags_of(&reader, &entry.id)?;
            entry.connections = self.connections_of(&reader, &entry.id)?;
        }
        Ok(entries)
    }

    /// Ids of every entry of a type (feeds the id allocator)
    pub fn ids_of_type(&self, ty: KnowledgeType) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare_cached("SELECT id FROM knowledge WHERE type = ?1")?;
        let ids = stmt
            .query_map([ty.as_str()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Every distinct tag in the store, sorted
    pub fn all_tags(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare_cached("SELECT DISTINCT tag FROM entry_tags ORDER BY tag")?;
        let tags = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn tags_of(&self, conn: &Connection, id: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare_cached("SELECT tag FROM entry_tags WHERE entry_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn connections_of(&self, conn: &Connection, id: &str) -> Result<Vec<Edge>> {
        let mut stmt = conn.prepare_cached(
            "SELECT source_id, target_id, type, note, created_at
             FROM connections WHERE source_id = ?1
             ORDER BY created_at, target_id",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (source, target, ty, note, created) = row?;
            // unknown edge labels in a hand-edited db are skipped, not fatal
            if let Ok(connection_type) = ConnectionType::parse(&ty) {
                edges.push(Edge {
                    source,
                    target,
                    connection_type,
                    note,
                    created_at: parse_ts(&created),
                });
            }
        }
        Ok(edges)
    }

    // ========================================================================
    // SEARCH SUPPORT
    // ========================================================================

    /// FTS candidates for a query: `(id, -bm25)` best first, `pool` rows.
    /// A query the tokenizer rejects surfaces as [`StoreError::FtsSyntax`].
    pub fn fts_candidates(&self, query: &str, pool: usize) -> Result<Vec<(String, f64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare_cached(
            "SELECT e.id, bm25(entries_fts) AS score
             FROM entries_fts
             JOIN entries e ON e.rowid = entries_fts.rowid
             WHERE entries_fts MATCH ?1
             ORDER BY score
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![query, pool as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        });

        let rows = match rows {
            Ok(rows) => rows,
            Err(rusqlite::Error::SqliteFailure(_, _)) => {
                return Err(StoreError::FtsSyntax(query.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for row in rows {
            match row {
                Ok((id, bm25)) => out.push((id, -bm25)),
                Err(rusqlite::Error::SqliteFailure(_, _)) => {
                    return Err(StoreError::FtsSyntax(query.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    /// Every persisted vector, decoded
    pub fn all_vectors(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare_cached("SELECT entry_id, embedding FROM entries_vec")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            out.push((id, decode_vector(&blob)));
        }
        Ok(out)
    }

    /// `updated_at` per id, for recency scoring; unparseable rows read None
    pub fn updated_map(&self, ids: &[String]) -> Result<HashMap<String, Option<DateTime<Utc>>>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare_cached("SELECT updated_at FROM entries WHERE id = ?1")?;

        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            let ts: Option<String> = stmt.query_row([id], |row| row.get(0)).optional()?;
            out.insert(id.clone(), ts.as_deref().and_then(parse_ts));
        }
        Ok(out)
    }

    /// Record a search access for each returned entry
    pub fn bump_access(&self, ids: &[String], now: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer()?;
        let txn = writer.transaction()?;
        {
            let mut knowledge = txn.prepare_cached(
                "UPDATE knowledge SET access_count = access_count + 1, last_accessed = ?1
                 WHERE id = ?2",
            )?;
            let mut entries = txn.prepare_cached(
                "UPDATE entries SET last_accessed = ?1 WHERE id = ?2",
            )?;
            let ts = now.to_rfc3339();
            for id in ids {
                knowledge.execute(params![ts, id])?;
                entries.execute(params![ts, id])?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Aggregate statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let reader = self.reader()?;

        let mut stats = StoreStats {
            total_entries: reader.query_row("SELECT COUNT(*) FROM knowledge", [], |r| {
                r.get::<_, i64>(0)
            })? as usize,
            tag_bindings: reader.query_row("SELECT COUNT(*) FROM entry_tags", [], |r| {
                r.get::<_, i64>(0)
            })? as usize,
            connection_rows: reader.query_row("SELECT COUNT(*) FROM connections", [], |r| {
                r.get::<_, i64>(0)
            })? as usize,
            entries_with_vectors: reader.query_row(
                "SELECT COUNT(*) FROM entries_vec",
                [],
                |r| r.get::<_, i64>(0),
            )? as usize,
            ..Default::default()
        };

        let mut stmt =
            reader.prepare_cached("SELECT type, COUNT(*) FROM knowledge GROUP BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (ty, count) = row?;
            stats.entries_by_type.insert(ty, count as usize);
        }

        let bounds: Option<(Option<String>, Option<String>)> = reader
            .query_row(
                "SELECT MIN(created_at), MAX(created_at) FROM knowledge",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((oldest, newest)) = bounds {
            stats.oldest_entry = oldest.as_deref().and_then(parse_ts);
            stats.newest_entry = newest.as_deref().and_then(parse_ts);
        }

        Ok(stats)
    }

    /// Verify schema and foreign-key integrity. Violations surface as
    /// [`StoreError::IndexCorruption`]; callers should rebuild.
    pub fn integrity_check(&self) -> Result<()> {
        let reader = self.reader()?;

        let verdict: String =
            reader.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if verdict != "ok" {
            return Err(StoreError::IndexCorruption(verdict));
        }

        let mut stmt = reader.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            let table: String = row.get(0)?;
            return Err(StoreError::IndexCorruption(format!(
                "foreign key violation in {table}"
            )));
        }
        Ok(())
    }

    /// Drop every derived row (entries, graph, vectors). The FTS rows go
    /// with the entry deletes via trigger; rebuild repopulates from files.
    pub fn wipe(&self) -> Result<()> {
        let mut writer = self.writer()?;
        let txn = writer.transaction()?;
        txn.execute("DELETE FROM knowledge", [])?;
        txn.execute("DELETE FROM entries", [])?;
        txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
        let ty: String = row.get(2)?;
        let created: String = row.get(4)?;
        let updated: String = row.get(5)?;
        let accessed: Option<String> = row.get(6)?;

        Ok(KnowledgeEntry {
            id: row.get(0)?,
            title: row.get(1)?,
            entry_type: KnowledgeType::parse(&ty).unwrap_or_default(),
            file_path: row.get(3)?,
            created_at: parse_ts(&created).unwrap_or_else(Utc::now),
            updated_at: parse_ts(&updated).unwrap_or_else(Utc::now),
            last_accessed: accessed.as_deref().and_then(parse_ts),
            access_count: row.get(7)?,
            tags: Vec::new(),
            connections: Vec::new(),
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse a stored timestamp: RFC 3339, or the legacy epoch-millis form
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(millis) = s.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    None
}

/// Little-endian f32 blob encoding for vector rows
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a vector blob written by [`encode_vector`]
pub fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, ty: KnowledgeType, content: &str) -> EntryRecord {
        let now = Utc::now();
        EntryRecord {
            id: id.to_string(),
            title: format!("Title {id}"),
            entry_type: ty,
            file_path: format!("{}/{}.md", crate::paths::directory_for(ty), id),
            content: content.to_string(),
            importance: 0.5,
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            source: None,
        }
    }

    fn open_index(tmp: &TempDir) -> SqliteIndex {
        SqliteIndex::open(&tmp.path().join("search.sqlite"), 8).unwrap()
    }

    fn insert(index: &SqliteIndex, rec: &EntryRecord, tags: &[String]) {
        let mut writer = index.writer().unwrap();
        let txn = writer.transaction().unwrap();
        SqliteIndex::write_entry_rows(&txn, rec, tags).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn write_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);

        insert(
            &index,
            &record("dec-001", KnowledgeType::Decision, "We decided things"),
            &["tech/runtime".to_string()],
        );

        {
            let writer = index.writer().unwrap();
            writer
                .execute(
                    "INSERT INTO entry_tags (entry_id, tag) VALUES ('dec-001', 'tech/runtime')",
                    [],
                )
                .unwrap();
        }

        let entry = index.get_entry("dec-001").unwrap().unwrap();
        assert_eq!(entry.title, "Title dec-001");
        assert_eq!(entry.entry_type, KnowledgeType::Decision);
        assert_eq!(entry.tags, vec!["tech/runtime"]);

        let by_path = index.get_entry_by_path(&entry.file_path).unwrap().unwrap();
        assert_eq!(by_path.id, "dec-001");
    }

    #[test]
    fn fts_matches_content() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);

        insert(
            &index,
            &record("note-001", KnowledgeType::Note, "sqlite write ahead logging"),
            &[],
        );
        insert(
            &index,
            &record("note-002", KnowledgeType::Note, "vector cosine distance"),
            &[],
        );

        let hits = index.fts_candidates("sqlite", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "note-001");
        // score is reported as -bm25, so a match is positive
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn fts_update_reindexes() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);

        let mut rec = record("note-001", KnowledgeType::Note, "original words here");
        insert(&index, &rec, &[]);

        rec.content = "replacement vocabulary instead".to_string();
        insert(&index, &rec, &[]);

        assert!(index.fts_candidates("original", 10).unwrap().is_empty());
        assert_eq!(index.fts_candidates("replacement", 10).unwrap().len(), 1);
    }

    #[test]
    fn fts_syntax_error_is_typed() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);
        insert(&index, &record("note-001", KnowledgeType::Note, "text"), &[]);

        let err = index.fts_candidates("tech/ai AND (", 10).unwrap_err();
        assert!(matches!(err, StoreError::FtsSyntax(_)));
    }

    #[test]
    fn vector_rows_round_trip_and_cascade() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);
        insert(&index, &record("note-001", KnowledgeType::Note, "x"), &[]);

        let vector = vec![0.5f32; 8];
        {
            let writer = index.writer().unwrap();
            index.put_vector(&writer, "note-001", &vector).unwrap();
        }
        let all = index.all_vectors().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, vector);

        // wrong width is refused
        {
            let writer = index.writer().unwrap();
            let err = index.put_vector(&writer, "note-001", &[0.1; 4]).unwrap_err();
            assert!(matches!(
                err,
                StoreError::DimensionMismatch { expected: 8, got: 4 }
            ));
        }

        // deleting the entry takes the vector with it
        {
            let mut writer = index.writer().unwrap();
            let txn = writer.transaction().unwrap();
            SqliteIndex::delete_entry_rows(&txn, "note-001").unwrap();
            txn.commit().unwrap();
        }
        assert!(index.all_vectors().unwrap().is_empty());
    }

    #[test]
    fn dimension_pinning_across_opens() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("search.sqlite");
        drop(SqliteIndex::open(&path, 8).unwrap());

        let err = SqliteIndex::open(&path, 16).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 8, got: 16 }
        ));

        // same width reopens fine
        assert!(SqliteIndex::open(&path, 8).is_ok());
    }

    #[test]
    fn bump_access_tracks_counts() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);
        insert(&index, &record("note-001", KnowledgeType::Note, "x"), &[]);

        index
            .bump_access(&["note-001".to_string()], Utc::now())
            .unwrap();
        index
            .bump_access(&["note-001".to_string()], Utc::now())
            .unwrap();

        let entry = index.get_entry("note-001").unwrap().unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed.is_some());
    }

    #[test]
    fn wipe_clears_all_derived_state() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp);
        insert(&index, &record("note-001", KnowledgeType::Note, "body"), &[]);

        index.wipe().unwrap();
        assert!(index.get_entry("note-001").unwrap().is_none());
        assert!(index.fts_candidates("body", 10).unwrap().is_empty());
        assert_eq!(index.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn vector_blob_codec() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[test]
    fn legacy_millis_timestamps_parse() {
        assert_eq!(
            parse_ts("1700000000000").unwrap().timestamp_millis(),
            1_700_000_000_000
        );
        assert!(parse_ts("2026-01-01T00:00:00+00:00").is_some());
        assert!(parse_ts("not a time").is_none());
    }
}

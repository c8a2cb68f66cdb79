//! Knowledge graph layer
//!
//! Hierarchical namespace tags and typed bidirectional connections over the
//! indexed entries. A logical link is always two physical rows: the forward
//! row with the caller's type and the mirrored row with its inverse label,
//! created and removed in the same transaction. Connection counts therefore
//! count outgoing rows: every logical link touching an id contributes
//! exactly one of those, whichever end it was created from.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as DbConnection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::index::{parse_ts, SqliteIndex};
use crate::types::{Connection, ConnectionType, Direction, KnowledgeType, TraverseHit};

/// Depth cap for traversal; deeper requests are clamped, not rejected
pub const MAX_TRAVERSE_DEPTH: u32 = 2;

// ============================================================================
// TAG NORMALISATION
// ============================================================================

/// Normal form for tags: lowercase, trimmed, trailing `/` stripped,
/// whitespace runs collapsed to `-`.
pub fn normalize_tag(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered.trim_end_matches('/');

    let mut out = String::with_capacity(stripped.len());
    let mut in_space = false;
    for ch in stripped.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('-');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// Graph operations over the shared SQLite index
pub struct GraphStore<'a> {
    index: &'a SqliteIndex,
}

impl<'a> GraphStore<'a> {
    /// Borrow the graph face of an index
    pub fn new(index: &'a SqliteIndex) -> Self {
        Self { index }
    }

    // ========================================================================
    // TAGS
    // ========================================================================

    /// Insert normalised tag bindings for an entry inside a caller-held
    /// transaction. Duplicates and empty tags are ignored. Returns the
    /// normalised tags actually bound, in input order.
    pub fn insert_tags(
        conn: &DbConnection,
        entry_id: &str,
        tags: &[String],
    ) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO entry_tags (entry_id, tag) VALUES (?1, ?2)",
        )?;

        let mut bound = Vec::new();
        for raw in tags {
            let tag = normalize_tag(raw);
            if tag.is_empty() {
                continue;
            }
            stmt.execute(params![entry_id, tag])?;
            if !bound.contains(&tag) {
                bound.push(tag);
            }
        }
        Ok(bound)
    }

    /// Tags bound to an entry
    pub fn tags_of(&self, entry_id: &str) -> Result<Vec<String>> {
        let reader = self.index.reader()?;
        let mut stmt = reader
            .prepare_cached("SELECT tag FROM entry_tags WHERE entry_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map([entry_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Entry ids carrying any of the filter tags. A filter tag matches
    /// exactly or as a hierarchical prefix on path segments: `tech/ai`
    /// matches `tech/ai` and `tech/ai/claude`, never `tech` or `tech/data`.
    pub fn entries_by_tags(&self, tags: &[String]) -> Result<Vec<String>> {
        let reader = self.index.reader()?;
        let mut stmt = reader.prepare_cached(
            "SELECT DISTINCT entry_id FROM entry_tags
             WHERE tag = ?1 OR tag LIKE ?1 || '/%'",
        )?;

        let mut out: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for raw in tags {
            let tag = normalize_tag(raw);
            if tag.is_empty() {
                continue;
            }
            let ids = stmt
                .query_map([&tag], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for id in ids {
                if seen.insert(id.clone()) {
                    out.push(id);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    // ========================================================================
    // CONNECTIONS
    // ========================================================================

    /// Upsert the two physical rows of one logical link inside a
    /// caller-held transaction.
    pub fn insert_connection_pair(
        conn: &DbConnection,
        source: &str,
        target: &str,
        ty: ConnectionType,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO connections (source_id, target_id, type, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id, target_id, type) DO UPDATE SET note = excluded.note",
        )?;
        let ts = now.to_rfc3339();
        stmt.execute(params![source, target, ty.as_str(), note, ts])?;
        stmt.execute(params![target, source, ty.inverse().as_str(), note, ts])?;
        Ok(())
    }

    /// Create a logical link between two existing entries. Both physical
    /// rows land in one transaction; either both exist afterwards or
    /// neither does.
    pub fn connect(
        &self,
        source: &str,
        target: &str,
        ty: ConnectionType,
        note: Option<&str>,
    ) -> Result<()> {
        self.require_entry(source)?;
        self.require_entry(target)?;

        let mut writer = self.index.writer()?;
        let txn = writer.transaction()?;
        Self::insert_connection_pair(&txn, source, target, ty, note, Utc::now())?;
        txn.commit()?;
        Ok(())
    }

    fn require_entry(&self, id: &str) -> Result<()> {
        let exists: Option<i64> = self
            .index
            .reader()?
            .prepare_cached("SELECT 1 FROM knowledge WHERE id = ?1")?
            .query_row([id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Connections of an entry filtered by direction and optional type set
    pub fn connections_of(
        &self,
        id: &str,
        direction: Direction,
        types: Option<&[ConnectionType]>,
    ) -> Result<Vec<Connection>> {
        let reader = self.index.reader()?;
        let mut out = Vec::new();

        if matches!(direction, Direction::Outgoing | Direction::Both) {
            let mut stmt = reader.prepare_cached(
                "SELECT source_id, target_id, type, note, created_at
                 FROM connections WHERE source_id = ?1
                 ORDER BY created_at, target_id, type",
            )?;
            Self::collect_edges(&mut stmt, id, types, &mut out)?;
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            let mut stmt = reader.prepare_cached(
                "SELECT source_id, target_id, type, note, created_at
                 FROM connections WHERE target_id = ?1
                 ORDER BY created_at, source_id, type",
            )?;
            Self::collect_edges(&mut stmt, id, types, &mut out)?;
        }
        Ok(out)
    }

    fn collect_edges(
        stmt: &mut rusqlite::CachedStatement<'_>,
        id: &str,
        types: Option<&[ConnectionType]>,
        out: &mut Vec<Connection>,
    ) -> Result<()> {
        let rows = stmt.query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        for row in rows {
            let (source, target, ty, note, created) = row?;
            let Ok(connection_type) = ConnectionType::parse(&ty) else {
                continue;
            };
            if let Some(filter) = types {
                if !filter.contains(&connection_type) {
                    continue;
                }
            }
            out.push(Connection {
                source,
                target,
                connection_type,
                note,
                created_at: parse_ts(&created),
            });
        }
        Ok(())
    }

    /// Logical links touching an entry (each counted once)
    pub fn connection_count(&self, id: &str) -> Result<usize> {
        let count: i64 = self.index.reader()?.query_row(
            "SELECT COUNT(*) FROM connections WHERE source_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Logical links excluding supersession lineage. Archival edges must
    /// not keep a stale entry alive in decay decisions.
    pub fn active_connection_count(&self, id: &str) -> Result<usize> {
        let count: i64 = self.index.reader()?.query_row(
            "SELECT COUNT(*) FROM connections
             WHERE source_id = ?1 AND type NOT IN ('supersedes', 'superseded_by')",
            [id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Ids one edge away in either direction, self excluded
    pub fn connected_entry_ids(&self, id: &str) -> Result<Vec<String>> {
        let reader = self.index.reader()?;
        let mut stmt = reader.prepare_cached(
            "SELECT target_id FROM connections WHERE source_id = ?1
             UNION
             SELECT source_id FROM connections WHERE target_id = ?1",
        )?;
        let mut ids = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.retain(|other| other != id);
        Ok(ids)
    }

    // ========================================================================
    // TRAVERSAL
    // ========================================================================

    /// Breadth-first walk from `start`, capped at depth 2. Each reachable
    /// node appears once at its shortest distance, labelled with the edge
    /// type on which it was first discovered. The start node itself is not
    /// emitted; cycles are broken by the visited set.
    pub fn traverse(
        &self,
        start: &str,
        direction: Direction,
        depth: u32,
        types: Option<&[ConnectionType]>,
    ) -> Result<Vec<TraverseHit>> {
        self.require_entry(start)?;
        let depth = depth.min(MAX_TRAVERSE_DEPTH);

        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(start.to_string(), 0)]);
        let mut hits: Vec<TraverseHit> = Vec::new();

        while let Some((node, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for edge in self.connections_of(&node, direction, types)? {
                // normalise to the neighbour regardless of row orientation
                let neighbour = if edge.source == node {
                    edge.target.clone()
                } else {
                    edge.source.clone()
                };
                if !visited.insert(neighbour.clone()) {
                    continue;
                }
                if let Some((title, entry_type)) = self.entry_head(&neighbour)? {
                    hits.push(TraverseHit {
                        id: neighbour.clone(),
                        title,
                        entry_type,
                        connection_type: edge.connection_type,
                        distance: dist + 1,
                    });
                }
                queue.push_back((neighbour, dist + 1));
            }
        }
        Ok(hits)
    }

    fn entry_head(&self, id: &str) -> Result<Option<(String, KnowledgeType)>> {
        let row: Option<(String, String)> = self
            .index
            .reader()?
            .prepare_cached("SELECT title, type FROM knowledge WHERE id = ?1")?
            .query_row([id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(row.map(|(title, ty)| (title, KnowledgeType::parse(&ty).unwrap_or_default())))
    }

    // ========================================================================
    // CASCADE
    // ========================================================================

    /// Remove an entry's tag bindings and every connection row touching it,
    /// then the knowledge row itself, inside a caller-held transaction.
    pub fn cascade_delete(conn: &DbConnection, id: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM connections WHERE source_id = ?1 OR target_id = ?1",
            [id],
        )?;
        conn.execute("DELETE FROM entry_tags WHERE entry_id = ?1", [id])?;
        conn.execute("DELETE FROM knowledge WHERE id = ?1", [id])?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EntryRecord;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteIndex) {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("search.sqlite"), 4).unwrap();
        (tmp, index)
    }

    fn seed(index: &SqliteIndex, id: &str, ty: KnowledgeType, tags: &[&str]) {
        let now = Utc::now();
        let rec = EntryRecord {
            id: id.to_string(),
            title: format!("Title {id}"),
            entry_type: ty,
            file_path: format!("{}/{id}.md", crate::paths::directory_for(ty)),
            content: format!("content of {id}"),
            importance: 0.5,
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            source: None,
        };
        let owned: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let mut writer = index.writer().unwrap();
        let txn = writer.transaction().unwrap();
        SqliteIndex::write_entry_rows(&txn, &rec, &owned).unwrap();
        GraphStore::insert_tags(&txn, id, &owned).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn tag_normal_form() {
        assert_eq!(normalize_tag("  Tech/AI/Claude-SDK  "), "tech/ai/claude-sdk");
        assert_eq!(normalize_tag("tech/ai/"), "tech/ai");
        assert_eq!(normalize_tag("machine   learning"), "machine-learning");
        assert_eq!(normalize_tag("/"), "");
    }

    #[test]
    fn hierarchical_tag_filter() {
        let (_tmp, index) = open();
        seed(&index, "note-001", KnowledgeType::Note, &["tech/ai/claude"]);
        seed(&index, "note-002", KnowledgeType::Note, &["tech/ai/openai"]);
        seed(&index, "note-003", KnowledgeType::Note, &["tech/data/sqlite"]);

        let graph = GraphStore::new(&index);

        let hits = graph.entries_by_tags(&["tech/ai".to_string()]).unwrap();
        assert_eq!(hits, ["note-001", "note-002"]);

        let hits = graph.entries_by_tags(&["tech".to_string()]).unwrap();
        assert_eq!(hits, ["note-001", "note-002", "note-003"]);

        let hits = graph.entries_by_tags(&["tech/other".to_string()]).unwrap();
        assert!(hits.is_empty());

        // segment prefix, not character prefix: "tech/a" must not match tech/ai
        let hits = graph.entries_by_tags(&["tech/a".to_string()]).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn connect_materialises_both_rows() {
        let (_tmp, index) = open();
        seed(&index, "dec-001", KnowledgeType::Decision, &[]);
        seed(&index, "pat-001", KnowledgeType::Pattern, &[]);

        let graph = GraphStore::new(&index);
        graph
            .connect("dec-001", "pat-001", ConnectionType::BuildsOn, None)
            .unwrap();

        let fwd = graph
            .connections_of("dec-001", Direction::Outgoing, None)
            .unwrap();
        assert_eq!(fwd.len(), 1);
        assert_eq!(fwd[0].target, "pat-001");
        assert_eq!(fwd[0].connection_type, ConnectionType::BuildsOn);

        let inv = graph
            .connections_of("pat-001", Direction::Outgoing, None)
            .unwrap();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv[0].target, "dec-001");
        assert_eq!(inv[0].connection_type, ConnectionType::ExtendedBy);
    }

    #[test]
    fn connect_unknown_entry_is_not_found() {
        let (_tmp, index) = open();
        seed(&index, "dec-001", KnowledgeType::Decision, &[]);
        let graph = GraphStore::new(&index);

        let err = graph
            .connect("dec-001", "ghost-001", ConnectionType::Related, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "ghost-001"));
        // nothing half-written
        assert_eq!(graph.connection_count("dec-001").unwrap(), 0);
    }

    #[test]
    fn duplicate_connect_is_idempotent() {
        let (_tmp, index) = open();
        seed(&index, "a", KnowledgeType::Note, &[]);
        seed(&index, "b", KnowledgeType::Note, &[]);

        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();
        graph
            .connect("a", "b", ConnectionType::Related, Some("second time"))
            .unwrap();

        assert_eq!(graph.connection_count("a").unwrap(), 1);
        let edges = graph.connections_of("a", Direction::Outgoing, None).unwrap();
        assert_eq!(edges[0].note.as_deref(), Some("second time"));
    }

    #[test]
    fn supersession_excluded_from_active_count() {
        let (_tmp, index) = open();
        seed(&index, "a", KnowledgeType::Decision, &[]);
        seed(&index, "b", KnowledgeType::Decision, &[]);

        let graph = GraphStore::new(&index);
        graph
            .connect("a", "b", ConnectionType::Supersedes, None)
            .unwrap();

        assert_eq!(graph.connection_count("a").unwrap(), 1);
        assert_eq!(graph.active_connection_count("a").unwrap(), 0);
        // the superseded side is archival too
        assert_eq!(graph.connection_count("b").unwrap(), 1);
        assert_eq!(graph.active_connection_count("b").unwrap(), 0);
    }

    #[test]
    fn direction_and_type_filters() {
        let (_tmp, index) = open();
        for id in ["a", "b", "c"] {
            seed(&index, id, KnowledgeType::Note, &[]);
        }
        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();
        graph.connect("c", "a", ConnectionType::BuildsOn, None).unwrap();

        let outgoing = graph.connections_of("a", Direction::Outgoing, None).unwrap();
        assert_eq!(outgoing.len(), 2); // related→b, extended_by→c

        let incoming = graph.connections_of("a", Direction::Incoming, None).unwrap();
        assert_eq!(incoming.len(), 2); // related←b, builds_on←c

        let only_related = graph
            .connections_of("a", Direction::Both, Some(&[ConnectionType::Related]))
            .unwrap();
        assert!(only_related
            .iter()
            .all(|e| e.connection_type == ConnectionType::Related));
        assert_eq!(only_related.len(), 2);
    }

    #[test]
    fn traverse_chain_is_capped_at_two() {
        let (_tmp, index) = open();
        for id in ["a", "b", "c", "d"] {
            seed(&index, id, KnowledgeType::Note, &[]);
        }
        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();
        graph.connect("b", "c", ConnectionType::Related, None).unwrap();
        graph.connect("c", "d", ConnectionType::Related, None).unwrap();

        let hits = graph.traverse("a", Direction::Outgoing, 5, None).unwrap();
        let mut found: Vec<(&str, u32)> =
            hits.iter().map(|h| (h.id.as_str(), h.distance)).collect();
        found.sort();
        assert_eq!(found, [("b", 1), ("c", 2)]);
    }

    #[test]
    fn traverse_reports_first_discovery_edge() {
        let (_tmp, index) = open();
        for id in ["a", "b", "c"] {
            seed(&index, id, KnowledgeType::Note, &[]);
        }
        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();
        graph.connect("c", "a", ConnectionType::BuildsOn, None).unwrap();

        let hits = graph.traverse("a", Direction::Both, 1, None).unwrap();
        assert_eq!(hits.len(), 2);
        let b = hits.iter().find(|h| h.id == "b").unwrap();
        assert_eq!(b.connection_type, ConnectionType::Related);
        assert_eq!(b.distance, 1);
        let c = hits.iter().find(|h| h.id == "c").unwrap();
        assert_eq!(c.connection_type, ConnectionType::ExtendedBy);
        assert_eq!(c.distance, 1);
        // the start node is never emitted
        assert!(hits.iter().all(|h| h.id != "a"));
    }

    #[test]
    fn traverse_breaks_cycles() {
        let (_tmp, index) = open();
        for id in ["a", "b"] {
            seed(&index, id, KnowledgeType::Note, &[]);
        }
        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();
        graph.connect("b", "a", ConnectionType::BuildsOn, None).unwrap();

        let hits = graph.traverse("a", Direction::Both, 2, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn cascade_removes_everything() {
        let (_tmp, index) = open();
        seed(&index, "a", KnowledgeType::Note, &["tech/ai"]);
        seed(&index, "b", KnowledgeType::Note, &[]);
        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();

        {
            let mut writer = index.writer().unwrap();
            let txn = writer.transaction().unwrap();
            GraphStore::cascade_delete(&txn, "a").unwrap();
            SqliteIndex::delete_entry_rows(&txn, "a").unwrap();
            txn.commit().unwrap();
        }

        let graph = GraphStore::new(&index);
        assert!(graph.tags_of("a").unwrap().is_empty());
        assert_eq!(graph.connection_count("b").unwrap(), 0);
        assert!(graph
            .connections_of("b", Direction::Both, None)
            .unwrap()
            .is_empty());
        assert!(index.get_entry("a").unwrap().is_none());
    }

    #[test]
    fn connected_ids_cover_both_directions() {
        let (_tmp, index) = open();
        for id in ["a", "b", "c"] {
            seed(&index, id, KnowledgeType::Note, &[]);
        }
        let graph = GraphStore::new(&index);
        graph.connect("a", "b", ConnectionType::Related, None).unwrap();
        graph.connect("c", "a", ConnectionType::PartOf, None).unwrap();

        let mut ids = graph.connected_entry_ids("a").unwrap();
        ids.sort();
        assert_eq!(ids, ["b", "c"]);
    }
}

//! Markdown codec
//!
//! Parses and serializes the on-disk entry format: an optional YAML
//! frontmatter block fenced by lines consisting exactly of `---`, followed
//! by a free-text body.
//!
//! Parsing never fails. A malformed YAML block degrades to an empty
//! frontmatter with the entire input kept as the body, so a damaged file
//! stays readable and rebuildable.
//!
//! Frontmatter is held as an insertion-ordered [`serde_yaml::Mapping`]:
//! updates rewrite values in place and keep the author's key order.

use chrono::{DateTime, TimeZone, Utc};
use serde_yaml::{Mapping, Value};

use crate::types::{Connection, ConnectionType};

// ============================================================================
// DOCUMENT
// ============================================================================

/// A parsed Markdown document: ordered frontmatter plus body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// YAML frontmatter, insertion-ordered; empty when the file has none
    pub frontmatter: Mapping,
    /// Everything after the closing fence (or the whole file)
    pub body: String,
}

/// Parse a document. Never fails: a missing or malformed frontmatter block
/// yields an empty mapping and the full text as body.
pub fn parse(text: &str) -> Document {
    let Some((yaml, body)) = split_frontmatter(text) else {
        return Document {
            frontmatter: Mapping::new(),
            body: text.to_string(),
        };
    };

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => Document {
            frontmatter: map,
            body: body.to_string(),
        },
        // Scalar or sequence frontmatter is as unusable as a parse error
        _ => Document {
            frontmatter: Mapping::new(),
            body: text.to_string(),
        },
    }
}

/// Serialize a document. Emits `---\n<yaml>\n---\n\n<body>` when the
/// frontmatter is non-empty, the bare body otherwise.
pub fn serialize(doc: &Document) -> String {
    if doc.frontmatter.is_empty() {
        return doc.body.clone();
    }

    // serde_yaml preserves Mapping insertion order and terminates with \n
    let yaml = serde_yaml::to_string(&doc.frontmatter)
        .unwrap_or_else(|_| String::new());

    format!("---\n{yaml}---\n\n{}", doc.body)
}

/// Split off the frontmatter block. Returns `(yaml, body)` when the text
/// opens with a `---` fence line and a closing fence line exists.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let mut body = &rest[offset + line.len()..];
            // One blank separator line belongs to the format, not the body
            body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

// ============================================================================
// TYPED FRONTMATTER VIEW
// ============================================================================

impl Document {
    /// Build the canonical frontmatter for a freshly created entry
    pub fn new_entry(
        id: &str,
        title: &str,
        entry_type: &str,
        tags: &[String],
        created: DateTime<Utc>,
        body: &str,
    ) -> Self {
        let mut map = Mapping::new();
        map.insert(Value::from("id"), Value::from(id));
        map.insert(Value::from("title"), Value::from(title));
        map.insert(Value::from("type"), Value::from(entry_type));
        map.insert(
            Value::from("tags"),
            Value::Sequence(tags.iter().map(|t| Value::from(t.as_str())).collect()),
        );
        map.insert(Value::from("created"), Value::from(created.to_rfc3339()));
        map.insert(Value::from("updated"), Value::from(created.to_rfc3339()));
        map.insert(Value::from("connections"), Value::Sequence(Vec::new()));

        Document {
            frontmatter: map,
            body: body.to_string(),
        }
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.frontmatter.get(&Value::from(key))?.as_str()
    }

    /// Entry id, if present (sequential or legacy UUID form)
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    /// Entry title
    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    /// Knowledge type string
    pub fn entry_type(&self) -> Option<&str> {
        self.get_str("type")
    }

    /// Tag list; missing or malformed keys read as empty
    pub fn tags(&self) -> Vec<String> {
        match self.frontmatter.get(&Value::from("tags")) {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Replace the tag list, preserving the key's position
    pub fn set_tags(&mut self, tags: &[String]) {
        self.frontmatter.insert(
            Value::from("tags"),
            Value::Sequence(tags.iter().map(|t| Value::from(t.as_str())).collect()),
        );
    }

    /// Creation timestamp: `created` (ISO) or legacy numeric `createdAt`
    pub fn created(&self) -> Option<DateTime<Utc>> {
        read_timestamp(&self.frontmatter, "created", "createdAt")
    }

    /// Update timestamp: `updated` (ISO) or legacy numeric `updatedAt`
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        read_timestamp(&self.frontmatter, "updated", "updatedAt")
    }

    /// Whether the file carries the legacy numeric timestamp form
    pub fn has_legacy_timestamps(&self) -> bool {
        matches!(
            self.frontmatter.get(&Value::from("updatedAt")),
            Some(Value::Number(_))
        )
    }

    /// Bump the update timestamp, writing back in whichever form the file
    /// already uses (legacy numeric millis vs ISO-8601).
    pub fn touch_updated(&mut self, now: DateTime<Utc>) {
        if self.has_legacy_timestamps() {
            self.frontmatter.insert(
                Value::from("updatedAt"),
                Value::from(now.timestamp_millis()),
            );
        } else {
            self.frontmatter
                .insert(Value::from("updated"), Value::from(now.to_rfc3339()));
        }
    }

    /// Outgoing connections recorded in frontmatter. `source_id` is the
    /// owning entry's id; rows with unknown types are skipped.
    pub fn connections(&self, source_id: &str) -> Vec<Connection> {
        let Some(Value::Sequence(seq)) = self.frontmatter.get(&Value::from("connections")) else {
            return Vec::new();
        };

        seq.iter()
            .filter_map(|v| {
                let map = v.as_mapping()?;
                let target = map.get(&Value::from("target"))?.as_str()?.to_string();
                let ty = ConnectionType::parse(map.get(&Value::from("type"))?.as_str()?).ok()?;
                let note = map
                    .get(&Value::from("note"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(Connection {
                    source: source_id.to_string(),
                    target,
                    connection_type: ty,
                    note,
                    created_at: None,
                })
            })
            .collect()
    }

    /// Append a connection row unless the same `(target, type)` pair is
    /// already listed.
    pub fn add_connection(&mut self, target: &str, ty: ConnectionType, note: Option<&str>) {
        let key = Value::from("connections");
        if !matches!(self.frontmatter.get(&key), Some(Value::Sequence(_))) {
            self.frontmatter.insert(key.clone(), Value::Sequence(Vec::new()));
        }
        let Some(Value::Sequence(seq)) = self.frontmatter.get_mut(&key) else {
            return;
        };

        let exists = seq.iter().any(|v| {
            v.as_mapping().is_some_and(|m| {
                m.get(&Value::from("target")).and_then(Value::as_str) == Some(target)
                    && m.get(&Value::from("type")).and_then(Value::as_str) == Some(ty.as_str())
            })
        });
        if exists {
            return;
        }

        let mut row = Mapping::new();
        row.insert(Value::from("target"), Value::from(target));
        row.insert(Value::from("type"), Value::from(ty.as_str()));
        if let Some(n) = note {
            row.insert(Value::from("note"), Value::from(n));
        }
        seq.push(Value::Mapping(row));
    }

    /// Remove every connection row pointing at `target`
    pub fn remove_connections_to(&mut self, target: &str) {
        if let Some(Value::Sequence(seq)) =
            self.frontmatter.get_mut(&Value::from("connections"))
        {
            seq.retain(|v| {
                v.as_mapping()
                    .and_then(|m| m.get(&Value::from("target")))
                    .and_then(Value::as_str)
                    != Some(target)
            });
        }
    }
}

/// Read a timestamp under its ISO key, falling back to the legacy numeric
/// key (epoch milliseconds).
fn read_timestamp(map: &Mapping, iso_key: &str, legacy_key: &str) -> Option<DateTime<Utc>> {
    if let Some(v) = map.get(&Value::from(iso_key)) {
        if let Some(s) = v.as_str() {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
        }
    }
    if let Some(Value::Number(n)) = map.get(&Value::from(legacy_key)) {
        let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
        return Utc.timestamp_millis_opt(millis).single();
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

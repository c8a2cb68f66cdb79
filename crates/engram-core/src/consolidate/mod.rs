//! Consolidation planner
//!
//! Turns a batch of free-text session notes into an ordered plan of store
//! actions: create a file, skip a duplicate, subsume (supersede) an
//! existing entry, or contribute nothing but tag normalisation. The plan
//! is pure data; executing it against the store is the orchestrator's job.
//!
//! Categorisation is regex-keyword scoring over five categories; the
//! `fact` category short-circuits to no file. Duplicates are detected by
//! word-level Jaccard similarity; supersession needs mid-range similarity
//! plus an explicit supersession phrase.

pub mod keywords;

use std::collections::HashSet;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::graph::normalize_tag;
use crate::types::KnowledgeType;

pub use keywords::Category;

/// Jaccard similarity at or above this marks a duplicate
pub const DUPLICATE_THRESHOLD: f64 = 0.6;

/// Similarity range that, with a supersession phrase, marks a subsume
pub const SUPERSEDE_RANGE: (f64, f64) = (0.25, 0.6);

/// Notes shorter than this without a category do not become files
pub const MIN_BODY_LEN: usize = 80;

// ============================================================================
// INPUT & PLAN TYPES
// ============================================================================

/// One free-text session note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNote {
    /// Caller-side identifier echoed in the plan
    pub id: String,
    /// Note text
    pub text: String,
    /// Raw tags attached to the note
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The slice of an existing entry the planner compares against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingEntry {
    /// Entry id
    pub id: String,
    /// Entry title
    pub title: String,
    /// Body text
    pub content: String,
}

/// One planned action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    /// Create a new entry file from the note
    CreateFile {
        /// Source note id
        note_id: String,
        /// Derived title
        title: String,
        /// Target knowledge type
        #[serde(rename = "type")]
        entry_type: KnowledgeType,
        /// File body
        content: String,
        /// Normalised tags
        tags: Vec<String>,
    },
    /// The note repeats an existing entry; do nothing
    SkipDuplicate {
        /// Source note id
        note_id: String,
        /// The entry it duplicates
        duplicate_of: String,
        /// Word-level Jaccard similarity
        similarity: f64,
    },
    /// Create the entry and mark it as superseding an existing one
    Subsume {
        /// Source note id
        note_id: String,
        /// The entry being superseded
        supersedes: String,
        /// Word-level Jaccard similarity
        similarity: f64,
        /// Derived title
        title: String,
        /// Target knowledge type
        #[serde(rename = "type")]
        entry_type: KnowledgeType,
        /// File body
        content: String,
        /// Normalised tags
        tags: Vec<String>,
    },
    /// Nothing file-worthy; only the note's tags feed tag normalisation
    NormalizeTags {
        /// Source note id
        note_id: String,
        /// Normalised tags
        tags: Vec<String>,
    },
}

/// Ordered consolidation plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationPlan {
    /// Actions in input-note order
    pub actions: Vec<PlanAction>,
}

// ============================================================================
// CONSOLIDATOR
// ============================================================================

/// Pure planner over session notes
pub struct Consolidator {
    supersession_keywords: Vec<String>,
}

impl Default for Consolidator {
    fn default() -> Self {
        Self {
            supersession_keywords: keywords::SUPERSESSION_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Consolidator {
    /// Planner with a caller-supplied supersession vocabulary
    pub fn with_supersession_keywords(keywords: Vec<String>) -> Self {
        Self {
            supersession_keywords: keywords,
        }
    }

    /// Produce the ordered action plan for a batch of notes
    pub fn plan(&self, notes: &[SessionNote], existing: &[ExistingEntry]) -> ConsolidationPlan {
        let mut plan = ConsolidationPlan::default();

        for note in notes {
            plan.actions.push(self.plan_note(note, existing));
        }
        plan
    }

    fn plan_note(&self, note: &SessionNote, existing: &[ExistingEntry]) -> PlanAction {
        let tags: Vec<String> = note
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();

        let category = categorize(&note.text);

        // facts never become files; neither do short uncategorised scraps
        let entry_type = match category {
            Some(Category::Decision) => Some(KnowledgeType::Decision),
            Some(Category::Incident) => Some(KnowledgeType::Incident),
            Some(Category::Workflow) => Some(KnowledgeType::Workflow),
            Some(Category::Note) => Some(KnowledgeType::Note),
            Some(Category::Fact) => None,
            None if note.text.len() >= MIN_BODY_LEN => Some(KnowledgeType::Note),
            None => None,
        };
        let Some(entry_type) = entry_type else {
            return PlanAction::NormalizeTags {
                note_id: note.id.clone(),
                tags,
            };
        };

        // closest existing entry by word overlap
        let closest = existing
            .iter()
            .map(|e| (e, jaccard(&note.text, &e.content)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((entry, similarity)) = closest {
            if similarity >= DUPLICATE_THRESHOLD {
                return PlanAction::SkipDuplicate {
                    note_id: note.id.clone(),
                    duplicate_of: entry.id.clone(),
                    similarity,
                };
            }
            if similarity >= SUPERSEDE_RANGE.0
                && similarity < SUPERSEDE_RANGE.1
                && self.mentions_supersession(&note.text)
            {
                return PlanAction::Subsume {
                    note_id: note.id.clone(),
                    supersedes: entry.id.clone(),
                    similarity,
                    title: derive_title(&note.text),
                    entry_type,
                    content: note.text.clone(),
                    tags,
                };
            }
        }

        PlanAction::CreateFile {
            note_id: note.id.clone(),
            title: derive_title(&note.text),
            entry_type,
            content: note.text.clone(),
            tags,
        }
    }

    fn mentions_supersession(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.supersession_keywords
            .iter()
            .any(|k| lowered.contains(k.as_str()))
    }
}

// ============================================================================
// SCORING PRIMITIVES
// ============================================================================

/// Best-scoring category for a note, if any pattern matches at all.
/// Table order breaks score ties.
pub fn categorize(text: &str) -> Option<Category> {
    let mut best: Option<(Category, usize)> = None;

    for entry in keywords::CATEGORY_KEYWORDS {
        let mut score = 0;
        for pattern in entry.patterns {
            let Ok(re) = RegexBuilder::new(pattern).case_insensitive(true).build() else {
                continue;
            };
            score += re.find_iter(text).count();
        }
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((entry.category, score));
        }
    }
    best.map(|(category, _)| category)
}

/// Word-level Jaccard similarity over lowercased alphanumeric tokens
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// First line of the note, word-trimmed to a title-sized string
fn derive_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let words: Vec<&str> = first_line.split_whitespace().take(10).collect();
    let mut title = words.join(" ");
    if title.len() > 80 {
        title.truncate(80);
        title = title.trim_end().to_string();
    }
    if title.is_empty() {
        "Untitled note".to_string()
    } else {
        title
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, text: &str) -> SessionNote {
        SessionNote {
            id: id.to_string(),
            text: text.to_string(),
            tags: Vec::new(),
        }
    }

    fn entry(id: &str, content: &str) -> ExistingEntry {
        ExistingEntry {
            id: id.to_string(),
            title: id.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn categorisation_table() {
        assert_eq!(
            categorize("We decided to use Bun for all new services"),
            Some(Category::Decision)
        );
        assert_eq!(
            categorize("Der Import ist abgestürzt, Fehler im Parser"),
            Some(Category::Incident)
        );
        assert_eq!(
            categorize("How to deploy: first build, then push, then restart"),
            Some(Category::Workflow)
        );
        assert_eq!(categorize("fyi the office moves next month"), Some(Category::Fact));
        assert_eq!(categorize("entirely unremarkable text"), None);
    }

    #[test]
    fn decision_notes_become_decision_files() {
        let consolidator = Consolidator::default();
        let plan = consolidator.plan(
            &[note("n1", "We decided to standardise on SQLite for local indexes.")],
            &[],
        );
        match &plan.actions[0] {
            PlanAction::CreateFile {
                entry_type, title, ..
            } => {
                assert_eq!(*entry_type, KnowledgeType::Decision);
                assert!(title.starts_with("We decided"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn facts_never_become_files() {
        let consolidator = Consolidator::default();
        let text = "fyi the search index lives under .index and can always be \
                    regenerated from the markdown tree whenever it drifts";
        assert!(text.len() >= MIN_BODY_LEN);
        let plan = consolidator.plan(&[note("n1", text)], &[]);
        assert!(matches!(
            plan.actions[0],
            PlanAction::NormalizeTags { .. }
        ));
    }

    #[test]
    fn short_uncategorised_notes_only_normalise_tags() {
        let consolidator = Consolidator::default();
        let mut short = note("n1", "random scrap");
        short.tags = vec!["  Tech/AI/ ".to_string()];
        let plan = consolidator.plan(&[short], &[]);
        match &plan.actions[0] {
            PlanAction::NormalizeTags { tags, .. } => {
                assert_eq!(tags, &["tech/ai"]);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn long_uncategorised_notes_become_note_files() {
        let consolidator = Consolidator::default();
        let text = "a".repeat(40) + " lorem ipsum dolor sit amet consectetur adipiscing elit sed";
        assert!(text.len() >= MIN_BODY_LEN);
        let plan = consolidator.plan(&[note("n1", &text)], &[]);
        assert!(matches!(
            &plan.actions[0],
            PlanAction::CreateFile { entry_type, .. } if *entry_type == KnowledgeType::Note
        ));
    }

    #[test]
    fn near_identical_notes_are_skipped() {
        let consolidator = Consolidator::default();
        let existing = entry(
            "dec-001",
            "We decided to use Bun for all new backend services going forward",
        );
        let plan = consolidator.plan(
            &[note(
                "n1",
                "We decided to use Bun for all new backend services going forward now",
            )],
            &[existing],
        );
        match &plan.actions[0] {
            PlanAction::SkipDuplicate {
                duplicate_of,
                similarity,
                ..
            } => {
                assert_eq!(duplicate_of, "dec-001");
                assert!(*similarity >= DUPLICATE_THRESHOLD);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn supersession_needs_midrange_similarity_and_keyword() {
        let consolidator = Consolidator::default();
        let existing = entry(
            "dec-001",
            "We decided to use Node with Express for backend services and the api layer",
        );

        // related topic + explicit replacement phrase
        let plan = consolidator.plan(
            &[note(
                "n1",
                "We decided Bun replaces Node for backend services; the api layer stays",
            )],
            &[existing.clone()],
        );
        match &plan.actions[0] {
            PlanAction::Subsume {
                supersedes,
                similarity,
                entry_type,
                ..
            } => {
                assert_eq!(supersedes, "dec-001");
                assert!(*similarity >= SUPERSEDE_RANGE.0 && *similarity < SUPERSEDE_RANGE.1);
                assert_eq!(*entry_type, KnowledgeType::Decision);
            }
            other => panic!("unexpected action: {other:?}"),
        }

        // same similarity without the phrase is a plain create
        let plan = consolidator.plan(
            &[note(
                "n1",
                "We decided Bun is great for backend services; the api layer stays",
            )],
            &[existing],
        );
        assert!(matches!(plan.actions[0], PlanAction::CreateFile { .. }));
    }

    #[test]
    fn german_supersession_keywords_count() {
        let consolidator = Consolidator::default();
        assert!(consolidator.mentions_supersession("Das ersetzt die alte Anleitung"));
        assert!(consolidator.mentions_supersession("wird nicht mehr verwendet"));
        assert!(!consolidator.mentions_supersession("alles bleibt wie es ist"));
    }

    #[test]
    fn jaccard_basics() {
        assert!((jaccard("a b c", "a b c") - 1.0).abs() < 1e-9);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert_eq!(jaccard("", "anything"), 0.0);
        let mid = jaccard("a b c d", "a b x y");
        assert!(mid > 0.3 && mid < 0.4); // 2 / 6
    }

    #[test]
    fn plan_preserves_note_order() {
        let consolidator = Consolidator::default();
        let plan = consolidator.plan(
            &[
                note("n1", "We decided to adopt a new logging format for services"),
                note("n2", "tiny scrap"),
            ],
            &[],
        );
        assert_eq!(plan.actions.len(), 2);
        assert!(matches!(&plan.actions[0], PlanAction::CreateFile { note_id, .. } if note_id == "n1"));
        assert!(matches!(&plan.actions[1], PlanAction::NormalizeTags { note_id, .. } if note_id == "n2"));
    }
}

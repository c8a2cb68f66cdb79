//! Keyword tables for note categorisation
//!
//! The category and supersession vocabularies are data, not code, so
//! deployments working in other languages can extend them. The shipped
//! tables mix English and German, matching the session notes this store
//! grew up with.

/// Note categories recognised by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A decision worth recording
    Decision,
    /// Something broke
    Incident,
    /// A repeatable procedure
    Workflow,
    /// A bare fact; facts do not become files
    Fact,
    /// Everything else worth keeping
    Note,
}

/// Regex patterns per category; each match adds one point
pub struct CategoryKeywords {
    /// The category these patterns vote for
    pub category: Category,
    /// Case-insensitive regex patterns
    pub patterns: &'static [&'static str],
}

/// The scoring table. Order doubles as the tie-break priority.
pub const CATEGORY_KEYWORDS: &[CategoryKeywords] = &[
    CategoryKeywords {
        category: Category::Decision,
        patterns: &[
            r"\bdecided\b",
            r"\bdecision\b",
            r"\bwe (?:chose|picked|selected)\b",
            r"\bagreed (?:on|to)\b",
            r"\bentschieden\b",
            r"\bentscheidung\b",
            r"\bbeschlossen\b",
            r"\bwir nehmen\b",
        ],
    },
    CategoryKeywords {
        category: Category::Incident,
        patterns: &[
            r"\bincident\b",
            r"\boutage\b",
            r"\bcrash(?:ed)?\b",
            r"\bbroke(?:n)?\b",
            r"\bfail(?:ed|ure)\b",
            r"\bbug\b",
            r"\bfehler\b",
            r"\bausfall\b",
            r"\bkaputt\b",
            r"\babgestürzt\b",
        ],
    },
    CategoryKeywords {
        category: Category::Workflow,
        patterns: &[
            r"\bworkflow\b",
            r"\bsteps?\b",
            r"\bprocess\b",
            r"\bhow to\b",
            r"\bfirst\b.*\bthen\b",
            r"\bablauf\b",
            r"\bschritte?\b",
            r"\banleitung\b",
            r"\bvorgehen\b",
        ],
    },
    CategoryKeywords {
        category: Category::Fact,
        patterns: &[
            r"\bfyi\b",
            r"\bfun fact\b",
            r"\bfact:\b",
            r"\btrivia\b",
            r"\bübrigens\b",
            r"\bnebenbei\b",
        ],
    },
    CategoryKeywords {
        category: Category::Note,
        patterns: &[
            r"\bnote:\b",
            r"\bremember\b",
            r"\bkeep in mind\b",
            r"\bnotiz\b",
            r"\bmerken\b",
            r"\bnicht vergessen\b",
        ],
    },
];

/// Phrases that mark a note as replacing existing knowledge
pub const SUPERSESSION_KEYWORDS: &[&str] = &[
    "replaces",
    "supersedes",
    "deprecated",
    "obsolete",
    "no longer",
    "instead of",
    "ersetzt",
    "veraltet",
    "nicht mehr",
    "stattdessen",
];

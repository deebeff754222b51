//! Read-only statement classification.
//!
//! This is a keyword scan, not a parser. A statement is allowed when its
//! leading keyword names a read-only statement kind and no mutation or DDL
//! pattern appears anywhere in the text. Comments, string literals and
//! encoding tricks are not understood: a literal containing `DELETE FROM`
//! is rejected, and a sufficiently obfuscated write can slip through.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::GatewayError;

/// Leading keywords that mark a read-only statement kind.
pub const ALLOWED_PREFIXES: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "WITH"];

static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(SELECT|SHOW|DESCRIBE|DESC|WITH)\b").expect("prefix pattern is valid")
});

static LEADING_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+").expect("leading word pattern is valid"));

static MUTATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bINSERT\s+INTO\b",
        r"\bUPDATE\s+[\w.`]+\s+SET\b",
        r"\bDELETE\s+FROM\b",
        r"\bDROP\s+(TABLE|VIEW|DATABASE|SCHEMA)\b",
        r"\bCREATE\s+(TABLE|VIEW|DATABASE|SCHEMA)\b",
        r"\bALTER\s+(TABLE|VIEW|DATABASE|SCHEMA)\b",
        r"\bTRUNCATE\s+TABLE\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("mutation pattern is valid"))
    .collect()
});

/// Why a statement was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    Empty,
    DisallowedPrefix,
    MutationKeyword,
}

/// A single denial, naming the text that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialReason {
    pub kind: DenialKind,
    /// The offending text as it appears in the normalized statement.
    pub pattern: String,
    pub detail: String,
}

/// Outcome of classifying a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allowed,
    Blocked(DenialReason),
}

impl Classification {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Classification::Allowed)
    }
}

/// Classify `sql` as allowed or blocked.
///
/// Pure function of the trimmed, upper-cased text. Mutation patterns are
/// checked before the prefix so that a write hidden behind `WITH` is
/// reported by the pattern that caught it.
pub fn classify(sql: &str) -> Classification {
    let normalized = sql.trim().to_uppercase();

    if normalized.is_empty() {
        return Classification::Blocked(DenialReason {
            kind: DenialKind::Empty,
            pattern: String::new(),
            detail: "statement is empty".to_string(),
        });
    }

    for pattern in MUTATION_PATTERNS.iter() {
        if let Some(found) = pattern.find(&normalized) {
            let text = collapse_whitespace(found.as_str());
            return Classification::Blocked(DenialReason {
                kind: DenialKind::MutationKeyword,
                detail: format!("dangerous SQL pattern detected: {text}"),
                pattern: text,
            });
        }
    }

    if !PREFIX.is_match(&normalized) {
        let leading = LEADING_WORD
            .find(&normalized)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return Classification::Blocked(DenialReason {
            kind: DenialKind::DisallowedPrefix,
            detail: format!(
                "only {} statements are allowed, found {leading}",
                ALLOWED_PREFIXES.join("/")
            ),
            pattern: leading,
        });
    }

    Classification::Allowed
}

/// Classify `sql` and turn a blocked statement into an error.
pub fn ensure_read_only(sql: &str) -> Result<(), GatewayError> {
    match classify(sql) {
        Classification::Allowed => Ok(()),
        Classification::Blocked(reason) => Err(GatewayError::UnsafeStatement {
            kind: reason.kind,
            detail: reason.detail,
        }),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

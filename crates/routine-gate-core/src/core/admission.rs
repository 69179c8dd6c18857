// crates/routine-gate-core/src/core/admission.rs
// ============================================================================
// Module: Statement Admission Gate
// Description: Classification and acceptance checks for raw SQL statements.
// Purpose: Reject denied keywords and suspicious shapes before execution.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The admission gate is a pure function over statement text plus static
//! configuration. It classifies statements as read or write by leading-verb
//! inspection and rejects statements matching denied keywords or structural
//! red flags. It never executes anything and never panics; malformed input
//! yields an invalid [`ValidationResult`] with a reason.
//!
//! Matching is deliberately crude text scanning, not SQL parsing. Ambiguous
//! statements classify as writes so they receive extra scrutiny instead of
//! silently bypassing it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Leading verbs that classify a statement as a write.
const WRITE_VERBS: &[&str] =
    &["insert", "update", "delete", "merge", "truncate", "create", "alter", "drop"];

/// Leading verbs that classify a statement as a read.
const READ_VERBS: &[&str] = &["select", "with", "show", "explain"];

/// Destructive verbs flagged when chained behind a statement terminator.
const CHAINED_DESTRUCTIVE_VERBS: &[&str] =
    &["drop", "delete", "truncate", "alter", "shutdown", "grant", "revoke"];

/// Default denied keywords naming destructive administrative commands.
const DEFAULT_DENIED_KEYWORDS: &[&str] = &[
    "xp_cmdshell",
    "sp_configure",
    "shutdown",
    "dbcc",
    "kill",
    "grant",
    "revoke",
    "reconfigure",
];

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the admission gate.
///
/// # Invariants
/// - Keywords are matched whole-word and case-insensitively.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Keywords that cause rejection when present as a whole word.
    #[serde(default = "default_denied_keywords")]
    pub denied_keywords: Vec<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            denied_keywords: default_denied_keywords(),
        }
    }
}

/// Returns the default denied keyword list.
fn default_denied_keywords() -> Vec<String> {
    DEFAULT_DENIED_KEYWORDS.iter().map(|keyword| (*keyword).to_string()).collect()
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Statement classification by leading verb.
///
/// # Invariants
/// - Variants are stable for serialization and audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Statement does not alter engine state.
    Read,
    /// Statement alters engine state, or is ambiguous.
    Write,
}

/// Outcome of admission validation.
///
/// # Invariants
/// - `valid` is `true` exactly when `violations` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the statement is admitted.
    pub valid: bool,
    /// Ordered human-readable violation reasons.
    pub violations: Vec<String>,
}

impl ValidationResult {
    /// Returns a passing result with no violations.
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
        }
    }

    /// Returns a failing result carrying the given violations.
    #[must_use]
    pub const fn fail(violations: Vec<String>) -> Self {
        Self {
            valid: false,
            violations,
        }
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Pure admission gate over statement text.
///
/// # Invariants
/// - `validate` and `classify` have no side effects and never panic.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    /// Static gate configuration.
    config: AdmissionConfig,
}

impl AdmissionGate {
    /// Creates a gate from the given configuration.
    #[must_use]
    pub const fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
        }
    }

    /// Validates a statement against the deny list and suspicious-pattern set.
    #[must_use]
    pub fn validate(&self, statement: &str) -> ValidationResult {
        let stripped = strip_comments(statement);
        if stripped.trim().is_empty() {
            return ValidationResult::fail(vec!["statement is empty".to_string()]);
        }
        let mut violations = Vec::new();
        for keyword in &self.config.denied_keywords {
            if contains_whole_word(&stripped, keyword) {
                violations.push(format!("statement contains denied keyword: {keyword}"));
            }
        }
        if let Some(verb) = chained_destructive_verb(&stripped) {
            violations
                .push(format!("destructive statement chained behind a terminator: {verb}"));
        }
        if has_dynamic_execution(&stripped) {
            violations.push("dynamic execution of a parameter-built string".to_string());
        }
        if has_tautology(&stripped) {
            violations.push("quoted literal followed by a boolean tautology".to_string());
        }
        if violations.is_empty() {
            ValidationResult::pass()
        } else {
            ValidationResult::fail(violations)
        }
    }

    /// Classifies a statement by leading-verb inspection.
    ///
    /// Ambiguous or empty statements classify as [`StatementKind::Write`] so
    /// they receive write-path scrutiny.
    #[must_use]
    pub fn classify(&self, statement: &str) -> StatementKind {
        let stripped = strip_comments(statement);
        let Some(verb) = leading_word(&stripped) else {
            return StatementKind::Write;
        };
        if WRITE_VERBS.contains(&verb.as_str()) {
            return StatementKind::Write;
        }
        if READ_VERBS.contains(&verb.as_str()) {
            return StatementKind::Read;
        }
        StatementKind::Write
    }
}

// ============================================================================
// SECTION: Text Scanning
// ============================================================================

/// Removes `--` line comments and `/* */` block comments, preserving string
/// literal contents.
fn strip_comments(statement: &str) -> String {
    let bytes = statement.as_bytes();
    let mut out = String::with_capacity(statement.len());
    let mut index = 0;
    let mut in_string = false;
    while index < bytes.len() {
        let byte = bytes[index];
        if in_string {
            out.push(byte as char);
            if byte == b'\'' {
                in_string = false;
            }
            index += 1;
            continue;
        }
        match byte {
            b'\'' => {
                in_string = true;
                out.push('\'');
                index += 1;
            }
            b'-' if bytes.get(index + 1) == Some(&b'-') => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
            }
            b'/' if bytes.get(index + 1) == Some(&b'*') => {
                index += 2;
                while index < bytes.len() {
                    if bytes[index] == b'*' && bytes.get(index + 1) == Some(&b'/') {
                        index += 2;
                        break;
                    }
                    index += 1;
                }
                out.push(' ');
            }
            _ => {
                // Non-ASCII bytes only ever appear inside identifiers or
                // literals, which the scanners below treat as word characters.
                out.push(byte as char);
                index += 1;
            }
        }
    }
    out
}

/// Returns the first word of the statement, lowercased.
fn leading_word(statement: &str) -> Option<String> {
    let trimmed = statement.trim_start();
    let word: String = trimmed
        .chars()
        .take_while(|character| character.is_ascii_alphanumeric() || *character == '_')
        .collect();
    if word.is_empty() {
        return None;
    }
    Some(word.to_ascii_lowercase())
}

/// Returns whether a character belongs to a word for whole-word matching.
const fn is_word_char(character: u8) -> bool {
    character.is_ascii_alphanumeric() || character == b'_'
}

/// Case-insensitive whole-word containment check.
fn contains_whole_word(statement: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let haystack = statement.to_ascii_lowercase();
    let needle = word.to_ascii_lowercase();
    let haystack_bytes = haystack.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = haystack[search_from ..].find(&needle) {
        let start = search_from + offset;
        let end = start + needle.len();
        let left_ok = start == 0 || !is_word_char(haystack_bytes[start - 1]);
        let right_ok = end >= haystack_bytes.len() || !is_word_char(haystack_bytes[end]);
        if left_ok && right_ok {
            return true;
        }
        search_from = start + 1;
    }
    false
}

/// Detects a destructive verb immediately following a statement terminator.
fn chained_destructive_verb(statement: &str) -> Option<&'static str> {
    let lowered = statement.to_ascii_lowercase();
    for (index, _) in lowered.match_indices(';') {
        let rest = lowered[index + 1 ..].trim_start();
        for verb in CHAINED_DESTRUCTIVE_VERBS {
            if rest.starts_with(verb) {
                let boundary = rest.as_bytes().get(verb.len());
                if boundary.is_none_or(|byte| !is_word_char(*byte)) {
                    return Some(verb);
                }
            }
        }
    }
    None
}

/// Detects execution of a string built from a parameter reference, such as
/// `exec(@stmt)` or `sp_executesql` over a concatenated variable.
fn has_dynamic_execution(statement: &str) -> bool {
    let lowered = statement.to_ascii_lowercase();
    for verb in ["exec", "execute"] {
        let mut search_from = 0;
        while let Some(offset) = lowered[search_from ..].find(verb) {
            let start = search_from + offset;
            let end = start + verb.len();
            let left_ok = start == 0 || !is_word_char(lowered.as_bytes()[start - 1]);
            if left_ok {
                let rest = lowered[end ..].trim_start();
                if rest.starts_with('(') && rest[1 ..].trim_start().starts_with('@') {
                    return true;
                }
            }
            search_from = start + 1;
        }
    }
    if contains_whole_word(&lowered, "sp_executesql") && lowered.contains('@') && lowered.contains('+') {
        return true;
    }
    false
}

/// Detects a crude injection shape: a quoted literal immediately followed by
/// an OR-tautology.
fn has_tautology(statement: &str) -> bool {
    let lowered = statement.to_ascii_lowercase();
    let normalized: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let compact: String = normalized.chars().filter(|character| *character != ' ').collect();
    compact.contains("'or'1'='1") || compact.contains("'or1=1") || compact.contains("\"or1=1")
}

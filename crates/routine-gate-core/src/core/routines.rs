// crates/routine-gate-core/src/core/routines.rs
// ============================================================================
// Module: Routine Definition Text Model
// Description: Defining-clause parsing and namespace rewriting for routine
//              definitions.
// Purpose: Support draft staging and deploy swaps with narrowly scoped text
//          substitution.
// Dependencies: serde, crate::core::identifiers
// ============================================================================

//! ## Overview
//! Routine definitions are opaque statement text. This module locates the
//! defining clause (`CREATE [OR ALTER] {PROCEDURE | PROC | FUNCTION} target`)
//! with an anchored scan and rewrites only the target identifier. The routine
//! body is never altered; these helpers are explicitly not SQL parsers and
//! must not be widened into general statement rewriting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RoutineName;
use crate::core::identifiers::SchemaName;

// ============================================================================
// SECTION: Routine Kinds
// ============================================================================

/// Kind of executable routine named by a defining clause.
///
/// # Invariants
/// - Variants are stable for serialization and audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    /// Stored procedure.
    Procedure,
    /// Scalar or table-valued function.
    Function,
}

impl RoutineKind {
    /// Returns the DDL keyword used to drop routines of this kind.
    #[must_use]
    pub const fn drop_keyword(self) -> &'static str {
        match self {
            Self::Procedure => "PROCEDURE",
            Self::Function => "FUNCTION",
        }
    }
}

// ============================================================================
// SECTION: Defining Clause
// ============================================================================

/// Location of a defining clause within a routine definition.
///
/// # Invariants
/// - `target_start .. target_end` is a valid byte range into the scanned
///   definition covering exactly the target identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefiningClause {
    /// Routine kind named by the clause.
    pub kind: RoutineKind,
    /// Byte offset of the target identifier.
    pub target_start: usize,
    /// Byte offset one past the target identifier.
    pub target_end: usize,
}

impl DefiningClause {
    /// Returns the target identifier text within `definition`.
    #[must_use]
    pub fn target<'a>(&self, definition: &'a str) -> &'a str {
        definition.get(self.target_start .. self.target_end).unwrap_or("")
    }
}

/// Returns whether a byte can appear in a (possibly qualified, possibly
/// bracket-quoted) target identifier.
const fn is_target_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(byte, b'_' | b'.' | b'[' | b']' | b'"' | b'#' | b'$' | b'@')
}

/// Consumes ASCII whitespace starting at `index`, returning the next offset.
fn skip_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && bytes[index].is_ascii_whitespace() {
        index += 1;
    }
    index
}

/// Consumes one case-insensitive keyword at `index`, returning the offset
/// past it, or `None` when the keyword is absent or not word-delimited.
fn take_keyword(text: &str, index: usize, keyword: &str) -> Option<usize> {
    let candidate = text.get(index .. index + keyword.len())?;
    if !candidate.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let end = index + keyword.len();
    match text.as_bytes().get(end) {
        Some(byte) if byte.is_ascii_alphanumeric() || *byte == b'_' => None,
        _ => Some(end),
    }
}

/// Locates the defining clause with an anchored scan.
///
/// The clause must be the first content of the definition, after leading
/// whitespace. Returns `None` when the definition is not recognizable as a
/// routine-creation statement.
#[must_use]
pub fn parse_defining_clause(definition: &str) -> Option<DefiningClause> {
    let bytes = definition.as_bytes();
    let mut index = skip_whitespace(bytes, 0);
    index = take_keyword(definition, index, "create")?;
    index = skip_whitespace(bytes, index);
    if let Some(after_or) = take_keyword(definition, index, "or") {
        let after_or_ws = skip_whitespace(bytes, after_or);
        index = skip_whitespace(bytes, take_keyword(definition, after_or_ws, "alter")?);
    }
    let (kind, after_kind) = if let Some(end) = take_keyword(definition, index, "procedure") {
        (RoutineKind::Procedure, end)
    } else if let Some(end) = take_keyword(definition, index, "proc") {
        (RoutineKind::Procedure, end)
    } else if let Some(end) = take_keyword(definition, index, "function") {
        (RoutineKind::Function, end)
    } else {
        return None;
    };
    let target_start = skip_whitespace(bytes, after_kind);
    let mut target_end = target_start;
    while target_end < bytes.len() && is_target_char(bytes[target_end]) {
        target_end += 1;
    }
    if target_end == target_start {
        return None;
    }
    Some(DefiningClause {
        kind,
        target_start,
        target_end,
    })
}

/// Splits a (possibly bracket-quoted) qualified target into schema and name
/// parts, without the quoting characters.
#[must_use]
pub fn split_qualified_target(target: &str) -> (Option<String>, String) {
    let unquote = |part: &str| {
        part.trim_matches(|character| matches!(character, '[' | ']' | '"')).to_string()
    };
    match target.rsplit_once('.') {
        Some((schema, name)) => (Some(unquote(schema)), unquote(name)),
        None => (None, unquote(target)),
    }
}

// ============================================================================
// SECTION: Namespace Rewrites
// ============================================================================

/// Rewrites the defining clause target to point into the draft namespace.
///
/// Only the target identifier is replaced; the rest of the definition is
/// byte-identical. Returns `None` when no defining clause is found.
#[must_use]
pub fn rewrite_target_to_draft(
    definition: &str,
    draft_namespace: &str,
    name: &RoutineName,
) -> Option<(RoutineKind, String)> {
    let clause = parse_defining_clause(definition)?;
    let mut rewritten = String::with_capacity(definition.len());
    rewritten.push_str(&definition[.. clause.target_start]);
    rewritten.push_str(draft_namespace);
    rewritten.push('.');
    rewritten.push_str(name.as_str());
    rewritten.push_str(&definition[clause.target_end ..]);
    Some((clause.kind, rewritten))
}

/// Rewrites every `<draft_namespace>.` occurrence to `<schema>.`,
/// case-insensitively on the namespace.
#[must_use]
pub fn rewrite_draft_to_production(
    definition: &str,
    draft_namespace: &str,
    schema: &SchemaName,
) -> String {
    let needle = format!("{}.", draft_namespace.to_ascii_lowercase());
    let lowered = definition.to_ascii_lowercase();
    let mut rewritten = String::with_capacity(definition.len());
    let mut copied_to = 0;
    let mut search_from = 0;
    while let Some(offset) = lowered[search_from ..].find(&needle) {
        let start = search_from + offset;
        rewritten.push_str(&definition[copied_to .. start]);
        rewritten.push_str(schema.as_str());
        rewritten.push('.');
        copied_to = start + needle.len();
        search_from = copied_to;
    }
    rewritten.push_str(&definition[copied_to ..]);
    rewritten
}

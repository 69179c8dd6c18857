// crates/routine-gate-core/tests/admission.rs
// ============================================================================
// Module: Admission Gate Unit Tests
// Description: Classification and acceptance tests for the statement gate.
// Purpose: Validate deny-list matching, verb classification, and the
//          suspicious-pattern checks.
// ============================================================================

//! ## Overview
//! Unit-level tests for the statement admission gate:
//! - Leading-verb classification, including the ambiguous-defaults-to-write
//!   rule
//! - Whole-word, case-insensitive deny-list matching
//! - Comment stripping ahead of every check
//! - Chained-destructive, dynamic-execution, and tautology shapes

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use routine_gate_core::AdmissionConfig;
use routine_gate_core::AdmissionGate;
use routine_gate_core::StatementKind;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn gate() -> AdmissionGate {
    AdmissionGate::default()
}

fn violations(statement: &str) -> Vec<String> {
    gate().validate(statement).violations
}

// ============================================================================
// SECTION: Classification
// ============================================================================

#[test]
fn read_verbs_classify_as_read() {
    let gate = gate();
    for statement in [
        "SELECT * FROM dbo.users",
        "with cte as (select 1) select * from cte",
        "SHOW TABLES",
        "EXPLAIN SELECT 1",
    ] {
        assert_eq!(gate.classify(statement), StatementKind::Read, "{statement}");
    }
}

#[test]
fn write_verbs_classify_as_write() {
    let gate = gate();
    for statement in [
        "INSERT INTO t VALUES (1)",
        "update t set x = 1",
        "DELETE FROM t",
        "MERGE INTO t USING s ON t.id = s.id",
        "TRUNCATE TABLE t",
        "CREATE TABLE t (id INT)",
        "ALTER TABLE t ADD c INT",
        "DROP TABLE t",
    ] {
        assert_eq!(gate.classify(statement), StatementKind::Write, "{statement}");
    }
}

#[test]
fn unknown_and_empty_statements_classify_as_write() {
    let gate = gate();
    assert_eq!(gate.classify("VACUUM FULL"), StatementKind::Write);
    assert_eq!(gate.classify(""), StatementKind::Write);
    assert_eq!(gate.classify("   "), StatementKind::Write);
}

#[test]
fn classification_ignores_leading_comments() {
    let gate = gate();
    assert_eq!(gate.classify("-- note\nselect 1"), StatementKind::Read);
    assert_eq!(gate.classify("/* note */ update t set x = 1"), StatementKind::Write);
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn plain_statements_are_admitted() {
    let gate = gate();
    assert!(gate.validate("SELECT id, name FROM dbo.users WHERE id = @id").valid);
    assert!(gate.validate("UPDATE dbo.users SET name = @name WHERE id = @id").valid);
    assert!(gate.validate("select 1;").valid);
}

#[test]
fn empty_and_comment_only_statements_are_rejected() {
    assert_eq!(violations(""), vec!["statement is empty".to_string()]);
    assert_eq!(violations("   \n\t"), vec!["statement is empty".to_string()]);
    assert_eq!(violations("-- nothing here"), vec!["statement is empty".to_string()]);
    assert_eq!(violations("/* nothing here */"), vec!["statement is empty".to_string()]);
}

#[test]
fn denied_keywords_are_rejected_case_insensitively() {
    for statement in [
        "EXEC xp_cmdshell 'dir'",
        "exec XP_CMDSHELL 'dir'",
        "KILL 42",
        "DBCC CHECKDB",
        "GRANT ALL TO someone",
    ] {
        let result = gate().validate(statement);
        assert!(!result.valid, "{statement}");
        assert!(
            result.violations.iter().any(|reason| reason.contains("denied keyword")),
            "{statement}: {:?}",
            result.violations
        );
    }
}

#[test]
fn deny_list_matches_whole_words_only() {
    assert!(gate().validate("SELECT * FROM dbo.killers").valid);
    assert!(gate().validate("SELECT granted_at FROM dbo.permissions").valid);
}

#[test]
fn deny_list_applies_inside_string_literals() {
    // Crude scanning is fail-closed: a denied word smuggled into a literal
    // still rejects.
    assert!(!gate().validate("SELECT 'please kill this'").valid);
}

#[test]
fn keywords_inside_comments_are_ignored() {
    assert!(gate().validate("SELECT 1 -- kill shutdown dbcc").valid);
    assert!(gate().validate("SELECT /* kill */ 1").valid);
}

#[test]
fn chained_destructive_statements_are_rejected() {
    let result = gate().validate("SELECT 1; DROP TABLE users");
    assert!(!result.valid);
    assert!(result.violations.iter().any(|reason| reason.contains("drop")));

    let result = gate().validate("update t set x = 1 ;truncate table t");
    assert!(!result.valid);
    assert!(result.violations.iter().any(|reason| reason.contains("truncate")));
}

#[test]
fn trailing_terminator_is_not_a_chain() {
    assert!(gate().validate("SELECT 1;").valid);
    assert!(gate().validate("UPDATE t SET x = 1;  ").valid);
}

#[test]
fn dynamic_execution_shapes_are_rejected() {
    for statement in [
        "EXEC(@stmt)",
        "EXECUTE ( @sql )",
        "exec sp_executesql @sql + @tail",
    ] {
        let result = gate().validate(statement);
        assert!(!result.valid, "{statement}");
        assert!(
            result.violations.iter().any(|reason| reason.contains("dynamic execution")),
            "{statement}: {:?}",
            result.violations
        );
    }
}

#[test]
fn static_routine_invocation_is_admitted() {
    assert!(gate().validate("EXEC dbo.GetUsers @id = 1").valid);
}

#[test]
fn tautology_shapes_are_rejected() {
    for statement in [
        "SELECT * FROM users WHERE name = '' OR '1'='1'",
        "SELECT * FROM users WHERE name = 'x' or 1 = 1",
    ] {
        let result = gate().validate(statement);
        assert!(!result.valid, "{statement}");
        assert!(
            result.violations.iter().any(|reason| reason.contains("tautology")),
            "{statement}: {:?}",
            result.violations
        );
    }
}

#[test]
fn violations_accumulate_in_order() {
    let result = gate().validate("KILL 1; DROP TABLE x");
    assert!(!result.valid);
    assert_eq!(result.violations.len(), 2);
    assert!(result.violations[0].contains("kill"));
    assert!(result.violations[1].contains("drop"));
}

#[test]
fn custom_deny_list_replaces_the_default() {
    let gate = AdmissionGate::new(AdmissionConfig {
        denied_keywords: vec!["forbidden".to_string()],
    });
    assert!(!gate.validate("SELECT forbidden FROM t").valid);
    // The default list no longer applies.
    assert!(gate.validate("EXEC xp_cmdshell 'dir'").valid);
}

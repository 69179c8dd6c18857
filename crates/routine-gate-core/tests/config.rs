// crates/routine-gate-core/tests/config.rs
// ============================================================================
// Module: Configuration Loading Tests
// Description: TOML parsing tests for the aggregate configuration document.
// Purpose: Validate section defaults, overrides, and parse failures.
// ============================================================================

//! Tests for aggregate configuration loading from TOML.

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

use routine_gate_core::ConfigError;
use routine_gate_core::RoutineGateConfig;

#[test]
fn empty_document_yields_defaults() {
    let config = RoutineGateConfig::from_toml_str("").expect("parse");
    assert_eq!(config.registry.pool_size, 4);
    assert_eq!(config.registry.transaction_timeout_ms, 300_000);
    assert_eq!(config.lifecycle.draft_namespace, "routine_drafts");
    assert_eq!(config.writes.max_affected_rows, 10_000);
    assert!(config.admission.denied_keywords.contains(&"xp_cmdshell".to_string()));
    assert!(config.audit.is_none());
}

#[test]
fn sections_override_individual_fields() {
    let document = r#"
        [registry]
        pool_size = 8
        transaction_timeout_ms = 60000

        [lifecycle]
        draft_namespace = "staging"

        [writes]
        max_affected_rows = 500

        [admission]
        denied_keywords = ["shutdown"]

        [audit]
        directory = "/var/log/routine-gate"
        batch_max_entries = 16
    "#;
    let config = RoutineGateConfig::from_toml_str(document).expect("parse");
    assert_eq!(config.registry.pool_size, 8);
    assert_eq!(config.registry.transaction_timeout_ms, 60_000);
    // Unspecified registry fields keep their defaults.
    assert_eq!(config.registry.acquire_timeout_ms, 5_000);
    assert_eq!(config.lifecycle.draft_namespace, "staging");
    assert_eq!(config.writes.max_affected_rows, 500);
    assert_eq!(config.admission.denied_keywords, vec!["shutdown".to_string()]);
    let audit = config.audit.expect("audit section");
    assert_eq!(audit.batch_max_entries, 16);
    assert_eq!(audit.queue_capacity, 1_024);
    assert_eq!(audit.flush_interval_ms, 1_000);
}

#[test]
fn malformed_documents_fail_to_parse() {
    assert!(matches!(
        RoutineGateConfig::from_toml_str("registry = 7"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        RoutineGateConfig::from_toml_str("[registry\npool_size = 1"),
        Err(ConfigError::Parse(_))
    ));
}

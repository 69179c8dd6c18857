// crates/routine-gate-core/tests/proptest_admission.rs
// ============================================================================
// Module: Admission Gate Property-Based Tests
// Description: Property tests for gate stability across wide input ranges.
// Purpose: Detect panics and invariant violations on arbitrary statements.
// ============================================================================

//! Property-based tests for admission gate invariants.

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

use proptest::prelude::*;
use routine_gate_core::AdmissionGate;
use routine_gate_core::StatementKind;

proptest! {
    #[test]
    fn validate_never_panics_and_valid_matches_violations(statement in ".*") {
        let gate = AdmissionGate::default();
        let result = gate.validate(&statement);
        prop_assert_eq!(result.valid, result.violations.is_empty());
    }

    #[test]
    fn classify_never_panics(statement in ".*") {
        let gate = AdmissionGate::default();
        let _ = gate.classify(&statement);
    }

    #[test]
    fn read_classification_implies_a_read_verb(statement in ".*") {
        let gate = AdmissionGate::default();
        if gate.classify(&statement) == StatementKind::Read {
            let lowered = statement.to_ascii_lowercase();
            let leading = lowered.trim_start();
            prop_assert!(
                ["select", "with", "show", "explain", "/*", "--"]
                    .iter()
                    .any(|prefix| leading.starts_with(prefix)),
                "read classification without a read verb: {:?}",
                statement
            );
        }
    }

    #[test]
    fn validation_is_deterministic(statement in ".*") {
        let gate = AdmissionGate::default();
        prop_assert_eq!(gate.validate(&statement), gate.validate(&statement));
    }
}

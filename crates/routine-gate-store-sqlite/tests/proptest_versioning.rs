// crates/routine-gate-store-sqlite/tests/proptest_versioning.rs
// ============================================================================
// Module: Version Numbering Property-Based Tests
// Description: Property tests for version assignment and retention.
// Purpose: Detect numbering gaps and ordering violations across arbitrary
//          save sequences.
// ============================================================================

//! Property-based tests for version store invariants.

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
use routine_gate_core::ActorId;
use routine_gate_core::RoutineName;
use routine_gate_core::SaveVersionRequest;
use routine_gate_core::SchemaName;
use routine_gate_core::Timestamp;
use routine_gate_core::VersionStore;
use routine_gate_store_sqlite::SqliteVersionStore;
use routine_gate_store_sqlite::SqliteVersionStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_store_keeping(dir: &TempDir, keep_versions: u64) -> SqliteVersionStore {
    let config = SqliteVersionStoreConfig {
        keep_versions,
        ..SqliteVersionStoreConfig::new(dir.path().join("versions.db"))
    };
    SqliteVersionStore::open(&config).expect("open store")
}

fn request(name: &str, at: u64) -> SaveVersionRequest {
    SaveVersionRequest {
        schema: SchemaName::new("dbo"),
        name: RoutineName::new(name),
        definition: format!("CREATE PROCEDURE dbo.{name} AS SELECT {at};"),
        created_at: Timestamp::Logical(at),
        created_by: ActorId::new("tester"),
        comment: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Interleaved saves across two routines number each routine
    /// independently and contiguously, and listings stay newest-first.
    #[test]
    fn interleaved_saves_number_contiguously(picks in prop::collection::vec(any::<bool>(), 1 .. 24)) {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store_keeping(&dir, 64);
        let mut counts = [0_u64, 0_u64];
        for (index, to_other) in picks.iter().enumerate() {
            let slot = usize::from(*to_other);
            let name = if *to_other { "Other" } else { "Example" };
            let version = store
                .save_version(&request(name, u64::try_from(index).expect("small index")))
                .expect("save");
            counts[slot] += 1;
            prop_assert_eq!(version.get(), counts[slot]);
        }
        for (slot, name) in ["Example", "Other"].iter().enumerate() {
            let versions = store
                .list_versions(&SchemaName::new("dbo"), &RoutineName::new(*name))
                .expect("list");
            let numbers: Vec<u64> =
                versions.iter().map(|snapshot| snapshot.version.get()).collect();
            let expected: Vec<u64> = (1 ..= counts[slot]).rev().collect();
            prop_assert_eq!(numbers, expected);
        }
    }

    /// After any save count, retention keeps exactly the most recent
    /// `keep_versions` snapshots while numbering keeps advancing.
    #[test]
    fn retention_bounds_history_length(save_count in 1_u64 .. 16) {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store_keeping(&dir, 3);
        for at in 1 ..= save_count {
            let version = store.save_version(&request("Example", at)).expect("save");
            prop_assert_eq!(version.get(), at);
        }
        let versions = store
            .list_versions(&SchemaName::new("dbo"), &RoutineName::new("Example"))
            .expect("list");
        let numbers: Vec<u64> = versions.iter().map(|snapshot| snapshot.version.get()).collect();
        let expected: Vec<u64> =
            (save_count.saturating_sub(2).max(1) ..= save_count).rev().collect();
        prop_assert_eq!(numbers, expected);
    }
}

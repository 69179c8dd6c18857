// crates/routine-gate-core/tests/registry.rs
// ============================================================================
// Module: Transaction Registry Unit Tests
// Description: Lifecycle, pooling, and timeout-sweep tests for the registry.
// Purpose: Validate exclusive session ownership, terminal-state behavior,
//          bounded pool waits, and forced rollback of expired transactions.
// ============================================================================

//! ## Overview
//! Unit-level tests for the transaction registry:
//! - Begin, execute, query, commit, and rollback happy paths
//! - Unknown and terminal identifiers surfacing as not-found
//! - Bounded pool checkout and exhaustion
//! - Timeout sweep reclamation under a manual clock, including the race with
//!   a concurrent manual commit

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

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use routine_gate_core::Clock;
use routine_gate_core::InMemoryEngine;
use routine_gate_core::ManualClock;
use routine_gate_core::ParamMap;
use routine_gate_core::RegistryConfig;
use routine_gate_core::RegistryError;
use routine_gate_core::TimeoutSweeper;
use routine_gate_core::TransactionRegistry;
use routine_gate_core::TransactionState;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn test_config() -> RegistryConfig {
    RegistryConfig {
        pool_size: 2,
        acquire_timeout_ms: 50,
        transaction_timeout_ms: 1_000,
        sweep_interval_ms: 10,
    }
}

fn registry_with(
    engine: &InMemoryEngine,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
) -> TransactionRegistry {
    TransactionRegistry::new(Arc::new(engine.clone()), config, clock)
        .expect("registry construction")
}

fn registry() -> (InMemoryEngine, TransactionRegistry, Arc<ManualClock>) {
    let engine = InMemoryEngine::new();
    let clock = Arc::new(ManualClock::starting_at(0));
    let registry = registry_with(&engine, test_config(), Arc::clone(&clock) as Arc<dyn Clock>);
    (engine, registry, clock)
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn begin_execute_commit_happy_path() {
    let (_engine, registry, _clock) = registry();
    let params = ParamMap::new();
    let txn = registry.begin().expect("begin");
    let rows = registry.execute(&txn, "INSERT INTO t VALUES (1)", &params).expect("execute");
    assert_eq!(rows, 1);
    registry.commit(&txn).expect("commit");
    assert_eq!(registry.active_count(), 0);
    assert_eq!(registry.idle_sessions(), 2);
}

#[test]
fn terminal_identifiers_are_unknown() {
    let (_engine, registry, _clock) = registry();
    let params = ParamMap::new();
    let txn = registry.begin().expect("begin");
    registry.rollback(&txn).expect("rollback");
    assert!(matches!(
        registry.execute(&txn, "SELECT 1", &params),
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(registry.commit(&txn), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.snapshot(&txn), Err(RegistryError::NotFound(_))));
}

#[test]
fn unknown_identifier_is_not_found() {
    let (_engine, registry, _clock) = registry();
    assert!(matches!(
        registry.commit(&"txn-999".into()),
        Err(RegistryError::NotFound(_))
    ));
}

#[test]
fn snapshot_records_statements_in_order() {
    let (_engine, registry, _clock) = registry();
    let params = ParamMap::new();
    let txn = registry.begin().expect("begin");
    registry.execute(&txn, "INSERT INTO t VALUES (1)", &params).expect("first");
    registry.query(&txn, "SELECT * FROM t", &params).expect("second");
    let snapshot = registry.snapshot(&txn).expect("snapshot");
    assert_eq!(snapshot.state, TransactionState::Active);
    assert_eq!(
        snapshot.statements,
        vec!["INSERT INTO t VALUES (1)".to_string(), "SELECT * FROM t".to_string()]
    );
}

#[test]
fn engine_failure_leaves_transaction_active() {
    let (engine, registry, _clock) = registry();
    engine.fail_statements_containing("boom");
    let params = ParamMap::new();
    let txn = registry.begin().expect("begin");
    assert!(matches!(
        registry.execute(&txn, "UPDATE t SET x = 'boom'", &params),
        Err(RegistryError::Engine(_))
    ));
    let snapshot = registry.snapshot(&txn).expect("snapshot");
    assert_eq!(snapshot.state, TransactionState::Active);
    registry.rollback(&txn).expect("rollback still works");
}

#[test]
fn query_returns_rows_inside_transaction() {
    let (_engine, registry, _clock) = registry();
    let params = ParamMap::new();
    let txn = registry.begin().expect("begin");
    let rows = registry.query(&txn, "SELECT 1", &params).expect("query");
    assert_eq!(rows.row_count(), 0);
    registry.commit(&txn).expect("commit");
}

// ============================================================================
// SECTION: Pooling
// ============================================================================

#[test]
fn pool_exhaustion_after_bounded_wait() {
    let engine = InMemoryEngine::new();
    let clock = Arc::new(ManualClock::starting_at(0));
    let config = RegistryConfig {
        pool_size: 1,
        ..test_config()
    };
    let registry = registry_with(&engine, config, clock);
    let _held = registry.begin().expect("first begin");
    let started = Instant::now();
    match registry.begin() {
        Err(RegistryError::PoolExhausted {
            waited_ms,
        }) => {
            assert!(waited_ms >= 50, "waited only {waited_ms} ms");
        }
        other => panic!("expected pool exhaustion, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn committed_transaction_returns_session_to_pool() {
    let engine = InMemoryEngine::new();
    let clock = Arc::new(ManualClock::starting_at(0));
    let config = RegistryConfig {
        pool_size: 1,
        ..test_config()
    };
    let registry = registry_with(&engine, config, clock);
    let first = registry.begin().expect("first begin");
    registry.commit(&first).expect("commit");
    let second = registry.begin().expect("second begin reuses the session");
    registry.rollback(&second).expect("rollback");
}

#[test]
fn zero_pool_size_is_rejected() {
    let engine = InMemoryEngine::new();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_at(0));
    let config = RegistryConfig {
        pool_size: 0,
        ..test_config()
    };
    assert!(TransactionRegistry::new(Arc::new(engine), config, clock).is_err());
}

// ============================================================================
// SECTION: Timeout Sweep
// ============================================================================

#[test]
fn sweep_reclaims_expired_transactions() {
    let (_engine, registry, clock) = registry();
    let txn = registry.begin().expect("begin");
    clock.advance(2_000);
    assert_eq!(registry.sweep_once(), 1);
    assert_eq!(registry.active_count(), 0);
    assert_eq!(registry.idle_sessions(), 2);
    assert!(matches!(registry.commit(&txn), Err(RegistryError::NotFound(_))));
}

#[test]
fn sweep_skips_young_transactions() {
    let (_engine, registry, clock) = registry();
    let txn = registry.begin().expect("begin");
    clock.advance(500);
    assert_eq!(registry.sweep_once(), 0);
    registry.commit(&txn).expect("still active");
}

#[test]
fn sweep_after_manual_commit_is_a_noop() {
    let (_engine, registry, clock) = registry();
    let txn = registry.begin().expect("begin");
    clock.advance(2_000);
    registry.commit(&txn).expect("commit wins the race");
    assert_eq!(registry.sweep_once(), 0);
    assert_eq!(registry.idle_sessions(), 2);
}

#[test]
fn sweeper_thread_reclaims_in_background() {
    let engine = InMemoryEngine::new();
    let clock = Arc::new(ManualClock::starting_at(0));
    let registry = Arc::new(registry_with(
        &engine,
        test_config(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));
    let _txn = registry.begin().expect("begin");
    clock.advance(2_000);
    let sweeper = TimeoutSweeper::spawn(Arc::clone(&registry)).expect("spawn sweeper");
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry.active_count() > 0 {
        assert!(Instant::now() < deadline, "sweeper did not reclaim in time");
        std::thread::sleep(Duration::from_millis(10));
    }
    drop(sweeper);
    assert_eq!(registry.idle_sessions(), 2);
}

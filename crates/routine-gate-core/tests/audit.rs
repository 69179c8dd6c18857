// crates/routine-gate-core/tests/audit.rs
// ============================================================================
// Module: Audit Sink Unit Tests
// Description: Buffering, batching, and day-keyed append tests for the sink.
// Purpose: Validate best-effort recording, dated file naming, and requeue of
//          failed flushes.
// ============================================================================

//! ## Overview
//! Tests for the buffered audit sink:
//! - Recorded entries reach dated newline-delimited JSON files
//! - Logical (test clock) timestamps group under a single day key
//! - A failed flush keeps the batch buffered and a later flush delivers it
//!   in order
//! - Recording is infallible from the caller's perspective
//! - Dropping the sink drains the buffer

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
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use routine_gate_core::ActorId;
use routine_gate_core::AuditAppender;
use routine_gate_core::AuditConfig;
use routine_gate_core::AuditEntry;
use routine_gate_core::AuditError;
use routine_gate_core::AuditSink;
use routine_gate_core::BufferedAuditSink;
use routine_gate_core::Timestamp;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config_for(dir: &TempDir) -> AuditConfig {
    AuditConfig {
        directory: dir.path().to_path_buf(),
        queue_capacity: 16,
        batch_max_entries: 8,
        flush_interval_ms: 60_000,
    }
}

fn entry(at: Timestamp, operation: &str) -> AuditEntry {
    AuditEntry {
        at,
        operation: operation.to_string(),
        actor: ActorId::new("tester"),
        detail: json!({ "n": operation }),
        success: true,
        error: None,
    }
}

fn read_lines(dir: &TempDir, file: &str) -> Vec<String> {
    let contents = std::fs::read_to_string(dir.path().join(file)).expect("read audit file");
    contents.lines().map(str::to_string).collect()
}

/// Appender that fails while armed and records successful appends.
struct FlakyAppender {
    /// When set, every append fails.
    failing: Arc<AtomicBool>,
    /// Lines delivered by successful appends, in order.
    delivered: Arc<Mutex<Vec<String>>>,
}

impl AuditAppender for FlakyAppender {
    fn append(&mut self, _day_key: &str, lines: &[String]) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Io("scripted append failure".to_string()));
        }
        self.delivered.lock().expect("delivered lock").extend(lines.iter().cloned());
        Ok(())
    }
}

// ============================================================================
// SECTION: File Appends
// ============================================================================

#[test]
fn flushed_entries_reach_the_dated_file() {
    let dir = TempDir::new().expect("tempdir");
    let sink = BufferedAuditSink::with_directory(config_for(&dir)).expect("sink");
    for index in 0 .. 3 {
        sink.record(entry(Timestamp::UnixMillis(0), &format!("op-{index}")));
    }
    sink.flush_now().expect("flush");
    let lines = read_lines(&dir, "audit-1970-01-01.ndjson");
    assert_eq!(lines.len(), 3);
    for (index, line) in lines.iter().enumerate() {
        let parsed: AuditEntry = serde_json::from_str(line).expect("entry parses");
        assert_eq!(parsed.operation, format!("op-{index}"));
        assert!(parsed.success);
    }
}

#[test]
fn logical_timestamps_group_under_one_key() {
    let dir = TempDir::new().expect("tempdir");
    let sink = BufferedAuditSink::with_directory(config_for(&dir)).expect("sink");
    sink.record(entry(Timestamp::Logical(1), "first"));
    sink.record(entry(Timestamp::Logical(2), "second"));
    sink.flush_now().expect("flush");
    let lines = read_lines(&dir, "audit-logical.ndjson");
    assert_eq!(lines.len(), 2);
}

#[test]
fn entries_split_across_days_land_in_separate_files() {
    let dir = TempDir::new().expect("tempdir");
    let sink = BufferedAuditSink::with_directory(config_for(&dir)).expect("sink");
    sink.record(entry(Timestamp::UnixMillis(0), "day-one"));
    sink.record(entry(Timestamp::UnixMillis(86_400_000), "day-two"));
    sink.flush_now().expect("flush");
    assert_eq!(read_lines(&dir, "audit-1970-01-01.ndjson").len(), 1);
    assert_eq!(read_lines(&dir, "audit-1970-01-02.ndjson").len(), 1);
}

#[test]
fn dropping_the_sink_drains_the_buffer() {
    let dir = TempDir::new().expect("tempdir");
    let sink = BufferedAuditSink::with_directory(config_for(&dir)).expect("sink");
    sink.record(entry(Timestamp::Logical(1), "final"));
    drop(sink);
    assert_eq!(read_lines(&dir, "audit-logical.ndjson").len(), 1);
}

// ============================================================================
// SECTION: Failure Handling
// ============================================================================

#[test]
fn failed_flush_requeues_and_retries_in_order() {
    let failing = Arc::new(AtomicBool::new(true));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let config = AuditConfig {
        directory: std::env::temp_dir(),
        queue_capacity: 16,
        batch_max_entries: 8,
        flush_interval_ms: 60_000,
    };
    let appender = FlakyAppender {
        failing: Arc::clone(&failing),
        delivered: Arc::clone(&delivered),
    };
    let sink = BufferedAuditSink::new(config, Box::new(appender)).expect("sink");
    sink.record(entry(Timestamp::Logical(1), "first"));
    sink.record(entry(Timestamp::Logical(2), "second"));
    assert!(sink.flush_now().is_err());
    assert!(delivered.lock().expect("delivered lock").is_empty());

    failing.store(false, Ordering::SeqCst);
    sink.flush_now().expect("retry succeeds");
    let lines = delivered.lock().expect("delivered lock").clone();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("first"));
    assert!(lines[1].contains("second"));
}

#[test]
fn recording_never_fails_when_the_queue_saturates() {
    let dir = TempDir::new().expect("tempdir");
    let config = AuditConfig {
        directory: dir.path().to_path_buf(),
        queue_capacity: 1,
        batch_max_entries: 64,
        flush_interval_ms: 60_000,
    };
    let sink = BufferedAuditSink::with_directory(config).expect("sink");
    // Saturating the bounded queue drops entries instead of blocking.
    for index in 0 .. 100 {
        sink.record(entry(Timestamp::Logical(index), "burst"));
    }
    sink.flush_now().expect("flush");
}

// ============================================================================
// SECTION: Config Validation
// ============================================================================

#[test]
fn zero_limits_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.queue_capacity = 0;
    assert!(matches!(
        BufferedAuditSink::with_directory(config),
        Err(AuditError::Invalid(_))
    ));

    let mut config = config_for(&dir);
    config.flush_interval_ms = 0;
    assert!(matches!(
        BufferedAuditSink::with_directory(config),
        Err(AuditError::Invalid(_))
    ));
}

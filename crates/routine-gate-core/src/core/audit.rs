// crates/routine-gate-core/src/core/audit.rs
// ============================================================================
// Module: Audit Sink
// Description: Durable, buffered, best-effort record of state-changing
//              operations.
// Purpose: Batch audit entries into periodic appends to dated log files.
// Dependencies: serde, serde_json, thiserror, time, tracing,
//               crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! The audit sink accepts entries on a bounded queue and drains them from a
//! background thread, batching by size threshold or periodic tick. Batches
//! append as newline-delimited JSON to one file per calendar day. Failed
//! flushes requeue at the front of the buffer and are retried on the next
//! tick; flush failures are logged, never surfaced to the recording caller.
//!
//! The sink must never block or fail an otherwise-successful operation: a
//! saturated queue logs a warning and drops the entry rather than stalling
//! the hot path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ActorId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Append-only audit record of one state-changing operation.
///
/// # Invariants
/// - Entries are immutable once recorded.
/// - `error` is `Some` only when `success` is `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Time the operation completed.
    pub at: Timestamp,
    /// Operation name, stable for grepping.
    pub operation: String,
    /// Identity that performed the operation.
    pub actor: ActorId,
    /// Opaque detail payload; not interpreted by the sink.
    pub detail: serde_json::Value,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error text for failed operations.
    pub error: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit sink errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - These errors are logged by the sink, never propagated to recording
///   callers.
#[derive(Debug, Error, Clone)]
pub enum AuditError {
    /// Durable append failed.
    #[error("audit append failed: {0}")]
    Io(String),
    /// Sink configuration is invalid.
    #[error("audit config invalid: {0}")]
    Invalid(String),
    /// Background worker is unavailable.
    #[error("audit worker unavailable: {0}")]
    Worker(String),
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the buffered audit sink.
///
/// # Invariants
/// - `queue_capacity`, `batch_max_entries`, and `flush_interval_ms` must be
///   greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Directory receiving dated audit log files.
    pub directory: PathBuf,
    /// Bounded queue capacity between callers and the flush thread.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Entry count that triggers an early flush.
    #[serde(default = "default_batch_max_entries")]
    pub batch_max_entries: usize,
    /// Periodic flush tick in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

/// Returns the default audit queue capacity.
const fn default_queue_capacity() -> usize {
    1_024
}

/// Returns the default flush batch size threshold.
const fn default_batch_max_entries() -> usize {
    64
}

/// Returns the default flush tick in milliseconds.
const fn default_flush_interval_ms() -> u64 {
    1_000
}

/// Validates audit sink limits.
fn validate_audit_config(config: &AuditConfig) -> Result<(), AuditError> {
    if config.queue_capacity == 0 {
        return Err(AuditError::Invalid("queue_capacity must be greater than zero".to_string()));
    }
    if config.batch_max_entries == 0 {
        return Err(AuditError::Invalid(
            "batch_max_entries must be greater than zero".to_string(),
        ));
    }
    if config.flush_interval_ms == 0 {
        return Err(AuditError::Invalid(
            "flush_interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Best-effort recorder of audit entries.
pub trait AuditSink: Send + Sync {
    /// Records an entry. Never fails and never blocks the caller beyond a
    /// bounded queue append.
    fn record(&self, entry: AuditEntry);
}

/// Sink that discards every entry. Used by tests and embedders that disable
/// auditing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

// ============================================================================
// SECTION: Appenders
// ============================================================================

/// Durable destination for flushed audit batches.
pub trait AuditAppender: Send {
    /// Appends serialized lines under the given calendar-day key.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the batch could not be made durable; the
    /// sink will requeue and retry the batch.
    fn append(&mut self, day_key: &str, lines: &[String]) -> Result<(), AuditError>;
}

/// Appender writing newline-delimited JSON to `audit-<day>.ndjson` files.
#[derive(Debug, Clone)]
pub struct DailyFileAppender {
    /// Directory receiving the dated files.
    directory: PathBuf,
}

impl DailyFileAppender {
    /// Creates the appender, ensuring the directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] when the directory cannot be created.
    pub fn new(directory: PathBuf) -> Result<Self, AuditError> {
        std::fs::create_dir_all(&directory)
            .map_err(|err| AuditError::Io(format!("create audit directory: {err}")))?;
        Ok(Self {
            directory,
        })
    }
}

impl AuditAppender for DailyFileAppender {
    fn append(&mut self, day_key: &str, lines: &[String]) -> Result<(), AuditError> {
        let path = self.directory.join(format!("audit-{day_key}.ndjson"));
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|err| AuditError::Io(format!("open {}: {err}", path.display())))?;
        for line in lines {
            file.write_all(line.as_bytes())
                .and_then(|()| file.write_all(b"\n"))
                .map_err(|err| AuditError::Io(format!("write {}: {err}", path.display())))?;
        }
        file.flush().map_err(|err| AuditError::Io(format!("flush {}: {err}", path.display())))
    }
}

/// Returns the calendar-day file key for a timestamp.
///
/// Logical timestamps (test clocks) group under a single `logical` key.
fn day_key(at: &Timestamp) -> String {
    match at {
        Timestamp::UnixMillis(millis) => {
            let seconds = millis.div_euclid(1_000);
            time::OffsetDateTime::from_unix_timestamp(seconds).map_or_else(
                |_| "unknown".to_string(),
                |moment| {
                    let date = moment.date();
                    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
                },
            )
        }
        Timestamp::Logical(_) => "logical".to_string(),
    }
}

// ============================================================================
// SECTION: Buffered Sink
// ============================================================================

/// Command envelope queued to the flush thread.
enum AuditCommand {
    /// Buffer one entry.
    Record(Box<AuditEntry>),
    /// Flush the buffer now and acknowledge the outcome.
    Flush(mpsc::Sender<Result<(), AuditError>>),
}

/// Buffered audit sink draining to an [`AuditAppender`] from a background
/// thread.
///
/// # Invariants
/// - Recording never blocks beyond the bounded queue append.
/// - Dropping the sink drains the buffer best-effort before the thread exits.
#[derive(Debug)]
pub struct BufferedAuditSink {
    /// Bounded queue into the flush thread; `None` once shut down.
    sender: Option<SyncSender<AuditCommand>>,
    /// Flush thread handle joined on drop.
    worker: Option<thread::JoinHandle<()>>,
}

impl BufferedAuditSink {
    /// Creates a sink flushing to the given appender.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the configuration is invalid or the flush
    /// thread cannot be spawned.
    pub fn new(
        config: AuditConfig,
        appender: Box<dyn AuditAppender>,
    ) -> Result<Self, AuditError> {
        validate_audit_config(&config)?;
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);
        let worker = thread::Builder::new()
            .name("rg-audit-flush".to_string())
            .spawn(move || audit_flush_loop(&config, appender, &receiver))
            .map_err(|err| AuditError::Worker(format!("spawn audit flush thread: {err}")))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Creates a sink flushing to dated files under the configured directory.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the directory cannot be created or the
    /// flush thread cannot be spawned.
    pub fn with_directory(config: AuditConfig) -> Result<Self, AuditError> {
        let appender = DailyFileAppender::new(config.directory.clone())?;
        Self::new(config, Box::new(appender))
    }

    /// Flushes buffered entries synchronously.
    ///
    /// Intended for shutdown paths and tests; operations being audited never
    /// call this.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the flush fails; failed entries remain
    /// buffered for retry.
    pub fn flush_now(&self) -> Result<(), AuditError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(AuditError::Worker("sink is shut down".to_string()));
        };
        let (ack, outcome) = mpsc::channel();
        sender
            .send(AuditCommand::Flush(ack))
            .map_err(|_| AuditError::Worker("flush thread disconnected".to_string()))?;
        outcome.recv().map_err(|_| AuditError::Worker("flush thread exited".to_string()))?
    }
}

impl AuditSink for BufferedAuditSink {
    fn record(&self, entry: AuditEntry) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        match sender.try_send(AuditCommand::Record(Box::new(entry))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("audit queue saturated; entry dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("audit flush thread gone; entry dropped");
            }
        }
    }
}

impl Drop for BufferedAuditSink {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// SECTION: Flush Loop
// ============================================================================

/// Drains queued entries into day-keyed batches on ticks, thresholds, and
/// explicit flush requests.
fn audit_flush_loop(
    config: &AuditConfig,
    mut appender: Box<dyn AuditAppender>,
    receiver: &mpsc::Receiver<AuditCommand>,
) {
    let tick = Duration::from_millis(config.flush_interval_ms);
    let mut pending: Vec<AuditEntry> = Vec::new();
    loop {
        match receiver.recv_timeout(tick) {
            Ok(AuditCommand::Record(entry)) => {
                pending.push(*entry);
                if pending.len() >= config.batch_max_entries
                    && let Err(err) = flush_pending(&mut pending, appender.as_mut())
                {
                    tracing::warn!(error = %err, "audit flush failed; batch requeued");
                }
            }
            Ok(AuditCommand::Flush(ack)) => {
                let outcome = flush_pending(&mut pending, appender.as_mut());
                if let Err(err) = &outcome {
                    tracing::warn!(error = %err, "audit flush failed; batch requeued");
                }
                let _ = ack.send(outcome);
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Err(err) = flush_pending(&mut pending, appender.as_mut()) {
                    tracing::warn!(error = %err, "audit flush failed; batch requeued");
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if let Err(err) = flush_pending(&mut pending, appender.as_mut()) {
                    tracing::warn!(error = %err, "final audit flush failed");
                }
                break;
            }
        }
    }
}

/// Flushes buffered entries as day-keyed batches, requeueing the unflushed
/// tail on failure.
fn flush_pending(
    pending: &mut Vec<AuditEntry>,
    appender: &mut dyn AuditAppender,
) -> Result<(), AuditError> {
    if pending.is_empty() {
        return Ok(());
    }
    let entries = std::mem::take(pending);
    let mut cursor = 0;
    while cursor < entries.len() {
        let key = day_key(&entries[cursor].at);
        let mut group_end = cursor + 1;
        while group_end < entries.len() && day_key(&entries[group_end].at) == key {
            group_end += 1;
        }
        let mut lines = Vec::with_capacity(group_end - cursor);
        for entry in &entries[cursor .. group_end] {
            match serde_json::to_string(entry) {
                Ok(line) => lines.push(line),
                Err(err) => {
                    tracing::warn!(error = %err, "unserializable audit entry skipped");
                }
            }
        }
        if let Err(err) = appender.append(&key, &lines) {
            pending.extend(entries.into_iter().skip(cursor));
            return Err(err);
        }
        cursor = group_end;
    }
    Ok(())
}

// crates/routine-gate-core/src/runtime/writes.rs
// ============================================================================
// Module: Write Statement Path
// Description: Gated execution of arbitrary write statements with a row
//              ceiling.
// Purpose: Run admitted writes inside owned transactions and bound their
//          blast radius.
// Dependencies: serde, serde_json, thiserror, tracing, crate::core,
//               crate::runtime::registry
// ============================================================================

//! ## Overview
//! The write path is the general-purpose transaction substrate: a statement
//! passes the admission gate, executes inside a registry-owned transaction,
//! and its affected-row count is checked against a configured ceiling.
//!
//! Transactions are either caller-supplied (the statement outcome is
//! surfaced and the transaction is left Active for the caller to decide) or
//! auto-created for the single call (committed on success, rolled back on
//! any failure, including a breached ceiling).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::core::admission::AdmissionGate;
use crate::core::audit::AuditEntry;
use crate::core::audit::AuditSink;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::TransactionId;
use crate::core::time::Clock;
use crate::interfaces::ParamMap;
use crate::runtime::registry::RegistryError;
use crate::runtime::registry::TransactionRegistry;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the write path.
///
/// # Invariants
/// - `max_affected_rows` must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteConfig {
    /// Ceiling on rows a single write may affect.
    #[serde(default = "default_max_affected_rows")]
    pub max_affected_rows: u64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            max_affected_rows: default_max_affected_rows(),
        }
    }
}

/// Returns the default affected-row ceiling.
const fn default_max_affected_rows() -> u64 {
    10_000
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Write path errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The admission gate rejected the statement; it was never executed.
    #[error("statement rejected: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// The write affected more rows than the configured ceiling.
    #[error("write affected {affected} rows (limit {limit})")]
    LimitExceeded {
        /// Rows the statement affected.
        affected: u64,
        /// Configured ceiling.
        limit: u64,
    },
    /// Transaction registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of one admitted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Transaction the statement ran in.
    pub transaction_id: TransactionId,
    /// Rows the statement affected.
    pub rows_affected: u64,
    /// Whether this call committed the transaction (auto-created only).
    pub committed: bool,
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Gated executor for arbitrary write statements.
pub struct WriteExecutor {
    /// Statement admission gate.
    gate: AdmissionGate,
    /// Transaction registry owning the execution.
    registry: Arc<TransactionRegistry>,
    /// Best-effort operation audit.
    audit: Arc<dyn AuditSink>,
    /// Time source for audit stamps.
    clock: Arc<dyn Clock>,
    /// Write path configuration.
    config: WriteConfig,
    /// Identity recorded in audit entries.
    actor: ActorId,
}

impl WriteExecutor {
    /// Creates an executor over the given collaborators.
    #[must_use]
    pub const fn new(
        gate: AdmissionGate,
        registry: Arc<TransactionRegistry>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: WriteConfig,
        actor: ActorId,
    ) -> Self {
        Self {
            gate,
            registry,
            audit,
            clock,
            config,
            actor,
        }
    }

    /// Executes an admitted write, auto-creating a transaction when the
    /// caller supplies none.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Validation`] for rejected statements,
    /// [`WriteError::LimitExceeded`] when the row ceiling is breached, or
    /// [`WriteError::Registry`] for pool, lookup, and engine failures. An
    /// auto-created transaction is rolled back on every failure path.
    pub fn execute_write(
        &self,
        statement: &str,
        params: &ParamMap,
        transaction_id: Option<&TransactionId>,
    ) -> Result<WriteOutcome, WriteError> {
        let kind = self.gate.classify(statement);
        let result = self.execute_write_inner(statement, params, transaction_id);
        self.audit.record(AuditEntry {
            at: self.clock.now(),
            operation: "execute_write".to_string(),
            actor: self.actor.clone(),
            detail: json!({
                "statement": statement,
                "classified": kind,
                "rows_affected": result.as_ref().ok().map(|outcome| outcome.rows_affected),
            }),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    /// Executes the write workflow.
    fn execute_write_inner(
        &self,
        statement: &str,
        params: &ParamMap,
        transaction_id: Option<&TransactionId>,
    ) -> Result<WriteOutcome, WriteError> {
        let validation = self.gate.validate(statement);
        if !validation.valid {
            return Err(WriteError::Validation(validation.violations));
        }
        let (transaction_id, auto_created) = match transaction_id {
            Some(id) => (id.clone(), false),
            None => (self.registry.begin()?, true),
        };
        let rows_affected = match self.registry.execute(&transaction_id, statement, params) {
            Ok(rows) => rows,
            Err(err) => {
                if auto_created {
                    self.abandon(&transaction_id);
                }
                return Err(err.into());
            }
        };
        if rows_affected > self.config.max_affected_rows {
            if auto_created {
                self.abandon(&transaction_id);
            }
            return Err(WriteError::LimitExceeded {
                affected: rows_affected,
                limit: self.config.max_affected_rows,
            });
        }
        if auto_created {
            if let Err(err) = self.registry.commit(&transaction_id) {
                self.abandon(&transaction_id);
                return Err(err.into());
            }
        }
        Ok(WriteOutcome {
            transaction_id,
            rows_affected,
            committed: auto_created,
        })
    }

    /// Best-effort rollback of an auto-created transaction.
    fn abandon(&self, transaction_id: &TransactionId) {
        if let Err(err) = self.registry.rollback(transaction_id) {
            tracing::warn!(
                transaction_id = %transaction_id,
                error = %err,
                "rollback of auto-created transaction failed; sweep will reclaim",
            );
        }
    }
}

// crates/routine-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Routine Gate Interfaces
// Description: Backend-agnostic interfaces for engine access and version
//              storage.
// Purpose: Define the contract surfaces used by the Routine Gate runtime.
// Dependencies: serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how Routine Gate talks to a relational engine and to a
//! version history store without embedding backend-specific details.
//! Implementations must fail closed: an error from the engine is surfaced,
//! never swallowed, and partial results are never fabricated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::RoutineName;
use crate::core::identifiers::SchemaName;
use crate::core::identifiers::VersionNumber;
use crate::core::version::RoutineVersion;
use crate::core::version::SaveVersionRequest;

// ============================================================================
// SECTION: Statement Values
// ============================================================================

/// Named parameters supplied with a statement or routine invocation.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;

/// Tabular result of a query or routine invocation.
///
/// # Invariants
/// - Every row has exactly `columns.len()` values, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RowSet {
    /// Result column names, in order.
    pub columns: Vec<String>,
    /// Result rows; values align with `columns`.
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    /// Returns the number of rows in the result.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ============================================================================
// SECTION: Engine Access
// ============================================================================

/// Relational engine errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// A connection could not be established.
    #[error("engine connect failed: {0}")]
    Connect(String),
    /// The engine rejected or failed a statement.
    #[error("engine statement failed: {0}")]
    Statement(String),
}

/// Exclusive session on one engine connection.
///
/// A session is owned by exactly one holder at a time; the transaction
/// registry enforces the one-transaction-per-connection invariant above this
/// trait.
pub trait EngineSession: Send {
    /// Executes a statement, returning the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the engine rejects or fails the statement.
    fn execute(&mut self, statement: &str, params: &ParamMap) -> Result<u64, EngineError>;

    /// Runs a query, returning its rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the engine rejects or fails the query.
    fn query(&mut self, statement: &str, params: &ParamMap) -> Result<RowSet, EngineError>;

    /// Starts an engine-level transaction on this session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the transaction cannot be started.
    fn begin(&mut self) -> Result<(), EngineError>;

    /// Commits the engine-level transaction on this session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the commit fails.
    fn commit(&mut self) -> Result<(), EngineError>;

    /// Rolls back the engine-level transaction on this session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the rollback fails.
    fn rollback(&mut self) -> Result<(), EngineError>;

    /// Invokes a routine with named parameters, returning its result rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the routine is missing or fails.
    fn call_routine(
        &mut self,
        schema: &SchemaName,
        name: &RoutineName,
        params: &ParamMap,
    ) -> Result<RowSet, EngineError>;

    /// Reads a routine's current definition from the engine catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the catalog cannot be read. A missing
    /// routine is `Ok(None)`, not an error.
    fn routine_definition(
        &mut self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Option<String>, EngineError>;
}

/// Factory for exclusive engine sessions.
pub trait EngineConnector: Send + Sync {
    /// Opens a new session against the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the connection cannot be established.
    fn connect(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

// ============================================================================
// SECTION: Version Store
// ============================================================================

/// Version store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone)]
pub enum VersionStoreError {
    /// Backing store failure.
    #[error("version store error: {0}")]
    Store(String),
    /// Invalid stored data or request.
    #[error("version store invalid data: {0}")]
    Invalid(String),
}

/// Persistent history of routine definition snapshots.
///
/// Implementations must serialize the read-max-then-insert sequence per
/// (schema, name) so concurrent saves yield distinct, contiguous version
/// numbers, and must prune to their configured retention after each save.
pub trait VersionStore: Send + Sync {
    /// Idempotently creates the backing persistent structure.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] when the structure cannot be created.
    fn ensure_store(&self) -> Result<(), VersionStoreError>;

    /// Persists a new snapshot, assigning the next version number.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] when the snapshot cannot be persisted.
    fn save_version(&self, request: &SaveVersionRequest)
    -> Result<VersionNumber, VersionStoreError>;

    /// Loads one snapshot by exact version.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] on store failure; a missing version is
    /// `Ok(None)`.
    fn get_version(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        version: VersionNumber,
    ) -> Result<Option<RoutineVersion>, VersionStoreError>;

    /// Loads the most recent snapshot for a routine.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] on store failure; no history is
    /// `Ok(None)`.
    fn get_latest(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Option<RoutineVersion>, VersionStoreError>;

    /// Lists snapshots for a routine, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`VersionStoreError`] on store failure.
    fn list_versions(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Vec<RoutineVersion>, VersionStoreError>;
}

// crates/routine-gate-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Engine and Version Store
// Description: Reference implementations of the engine and version-store
//              interfaces backed by process memory.
// Purpose: Back unit tests and local development without a live engine.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryEngine`] models just enough of a relational engine to exercise
//! the lifecycle workflows: it applies `CREATE {PROCEDURE | FUNCTION}` and
//! `DROP {PROCEDURE | FUNCTION}` statements to a routine catalog, buffers
//! catalog changes inside engine-level transactions so rollback undoes them,
//! and lets tests script statement failures, affected-row counts, and
//! routine results.
//!
//! [`InMemoryVersionStore`] mirrors the durable store's numbering and
//! retention behavior behind a single map mutex.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::core::identifiers::RoutineName;
use crate::core::identifiers::SchemaName;
use crate::core::identifiers::VersionNumber;
use crate::core::routines::parse_defining_clause;
use crate::core::routines::split_qualified_target;
use crate::core::version::RoutineVersion;
use crate::core::version::SaveVersionRequest;
use crate::interfaces::EngineConnector;
use crate::interfaces::EngineError;
use crate::interfaces::EngineSession;
use crate::interfaces::ParamMap;
use crate::interfaces::RowSet;
use crate::interfaces::VersionStore;
use crate::interfaces::VersionStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema assumed for unqualified defining-clause targets.
const DEFAULT_SCHEMA: &str = "dbo";

// ============================================================================
// SECTION: Engine State
// ============================================================================

/// Catalog key: lowercased (schema, routine name).
type RoutineKey = (String, String);

/// Builds a catalog key from raw parts.
fn routine_key(schema: &str, name: &str) -> RoutineKey {
    (schema.to_ascii_lowercase(), name.to_ascii_lowercase())
}

/// Committed engine state shared by every session.
#[derive(Debug, Default)]
struct EngineState {
    /// Routine catalog: key to full definition text.
    routines: HashMap<RoutineKey, String>,
    /// Scripted results returned by routine invocations.
    routine_results: HashMap<RoutineKey, RowSet>,
    /// Statement fragments that make execution fail.
    failure_fragments: Vec<String>,
    /// Statement fragments mapped to scripted affected-row counts.
    affected_overrides: Vec<(String, u64)>,
    /// Journal of every executed statement text.
    executed: Vec<String>,
}

/// Catalog mutation buffered inside a session transaction.
#[derive(Debug, Clone)]
enum PendingOp {
    /// Create or replace a routine.
    Create {
        /// Catalog key of the routine.
        key: RoutineKey,
        /// Full definition text.
        definition: String,
    },
    /// Drop a routine.
    Drop {
        /// Catalog key of the routine.
        key: RoutineKey,
    },
}

impl PendingOp {
    /// Applies the mutation to the committed catalog.
    fn apply(self, routines: &mut HashMap<RoutineKey, String>) {
        match self {
            Self::Create {
                key,
                definition,
            } => {
                routines.insert(key, definition);
            }
            Self::Drop {
                key,
            } => {
                routines.remove(&key);
            }
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// In-memory relational engine for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    /// Shared committed state.
    state: Arc<Mutex<EngineState>>,
}

impl InMemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the shared state, recovering from poison.
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every statement containing `fragment` fail.
    pub fn fail_statements_containing(&self, fragment: impl Into<String>) {
        self.lock_state().failure_fragments.push(fragment.into().to_ascii_lowercase());
    }

    /// Clears scripted statement failures.
    pub fn clear_failures(&self) {
        self.lock_state().failure_fragments.clear();
    }

    /// Scripts the affected-row count for statements containing `fragment`.
    pub fn script_affected_rows(&self, fragment: impl Into<String>, rows: u64) {
        self.lock_state().affected_overrides.push((fragment.into().to_ascii_lowercase(), rows));
    }

    /// Scripts the result returned when the given routine is invoked.
    pub fn script_routine_result(&self, schema: &SchemaName, name: &RoutineName, result: RowSet) {
        self.lock_state()
            .routine_results
            .insert(routine_key(schema.as_str(), name.as_str()), result);
    }

    /// Returns the committed definition of a routine, if present.
    #[must_use]
    pub fn definition_of(&self, schema: &SchemaName, name: &RoutineName) -> Option<String> {
        self.lock_state().routines.get(&routine_key(schema.as_str(), name.as_str())).cloned()
    }

    /// Returns the number of committed routines.
    #[must_use]
    pub fn routine_count(&self) -> usize {
        self.lock_state().routines.len()
    }

    /// Returns every executed statement text, in order.
    #[must_use]
    pub fn executed_statements(&self) -> Vec<String> {
        self.lock_state().executed.clone()
    }
}

impl EngineConnector for InMemoryEngine {
    fn connect(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        Ok(Box::new(InMemorySession {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            in_transaction: false,
        }))
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// One engine session over the shared state.
#[derive(Debug)]
struct InMemorySession {
    /// Shared committed state.
    state: Arc<Mutex<EngineState>>,
    /// Catalog mutations buffered until commit.
    pending: Vec<PendingOp>,
    /// Whether an engine-level transaction is open.
    in_transaction: bool,
}

impl InMemorySession {
    /// Locks the shared state, recovering from poison.
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a routine definition as visible to this session, overlaying
    /// buffered mutations on the committed catalog.
    fn visible_definition(&self, key: &RoutineKey) -> Option<String> {
        let mut definition = self.lock_state().routines.get(key).cloned();
        for op in &self.pending {
            match op {
                PendingOp::Create {
                    key: pending_key,
                    definition: pending_definition,
                } if pending_key == key => {
                    definition = Some(pending_definition.clone());
                }
                PendingOp::Drop {
                    key: pending_key,
                } if pending_key == key => {
                    definition = None;
                }
                _ => {}
            }
        }
        definition
    }

    /// Interprets a statement as a catalog mutation, when it is one.
    fn parse_catalog_op(&self, statement: &str) -> Result<Option<PendingOp>, EngineError> {
        if let Some(clause) = parse_defining_clause(statement) {
            let (schema, name) = split_qualified_target(clause.target(statement));
            let key = routine_key(schema.as_deref().unwrap_or(DEFAULT_SCHEMA), &name);
            return Ok(Some(PendingOp::Create {
                key,
                definition: statement.to_string(),
            }));
        }
        let tokens: Vec<String> = statement
            .trim_end_matches(';')
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect();
        let [verb, kind, rest @ ..] = tokens.as_slice() else {
            return Ok(None);
        };
        if verb != "drop" || !matches!(kind.as_str(), "procedure" | "proc" | "function") {
            return Ok(None);
        }
        let (if_exists, target) = match rest {
            [first, second, target] if first == "if" && second == "exists" => (true, target),
            [target] => (false, target),
            _ => {
                return Err(EngineError::Statement(format!(
                    "malformed drop statement: {statement}"
                )));
            }
        };
        let (schema, name) = split_qualified_target(target);
        let key = routine_key(schema.as_deref().unwrap_or(DEFAULT_SCHEMA), &name);
        if !if_exists && self.visible_definition(&key).is_none() {
            return Err(EngineError::Statement(format!("unknown routine: {target}")));
        }
        Ok(Some(PendingOp::Drop {
            key,
        }))
    }

    /// Returns the scripted failure for a statement, if any is configured.
    fn scripted_failure(&self, statement: &str) -> Option<EngineError> {
        let lowered = statement.to_ascii_lowercase();
        let state = self.lock_state();
        state
            .failure_fragments
            .iter()
            .find(|fragment| lowered.contains(fragment.as_str()))
            .map(|fragment| EngineError::Statement(format!("scripted failure: {fragment}")))
    }

    /// Returns the affected-row count for a non-catalog statement.
    fn affected_rows(&self, statement: &str) -> u64 {
        let lowered = statement.to_ascii_lowercase();
        let state = self.lock_state();
        for (fragment, rows) in &state.affected_overrides {
            if lowered.contains(fragment.as_str()) {
                return *rows;
            }
        }
        let verb = lowered.split_whitespace().next().unwrap_or("");
        u64::from(matches!(verb, "insert" | "update" | "delete" | "merge"))
    }
}

impl EngineSession for InMemorySession {
    fn execute(&mut self, statement: &str, _params: &ParamMap) -> Result<u64, EngineError> {
        self.lock_state().executed.push(statement.to_string());
        if let Some(failure) = self.scripted_failure(statement) {
            return Err(failure);
        }
        if let Some(op) = self.parse_catalog_op(statement)? {
            if self.in_transaction {
                self.pending.push(op);
            } else {
                op.apply(&mut self.lock_state().routines);
            }
            return Ok(0);
        }
        Ok(self.affected_rows(statement))
    }

    fn query(&mut self, statement: &str, _params: &ParamMap) -> Result<RowSet, EngineError> {
        self.lock_state().executed.push(statement.to_string());
        if let Some(failure) = self.scripted_failure(statement) {
            return Err(failure);
        }
        Ok(RowSet::default())
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        if self.in_transaction {
            return Err(EngineError::Statement("transaction already open".to_string()));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        if !self.in_transaction {
            return Err(EngineError::Statement("no open transaction".to_string()));
        }
        let ops = std::mem::take(&mut self.pending);
        let mut state = self.lock_state();
        for op in ops {
            op.apply(&mut state.routines);
        }
        drop(state);
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        if !self.in_transaction {
            return Err(EngineError::Statement("no open transaction".to_string()));
        }
        self.pending.clear();
        self.in_transaction = false;
        Ok(())
    }

    fn call_routine(
        &mut self,
        schema: &SchemaName,
        name: &RoutineName,
        _params: &ParamMap,
    ) -> Result<RowSet, EngineError> {
        let key = routine_key(schema.as_str(), name.as_str());
        if self.visible_definition(&key).is_none() {
            return Err(EngineError::Statement(format!("unknown routine: {schema}.{name}")));
        }
        Ok(self.lock_state().routine_results.get(&key).cloned().unwrap_or_default())
    }

    fn routine_definition(
        &mut self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Option<String>, EngineError> {
        Ok(self.visible_definition(&routine_key(schema.as_str(), name.as_str())))
    }
}

// ============================================================================
// SECTION: Version Store
// ============================================================================

/// In-memory [`VersionStore`] with the durable store's numbering and
/// retention behavior.
#[derive(Debug)]
pub struct InMemoryVersionStore {
    /// Most recent snapshots kept per routine.
    keep_versions: usize,
    /// Snapshots keyed by (schema, name), oldest first.
    inner: Mutex<HashMap<RoutineKey, Vec<RoutineVersion>>>,
}

impl InMemoryVersionStore {
    /// Creates a store retaining the `keep_versions` most recent snapshots
    /// per routine (minimum 1).
    #[must_use]
    pub fn new(keep_versions: usize) -> Self {
        Self {
            keep_versions: keep_versions.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Locks the snapshot map, recovering from poison.
    fn lock_inner(&self) -> MutexGuard<'_, HashMap<RoutineKey, Vec<RoutineVersion>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryVersionStore {
    fn default() -> Self {
        Self::new(5)
    }
}

impl VersionStore for InMemoryVersionStore {
    fn ensure_store(&self) -> Result<(), VersionStoreError> {
        Ok(())
    }

    fn save_version(
        &self,
        request: &SaveVersionRequest,
    ) -> Result<VersionNumber, VersionStoreError> {
        let mut inner = self.lock_inner();
        let versions = inner
            .entry(routine_key(request.schema.as_str(), request.name.as_str()))
            .or_default();
        let next = versions.last().map_or(1, |snapshot| snapshot.version.get() + 1);
        let version = VersionNumber::from_raw(next)
            .ok_or_else(|| VersionStoreError::Invalid("version overflow".to_string()))?;
        versions.push(RoutineVersion {
            schema: request.schema.clone(),
            name: request.name.clone(),
            version,
            definition: request.definition.clone(),
            created_at: request.created_at,
            created_by: request.created_by.clone(),
            comment: request.comment.clone(),
        });
        if versions.len() > self.keep_versions {
            let excess = versions.len() - self.keep_versions;
            versions.drain(.. excess);
        }
        Ok(version)
    }

    fn get_version(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        version: VersionNumber,
    ) -> Result<Option<RoutineVersion>, VersionStoreError> {
        Ok(self
            .lock_inner()
            .get(&routine_key(schema.as_str(), name.as_str()))
            .and_then(|versions| {
                versions.iter().find(|snapshot| snapshot.version == version).cloned()
            }))
    }

    fn get_latest(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Option<RoutineVersion>, VersionStoreError> {
        Ok(self
            .lock_inner()
            .get(&routine_key(schema.as_str(), name.as_str()))
            .and_then(|versions| versions.last().cloned()))
    }

    fn list_versions(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Vec<RoutineVersion>, VersionStoreError> {
        Ok(self
            .lock_inner()
            .get(&routine_key(schema.as_str(), name.as_str()))
            .map(|versions| versions.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

// crates/routine-gate-core/src/runtime/lifecycle.rs
// ============================================================================
// Module: Lifecycle Orchestrator
// Description: Draft creation, isolated testing, atomic deploy, and rollback
//              of routine definitions.
// Purpose: Coordinate the gate, registry, and version store so production
//          swaps always leave a recoverable prior version.
// Dependencies: serde_json, thiserror, tracing, crate::core,
//               crate::interfaces, crate::runtime::registry
// ============================================================================

//! ## Overview
//! The orchestrator is a stateless coordinator: it owns no state across
//! calls and borrows the registry and version store for the duration of one
//! workflow step. Deploy ordering is the heart of the module: the outgoing
//! production definition is snapshotted before production is touched, the
//! drop-and-create swap runs inside one registry transaction, and the draft
//! is deleted only after a successful commit. A failed swap rolls back and
//! leaves the draft and the already-saved backup untouched, so the deploy is
//! retryable.
//!
//! `deploy_draft` and `rollback` on the same routine are not mutually fenced
//! here; concurrent calls serialize only at the engine's lock level.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::core::admission::AdmissionGate;
use crate::core::audit::AuditEntry;
use crate::core::audit::AuditSink;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::RoutineName;
use crate::core::identifiers::SchemaName;
use crate::core::identifiers::VersionNumber;
use crate::core::routines::RoutineKind;
use crate::core::routines::parse_defining_clause;
use crate::core::routines::rewrite_draft_to_production;
use crate::core::routines::rewrite_target_to_draft;
use crate::core::time::Clock;
use crate::core::version::SaveVersionRequest;
use crate::interfaces::EngineConnector;
use crate::interfaces::EngineError;
use crate::interfaces::ParamMap;
use crate::interfaces::RowSet;
use crate::interfaces::VersionStore;
use crate::interfaces::VersionStoreError;
use crate::runtime::registry::RegistryError;
use crate::runtime::registry::TransactionRegistry;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the lifecycle orchestrator.
///
/// # Invariants
/// - `draft_namespace` is non-empty, has no dots, and never names a
///   production schema.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Isolated namespace holding staged drafts.
    #[serde(default = "default_draft_namespace")]
    pub draft_namespace: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            draft_namespace: default_draft_namespace(),
        }
    }
}

/// Returns the default draft namespace.
fn default_draft_namespace() -> String {
    "routine_drafts".to_string()
}

/// Validates the lifecycle configuration.
fn validate_lifecycle_config(config: &LifecycleConfig) -> Result<(), LifecycleError> {
    let namespace = config.draft_namespace.as_str();
    if namespace.is_empty()
        || namespace.contains('.')
        || namespace.chars().any(char::is_whitespace)
    {
        return Err(LifecycleError::Validation(vec![format!(
            "draft namespace is not a valid identifier: {namespace:?}"
        )]));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lifecycle workflow errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The admission gate rejected the definition; it was never executed.
    #[error("definition rejected: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// A draft or stored version was missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// Transaction registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Version store failure.
    #[error(transparent)]
    Versions(#[from] VersionStoreError),
    /// Engine failure outside a registry transaction.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Stateless coordinator of the draft, deploy, and rollback workflows.
pub struct LifecycleOrchestrator {
    /// Statement admission gate.
    gate: AdmissionGate,
    /// Transaction registry used for atomic swaps.
    registry: Arc<TransactionRegistry>,
    /// Routine version history.
    versions: Arc<dyn VersionStore>,
    /// Direct engine access for drafts and catalog reads.
    connector: Arc<dyn EngineConnector>,
    /// Best-effort operation audit.
    audit: Arc<dyn AuditSink>,
    /// Time source for version and audit stamps.
    clock: Arc<dyn Clock>,
    /// Orchestrator configuration.
    config: LifecycleConfig,
    /// Identity recorded in snapshots and audit entries.
    actor: ActorId,
}

impl LifecycleOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] when the configuration is
    /// invalid.
    #[allow(clippy::too_many_arguments, reason = "One-time wiring of injected collaborators.")]
    pub fn new(
        gate: AdmissionGate,
        registry: Arc<TransactionRegistry>,
        versions: Arc<dyn VersionStore>,
        connector: Arc<dyn EngineConnector>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
        actor: ActorId,
    ) -> Result<Self, LifecycleError> {
        validate_lifecycle_config(&config)?;
        versions.ensure_store()?;
        Ok(Self {
            gate,
            registry,
            versions,
            connector,
            audit,
            clock,
            config,
            actor,
        })
    }

    /// Returns the draft namespace as a schema name.
    fn draft_schema(&self) -> SchemaName {
        SchemaName::new(self.config.draft_namespace.clone())
    }

    /// Records an audit entry for a finished operation.
    fn audit_outcome<T>(
        &self,
        operation: &str,
        detail: serde_json::Value,
        result: &Result<T, LifecycleError>,
    ) {
        self.audit.record(AuditEntry {
            at: self.clock.now(),
            operation: operation.to_string(),
            actor: self.actor.clone(),
            detail,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        });
    }

    /// Stages a routine definition as a draft in the isolated namespace.
    ///
    /// A pre-existing draft of the same name is replaced. The rewrite touches
    /// only the defining clause's target identifier; the body is
    /// byte-identical.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] when the gate rejects the
    /// definition or it is not a routine-creation statement, or
    /// [`LifecycleError::Engine`] when staging fails.
    pub fn create_draft(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        definition: &str,
    ) -> Result<(), LifecycleError> {
        let detail = json!({ "schema": schema, "name": name });
        let result = self.create_draft_inner(name, definition);
        self.audit_outcome("create_draft", detail, &result);
        result
    }

    /// Executes the draft creation workflow.
    fn create_draft_inner(
        &self,
        name: &RoutineName,
        definition: &str,
    ) -> Result<(), LifecycleError> {
        let validation = self.gate.validate(definition);
        if !validation.valid {
            return Err(LifecycleError::Validation(validation.violations));
        }
        let Some((kind, rewritten)) =
            rewrite_target_to_draft(definition, &self.config.draft_namespace, name)
        else {
            return Err(LifecycleError::Validation(vec![
                "definition is not a routine-creation statement".to_string(),
            ]));
        };
        let mut session = self.connector.connect()?;
        let params = ParamMap::new();
        session.execute(&drop_statement(kind, &self.draft_schema(), name), &params)?;
        session.execute(&rewritten, &params)?;
        Ok(())
    }

    /// Executes a draft directly with named parameters, returning its rows.
    ///
    /// Drafts have no production side effects by construction, so this runs
    /// on a direct session rather than through the registry.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when no draft exists, or
    /// [`LifecycleError::Engine`] when the invocation fails.
    pub fn test_draft(
        &self,
        name: &RoutineName,
        params: &ParamMap,
    ) -> Result<RowSet, LifecycleError> {
        let detail = json!({ "name": name });
        let result = self.test_draft_inner(name, params);
        self.audit_outcome("test_draft", detail, &result);
        result
    }

    /// Executes the draft test workflow.
    fn test_draft_inner(
        &self,
        name: &RoutineName,
        params: &ParamMap,
    ) -> Result<RowSet, LifecycleError> {
        let draft_schema = self.draft_schema();
        let mut session = self.connector.connect()?;
        if session.routine_definition(&draft_schema, name)?.is_none() {
            return Err(LifecycleError::NotFound(format!("no draft for routine {name}")));
        }
        Ok(session.call_routine(&draft_schema, name, params)?)
    }

    /// Atomically deploys the draft to production, backing up the outgoing
    /// definition first.
    ///
    /// Returns the backup version number, or `None` on a first deploy with
    /// nothing to back up.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when no draft exists. A failure
    /// during the swap rolls the transaction back and leaves the draft and
    /// the saved backup untouched.
    pub fn deploy_draft(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        comment: Option<String>,
    ) -> Result<Option<VersionNumber>, LifecycleError> {
        let detail = json!({ "schema": schema, "name": name, "comment": &comment });
        let result = self.deploy_draft_inner(schema, name, comment);
        self.audit_outcome("deploy_draft", detail, &result);
        result
    }

    /// Executes the deploy workflow.
    fn deploy_draft_inner(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        comment: Option<String>,
    ) -> Result<Option<VersionNumber>, LifecycleError> {
        let draft_schema = self.draft_schema();
        let mut session = self.connector.connect()?;
        let draft_definition = session
            .routine_definition(&draft_schema, name)?
            .ok_or_else(|| LifecycleError::NotFound(format!("no draft for routine {name}")))?;
        let production_definition = session.routine_definition(schema, name)?;

        // Backup precedes any mutation of production.
        let backup = match &production_definition {
            Some(definition) => Some(self.versions.save_version(&SaveVersionRequest {
                schema: schema.clone(),
                name: name.clone(),
                definition: definition.clone(),
                created_at: self.clock.now(),
                created_by: self.actor.clone(),
                comment,
            })?),
            None => None,
        };

        let rewritten =
            rewrite_draft_to_production(&draft_definition, &self.config.draft_namespace, schema);
        let draft_kind = routine_kind_of(&draft_definition);
        let production_kind = production_definition.as_deref().map(routine_kind_of);

        self.swap_production(schema, name, production_kind, &rewritten)?;

        // Draft cleanup is outside the committed swap; a failure here leaves
        // a stale draft that the next create_draft replaces.
        let params = ParamMap::new();
        if let Err(err) =
            session.execute(&drop_statement(draft_kind, &draft_schema, name), &params)
        {
            tracing::warn!(name = %name, error = %err, "failed to delete deployed draft");
        }
        Ok(backup)
    }

    /// Restores a stored snapshot as the production definition.
    ///
    /// Resolves the latest snapshot when `version` is omitted. Rollback is a
    /// restore, not a new deploy: it does not snapshot the definition being
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] when no matching snapshot
    /// exists. A failure during the restore rolls the transaction back.
    pub fn rollback(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        version: Option<VersionNumber>,
    ) -> Result<VersionNumber, LifecycleError> {
        let detail = json!({ "schema": schema, "name": name, "version": version });
        let result = self.rollback_inner(schema, name, version);
        self.audit_outcome("rollback", detail, &result);
        result
    }

    /// Executes the rollback workflow.
    fn rollback_inner(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        version: Option<VersionNumber>,
    ) -> Result<VersionNumber, LifecycleError> {
        let snapshot = match version {
            Some(version) => self.versions.get_version(schema, name, version)?,
            None => self.versions.get_latest(schema, name)?,
        }
        .ok_or_else(|| {
            LifecycleError::NotFound(format!("no stored version for {schema}.{name}"))
        })?;
        let mut session = self.connector.connect()?;
        let production_kind = session
            .routine_definition(schema, name)?
            .as_deref()
            .map(routine_kind_of);
        self.swap_production(schema, name, production_kind, &snapshot.definition)?;
        Ok(snapshot.version)
    }

    /// Drops the current production routine (when present) and creates the
    /// replacement inside one registry transaction.
    fn swap_production(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        current_kind: Option<RoutineKind>,
        replacement: &str,
    ) -> Result<(), LifecycleError> {
        let transaction_id = self.registry.begin()?;
        let params = ParamMap::new();
        let swap = current_kind
            .map_or(Ok(0), |kind| {
                self.registry.execute(&transaction_id, &drop_statement(kind, schema, name), &params)
            })
            .and_then(|_| self.registry.execute(&transaction_id, replacement, &params))
            .and_then(|_| self.registry.commit(&transaction_id).map(|()| 0));
        if let Err(err) = swap {
            if let Err(rollback_err) = self.registry.rollback(&transaction_id) {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    error = %rollback_err,
                    "rollback after failed swap did not complete; sweep will reclaim",
                );
            }
            return Err(err.into());
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Statement Builders
// ============================================================================

/// Builds the conditional drop statement for a routine.
fn drop_statement(kind: RoutineKind, schema: &SchemaName, name: &RoutineName) -> String {
    format!("DROP {} IF EXISTS {}.{};", kind.drop_keyword(), schema, name)
}

/// Returns the routine kind named by a definition, defaulting to procedure.
fn routine_kind_of(definition: &str) -> RoutineKind {
    parse_defining_clause(definition).map_or(RoutineKind::Procedure, |clause| clause.kind)
}

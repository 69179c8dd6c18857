// crates/routine-gate-core/src/lib.rs
// ============================================================================
// Module: Routine Gate Core
// Description: Transactional lifecycle manager for database routines.
// Purpose: Crate root re-exporting the public surface.
// Dependencies: crate modules
// ============================================================================

//! ## Overview
//! Routine Gate manages the safe, auditable, versioned modification of
//! executable database routines in a live relational engine, plus a
//! general-purpose transaction substrate for arbitrary write statements. It
//! serves an automated caller that must be prevented from corrupting
//! production routines, running unbounded writes, or leaving dangling
//! transactions.
//!
//! The core is four tightly coupled pieces:
//! - an [`crate::core::admission::AdmissionGate`] that accepts or rejects raw
//!   statements before anything executes;
//! - a [`crate::runtime::registry::TransactionRegistry`] owning in-flight
//!   transactions, their pooled sessions, and a timeout sweep;
//! - a [`crate::interfaces::VersionStore`] of immutable routine definition
//!   snapshots;
//! - a [`crate::runtime::lifecycle::LifecycleOrchestrator`] driving the
//!   draft → test → deploy → rollback workflow with an atomic production
//!   swap and a guaranteed recoverable prior version.

/// Aggregate configuration loading.
pub mod config;
/// Pure value types and leaf components.
pub mod core;
/// Backend-agnostic engine and storage interfaces.
pub mod interfaces;
/// Registry, orchestrator, write path, and in-memory backends.
pub mod runtime;

pub use crate::config::ConfigError;
pub use crate::config::RoutineGateConfig;
pub use crate::core::ActorId;
pub use crate::core::AdmissionConfig;
pub use crate::core::AdmissionGate;
pub use crate::core::AuditAppender;
pub use crate::core::AuditConfig;
pub use crate::core::AuditEntry;
pub use crate::core::AuditError;
pub use crate::core::AuditSink;
pub use crate::core::BufferedAuditSink;
pub use crate::core::Clock;
pub use crate::core::DailyFileAppender;
pub use crate::core::ManualClock;
pub use crate::core::NullAuditSink;
pub use crate::core::RoutineKind;
pub use crate::core::RoutineName;
pub use crate::core::RoutineVersion;
pub use crate::core::SaveVersionRequest;
pub use crate::core::SchemaName;
pub use crate::core::StatementKind;
pub use crate::core::SystemClock;
pub use crate::core::Timestamp;
pub use crate::core::TransactionId;
pub use crate::core::ValidationResult;
pub use crate::core::VersionNumber;
pub use crate::interfaces::EngineConnector;
pub use crate::interfaces::EngineError;
pub use crate::interfaces::EngineSession;
pub use crate::interfaces::ParamMap;
pub use crate::interfaces::RowSet;
pub use crate::interfaces::VersionStore;
pub use crate::interfaces::VersionStoreError;
pub use crate::runtime::InMemoryEngine;
pub use crate::runtime::InMemoryVersionStore;
pub use crate::runtime::LifecycleConfig;
pub use crate::runtime::LifecycleError;
pub use crate::runtime::LifecycleOrchestrator;
pub use crate::runtime::RegistryConfig;
pub use crate::runtime::RegistryError;
pub use crate::runtime::TimeoutSweeper;
pub use crate::runtime::TransactionRegistry;
pub use crate::runtime::TransactionSnapshot;
pub use crate::runtime::TransactionState;
pub use crate::runtime::WriteConfig;
pub use crate::runtime::WriteError;
pub use crate::runtime::WriteExecutor;
pub use crate::runtime::WriteOutcome;

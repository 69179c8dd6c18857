// crates/routine-gate-core/src/core/mod.rs
// ============================================================================
// Module: Routine Gate Core Types
// Description: Identifiers, time model, admission gate, version snapshots,
//              routine text model, and audit records.
// Purpose: House the pure value types and leaf components of the core.
// Dependencies: submodules only
// ============================================================================

//! ## Overview
//! Leaf modules with no dependency on the runtime: everything here is either
//! a pure value type or a side-effect-free component (the admission gate) or
//! a self-contained background component (the audit sink).

/// Statement admission gate.
pub mod admission;
/// Audit entries and the buffered sink.
pub mod audit;
/// Strongly typed identifiers.
pub mod identifiers;
/// Routine defining-clause parsing and namespace rewriting.
pub mod routines;
/// Timestamps and clock sources.
pub mod time;
/// Routine version snapshots.
pub mod version;

pub use self::admission::AdmissionConfig;
pub use self::admission::AdmissionGate;
pub use self::admission::StatementKind;
pub use self::admission::ValidationResult;
pub use self::audit::AuditAppender;
pub use self::audit::AuditConfig;
pub use self::audit::AuditEntry;
pub use self::audit::AuditError;
pub use self::audit::AuditSink;
pub use self::audit::BufferedAuditSink;
pub use self::audit::DailyFileAppender;
pub use self::audit::NullAuditSink;
pub use self::identifiers::ActorId;
pub use self::identifiers::RoutineName;
pub use self::identifiers::SchemaName;
pub use self::identifiers::TransactionId;
pub use self::identifiers::VersionNumber;
pub use self::routines::DefiningClause;
pub use self::routines::RoutineKind;
pub use self::time::Clock;
pub use self::time::ManualClock;
pub use self::time::SystemClock;
pub use self::time::Timestamp;
pub use self::version::RoutineVersion;
pub use self::version::SaveVersionRequest;

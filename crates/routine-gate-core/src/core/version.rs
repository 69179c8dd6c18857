// crates/routine-gate-core/src/core/version.rs
// ============================================================================
// Module: Routine Version Snapshots
// Description: Immutable recorded prior definitions of routines.
// Purpose: Capture the outgoing production definition before every swap.
// Dependencies: serde, crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! A [`RoutineVersion`] is an immutable snapshot of a routine definition,
//! numbered per (schema, name) with a strictly increasing, gap-tolerant
//! sequence. Snapshots are created on every successful deploy and pruned to a
//! configured retention count by the owning store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ActorId;
use crate::core::identifiers::RoutineName;
use crate::core::identifiers::SchemaName;
use crate::core::identifiers::VersionNumber;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// Immutable snapshot of a routine's definition.
///
/// # Invariants
/// - `version` is strictly increasing per (`schema`, `name`).
/// - `definition` is the full defining statement, byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineVersion {
    /// Production schema of the routine.
    pub schema: SchemaName,
    /// Routine name within the schema.
    pub name: RoutineName,
    /// Snapshot version number.
    pub version: VersionNumber,
    /// Full definition text.
    pub definition: String,
    /// Snapshot creation time.
    pub created_at: Timestamp,
    /// Identity that caused the snapshot.
    pub created_by: ActorId,
    /// Optional free-text comment.
    pub comment: Option<String>,
}

/// Request to persist a new routine version snapshot.
///
/// # Invariants
/// - The store assigns the version number; callers never choose one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersionRequest {
    /// Production schema of the routine.
    pub schema: SchemaName,
    /// Routine name within the schema.
    pub name: RoutineName,
    /// Full definition text to snapshot.
    pub definition: String,
    /// Snapshot creation time.
    pub created_at: Timestamp,
    /// Identity that caused the snapshot.
    pub created_by: ActorId,
    /// Optional free-text comment.
    pub comment: Option<String>,
}

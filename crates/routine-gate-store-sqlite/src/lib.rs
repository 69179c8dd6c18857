// crates/routine-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Routine Gate SQLite Store
// Description: Durable VersionStore backed by SQLite WAL.
// Purpose: Crate root re-exporting the SQLite-backed version store.
// Dependencies: crate modules
// ============================================================================

//! ## Overview
//! This crate persists routine version history in a single `SQLite` database
//! file. It implements the [`routine_gate_core::VersionStore`] contract with
//! an append-only version table, contiguous per-routine numbering, and
//! retention pruning after every save.

/// SQLite-backed version store implementation.
pub mod store;

pub use crate::store::SqliteStoreMode;
pub use crate::store::SqliteSyncMode;
pub use crate::store::SqliteVersionStore;
pub use crate::store::SqliteVersionStoreConfig;
pub use crate::store::SqliteVersionStoreError;

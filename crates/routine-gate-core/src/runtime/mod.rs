// crates/routine-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Routine Gate Runtime
// Description: Transaction registry, lifecycle orchestrator, write path, and
//              in-memory backends.
// Purpose: Coordinate the core components against a live engine.
// Dependencies: submodules only
// ============================================================================

//! ## Overview
//! The runtime wires the pure core components to engine sessions: the
//! registry owns transactions and their sessions, the orchestrator drives
//! the draft workflows, the write path runs gated arbitrary writes, and the
//! in-memory backends stand in for a live engine in tests and local
//! development.

/// Lifecycle orchestrator for drafts, deploys, and rollbacks.
pub mod lifecycle;
/// In-memory engine and version store.
pub mod memory;
/// Transaction registry, session pool, and timeout sweep.
pub mod registry;
/// Gated write statement path.
pub mod writes;

pub use self::lifecycle::LifecycleConfig;
pub use self::lifecycle::LifecycleError;
pub use self::lifecycle::LifecycleOrchestrator;
pub use self::memory::InMemoryEngine;
pub use self::memory::InMemoryVersionStore;
pub use self::registry::RegistryConfig;
pub use self::registry::RegistryError;
pub use self::registry::TimeoutSweeper;
pub use self::registry::TransactionRegistry;
pub use self::registry::TransactionSnapshot;
pub use self::registry::TransactionState;
pub use self::writes::WriteConfig;
pub use self::writes::WriteError;
pub use self::writes::WriteExecutor;
pub use self::writes::WriteOutcome;

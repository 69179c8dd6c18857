// crates/routine-gate-core/src/core/time.rs
// ============================================================================
// Module: Routine Gate Time Model
// Description: Canonical timestamp representations and clock sources.
// Purpose: Provide deterministic, replayable time values across Routine Gate
//          records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Routine Gate embeds explicit time values in transactions, version
//! snapshots, and audit entries. Components never read wall-clock time
//! directly; a [`Clock`] is injected so the timeout sweep and audit flush are
//! testable with a fake time source.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in Routine Gate records.
///
/// # Invariants
/// - Values are explicitly provided by a [`Clock`]; monotonicity is a clock
///   responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value.
    Logical(u64),
}

impl Timestamp {
    /// Returns the timestamp as unix milliseconds when available.
    #[must_use]
    pub const fn as_unix_millis(&self) -> Option<i64> {
        match self {
            Self::UnixMillis(value) => Some(*value),
            Self::Logical(_) => None,
        }
    }

    /// Returns the timestamp as logical time when available.
    #[must_use]
    pub const fn as_logical(&self) -> Option<u64> {
        match self {
            Self::UnixMillis(_) => None,
            Self::Logical(value) => Some(*value),
        }
    }

    /// Returns the milliseconds elapsed since `earlier`, when both values
    /// share a representation. Mixed representations return `None`.
    #[must_use]
    pub fn millis_since(&self, earlier: &Self) -> Option<i64> {
        match (self, earlier) {
            (Self::UnixMillis(now), Self::UnixMillis(then)) => Some(now.saturating_sub(*then)),
            (Self::Logical(now), Self::Logical(then)) => {
                i64::try_from(now.saturating_sub(*then)).ok()
            }
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Clock Sources
// ============================================================================

/// Source of timestamps for registries, stores, and sinks.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock source producing [`Timestamp::UnixMillis`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::UnixMillis(millis)
    }
}

/// Manually advanced clock producing [`Timestamp::Logical`] values.
///
/// # Invariants
/// - Time only moves forward through [`ManualClock::advance`].
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current logical time in milliseconds.
    now_ms: Mutex<u64>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given logical millisecond.
    #[must_use]
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now_ms: Mutex::new(now_ms),
        }
    }

    /// Advances the clock by the given number of logical milliseconds.
    pub fn advance(&self, delta_ms: u64) {
        let mut guard = self.now_ms.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = guard.saturating_add(delta_ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let guard = self.now_ms.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Timestamp::Logical(*guard)
    }
}

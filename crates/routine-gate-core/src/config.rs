// crates/routine-gate-core/src/config.rs
// ============================================================================
// Module: Routine Gate Configuration
// Description: Aggregate configuration loaded from TOML.
// Purpose: Wire per-component config sections with serde defaults.
// Dependencies: serde, thiserror, toml, crate::core, crate::runtime
// ============================================================================

//! ## Overview
//! Every component carries its own serde-deserializable config struct with
//! defaulted fields; this module aggregates them into one document loadable
//! from TOML. Validation stays with the component constructors, which fail
//! closed on out-of-range values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use thiserror::Error;

use crate::core::admission::AdmissionConfig;
use crate::core::audit::AuditConfig;
use crate::runtime::lifecycle::LifecycleConfig;
use crate::runtime::registry::RegistryConfig;
use crate::runtime::writes::WriteConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be parsed as TOML.
    #[error("config parse error: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Aggregate Config
// ============================================================================

/// Aggregate Routine Gate configuration.
///
/// # Invariants
/// - Component sections validate themselves at construction time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutineGateConfig {
    /// Admission gate section.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Transaction registry section.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Lifecycle orchestrator section.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Write path section.
    #[serde(default)]
    pub writes: WriteConfig,
    /// Audit sink section; auditing is disabled when absent.
    #[serde(default)]
    pub audit: Option<AuditConfig>,
}

impl RoutineGateConfig {
    /// Parses a configuration document from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is not valid TOML or
    /// does not match the expected shape.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        toml::from_str(document).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

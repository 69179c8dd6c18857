// crates/routine-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Version Store
// Description: Durable VersionStore backed by SQLite WAL.
// Purpose: Persist routine definition snapshots with contiguous numbering
//          and retention pruning.
// Dependencies: routine-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`VersionStore`] using `SQLite`. Each
//! save runs inside one `SQLite` transaction: the next version number is read
//! under the same transaction that inserts it, so concurrent saves for the
//! same routine yield distinct, contiguous numbers. After each insert the
//! history is pruned to the configured retention count. Database contents are
//! untrusted; loads fail closed on rows that do not decode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use routine_gate_core::RoutineName;
use routine_gate_core::RoutineVersion;
use routine_gate_core::SaveVersionRequest;
use routine_gate_core::SchemaName;
use routine_gate_core::Timestamp;
use routine_gate_core::VersionNumber;
use routine_gate_core::VersionStore;
use routine_gate_core::VersionStoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of versions retained per routine.
const DEFAULT_KEEP_VERSIONS: u64 = 5;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` version store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `keep_versions` must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteVersionStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of versions retained per routine; older versions are pruned.
    #[serde(default = "default_keep_versions")]
    pub keep_versions: u64,
}

impl SqliteVersionStoreConfig {
    /// Creates a configuration with defaults for the given database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            keep_versions: default_keep_versions(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default retention count per routine.
const fn default_keep_versions() -> u64 {
    DEFAULT_KEEP_VERSIONS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` version store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteVersionStoreError {
    /// Filesystem failure while preparing the database location.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` failure.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid configuration or stored data.
    #[error("sqlite store invalid: {0}")]
    Invalid(String),
}

impl From<SqliteVersionStoreError> for VersionStoreError {
    fn from(err: SqliteVersionStoreError) -> Self {
        match err {
            SqliteVersionStoreError::Invalid(message) => Self::Invalid(message),
            SqliteVersionStoreError::Io(message) | SqliteVersionStoreError::Db(message) => {
                Self::Store(message)
            }
        }
    }
}

/// Maps a `rusqlite` error into the store error type.
fn db_err(err: &rusqlite::Error) -> SqliteVersionStoreError {
    SqliteVersionStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable [`VersionStore`] backed by a single `SQLite` database file.
///
/// # Invariants
/// - All access goes through one connection behind a mutex, so the
///   read-max-then-insert sequence in [`VersionStore::save_version`] is
///   serialized.
pub struct SqliteVersionStore {
    /// Exclusive connection to the database file.
    connection: Arc<Mutex<Connection>>,
    /// Versions retained per routine.
    keep_versions: u64,
}

impl SqliteVersionStore {
    /// Opens (creating if needed) the database file and initializes the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteVersionStoreError::Invalid`] for a rejected
    /// configuration, [`SqliteVersionStoreError::Io`] when the parent
    /// directory cannot be created, or [`SqliteVersionStoreError::Db`] when
    /// the database cannot be opened or migrated.
    pub fn open(config: &SqliteVersionStoreConfig) -> Result<Self, SqliteVersionStoreError> {
        if config.keep_versions == 0 {
            return Err(SqliteVersionStoreError::Invalid(
                "keep_versions must be greater than zero".to_string(),
            ));
        }
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            keep_versions: config.keep_versions,
        })
    }

    /// Locks the connection, mapping mutex poisoning to a store error.
    fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, SqliteVersionStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteVersionStoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Persists a snapshot and prunes history inside one transaction.
    fn save_version_inner(
        &self,
        request: &SaveVersionRequest,
    ) -> Result<VersionNumber, SqliteVersionStoreError> {
        let created_at_json = serde_json::to_string(&request.created_at)
            .map_err(|err| SqliteVersionStoreError::Invalid(err.to_string()))?;
        let mut connection = self.lock_connection()?;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        let current: Option<i64> = tx
            .query_row(
                "SELECT MAX(version) FROM routine_versions
                 WHERE schema_name = ?1 AND routine_name = ?2",
                params![request.schema.as_str(), request.name.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| db_err(&err))?;
        let next = current.unwrap_or(0).checked_add(1).ok_or_else(|| {
            SqliteVersionStoreError::Invalid("version counter overflow".to_string())
        })?;
        tx.execute(
            "INSERT INTO routine_versions
             (schema_name, routine_name, version, definition, created_at_json,
              created_by, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request.schema.as_str(),
                request.name.as_str(),
                next,
                request.definition,
                created_at_json,
                request.created_by.as_str(),
                request.comment,
            ],
        )
        .map_err(|err| db_err(&err))?;
        let keep = i64::try_from(self.keep_versions).unwrap_or(i64::MAX);
        tx.execute(
            "DELETE FROM routine_versions
             WHERE schema_name = ?1 AND routine_name = ?2
               AND version NOT IN (
                   SELECT version FROM routine_versions
                   WHERE schema_name = ?1 AND routine_name = ?2
                   ORDER BY version DESC LIMIT ?3
               )",
            params![request.schema.as_str(), request.name.as_str(), keep],
        )
        .map_err(|err| db_err(&err))?;
        tx.commit().map_err(|err| db_err(&err))?;
        version_from_raw(next)
    }

    /// Loads one snapshot matching the given `WHERE` suffix.
    fn query_one(
        &self,
        suffix: &str,
        schema: &SchemaName,
        name: &RoutineName,
        version: Option<i64>,
    ) -> Result<Option<RoutineVersion>, SqliteVersionStoreError> {
        let connection = self.lock_connection()?;
        let sql = format!(
            "SELECT schema_name, routine_name, version, definition,
                    created_at_json, created_by, comment
             FROM routine_versions
             WHERE schema_name = ?1 AND routine_name = ?2 {suffix}",
        );
        let row: Option<VersionRow> = match version {
            Some(exact) => connection
                .query_row(&sql, params![schema.as_str(), name.as_str(), exact], read_row)
                .optional(),
            None => connection
                .query_row(&sql, params![schema.as_str(), name.as_str()], read_row)
                .optional(),
        }
        .map_err(|err| db_err(&err))?;
        row.map(decode_row).transpose()
    }
}

impl VersionStore for SqliteVersionStore {
    fn ensure_store(&self) -> Result<(), VersionStoreError> {
        let mut connection = self.lock_connection()?;
        initialize_schema(&mut connection)?;
        Ok(())
    }

    fn save_version(
        &self,
        request: &SaveVersionRequest,
    ) -> Result<VersionNumber, VersionStoreError> {
        self.save_version_inner(request).map_err(Into::into)
    }

    fn get_version(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
        version: VersionNumber,
    ) -> Result<Option<RoutineVersion>, VersionStoreError> {
        let exact = i64::try_from(version.get())
            .map_err(|_| VersionStoreError::Invalid("version exceeds storage range".to_string()))?;
        self.query_one("AND version = ?3", schema, name, Some(exact)).map_err(Into::into)
    }

    fn get_latest(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Option<RoutineVersion>, VersionStoreError> {
        self.query_one("ORDER BY version DESC LIMIT 1", schema, name, None).map_err(Into::into)
    }

    fn list_versions(
        &self,
        schema: &SchemaName,
        name: &RoutineName,
    ) -> Result<Vec<RoutineVersion>, VersionStoreError> {
        let connection = self.lock_connection()?;
        let mut statement = connection
            .prepare(
                "SELECT schema_name, routine_name, version, definition,
                        created_at_json, created_by, comment
                 FROM routine_versions
                 WHERE schema_name = ?1 AND routine_name = ?2
                 ORDER BY version DESC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![schema.as_str(), name.as_str()], read_row)
            .map_err(|err| db_err(&err))?;
        let mut versions = Vec::new();
        for row in rows {
            let row = row.map_err(|err| db_err(&err))?;
            versions.push(decode_row(row)?);
        }
        Ok(versions)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Raw column values of one version row.
type VersionRow = (String, String, i64, String, String, String, Option<String>);

/// Reads the raw column tuple from a result row.
fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

/// Decodes a raw row into a snapshot, failing closed on bad data.
fn decode_row(row: VersionRow) -> Result<RoutineVersion, SqliteVersionStoreError> {
    let (schema, name, version, definition, created_at_json, created_by, comment) = row;
    let created_at: Timestamp = serde_json::from_str(&created_at_json).map_err(|err| {
        SqliteVersionStoreError::Invalid(format!("stored timestamp does not decode: {err}"))
    })?;
    Ok(RoutineVersion {
        schema: SchemaName::new(schema),
        name: RoutineName::new(name),
        version: version_from_raw(version)?,
        definition,
        created_at,
        created_by: created_by.into(),
        comment,
    })
}

/// Converts a stored version column into a [`VersionNumber`].
fn version_from_raw(raw: i64) -> Result<VersionNumber, SqliteVersionStoreError> {
    let unsigned = u64::try_from(raw).map_err(|_| {
        SqliteVersionStoreError::Invalid(format!("stored version {raw} is negative"))
    })?;
    VersionNumber::from_raw(unsigned).ok_or_else(|| {
        SqliteVersionStoreError::Invalid("stored version must be at least one".to_string())
    })
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteVersionStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| SqliteVersionStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Validates the database path before opening.
fn validate_store_path(path: &Path) -> Result<(), SqliteVersionStoreError> {
    let path_string = path.to_string_lossy();
    if path_string.is_empty() {
        return Err(SqliteVersionStoreError::Invalid("store path is empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteVersionStoreError::Invalid(
            "store path exceeds length limit".to_string(),
        ));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteVersionStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteVersionStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(
    config: &SqliteVersionStoreConfig,
) -> Result<Connection, SqliteVersionStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_err(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteVersionStoreConfig,
) -> Result<(), SqliteVersionStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteVersionStoreError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS routine_versions (
                    schema_name TEXT NOT NULL,
                    routine_name TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    definition TEXT NOT NULL,
                    created_at_json TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    comment TEXT,
                    PRIMARY KEY (schema_name, routine_name, version)
                );
                CREATE INDEX IF NOT EXISTS idx_routine_versions_latest
                    ON routine_versions (schema_name, routine_name, version DESC);",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteVersionStoreError::Invalid(format!(
                "unsupported store schema version {other}"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))?;
    Ok(())
}

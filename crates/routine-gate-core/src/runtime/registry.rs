// crates/routine-gate-core/src/runtime/registry.rs
// ============================================================================
// Module: Transaction Registry
// Description: Ownership of in-flight transactions, their connections, and
//              timeout reclamation.
// Purpose: Hand out exclusive sessions, serialize per-transaction state
//          transitions, and force-terminate timed-out transactions.
// Dependencies: serde, thiserror, tracing, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The registry owns the map of in-flight transactions. Each transaction
//! exclusively holds one pooled engine session until it reaches a terminal
//! state; terminal transactions are removed from the map, so their
//! identifiers become unknown. State transitions are
//! check-current-state-then-transition under a per-transaction lock, which is
//! what lets the timeout sweep race a concurrent manual commit or rollback
//! without either side observing a half-finished transition.
//!
//! The registry map lock is held only for slot lookup, insert, and removal;
//! unrelated transactions proceed fully in parallel on their own sessions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::TransactionId;
use crate::core::time::Clock;
use crate::core::time::Timestamp;
use crate::interfaces::EngineConnector;
use crate::interfaces::EngineError;
use crate::interfaces::EngineSession;
use crate::interfaces::ParamMap;
use crate::interfaces::RowSet;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the transaction registry and its timeout sweep.
///
/// # Invariants
/// - All fields must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Number of pooled engine sessions.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Bounded wait for a free session in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Transaction age ceiling in milliseconds before forced rollback.
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
    /// Sweep wake interval in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            transaction_timeout_ms: default_transaction_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Returns the default pooled session count.
const fn default_pool_size() -> usize {
    4
}

/// Returns the default session acquire timeout in milliseconds.
const fn default_acquire_timeout_ms() -> u64 {
    5_000
}

/// Returns the default transaction age ceiling (5 minutes).
const fn default_transaction_timeout_ms() -> u64 {
    300_000
}

/// Returns the default sweep interval (1 minute).
const fn default_sweep_interval_ms() -> u64 {
    60_000
}

/// Validates registry limits.
fn validate_registry_config(config: &RegistryConfig) -> Result<(), RegistryError> {
    if config.pool_size == 0 {
        return Err(RegistryError::Internal("pool_size must be greater than zero".to_string()));
    }
    if config.acquire_timeout_ms == 0 {
        return Err(RegistryError::Internal(
            "acquire_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if config.transaction_timeout_ms == 0 {
        return Err(RegistryError::Internal(
            "transaction_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if config.sweep_interval_ms == 0 {
        return Err(RegistryError::Internal(
            "sweep_interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Transaction registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transaction identifier is unknown or already terminal.
    #[error("transaction not found: {0}")]
    NotFound(TransactionId),
    /// No pooled session became available within the bounded wait.
    #[error("connection pool exhausted after {waited_ms} ms")]
    PoolExhausted {
        /// Milliseconds waited before giving up.
        waited_ms: u64,
    },
    /// The engine rejected or failed a statement.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Registry invariant violation or poisoned lock.
    #[error("registry internal error: {0}")]
    Internal(String),
}

// ============================================================================
// SECTION: Transaction State
// ============================================================================

/// Transaction lifecycle state.
///
/// # Invariants
/// - No transitions leave `Committed` or `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Transaction is open and owns a session.
    Active,
    /// Transaction committed (terminal).
    Committed,
    /// Transaction rolled back, manually or by the sweep (terminal).
    RolledBack,
}

/// Read-only view of an in-flight transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    /// Transaction identifier.
    pub transaction_id: TransactionId,
    /// Current state; always [`TransactionState::Active`] while registered.
    pub state: TransactionState,
    /// Time the transaction began.
    pub started_at: Timestamp,
    /// Statement texts executed so far, in submission order.
    pub statements: Vec<String>,
}

/// Mutable per-transaction state guarded by the slot mutex.
struct TransactionSlot {
    /// Current lifecycle state.
    state: TransactionState,
    /// Exclusively held session; `None` once terminal.
    session: Option<Box<dyn EngineSession>>,
    /// Time the transaction began.
    started_at: Timestamp,
    /// Statement texts executed, in submission order.
    statements: Vec<String>,
}

// ============================================================================
// SECTION: Session Pool
// ============================================================================

/// Pool of idle engine sessions with a bounded-wait checkout.
struct SessionPool {
    /// Idle sessions available for checkout.
    idle: Mutex<Vec<Box<dyn EngineSession>>>,
    /// Signaled when a session returns to the pool.
    available: Condvar,
}

impl SessionPool {
    /// Creates a pool holding the given sessions.
    fn new(sessions: Vec<Box<dyn EngineSession>>) -> Self {
        Self {
            idle: Mutex::new(sessions),
            available: Condvar::new(),
        }
    }

    /// Locks the idle list, mapping poison to an internal error.
    fn lock_idle(&self) -> Result<MutexGuard<'_, Vec<Box<dyn EngineSession>>>, RegistryError> {
        self.idle.lock().map_err(|_| RegistryError::Internal("pool mutex poisoned".to_string()))
    }

    /// Checks out one session, waiting up to `timeout` for one to free up.
    fn acquire(&self, timeout: Duration) -> Result<Box<dyn EngineSession>, RegistryError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut idle = self.lock_idle()?;
        loop {
            if let Some(session) = idle.pop() {
                return Ok(session);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RegistryError::PoolExhausted {
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            let (guard, _timed_out) = self
                .available
                .wait_timeout(idle, deadline.saturating_duration_since(now))
                .map_err(|_| RegistryError::Internal("pool mutex poisoned".to_string()))?;
            idle = guard;
        }
    }

    /// Returns a session to the pool and wakes one waiter.
    fn release(&self, session: Box<dyn EngineSession>) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(session);
        }
        self.available.notify_one();
    }

    /// Returns the number of idle sessions.
    fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Owner of in-flight transactions and their pooled sessions.
///
/// # Invariants
/// - At most one transaction holds a given pooled session at a time.
/// - A terminal transaction holds no session and is removed from the map.
pub struct TransactionRegistry {
    /// Registry configuration.
    config: RegistryConfig,
    /// Idle session pool.
    pool: SessionPool,
    /// Connector used to replace sessions broken by a failed forced rollback.
    connector: Arc<dyn EngineConnector>,
    /// Time source for start stamps and age checks.
    clock: Arc<dyn Clock>,
    /// In-flight transactions keyed by identifier.
    slots: Mutex<HashMap<TransactionId, Arc<Mutex<TransactionSlot>>>>,
    /// Monotonic sequence for identifier minting.
    sequence: AtomicU64,
}

impl TransactionRegistry {
    /// Creates a registry, opening `pool_size` sessions up front.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the configuration is invalid or any
    /// initial connection fails.
    pub fn new(
        connector: Arc<dyn EngineConnector>,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        validate_registry_config(&config)?;
        let mut sessions = Vec::with_capacity(config.pool_size);
        for _ in 0 .. config.pool_size {
            sessions.push(connector.connect()?);
        }
        Ok(Self {
            config,
            pool: SessionPool::new(sessions),
            connector,
            clock,
            slots: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(1),
        })
    }

    /// Returns the configured sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.config.sweep_interval_ms)
    }

    /// Begins a transaction, checking out a session and issuing the
    /// engine-level begin.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PoolExhausted`] when no session frees up
    /// within the bounded wait, or [`RegistryError::Engine`] when the begin
    /// statement fails (the session returns to the pool).
    pub fn begin(&self) -> Result<TransactionId, RegistryError> {
        let mut session =
            self.pool.acquire(Duration::from_millis(self.config.acquire_timeout_ms))?;
        if let Err(err) = session.begin() {
            self.pool.release(session);
            return Err(RegistryError::Engine(err));
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let transaction_id = TransactionId::new(format!("txn-{sequence}"));
        let slot = Arc::new(Mutex::new(TransactionSlot {
            state: TransactionState::Active,
            session: Some(session),
            started_at: self.clock.now(),
            statements: Vec::new(),
        }));
        self.lock_slots()?.insert(transaction_id.clone(), slot);
        Ok(transaction_id)
    }

    /// Executes a statement inside a transaction, returning affected rows.
    ///
    /// On engine failure the transaction stays Active; the caller decides
    /// whether to roll back.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown or terminal
    /// identifiers, or [`RegistryError::Engine`] on statement failure.
    pub fn execute(
        &self,
        transaction_id: &TransactionId,
        statement: &str,
        params: &ParamMap,
    ) -> Result<u64, RegistryError> {
        self.with_active_session(transaction_id, statement, |session| {
            session.execute(statement, params)
        })
    }

    /// Runs a query inside a transaction, returning its rows.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown or terminal
    /// identifiers, or [`RegistryError::Engine`] on query failure.
    pub fn query(
        &self,
        transaction_id: &TransactionId,
        statement: &str,
        params: &ParamMap,
    ) -> Result<RowSet, RegistryError> {
        self.with_active_session(transaction_id, statement, |session| {
            session.query(statement, params)
        })
    }

    /// Commits a transaction and releases its session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown or terminal
    /// identifiers, or [`RegistryError::Engine`] when the commit fails (the
    /// transaction stays Active).
    pub fn commit(&self, transaction_id: &TransactionId) -> Result<(), RegistryError> {
        self.finish(transaction_id, TransactionState::Committed)
    }

    /// Rolls back a transaction and releases its session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown or terminal
    /// identifiers, or [`RegistryError::Engine`] when the rollback fails (the
    /// transaction stays Active).
    pub fn rollback(&self, transaction_id: &TransactionId) -> Result<(), RegistryError> {
        self.finish(transaction_id, TransactionState::RolledBack)
    }

    /// Returns a read-only view of an in-flight transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown or terminal
    /// identifiers.
    pub fn snapshot(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionSnapshot, RegistryError> {
        let slot = self.slot(transaction_id)?;
        let guard = lock_slot(&slot)?;
        Ok(TransactionSnapshot {
            transaction_id: transaction_id.clone(),
            state: guard.state,
            started_at: guard.started_at,
            statements: guard.statements.clone(),
        })
    }

    /// Returns the number of in-flight transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    /// Returns the number of idle pooled sessions.
    #[must_use]
    pub fn idle_sessions(&self) -> usize {
        self.pool.idle_count()
    }

    /// Force-rolls-back every Active transaction older than the configured
    /// ceiling, returning the number reclaimed.
    ///
    /// Tolerates racing a concurrent manual commit or rollback: a
    /// transaction that reached a terminal state between the age check and
    /// the forced action is skipped without error.
    pub fn sweep_once(&self) -> u64 {
        let now = self.clock.now();
        let candidates: Vec<(TransactionId, Arc<Mutex<TransactionSlot>>)> = match self.slots.lock()
        {
            Ok(slots) => {
                slots.iter().map(|(id, slot)| (id.clone(), Arc::clone(slot))).collect()
            }
            Err(_) => return 0,
        };
        let ceiling = i64::try_from(self.config.transaction_timeout_ms).unwrap_or(i64::MAX);
        let mut reclaimed = Vec::new();
        for (transaction_id, slot) in candidates {
            let Ok(mut guard) = slot.lock() else {
                continue;
            };
            if guard.state != TransactionState::Active {
                continue;
            }
            let Some(age_ms) = now.millis_since(&guard.started_at) else {
                continue;
            };
            if age_ms < ceiling {
                continue;
            }
            let Some(mut session) = guard.session.take() else {
                continue;
            };
            match session.rollback() {
                Ok(()) => self.pool.release(session),
                Err(err) => {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        error = %err,
                        "forced rollback failed; discarding session",
                    );
                    self.replace_session();
                }
            }
            guard.state = TransactionState::RolledBack;
            tracing::warn!(
                transaction_id = %transaction_id,
                age_ms,
                "transaction exceeded timeout ceiling; rolled back",
            );
            drop(guard);
            reclaimed.push(transaction_id);
        }
        let count = u64::try_from(reclaimed.len()).unwrap_or(u64::MAX);
        if let Ok(mut slots) = self.slots.lock() {
            for transaction_id in reclaimed {
                slots.remove(&transaction_id);
            }
        }
        count
    }

    /// Looks up a slot by identifier.
    fn slot(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Arc<Mutex<TransactionSlot>>, RegistryError> {
        self.lock_slots()?
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(transaction_id.clone()))
    }

    /// Locks the slot map, mapping poison to an internal error.
    fn lock_slots(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<TransactionId, Arc<Mutex<TransactionSlot>>>>, RegistryError>
    {
        self.slots
            .lock()
            .map_err(|_| RegistryError::Internal("registry mutex poisoned".to_string()))
    }

    /// Runs an operation against a transaction's session, recording the
    /// statement text.
    fn with_active_session<T>(
        &self,
        transaction_id: &TransactionId,
        statement: &str,
        operation: impl FnOnce(&mut dyn EngineSession) -> Result<T, EngineError>,
    ) -> Result<T, RegistryError> {
        let slot = self.slot(transaction_id)?;
        let mut guard = lock_slot(&slot)?;
        if guard.state != TransactionState::Active {
            return Err(RegistryError::NotFound(transaction_id.clone()));
        }
        guard.statements.push(statement.to_string());
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| RegistryError::Internal("active transaction lost session".to_string()))?;
        operation(session.as_mut()).map_err(RegistryError::Engine)
    }

    /// Transitions a transaction to a terminal state and releases its
    /// session.
    fn finish(
        &self,
        transaction_id: &TransactionId,
        target: TransactionState,
    ) -> Result<(), RegistryError> {
        let slot = self.slot(transaction_id)?;
        let mut guard = lock_slot(&slot)?;
        if guard.state != TransactionState::Active {
            return Err(RegistryError::NotFound(transaction_id.clone()));
        }
        let mut session = guard
            .session
            .take()
            .ok_or_else(|| RegistryError::Internal("active transaction lost session".to_string()))?;
        let result = match target {
            TransactionState::Committed => session.commit(),
            TransactionState::Active | TransactionState::RolledBack => session.rollback(),
        };
        match result {
            Ok(()) => {
                guard.state = target;
                self.pool.release(session);
                drop(guard);
                if let Ok(mut slots) = self.slots.lock() {
                    slots.remove(transaction_id);
                }
                Ok(())
            }
            Err(err) => {
                guard.session = Some(session);
                Err(RegistryError::Engine(err))
            }
        }
    }

    /// Opens a replacement session after one was discarded, keeping the pool
    /// at its configured size.
    fn replace_session(&self) {
        match self.connector.connect() {
            Ok(session) => self.pool.release(session),
            Err(err) => {
                tracing::warn!(error = %err, "failed to replace discarded session");
            }
        }
    }
}

/// Locks a transaction slot, mapping poison to an internal error.
fn lock_slot(
    slot: &Arc<Mutex<TransactionSlot>>,
) -> Result<MutexGuard<'_, TransactionSlot>, RegistryError> {
    slot.lock().map_err(|_| RegistryError::Internal("transaction mutex poisoned".to_string()))
}

// ============================================================================
// SECTION: Timeout Sweeper
// ============================================================================

/// Background thread driving [`TransactionRegistry::sweep_once`] on the
/// configured interval for the life of the process.
///
/// # Invariants
/// - Dropping the sweeper stops the thread before returning.
pub struct TimeoutSweeper {
    /// Signals the thread to stop; `None` once stopped.
    stop: Option<SyncSender<()>>,
    /// Thread handle joined on drop.
    handle: Option<thread::JoinHandle<()>>,
}

impl TimeoutSweeper {
    /// Spawns the sweep thread for the given registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Internal`] when the thread cannot be spawned.
    pub fn spawn(registry: Arc<TransactionRegistry>) -> Result<Self, RegistryError> {
        let interval = registry.sweep_interval();
        let (stop, stop_signal) = mpsc::sync_channel::<()>(1);
        let handle = thread::Builder::new()
            .name("rg-txn-sweep".to_string())
            .spawn(move || {
                loop {
                    match stop_signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            registry.sweep_once();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|err| RegistryError::Internal(format!("spawn sweep thread: {err}")))?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for TimeoutSweeper {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

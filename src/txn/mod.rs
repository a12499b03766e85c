//! Transaction context and lock manager
//!
//! Statements execute under an `ExecContext`: a transaction id, a handle on
//! the shared lock manager, and a cooperative cancellation flag that
//! operators check between tuples. Lock acquisition is immediate-conflict:
//! a lock held in an incompatible mode by another transaction fails the
//! request with a conflict, leaving wait queues and deadlock detection to
//! the embedding transaction manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Transaction identifier
pub type TxnId = u64;

/// Transaction and locking errors
#[derive(Error, Debug, Clone)]
pub enum TxnError {
    /// Lock held in an incompatible mode by another transaction
    #[error("Lock conflict on table '{0}'")]
    Conflict(String),

    /// BEGIN inside an open transaction
    #[error("Transaction already in progress")]
    AlreadyInTransaction,

    /// COMMIT/ABORT without an open transaction
    #[error("No transaction in progress")]
    NoTransaction,

    /// Statement saw the cancellation flag
    #[error("Statement cancelled")]
    Cancelled,
}

/// Result type for transaction operations
pub type TxnResult<T> = Result<T, TxnError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockState {
    mode: LockMode,
    holders: HashSet<TxnId>,
}

/// Table-granularity lock registry
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, LockState>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a shared lock on a table
    pub fn lock_shared(&self, txn: TxnId, table: &str) -> TxnResult<()> {
        let mut locks = self.locks.lock();
        match locks.get_mut(table) {
            None => {
                locks.insert(
                    table.to_string(),
                    LockState {
                        mode: LockMode::Shared,
                        holders: HashSet::from([txn]),
                    },
                );
                Ok(())
            }
            Some(state) => match state.mode {
                LockMode::Shared => {
                    state.holders.insert(txn);
                    Ok(())
                }
                LockMode::Exclusive if state.holders.contains(&txn) => Ok(()),
                LockMode::Exclusive => Err(TxnError::Conflict(table.to_string())),
            },
        }
    }

    /// Acquire an exclusive lock on a table, upgrading a shared lock this
    /// transaction holds alone
    pub fn lock_exclusive(&self, txn: TxnId, table: &str) -> TxnResult<()> {
        let mut locks = self.locks.lock();
        match locks.get_mut(table) {
            None => {
                locks.insert(
                    table.to_string(),
                    LockState {
                        mode: LockMode::Exclusive,
                        holders: HashSet::from([txn]),
                    },
                );
                Ok(())
            }
            Some(state) => {
                if state.holders.len() == 1 && state.holders.contains(&txn) {
                    state.mode = LockMode::Exclusive;
                    Ok(())
                } else {
                    Err(TxnError::Conflict(table.to_string()))
                }
            }
        }
    }

    /// Release every lock a transaction holds (commit or abort)
    pub fn release_all(&self, txn: TxnId) {
        let mut locks = self.locks.lock();
        locks.retain(|_, state| {
            state.holders.remove(&txn);
            !state.holders.is_empty()
        });
    }
}

/// Per-statement execution context
#[derive(Debug, Clone)]
pub struct ExecContext {
    txn_id: TxnId,
    locks: Arc<LockManager>,
    cancel: Arc<AtomicBool>,
}

impl ExecContext {
    pub fn new(txn_id: TxnId, locks: Arc<LockManager>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            txn_id,
            locks,
            cancel,
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Shared lock for reads; held until the transaction ends
    pub fn lock_shared(&self, table: &str) -> TxnResult<()> {
        self.locks.lock_shared(self.txn_id, table)
    }

    /// Exclusive lock for writes; held until the transaction ends
    pub fn lock_exclusive(&self, table: &str) -> TxnResult<()> {
        self.locks.lock_exclusive(self.txn_id, table)
    }

    /// Whether cancellation has been requested for this statement
    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Fail with `Cancelled` if cancellation has been requested
    pub fn check_cancelled(&self) -> TxnResult<()> {
        if self.cancel_requested() {
            Err(TxnError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_locks_coexist() {
        let mgr = LockManager::new();
        mgr.lock_shared(1, "t").unwrap();
        mgr.lock_shared(2, "t").unwrap();
    }

    #[test]
    fn test_exclusive_conflicts() {
        let mgr = LockManager::new();
        mgr.lock_exclusive(1, "t").unwrap();
        assert!(matches!(
            mgr.lock_shared(2, "t").unwrap_err(),
            TxnError::Conflict(_)
        ));
        assert!(matches!(
            mgr.lock_exclusive(2, "t").unwrap_err(),
            TxnError::Conflict(_)
        ));
        // re-entrant for the holder
        mgr.lock_shared(1, "t").unwrap();
        mgr.lock_exclusive(1, "t").unwrap();
    }

    #[test]
    fn test_upgrade_when_sole_holder() {
        let mgr = LockManager::new();
        mgr.lock_shared(1, "t").unwrap();
        mgr.lock_exclusive(1, "t").unwrap();

        mgr.lock_shared(2, "u").unwrap();
        mgr.lock_shared(3, "u").unwrap();
        assert!(mgr.lock_exclusive(2, "u").is_err());
    }

    #[test]
    fn test_release_unblocks() {
        let mgr = LockManager::new();
        mgr.lock_exclusive(1, "t").unwrap();
        mgr.release_all(1);
        mgr.lock_exclusive(2, "t").unwrap();
    }

    #[test]
    fn test_cancellation_flag() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = ExecContext::new(1, Arc::new(LockManager::new()), cancel.clone());
        assert!(ctx.check_cancelled().is_ok());
        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(ctx.check_cancelled().unwrap_err(), TxnError::Cancelled));
    }
}

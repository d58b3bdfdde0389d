//! Transactable capability and lifecycle state.

use parking_lot::Mutex;

/// An operation that can be soft-executed, then committed or rolled back.
///
/// Implementations are supplied by the storage layer. Each method reports
/// success as a boolean; a `false` from [`soft_execute`](Self::soft_execute)
/// means there is nothing to commit.
pub trait Transactable: Send + Sync {
    /// Performs the work without making it durable or externally visible.
    fn soft_execute(&self) -> bool;

    /// Makes a previously soft-executed operation durable.
    fn commit(&self) -> bool;

    /// Discards a soft-executed, uncommitted operation.
    fn rollback(&self) -> bool;
}

impl<T: Transactable + ?Sized> Transactable for Box<T> {
    fn soft_execute(&self) -> bool {
        (**self).soft_execute()
    }

    fn commit(&self) -> bool {
        (**self).commit()
    }

    fn rollback(&self) -> bool {
        (**self).rollback()
    }
}

/// Lifecycle state of a [`TrackedTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Created, nothing executed yet.
    Pending,
    /// Soft-execute succeeded; waiting for commit or rollback.
    SoftExecuted,
    /// Soft-execute reported failure.
    Failed,
    /// Commit succeeded.
    Committed,
    /// Rollback succeeded.
    RolledBack,
}

impl TransactionState {
    /// Returns true once the transaction can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Failed | TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

/// Wraps a [`Transactable`] and enforces the call order.
///
/// `commit` and `rollback` only reach the inner operation after a
/// successful `soft_execute`; out-of-order calls return `false` without
/// touching it. A pending transaction may be rolled back, which simply
/// marks it as discarded.
pub struct TrackedTransaction<T> {
    inner: T,
    state: Mutex<TransactionState>,
}

impl<T: Transactable> TrackedTransaction<T> {
    /// Wraps an operation in the `Pending` state.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            state: Mutex::new(TransactionState::Pending),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Returns the wrapped operation.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transactable> Transactable for TrackedTransaction<T> {
    fn soft_execute(&self) -> bool {
        let mut state = self.state.lock();
        if *state != TransactionState::Pending {
            return false;
        }
        let ok = self.inner.soft_execute();
        *state = if ok {
            TransactionState::SoftExecuted
        } else {
            TransactionState::Failed
        };
        ok
    }

    fn commit(&self) -> bool {
        let mut state = self.state.lock();
        if *state != TransactionState::SoftExecuted {
            return false;
        }
        let ok = self.inner.commit();
        if ok {
            *state = TransactionState::Committed;
        }
        ok
    }

    fn rollback(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            TransactionState::Pending => {
                *state = TransactionState::RolledBack;
                true
            }
            TransactionState::SoftExecuted => {
                let ok = self.inner.rollback();
                if ok {
                    *state = TransactionState::RolledBack;
                }
                ok
            }
            _ => false,
        }
    }
}

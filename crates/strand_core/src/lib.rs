//! # Strand Core
//!
//! Process-wide coordination state for a Strand node.
//!
//! This crate provides:
//! - [`PermitStore`]: advisory, non-blocking mutual exclusion at datastore,
//!   collection and record granularity
//! - [`TransactionRegistry`]: the single active [`Transactable`] per
//!   transaction id, driven through soft-execute, commit and rollback
//! - [`HookRegistry`]: event and transaction hook subscriptions with
//!   datastore-wide wildcard matching
//! - [`HookEnvelope`]: the payload handed to the hook delivery layer
//!
//! Every store is an ordinary value; the server shares one instance of each
//! behind an `Arc`, while tests build isolated ones.
//!
//! ```
//! use strand_core::{PermitKey, PermitStore};
//!
//! let permits = PermitStore::new();
//! let key = PermitKey::record("sales", "orders", "pk-42");
//!
//! assert!(permits.acquire(&key));
//! assert!(!permits.acquire(&key));
//! permits.release(&key);
//! assert!(permits.acquire(&key));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
pub mod hook;
mod permit;
pub mod transaction;

pub use error::{CoreError, CoreResult};
pub use hook::{AffectedRecords, EventType, Hook, HookEnvelope, HookKind, HookPayload, HookRegistry};
pub use permit::{PermitGuard, PermitKey, PermitScope, PermitStore};
pub use transaction::{
    SharedTransactable, Transactable, TrackedTransaction, TransactionRegistry, TransactionState,
};

//! Transaction lifecycle tracking.
//!
//! A transactional operation is split in two phases:
//! - **soft-execute**: do the work without making it durable or visible
//! - **commit** or **rollback**: make it durable, or discard it
//!
//! Because soft-execute has no external effect, rollback never needs a
//! compensating action. The [`TransactionRegistry`] holds the one live
//! [`Transactable`] for each transaction id between the two phases.

mod registry;
mod state;

pub use registry::{SharedTransactable, TransactionRegistry};
pub use state::{Transactable, TrackedTransaction, TransactionState};

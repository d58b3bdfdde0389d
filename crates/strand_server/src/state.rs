//! Process-wide coordination state.

use std::sync::Arc;
use strand_core::{HookRegistry, PermitStore, TransactionRegistry};

/// The stores shared by every connection of a node.
///
/// Cloning is cheap and shares the stores.
#[derive(Clone, Default)]
pub struct CoordinationState {
    /// Advisory resource permits.
    pub permits: Arc<PermitStore>,
    /// Live transactions by id.
    pub transactions: Arc<TransactionRegistry>,
    /// Hook subscriptions.
    pub hooks: Arc<HookRegistry>,
}

impl CoordinationState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }
}

//! Hook subscriptions and event envelopes.
//!
//! A hook asks for mutation events on a datastore, optionally narrowed to
//! one collection, to be delivered to a URL. Event hooks fire on ordinary
//! data changes; transaction hooks fire as part of a transaction's commit.
//! Both receive the same [`HookEnvelope`] shape, tagged with their kind.
//!
//! Delivery itself (HTTP, retries) lives outside this crate.

mod envelope;
mod model;
mod registry;

pub use envelope::{AffectedRecords, EventType, HookEnvelope};
pub use model::{Hook, HookKind, HookPayload};
pub use registry::HookRegistry;

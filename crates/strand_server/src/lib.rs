//! # Strand Server
//!
//! Network front end of a Strand node.
//!
//! This crate provides:
//! - [`StrandServer`]: TCP accept loop with a connection limit
//! - [`serve_connection`]: the per-connection decode, handle, reply loop
//! - [`RequestHandler`]: turns request packets into replies, guarding
//!   mutations with permits and driving transactions through
//!   soft-execute, commit and rollback
//! - [`HookDispatcher`]: fire-and-forget hook delivery with retries
//! - Collaborator traits for storage ([`StorageExecutor`],
//!   [`TransactionFactory`]) and delivery ([`HookTransport`]), plus an
//!   in-memory backend, [`MemoryStorage`]
//!
//! # Request flow
//!
//! 1. `Mutate` acquires record permits for every primary key, builds a
//!    transaction through the factory, soft-executes it and registers it
//!    under the client's transaction id.
//! 2. `Commit` commits, unregisters, releases the permits and dispatches
//!    the change to matching transaction and event hooks.
//! 3. `Rollback`, or the connection closing, discards the transaction and
//!    releases its permits.
//!
//! A denied permit is answered with a 409 `Error` packet; nothing waits.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod connection;
mod dispatch;
mod error;
mod executor;
mod handler;
mod memory;
mod server;
mod state;

pub use config::{DeliveryConfig, ServerConfig};
pub use connection::serve_connection;
pub use dispatch::{HookDispatcher, HookTransport, LogTransport};
pub use error::{ServerError, ServerResult};
pub use executor::{Mutation, StorageExecutor, TransactionFactory};
pub use handler::{RequestHandler, Session};
pub use memory::MemoryStorage;
pub use server::StrandServer;
pub use state::CoordinationState;

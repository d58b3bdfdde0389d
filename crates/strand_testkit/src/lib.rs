//! # Strand Testkit
//!
//! Test utilities for Strand.
//!
//! This crate provides:
//! - Scripted transactables and recording hook transports
//! - [`TestNode`], a request handler over memory storage
//! - Raw frame builders for decoder tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strand_testkit::prelude::*;
//!
//! #[test]
//! fn commit_fires_hooks() {
//!     let node = TestNode::new();
//!     let mut session = node.session("test");
//!     // ... send packets, inspect node.hooks
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

//! CLI command implementations.

pub mod decode;
pub mod serve;

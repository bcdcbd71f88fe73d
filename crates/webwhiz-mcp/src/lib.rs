//! `webwhiz` crate (library surface).
//!
//! The primary entrypoint is the `webwhiz` binary. The MCP client and the output envelope live
//! here so integration tests can drive them without spawning the binary.

pub use webwhiz_core as core;

pub mod envelope;
pub mod mcp;

//! Domain layer containing the coordinator's types and pure logic.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, sequence clock, errors)
//! - `stream` - Wire events, parsing and per-block argument buffering
//! - `invocation` - Recognized tool calls and their dispatch lifecycle
//! - `execution` - Per-turn status and deadline header
//! - `resumption` - The outcome handed to the conversation driver

pub mod execution;
pub mod foundation;
pub mod invocation;
pub mod resumption;
pub mod stream;

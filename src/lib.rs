//! Tool Relay - incremental streaming tool-call coordination.
//!
//! Consumes a model's token-level event stream, rebuilds tool calls as their
//! arguments arrive, dispatches each one the moment its block closes, and
//! resumes the conversation exactly once when every dispatched call is
//! terminal or the execution deadline passes.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

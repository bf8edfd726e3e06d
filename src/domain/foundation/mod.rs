//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, time and sequence value objects, the state machine
//! trait, and error types shared by the streaming and execution modules.

mod errors;
mod ids;
mod sequence;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ExecutionId, InvocationId};
pub use sequence::{SequenceClock, SequenceTimestamp};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;

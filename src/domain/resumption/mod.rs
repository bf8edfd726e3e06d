//! Resumption module - the single result set delivered per execution.

mod outcome;

pub use outcome::{
    DiagnosticKind, InvocationDiagnostic, OrderedResult, OutcomeStatus, ResumptionOutcome,
};

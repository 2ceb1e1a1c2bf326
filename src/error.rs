//! Fatal errors of the execution core.
//!
//! Everything here means the loaded definition is incomplete or inconsistent.
//! Ordinary rewriting outcomes (stuck terms, failed or undecided matches) are
//! values, see `machine::StepResult` and `matching::MatchOutcome`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// A fresh value was requested for a sort with no registered generator.
    UnconfiguredFreshFunction { sort: String },
    /// An application's arity disagrees with its label's declared signature.
    MalformedTerm {
        label: String,
        expected: usize,
        found: usize,
    },
    /// A rule or hook refers to a symbol the definition never declared.
    UnknownSymbol { name: String },
    /// Function evaluation recursed deeper than `MachineConfig::max_function_depth`.
    FunctionDepthExceeded { label: String, depth: usize },
}

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteError::UnconfiguredFreshFunction { sort } => {
                write!(f, "no fresh generator registered for sort {}", sort)
            }
            RewriteError::MalformedTerm {
                label,
                expected,
                found,
            } => write!(
                f,
                "malformed term: {} expects {} argument(s), got {}",
                label, expected, found
            ),
            RewriteError::UnknownSymbol { name } => write!(f, "unknown symbol {}", name),
            RewriteError::FunctionDepthExceeded { label, depth } => write!(
                f,
                "function evaluation of {} exceeded depth {}",
                label, depth
            ),
        }
    }
}

impl std::error::Error for RewriteError {}

pub type Result<T> = std::result::Result<T, RewriteError>;

/// Runtime errors raised while executing a pattern.

use std::time::Duration;
use thiserror::Error;

use crate::schema::node::LineCol;

/// What went wrong. Every kind is fatal to the run that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("stack overflow: exceeded maximum depth of {0}")]
    StackOverflow(usize),
    #[error("exceeded character limit ({0})")]
    CharacterLimit(usize),
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("undefined subroutine '{0}'")]
    UndefinedSubroutine(String),
    #[error("undefined synchronizer '{0}'")]
    UndefinedSynchronizer(String),
    #[error("'{name}' does not take {got} argument(s)")]
    ArgumentCountMismatch { name: String, got: usize },
    #[error("expected a boolean condition, found '{0}'")]
    NonBooleanCondition(String),
    #[error("index {index} is out of bounds for '{name}' (length {len})")]
    IndexOutOfBounds { name: String, index: i64, len: usize },
    #[error("invalid operand: expected {expected}, found '{value}'")]
    InvalidOperand { expected: &'static str, value: String },
    #[error("invalid block weight '{0}'")]
    InvalidWeight(String),
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    #[error("unknown {kind} '{value}'")]
    UnknownMode { kind: &'static str, value: String },
}

/// A runtime error tagged with the location of the node that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("runtime error at {location}: {kind}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub location: LineCol,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, location: LineCol) -> Self {
        Self { kind, location }
    }
}

//! Routing-specific error types.

use thiserror::Error;

/// A routing text that could not be compiled.
///
/// `line` is 1-based and points at the first offending line of the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct CompileError {
    pub line: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

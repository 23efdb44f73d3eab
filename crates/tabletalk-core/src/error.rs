//! Error types for the Tabletalk engine
//!
//! This module defines all error types used throughout the core engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
///
/// None of these ever cross the `Engine::process` boundary as a raised
/// error; they are folded into an `Error` envelope before returning.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Language model errors (transport, quota, bad completion)
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    /// Tabular store errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chart sandbox errors
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// A generate-execute loop spent its whole attempt budget
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },

    /// Invalid table shape (duplicate or missing columns)
    #[error("invalid table: {0}")]
    InvalidTable(String),
}

/// Errors raised by a language model client
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("completion contained no choices")]
    EmptyCompletion,
}

/// Errors raised by a tabular store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("failed to open connection: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("data load failed: {0}")]
    Load(String),
}

/// Errors raised by the chart sandbox
#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    /// The chart program could not be parsed or interpreted
    #[error("chart program failed: {0}")]
    Execution(String),

    /// The program ran but bound no chart object under the expected name
    #[error("no chart object produced")]
    MissingChart,

    /// The program referenced a column the table does not have
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// The requested chart kind is not part of the chart capability
    #[error("unsupported chart kind: {0}")]
    UnsupportedKind(String),

    /// The run exceeded the wall-clock bound
    #[error("execution timed out after {0}ms")]
    Timeout(u64),
}

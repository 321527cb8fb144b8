//! Tagged error variants shared across the engine.
//!
//! Every subsystem returns one of these instead of a bare `String` or
//! `anyhow::Error` so that callers (and tests) can match on the failure
//! kind rather than scrape a message.

use thiserror::Error;

/// Top level error surfaced by the public engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session is already processing a turn")]
    Busy,

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("parameter '{0}' not found")]
    ParameterNotFound(String),

    #[error("operation '{0}' not found")]
    OperationNotFound(String),

    #[error("value for '{name}' has the wrong type: expected {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: String,
        got: String,
    },

    #[error("value {value} for '{name}' is out of bounds [{min}, {max}]")]
    OutOfBounds {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Never escapes the graph layer: an edge insertion that would close a
    /// cycle is rejected before it is committed.
    #[error("adding this dependency would create a cycle")]
    CycleDetected,

    #[error("plan failed validation: {errors:?}")]
    PlanInvalid { errors: Vec<String> },

    #[error("language model backend unavailable: {0}")]
    LlmUnavailable(String),

    #[error("language model call timed out after {0:?}")]
    LlmTimeout(std::time::Duration),

    #[error("language model response could not be parsed as a plan: {0}")]
    LlmMalformed(String),

    #[error("script execution exceeded the time limit of {0:?}")]
    ExecTimeout(std::time::Duration),

    #[error("script execution failed: {msg}")]
    ExecFailure { msg: String, traceback: String },

    #[error("script finished without producing a result")]
    ExecMissingResult,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Error taxonomy for the reconciliation core.

use thiserror::Error;

/// Errors surfaced by snapshot fetching, evaluation, matching and mutation.
///
/// Precondition failures (missing token, missing body) never reach this type;
/// they are answered at the HTTP boundary.
#[derive(Debug, Error)]
pub enum MateError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The CAD platform or script evaluator rejected the request.
    #[error("CAD API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A response was missing a required field or had the wrong shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No freshly created instance is left for a pending plan entry.
    #[error("no created instance matches pending entry {entry} ({path})")]
    UnmatchedInstance { entry: usize, path: String },

    #[error("invalid element path: {0}")]
    InvalidPath(String),

    /// A fan-out task panicked or was cancelled by the runtime.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MateError {
    pub fn malformed(context: &str, err: impl std::fmt::Display) -> Self {
        MateError::MalformedResponse(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, MateError>;

//! Errors surfaced by tracing components.
//!
//! Instrumentation-facing operations never return these into the host
//! application; they are logged and counted instead. The error type exists
//! for the injected collaborators (reporters, sampling engines) whose
//! failures the core must observe.

use std::time::Duration;
use thiserror::Error;

/// Describe the result of operations in the tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by tracing collaborators.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The reporter failed to deliver an event.
    #[error("reporter failed to deliver event: {0}")]
    SendFailed(String),

    /// The reporter did not complete within the configured timeout.
    #[error("reporter timed out after {0:?}")]
    SendTimedOut(Duration),

    /// The sampling engine could not produce a decision.
    #[error("sampling engine failure: {0}")]
    SamplingFailed(String),

    /// Other errors propagated from collaborators not covered above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);

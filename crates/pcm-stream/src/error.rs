//! Error taxonomy for the streaming engine.
//!
//! Every variant is terminal for the session that produced it: the state
//! machine moves to `Error` and no further feed cycles run.

use pcm_stream_types::FailureReason;

pub type Result<T, E = StreamError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("invalid stream config: {0}")]
    InvalidConfig(String),

    /// Engine, output path, player, interface lookup or callback registration failed.
    #[error("backend init failed ({stage}): {message}")]
    BackendInit { stage: &'static str, message: String },

    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{op} is not valid while {state}")]
    InvalidState { op: &'static str, state: &'static str },

    /// The output rejected a filled buffer.
    #[error("output rejected buffer: {0}")]
    Submit(String),

    /// The output failed after initialization (start/stop).
    #[error("output error: {0}")]
    Backend(String),
}

impl StreamError {
    pub fn backend_init(stage: &'static str, message: impl std::fmt::Display) -> Self {
        StreamError::BackendInit {
            stage,
            message: message.to_string(),
        }
    }

    /// Re-tag any backend failure during bring-up as `BackendInit`.
    pub(crate) fn into_init(self, stage: &'static str) -> Self {
        match self {
            err @ StreamError::BackendInit { .. } => err,
            other => StreamError::backend_init(stage, other),
        }
    }

    /// Category reported on the event channel.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            StreamError::BackendInit { .. } => FailureReason::BackendInit,
            StreamError::Io(_) => FailureReason::Io,
            StreamError::Submit(_) => FailureReason::Submit,
            StreamError::InvalidFormat(_)
            | StreamError::InvalidConfig(_)
            | StreamError::InvalidState { .. }
            | StreamError::Backend(_) => FailureReason::Backend,
        }
    }
}

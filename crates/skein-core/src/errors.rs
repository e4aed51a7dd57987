//! Stream error taxonomy.
//!
//! A single [`StreamError`] recorded by the pump is cloned into every choice
//! track, so the type is `Clone` and carries only owned strings.

/// Result alias for stream consumers.
pub type StreamResult<T> = Result<T, StreamError>;

/// Terminal and local errors observed while consuming a streamed completion.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The frame source failed (socket error, truncated body, TLS failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The body ended in the middle of an event line.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The session was closed before this choice or the stream finished.
    #[error("stream session closed")]
    Closed,

    /// The caller's own wait was cancelled. Never recorded on shared state.
    #[error("cancelled")]
    Cancelled,
}

impl StreamError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether reissuing the request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::StreamInterrupted(_))
    }
}

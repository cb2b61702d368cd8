use thiserror::Error;

/// Errors from sending a grid to the physical board.
#[derive(Error, Debug)]
pub enum SendError {
    /// Board refused the write (quiet hours or rate limiting). The board
    /// eventually unlocks on its own; the message is not retried.
    #[error("board is locked{}", retry_after_s.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    Locked { retry_after_s: Option<u64> },

    #[error("send timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("board returned unexpected response: {0}")]
    Unexpected(String),
}

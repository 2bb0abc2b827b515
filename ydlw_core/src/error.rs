use std::fmt;

/// Why a download was stopped cooperatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The host abort signal fired or `request_cancel()` was called.
    AbortRequested,
    /// The session's duration limit elapsed.
    DurationReached,
    /// The progress callback returned `false`.
    CallbackDeclined,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::AbortRequested => "abortRequested",
            CancelReason::DurationReached => "duration_reached",
            CancelReason::CallbackDeclined => "callback declined",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download canceled: {0}")]
    Canceled(CancelReason),

    /// The host asked to shut down while no callback was listening.
    #[error("abortRequested")]
    Aborted,

    #[error("engine error: {0}")]
    Engine(String),

    #[error("engine unavailable: {0}")]
    Construction(String),

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl DownloadError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadError::Canceled(_))
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            DownloadError::Canceled(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Raised by a progress callback. The router drops the callback on receipt.
#[derive(Debug, thiserror::Error)]
#[error("callback failed: {0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

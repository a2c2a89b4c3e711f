// Error types for the download engine

use std::time::Duration;

use thiserror::Error;

use super::diagnostics::is_auth_error;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Neither video nor audio was requested
    #[error("Invalid request: at least one of keep-video or extract-audio must be selected")]
    InvalidIntent,

    /// A bounded collaborator call did not finish in time
    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The site wants (different) credentials
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Generic network timeout reported by the collaborator
    #[error("Network timeout: the remote site is not responding")]
    NetworkTimeout,

    /// The site rejected the request (429, bot detection, etc.)
    #[error("The remote site is blocking or throttling requests: {0}")]
    Blocked(String),

    /// yt-dlp or ffmpeg not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// URL the collaborator cannot handle
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse collaborator JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Local audio extraction failed
    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    /// Every step of the fallback matrix failed to produce a file
    #[error("No file could be produced: {0}")]
    Exhausted(String),

    /// Unknown error with details
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DownloadError {
    /// Errors the caller caused, as opposed to system faults
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidIntent | Self::InvalidUrl(_))
    }
}

// Classify raw collaborator stderr
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        // Credentials first: login walls frequently come with timeouts or 403s
        if is_auth_error(&s) {
            return Self::AuthRequired(s);
        }

        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("blocked")
        {
            return Self::Blocked(s);
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("invalid json") || lower.contains("failed to parse") {
            return Self::ParseError(s);
        }

        if lower.contains("invalid url") || lower.contains("unsupported url") {
            return Self::InvalidUrl(s);
        }

        Self::Unknown(s)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::ExecutionError(e.to_string())
    }
}

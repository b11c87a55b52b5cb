//! Remote purge seam.

use async_trait::async_trait;
use thiserror::Error;

/// Why a single purge request did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PurgeError {
    #[error("proxy answered with status {status}")]
    Status { status: u16 },
    #[error("purge request timed out")]
    Timeout,
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("invalid purge url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },
}

impl PurgeError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Short code logged next to the message: the HTTP status when there was
    /// one, otherwise the failure class.
    pub fn code(&self) -> String {
        match self {
            Self::Status { status } => status.to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::Transport { .. } => "transport".to_string(),
            Self::InvalidUrl { .. } => "invalid_url".to_string(),
        }
    }
}

/// Issues one `PURGE` request.
///
/// Implementations never retry; a failure is reported once and the caller
/// decides what it means for the local record.
#[async_trait]
pub trait PurgeClient: Send + Sync {
    async fn purge(&self, url: &str) -> Result<(), PurgeError>;
}

/// Map a proxy status code to a purge outcome.
///
/// Redirects are not followed, so a 3xx is the proxy's final answer and
/// counts as success. Only 4xx and 5xx fail.
pub fn classify_status(status: u16) -> Result<(), PurgeError> {
    if (400..600).contains(&status) {
        Err(PurgeError::Status { status })
    } else {
        Ok(())
    }
}

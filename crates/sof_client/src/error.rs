use engine::ExternalError;
use thiserror::Error;

use crate::retry::is_retryable_status;

pub type Result<T> = std::result::Result<T, SofError>;

#[derive(Debug, Error)]
pub enum SofError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("request not successful: {0}")]
    Unsuccessful(String),
}

impl SofError {
    /// Whether the transport layer may repeat the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::InvalidUrl(_) | Self::Decode(_) | Self::Unsuccessful(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

impl From<SofError> for ExternalError {
    fn from(err: SofError) -> Self {
        ExternalError::Unavailable {
            status: err.status(),
            detail: err.to_string(),
        }
    }
}

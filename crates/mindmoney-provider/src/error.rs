use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Timeout,
    Connect,
    RateLimit,
    ServerError,
    AuthError,
    NotFound,
    InvalidRequest,
    Decode,
    Config,
    Unknown,
}

impl BackendErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            404 => Self::NotFound,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ServerError | Self::Timeout | Self::Connect
        )
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend url: {0}")]
    InvalidBaseUrl(String),
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend unreachable: {0}")]
    Connect(String),
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend api error ({status}): {detail}")]
    Status { status: u16, detail: String },
    #[error("backend returned an unreadable body: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::InvalidBaseUrl(_) => BackendErrorKind::Config,
            BackendError::Timeout(_) => BackendErrorKind::Timeout,
            BackendError::Connect(_) => BackendErrorKind::Connect,
            BackendError::Transport(_) => BackendErrorKind::Unknown,
            BackendError::Status { status, .. } => BackendErrorKind::from_status(*status),
            BackendError::Decode(_) => BackendErrorKind::Decode,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

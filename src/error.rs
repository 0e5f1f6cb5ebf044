//! Error types for the session engine

use std::fmt;
use thiserror::Error;

/// Transport failure with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        let kind = if code == 401 || code == 403 {
            TransportErrorKind::Auth
        } else {
            TransportErrorKind::Status(code)
        };
        Self::new(kind, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("Request timeout: {err}"))
        } else if err.is_decode() {
            Self::decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

/// Failure classification for manual retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, reset, or dropped mid-stream
    Network,
    Timeout,
    /// Non-success HTTP status other than auth failures
    Status(u16),
    /// 401 / 403
    Auth,
    /// Response body could not be decoded
    Decode,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Network | Self::Timeout => true,
            Self::Status(code) => code >= 500,
            Self::Auth | Self::Decode => false,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Auth => write!(f, "authentication failed"),
            Self::Decode => write!(f, "decode error"),
        }
    }
}

/// Errors returned by the history / catalog / feedback / account collaborators
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the session controller
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No chapter has been started")]
    NotStarted,
    #[error("Unknown lesson: {0}")]
    UnknownLesson(String),
    #[error("Unknown chapter: {0}")]
    UnknownChapter(String),
    #[error("Unknown or incomplete message: {0}")]
    UnknownMessage(String),
    #[error("A control handler is active for {0}")]
    Busy(String),
    #[error("Nothing to resend")]
    NothingToResend,
    #[error("Failed to load transcript: {0}")]
    History(#[source] BackendError),
    #[error("Failed to load lesson tree: {0}")]
    Catalog(#[source] BackendError),
}

use std::fmt;

use serde::{Deserialize, Serialize};

pub const NETWORK_MESSAGE: &str = "Network error. Please check your internet connection.";
pub const TIMEOUT_MESSAGE: &str = "The request timed out. Please try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";
pub const VALIDATION_MESSAGE: &str = "The submitted data is invalid.";
pub const SERVER_MESSAGE: &str = "Something went wrong on our end. Please try again later.";
pub const UNKNOWN_MESSAGE: &str = "An unexpected error occurred.";

/// Access credential plus the optional token used to renew it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

// Tokens stay out of log lines and panic messages.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field(
                "access_token",
                &marketplace_logging::redact_token(&self.access_token),
            )
            .field(
                "refresh_token",
                &self
                    .refresh_token
                    .as_deref()
                    .map(marketplace_logging::redact_token),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Network,
    Server,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Server => write!(f, "server"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// The single error type callers see. `message` is ready to show to a user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// Field-level messages in server order; populated for validation errors only.
    pub field_errors: Vec<(String, Vec<String>)>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            field_errors: Vec::new(),
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network() -> Self {
        Self::new(ErrorKind::Network, NETWORK_MESSAGE)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Network, TIMEOUT_MESSAGE)
    }

    pub fn session_expired() -> Self {
        Self::new(ErrorKind::Unauthorized, SESSION_EXPIRED_MESSAGE).with_status(401)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// Normalized response body: `{status, data, message}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub status: EnvelopeStatus,
    pub status_code: u16,
    pub data: T,
    pub message: Option<String>,
}

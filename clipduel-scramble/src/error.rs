//! Error types for clipduel-scramble
//!
//! Network and media errors are caught at the lowest layer; the phase
//! reducer only ever receives well-formed actions and never sees these.

use thiserror::Error;

/// Main error type for clipduel-scramble
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend refused the credentials (401/403)
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    /// Backend answered with a non-success status
    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// Backend payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] clipduel_common::Error),
}

impl Error {
    /// Whether the failure calls for the sign-in view rather than a generic error
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                Error::Unauthorized(err.to_string())
            }
            Some(status) => Error::Backend {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => Error::Decode(err.to_string()),
            None => Error::Http(err.to_string()),
        }
    }
}

/// Convenience Result type using clipduel-scramble Error
pub type Result<T> = std::result::Result<T, Error>;

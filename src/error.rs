//! Application-wide error types.
//!
//! [`ClientError`] is what every core operation returns; [`AppError`] wraps it
//! together with the bootstrap failures of the binary (config, logger, I/O).

use thiserror::Error;

use crate::models::ProjectId;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Failure classification handed back to callers of the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The login endpoint rejected the credentials (carries the server detail).
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The service answered with a non-success HTTP status.
    #[error("api error {status}: {detail}")]
    Api { status: u16, detail: String },

    /// The request never produced a response (connect, DNS, reset…).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Local validation refused the input; no request was made.
    #[error("validation error: {field} must not be empty")]
    Validation { field: &'static str },

    /// An authenticated endpoint was called without a token.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),
}

impl ClientError {
    /// `true` for the authorization failure that forces a re-login.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Api { status: 401, .. })
    }

    /// `true` when the server saw and answered the request.
    pub fn is_server_reply(&self) -> bool {
        matches!(self, ClientError::Api { .. } | ClientError::InvalidCredentials(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn client_error_is_transparent_in_app_error() {
        let e: AppError = ClientError::NotAuthenticated.into();
        assert_eq!(e.to_string(), "not authenticated");
    }

    #[test]
    fn api_error_display_carries_status_and_detail() {
        let e = ClientError::Api { status: 404, detail: "Project not found".into() };
        assert_eq!(e.to_string(), "api error 404: Project not found");
    }

    #[test]
    fn only_401_is_unauthorized() {
        assert!(ClientError::Api { status: 401, detail: String::new() }.is_unauthorized());
        assert!(!ClientError::Api { status: 403, detail: String::new() }.is_unauthorized());
        assert!(!ClientError::Transport("refused".into()).is_unauthorized());
    }

    #[test]
    fn validation_names_the_field() {
        let e = ClientError::Validation { field: "name" };
        assert_eq!(e.to_string(), "validation error: name must not be empty");
    }
}

//! Error types for the chat service.
//!
//! This module defines the central `Error` enum shared by the account store,
//! the session machinery and the gRPC handlers. It implements `From<Error>` for
//! `tonic::Status` so failures that do reach the transport carry a sensible
//! status code.
//!
//! ## Error Cases
//! - `AccountExists`: Registration under a username that is already taken.
//! - `InvalidCredentials`: Unknown username or wrong password. The two are
//!   deliberately indistinguishable.
//! - `InvalidRequest`: The client sent a malformed request or frame.
//! - `PasswordHash`: The password hasher failed or a stored hash is corrupt.
//! - `ChannelError`: An internal channel or task failed.
//! - `ServiceShutdown`: A stream arrived while the service was shutting down.
//!
//! Credential errors are normally turned into `success = false` responses by
//! the handlers; the `Status` mapping exists for the remaining cases.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the chat service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The username is already registered.
    #[error("username already exists")]
    AccountExists,

    /// The username is unknown or the password does not match.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The client request was invalid.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Hashing or parsing a password hash failed.
    #[error("Password hash error: {context}")]
    PasswordHash { context: String },

    /// Internal channel or task failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::AccountExists => Status::already_exists(message),
            Error::InvalidCredentials => Status::unauthenticated(message),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::PasswordHash { .. } | Error::ChannelError { .. } => Status::internal(message),
            Error::ServiceShutdown => Status::unavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn credential_errors_share_no_detail() {
        assert_eq!(
            Error::InvalidCredentials.to_string(),
            "invalid username or password"
        );
        assert_eq!(Error::AccountExists.to_string(), "username already exists");
    }

    #[test]
    fn maps_to_status_codes() {
        let status: Status = Error::InvalidRequest {
            reason: "username must not be empty".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "username must not be empty");

        let status: Status = Error::ServiceShutdown.into();
        assert_eq!(status.code(), Code::Unavailable);

        let status: Status = Error::ChannelError {
            context: "closed".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::Internal);
    }
}

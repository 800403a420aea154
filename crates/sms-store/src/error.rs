//! Store errors and classification of backend failures.

use redis::{ErrorKind, RedisError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing medium cannot be reached right now. Callers may try again later.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backing medium rejected us in a way that will not fix itself
    /// (bad credentials, unreachable at startup).
    #[error("Fatal store error: {0}")]
    Fatal(String),

    /// The server refused a single command. The connection is still usable
    /// and other keys are unaffected.
    #[error("Store rejected command: {0}")]
    Rejected(String),

    /// The store was explicitly disconnected.
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Whether a later attempt could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Escalate to a fatal error. Used for failures during the initial connect.
    pub fn into_fatal(self) -> Self {
        match self {
            StoreError::Unavailable(msg) | StoreError::Rejected(msg) => StoreError::Fatal(msg),
            other => other,
        }
    }
}

/// Whether the failure is about reaching the server at all rather than
/// the server's answer to one command.
fn is_transport_failure(e: &RedisError) -> bool {
    e.is_io_error()
        || e.is_connection_dropped()
        || e.is_connection_refusal()
        || e.is_timeout()
        || e.kind() == ErrorKind::BusyLoadingError
}

/// Redis error codes that mean the credentials are wrong or missing.
const AUTH_ERROR_CODES: &[&str] = &["NOAUTH", "WRONGPASS"];

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        let credentials_rejected = e.kind() == ErrorKind::AuthenticationFailed
            || e.code().is_some_and(|code| AUTH_ERROR_CODES.contains(&code));

        if credentials_rejected {
            StoreError::Fatal(format!("credentials rejected: {}", e))
        } else if is_transport_failure(&e) {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Rejected(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_authentication_failure_is_fatal() {
        let err = RedisError::from((ErrorKind::AuthenticationFailed, "Password authentication failed"));
        let classified = StoreError::from(err);

        assert!(matches!(classified, StoreError::Fatal(_)));
        assert!(!classified.is_transient());
    }

    #[test]
    fn test_connection_refused_is_transient() {
        let err = RedisError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        let classified = StoreError::from(err);

        assert!(matches!(classified, StoreError::Unavailable(_)));
        assert!(classified.is_transient());
    }

    #[test]
    fn test_loading_is_transient() {
        let err = RedisError::from((ErrorKind::BusyLoadingError, "loading dataset"));
        assert!(StoreError::from(err).is_transient());
    }

    #[test]
    fn test_command_error_is_rejected() {
        let err = RedisError::from((
            ErrorKind::TypeError,
            "Operation against a key holding the wrong kind of value",
        ));
        let classified = StoreError::from(err);

        assert!(matches!(classified, StoreError::Rejected(_)));
        assert!(!classified.is_transient());

        let err = RedisError::from((ErrorKind::ReadOnly, "You can't write against a read only replica"));
        assert!(matches!(StoreError::from(err), StoreError::Rejected(_)));
    }

    #[test]
    fn test_dropped_connection_is_transient() {
        let err = RedisError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));

        let err = RedisError::from(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn test_into_fatal() {
        let err = StoreError::Unavailable("connection refused".into()).into_fatal();
        assert_eq!(err, StoreError::Fatal("connection refused".into()));

        let err = StoreError::Rejected("LOADING".into()).into_fatal();
        assert_eq!(err, StoreError::Fatal("LOADING".into()));

        assert_eq!(StoreError::Closed.into_fatal(), StoreError::Closed);
    }
}

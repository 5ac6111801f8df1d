//! Error types for directory operations.
//!
//! Every failure a directory session can surface maps onto one variant of [`Error`]. Variants
//! carry the target path and, where the server supplied them, the result code and diagnostic
//! message so callers can act on a single error per failed operation.

use crate::result_code::ResultCode;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The transport could not establish a connection to the server.
    #[error("Could not connect to directory server {uri}: {message}")]
    Connection {
        /// Server URI that was dialled
        uri: String,
        /// Transport diagnostic
        message: String,
    },

    /// The server rejected the bind.
    #[error("Could not bind to directory server {uri} as `{identity}`: {message}")]
    Bind {
        /// Server URI
        uri: String,
        /// Identity used for the bind (empty for anonymous)
        identity: String,
        /// Server or transport diagnostic
        message: String,
    },

    /// A request could not be dispatched at all.
    #[error("Could not dispatch {operation} for {path}: {message}")]
    Transport {
        /// Operation name (`search`, `add`, ...)
        operation: &'static str,
        /// Target path
        path: String,
        /// Transport diagnostic
        message: String,
    },

    /// The server answered with a non-success, non-busy status.
    #[error("{operation} failed for {path} ({code}) {message}")]
    Protocol {
        /// Operation name
        operation: &'static str,
        /// Target path
        path: String,
        /// Result code reported by the server
        code: ResultCode,
        /// Diagnostic message reported by the server
        message: String,
    },

    /// The server kept answering busy after the retry budget ran out.
    #[error("{operation} failed for {path}: server still busy after {attempts} attempts")]
    BusyExceeded {
        /// Operation name
        operation: &'static str,
        /// Target path
        path: String,
        /// Number of requests issued
        attempts: u32,
    },

    /// No entry exists at the requested path.
    #[error("Directory entry not found: {0}")]
    NotFound(String),

    /// The final delete of a (possibly recursive) delete failed.
    #[error("Could not delete directory entry {path}: {source}")]
    Delete {
        /// Entry that could not be removed
        path: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// A rename under a new parent failed.
    #[error("Could not move directory entry {path} under {new_parent}: {source}")]
    Move {
        /// Entry that was being moved
        path: String,
        /// Requested new parent
        new_parent: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// A distinguished path could not be parsed or manipulated.
    #[error("Invalid directory path: {0}")]
    InvalidPath(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out in the transport
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The session was closed and no longer accepts operations.
    #[error("Session for {0} is closed")]
    SessionClosed(String),

    /// A nested transaction call was made in an invalid state.
    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::BusyExceeded { .. } => "BUSY_EXCEEDED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Delete { .. } => "DELETE_ERROR",
            Self::Move { .. } => "MOVE_ERROR",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::Transaction(_) => "TRANSACTION_ERROR",
        }
    }

    /// Returns the server result code carried by this error, looking through
    /// delete and move wrappers.
    #[must_use]
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            Self::BusyExceeded { .. } => Some(ResultCode::Busy),
            Self::NotFound(_) => Some(ResultCode::NoSuchObject),
            Self::Delete { source, .. } | Self::Move { source, .. } => source.result_code(),
            _ => None,
        }
    }

    /// Returns true if the error means the target entry does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.result_code(), Some(ResultCode::NoSuchObject))
    }

    /// Returns true if repeating the whole operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. }
            | Self::Transport { .. }
            | Self::BusyExceeded { .. }
            | Self::Timeout(_) => true,
            Self::Delete { source, .. } | Self::Move { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Bind { .. } | Self::Transport { .. } | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(code: ResultCode) -> Error {
        Error::Protocol {
            operation: "modify",
            path: "cn=a,dc=example,dc=com".to_string(),
            code,
            message: "nope".to_string(),
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::Connection {
                uri: "ldap://x".to_string(),
                message: "refused".to_string()
            }
            .error_code(),
            "CONNECTION_ERROR"
        );
        assert_eq!(protocol(ResultCode::Other(99)).error_code(), "PROTOCOL_ERROR");
        assert_eq!(Error::NotFound("x".to_string()).error_code(), "NOT_FOUND");
        assert_eq!(
            Error::SessionClosed("ldap://x".to_string()).error_code(),
            "SESSION_CLOSED"
        );
    }

    #[test]
    fn test_error_display() {
        let err = protocol(ResultCode::InsufficientAccess);
        assert_eq!(
            err.to_string(),
            "modify failed for cn=a,dc=example,dc=com (50 insufficientAccessRights) nope"
        );

        let err = Error::BusyExceeded {
            operation: "add",
            path: "cn=a".to_string(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "add failed for cn=a: server still busy after 3 attempts"
        );
    }

    #[test]
    fn test_result_code_through_wrappers() {
        let err = Error::Delete {
            path: "ou=a".to_string(),
            source: Box::new(protocol(ResultCode::NotAllowedOnNonLeaf)),
        };
        assert_eq!(err.result_code(), Some(ResultCode::NotAllowedOnNonLeaf));
        assert!(!err.is_not_found());

        let err = Error::Move {
            path: "ou=a".to_string(),
            new_parent: "ou=b".to_string(),
            source: Box::new(protocol(ResultCode::NoSuchObject)),
        };
        assert!(err.is_not_found());
        assert!(Error::NotFound("ou=a".to_string()).is_not_found());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::Timeout("search".to_string()).is_retryable());
        assert!(!protocol(ResultCode::InsufficientAccess).is_retryable());
        let err = Error::Delete {
            path: "ou=a".to_string(),
            source: Box::new(Error::BusyExceeded {
                operation: "delete",
                path: "ou=a".to_string(),
                attempts: 11,
            }),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_should_log() {
        assert!(Error::Config("bad".to_string()).should_log());
        assert!(!Error::NotFound("x".to_string()).should_log());
    }
}

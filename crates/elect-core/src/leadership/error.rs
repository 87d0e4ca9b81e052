//! Error types for leader election.
//!
//! These errors describe failures talking to the backing lock store and
//! configuration mistakes. None of them ever escape `start`, `stop` or
//! `is_leader`; they are logged there and only returned to callers of the
//! one-shot and store-level APIs.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during leader election operations.
#[derive(Error, Debug, Clone)]
pub enum LeaderElectionError {
    /// A connection error occurred while communicating with the backing store.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// A store operation did not complete within its time bound.
    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout {
        /// The operation that timed out (e.g. "acquire", "release").
        operation: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// The store session was used after it had been closed.
    #[error("Lock session is closed")]
    SessionClosed,

    /// The store rejected or failed a lock query.
    #[error("Query error: {message}")]
    Query {
        /// Description of the query failure.
        message: String,
    },

    /// A purpose name did not match any entry of the lock catalog.
    #[error("Unknown lock purpose '{name}'")]
    UnknownPurpose {
        /// The name that failed to resolve.
        name: String,
    },

    /// Elector configuration failed validation.
    #[error("Invalid elector configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl LeaderElectionError {
    /// Creates a `Connection` error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Creates a `Query` error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates an `UnknownPurpose` error.
    pub fn unknown_purpose(name: impl Into<String>) -> Self {
        Self::UnknownPurpose { name: name.into() }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the session was already closed.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed)
    }

    /// Returns `true` if the session that produced this error can no longer
    /// be trusted to hold locks and should be replaced.
    pub fn invalidates_session(&self) -> bool {
        self.is_connection() || self.is_timeout() || self.is_session_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error() {
        let err = LeaderElectionError::connection("connection refused");
        assert!(err.is_connection());
        assert!(!err.is_timeout());
        assert!(err.invalidates_session());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_timeout_error() {
        let err = LeaderElectionError::timeout("acquire", Duration::from_secs(5));
        assert!(err.is_timeout());
        assert!(err.invalidates_session());
        assert!(err.to_string().contains("acquire"));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_query_error_keeps_session() {
        let err = LeaderElectionError::query("syntax error");
        assert!(!err.is_connection());
        assert!(!err.invalidates_session());
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_session_closed_error() {
        let err = LeaderElectionError::SessionClosed;
        assert!(err.is_session_closed());
        assert!(err.invalidates_session());
    }

    #[test]
    fn test_unknown_purpose_error() {
        let err = LeaderElectionError::unknown_purpose("billing");
        assert!(!err.invalidates_session());
        assert!(err.to_string().contains("billing"));
    }
}

//! Error types for store client operations.

use thiserror::Error;

/// Errors a store client can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The endpoint could not be reached.
    #[error("store unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// The operation did not complete within its deadline.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// The store rejected the supplied credentials.
    #[error("authentication failed for user {username:?}: {reason}")]
    AuthFailed { username: String, reason: String },

    /// The authenticated user may not perform this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The named user does not exist.
    #[error("user not found: {0}")]
    UnknownUser(String),

    /// The named role does not exist.
    #[error("role not found: {0}")]
    UnknownRole(String),

    /// The client was closed and can no longer be used.
    #[error("client closed")]
    Closed,

    /// The store answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TLS material could not be loaded.
    #[error("tls configuration: {0}")]
    Tls(String),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

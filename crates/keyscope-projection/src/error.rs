use keyscope_session::SessionError;
use keyscope_store::StoreError;
use thiserror::Error;

/// Failures surfaced by the projection service.
///
/// Keys outside every permitted range are reported as [`NotFound`], never
/// as [`PermissionDenied`]: callers cannot tell "exists but forbidden" from
/// "does not exist".
///
/// [`NotFound`]: ProjectionError::NotFound
/// [`PermissionDenied`]: ProjectionError::PermissionDenied
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// No session could be established or authenticated for the caller.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Looking up the caller's roles or role permissions failed.
    #[error("permission lookup failed: {0}")]
    AuthQueryFailed(String),

    /// A fetch, put or delete failed after the session was established.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The key matched nothing and has no descendants in any permitted range.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The store refused an operation for the authenticated user.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ProjectionError {
    /// Classify a failure on the data path.
    pub fn store(err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied(reason) => Self::PermissionDenied(reason),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }

    /// Classify a failure while resolving permissions.
    pub fn auth_query(err: StoreError) -> Self {
        Self::AuthQueryFailed(err.to_string())
    }
}

impl From<SessionError> for ProjectionError {
    fn from(err: SessionError) -> Self {
        Self::ConnectFailed(err.to_string())
    }
}

pub type ProjectionResult<T> = Result<T, ProjectionError>;

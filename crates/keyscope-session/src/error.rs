use keyscope_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No session could be established or authenticated for the identity.
    #[error("connect failed for {target}: {source}")]
    ConnectFailed {
        target: String,
        #[source]
        source: StoreError,
    },

    /// Establishing the session took longer than the connect timeout.
    #[error("connect to {target} timed out after {seconds}s")]
    ConnectTimeout { target: String, seconds: u64 },
}

pub type SessionResult<T> = Result<T, SessionError>;

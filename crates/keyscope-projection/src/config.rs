use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, ProjectionResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Delimiter that splits flat keys into path segments.
    pub separator: String,
    /// Whether the store enforces authentication. When `false` every
    /// identity sees the whole key space.
    pub use_auth: bool,
    /// Name of the privileged user that bypasses permission resolution.
    pub root_username: String,
    /// Password of the privileged user, used for role lookups. When unset
    /// the caller's own session performs them.
    pub root_secret: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            separator: "/".into(),
            use_auth: true,
            root_username: "root".into(),
            root_secret: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
        }
    }
}

impl ProjectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> ProjectionResult<()> {
        if self.separator.is_empty() {
            return Err(ProjectionError::InvalidInput("separator must not be empty".into()));
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(ProjectionError::InvalidInput("timeouts must be at least one second".into()));
        }
        Ok(())
    }
}

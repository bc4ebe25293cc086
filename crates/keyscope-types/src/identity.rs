use std::fmt;

/// The credentials a store session is opened for.
///
/// Equality is structural over all three fields, so two identities that
/// differ only in `secret` are distinct. The connection cache relies on this
/// to notice a changed password for the same `(endpoint, username)` slot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Store endpoint URL, e.g. `http://127.0.0.1:2379`.
    pub endpoint: String,
    /// Store user name. Empty for unauthenticated sessions.
    pub username: String,
    /// Store password.
    pub secret: String,
}

impl Identity {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// An identity without credentials, for stores running without auth.
    pub fn anonymous(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, "", "")
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// The cache slot this identity occupies: one live session per
    /// `(endpoint, username)` pair.
    pub fn slot(&self) -> (&str, &str) {
        (&self.endpoint, &self.username)
    }
}

// The secret never appears in logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "anonymous@{}", self.endpoint)
        } else {
            write!(f, "{}@{}", self.username, self.endpoint)
        }
    }
}

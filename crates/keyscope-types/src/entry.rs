//! Key/value entries as the remote store returns them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of a store lease. A key attached to a lease is removed when the
/// lease expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaseId(pub i64);

/// One entry of the flat key space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
    /// Lease the key is attached to, if any.
    pub lease: Option<LeaseId>,
    /// Store revision at which the key was created.
    pub create_revision: i64,
    /// Store revision of the last modification.
    pub mod_revision: i64,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            lease: None,
            create_revision: 0,
            mod_revision: 0,
        }
    }

    pub fn with_revisions(mut self, create: i64, modified: i64) -> Self {
        self.create_revision = create;
        self.mod_revision = modified;
        self
    }
}

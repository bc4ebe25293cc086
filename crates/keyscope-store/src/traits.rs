//! The store capability consumed by keyscope.
//!
//! Any backend (in-memory, JSON gateway, a native RPC client) implements
//! [`StoreClient`] for an open session and [`Connector`] to open sessions for
//! an [`Identity`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use keyscope_types::{Identity, KeyValue, LeaseId, RolePermission};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Cluster summary shown when a session is opened.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Server version string.
    pub version: String,
    /// Backend database size in bytes.
    pub db_size: u64,
    /// Name of the current leader member.
    pub leader_name: String,
}

/// An open, authenticated session against the store.
///
/// Implementations must be thread-safe; one session is shared by every
/// request made with the same identity.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Point lookup. Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>>;

    /// Every entry whose key starts with `prefix`, ascending by key.
    async fn get_prefix(&self, prefix: &str) -> StoreResult<Vec<KeyValue>>;

    /// Create or update `key`. When `lease_seconds` is given a fresh lease of
    /// that length is granted and attached to the key.
    async fn put(&self, key: &str, value: Bytes, lease_seconds: Option<i64>)
        -> StoreResult<KeyValue>;

    /// Delete a single key. Returns the number of keys removed.
    async fn delete(&self, key: &str) -> StoreResult<u64>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64>;

    /// Remaining seconds of `lease`; `-1` if it expired or is unknown.
    async fn lease_time_to_live(&self, lease: LeaseId) -> StoreResult<i64>;

    async fn list_users(&self) -> StoreResult<Vec<String>>;

    /// Role names granted to `name`.
    async fn get_user(&self, name: &str) -> StoreResult<Vec<String>>;

    /// Permissions carried by role `name`.
    async fn get_role(&self, name: &str) -> StoreResult<Vec<RolePermission>>;

    async fn status(&self) -> StoreResult<ClusterStatus>;

    /// Release the session. Further calls fail with `StoreError::Closed`.
    async fn close(&self);
}

/// Opens store sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a session for `identity`.
    async fn connect(&self, identity: &Identity) -> StoreResult<Arc<dyn StoreClient>>;
}

//! In-memory store cluster for tests and demos.
//!
//! [`MemoryCluster`] keeps a revisioned, sorted key space plus leases, users
//! and roles behind a `RwLock`. [`MemoryConnector`] opens [`MemoryClient`]
//! sessions against it and counts how many were opened and closed, which is
//! what the connection cache tests assert on. Data is lost when the cluster
//! is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use keyscope_types::{Identity, KeyValue, LeaseId, RolePermission};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ClusterStatus, Connector, StoreClient};

const MEMORY_VERSION: &str = "memory-1";

#[derive(Clone, Debug)]
struct StoredValue {
    value: Bytes,
    lease: Option<LeaseId>,
    create_revision: i64,
    mod_revision: i64,
}

#[derive(Clone, Debug)]
struct Lease {
    expires_at: Instant,
}

#[derive(Clone, Debug)]
struct User {
    password: String,
    roles: Vec<String>,
}

#[derive(Debug, Default)]
struct ClusterState {
    kvs: BTreeMap<String, StoredValue>,
    revision: i64,
    leases: HashMap<LeaseId, Lease>,
    next_lease: i64,
    users: BTreeMap<String, User>,
    roles: BTreeMap<String, Vec<RolePermission>>,
    auth_enabled: bool,
}

impl ClusterState {
    /// Revoke expired leases together with the keys attached to them.
    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return;
        }
        for id in &expired {
            self.leases.remove(id);
        }
        let before = self.kvs.len();
        self.kvs
            .retain(|_, stored| !stored.lease.is_some_and(|l| expired.contains(&l)));
        if self.kvs.len() != before {
            self.revision += 1;
        }
    }

    fn entry(&self, key: &str, stored: &StoredValue) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: stored.value.clone(),
            lease: stored.lease,
            create_revision: stored.create_revision,
            mod_revision: stored.mod_revision,
        }
    }

    fn put(&mut self, key: &str, value: Bytes, lease: Option<LeaseId>) -> KeyValue {
        self.revision += 1;
        let revision = self.revision;
        let create_revision = self
            .kvs
            .get(key)
            .map(|existing| existing.create_revision)
            .unwrap_or(revision);
        let stored = StoredValue {
            value,
            lease,
            create_revision,
            mod_revision: revision,
        };
        let entry = self.entry(key, &stored);
        self.kvs.insert(key.to_string(), stored);
        entry
    }

    fn grant(&mut self, seconds: i64, now: Instant) -> StoreResult<LeaseId> {
        if seconds <= 0 {
            return Err(StoreError::Protocol(format!(
                "lease TTL must be positive, got {seconds}"
            )));
        }
        let expires_at = now
            .checked_add(Duration::from_secs(seconds.unsigned_abs()))
            .ok_or_else(|| StoreError::Protocol(format!("lease TTL {seconds}s is too large")))?;
        self.next_lease += 1;
        let id = LeaseId(self.next_lease);
        self.leases.insert(id, Lease { expires_at });
        Ok(id)
    }
}

/// A shared in-memory store cluster.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: RwLock<ClusterState>,
    unavailable: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryCluster {
    /// Create an empty cluster with auth disabled.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> StoreResult<RwLockWriteGuard<'_, ClusterState>> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StoreError::Protocol(format!("lock poisoned: {e}")))?;
        state.purge_expired(Instant::now());
        Ok(state)
    }

    /// Seed a key directly, bypassing sessions.
    pub fn insert(&self, key: &str, value: impl Into<Bytes>) -> StoreResult<KeyValue> {
        Ok(self.state()?.put(key, value.into(), None))
    }

    /// Register a user with the given roles.
    pub fn add_user(&self, name: &str, password: &str, roles: &[&str]) -> StoreResult<()> {
        self.state()?.users.insert(
            name.to_string(),
            User {
                password: password.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Register a role with the given permissions.
    pub fn add_role(&self, name: &str, permissions: Vec<RolePermission>) -> StoreResult<()> {
        self.state()?.roles.insert(name.to_string(), permissions);
        Ok(())
    }

    /// Require valid credentials on connect.
    pub fn enable_auth(&self) -> StoreResult<()> {
        self.state()?.auth_enabled = true;
        Ok(())
    }

    /// Simulate an outage: every subsequent call fails as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sessions opened so far.
    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn connections_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn revision(&self) -> i64 {
        self.state.read().map(|s| s.revision).unwrap_or_default()
    }

    fn check_available(&self, endpoint: &str) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "cluster marked unavailable".into(),
            });
        }
        Ok(())
    }
}

/// Opens sessions against a [`MemoryCluster`].
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    cluster: Arc<MemoryCluster>,
    delay: Option<Duration>,
}

impl MemoryConnector {
    pub fn new(cluster: Arc<MemoryCluster>) -> Self {
        Self { cluster, delay: None }
    }

    /// Make every connect take at least `delay`, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, identity: &Identity) -> StoreResult<Arc<dyn StoreClient>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.cluster.check_available(&identity.endpoint)?;
        {
            let state = self.cluster.state()?;
            if state.auth_enabled {
                let valid = state
                    .users
                    .get(&identity.username)
                    .is_some_and(|u| u.password == identity.secret);
                if !valid {
                    return Err(StoreError::AuthFailed {
                        username: identity.username.clone(),
                        reason: "invalid user name or password".into(),
                    });
                }
            }
        }
        self.cluster.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryClient {
            cluster: Arc::clone(&self.cluster),
            endpoint: identity.endpoint.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One session against a [`MemoryCluster`].
#[derive(Debug)]
pub struct MemoryClient {
    cluster: Arc<MemoryCluster>,
    endpoint: String,
    closed: AtomicBool,
}

impl MemoryClient {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ready(&self) -> StoreResult<RwLockWriteGuard<'_, ClusterState>> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        self.cluster.check_available(&self.endpoint)?;
        self.cluster.state()
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>> {
        let state = self.ready()?;
        Ok(state.kvs.get(key).map(|stored| state.entry(key, stored)))
    }

    async fn get_prefix(&self, prefix: &str) -> StoreResult<Vec<KeyValue>> {
        let state = self.ready()?;
        Ok(state
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, stored)| state.entry(k, stored))
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease_seconds: Option<i64>,
    ) -> StoreResult<KeyValue> {
        let mut state = self.ready()?;
        let lease = match lease_seconds {
            Some(seconds) => Some(state.grant(seconds, Instant::now())?),
            None => None,
        };
        Ok(state.put(key, value, lease))
    }

    async fn delete(&self, key: &str) -> StoreResult<u64> {
        let mut state = self.ready()?;
        if state.kvs.remove(key).is_some() {
            state.revision += 1;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut state = self.ready()?;
        let before = state.kvs.len();
        state.kvs.retain(|k, _| !k.starts_with(prefix));
        let removed = (before - state.kvs.len()) as u64;
        if removed > 0 {
            state.revision += 1;
        }
        Ok(removed)
    }

    async fn lease_time_to_live(&self, lease: LeaseId) -> StoreResult<i64> {
        let state = self.ready()?;
        let now = Instant::now();
        Ok(state
            .leases
            .get(&lease)
            .map(|l| l.expires_at.saturating_duration_since(now).as_secs() as i64)
            .unwrap_or(-1))
    }

    async fn list_users(&self) -> StoreResult<Vec<String>> {
        let state = self.ready()?;
        Ok(state.users.keys().cloned().collect())
    }

    async fn get_user(&self, name: &str) -> StoreResult<Vec<String>> {
        let state = self.ready()?;
        state
            .users
            .get(name)
            .map(|u| u.roles.clone())
            .ok_or_else(|| StoreError::UnknownUser(name.to_string()))
    }

    async fn get_role(&self, name: &str) -> StoreResult<Vec<RolePermission>> {
        let state = self.ready()?;
        state
            .roles
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRole(name.to_string()))
    }

    async fn status(&self) -> StoreResult<ClusterStatus> {
        let state = self.ready()?;
        let db_size = state
            .kvs
            .iter()
            .map(|(k, v)| (k.len() + v.value.len()) as u64)
            .sum();
        Ok(ClusterStatus {
            version: MEMORY_VERSION.into(),
            db_size,
            leader_name: "memory".into(),
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cluster.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscope_types::Access;

    async fn open(cluster: &Arc<MemoryCluster>) -> Arc<dyn StoreClient> {
        MemoryConnector::new(Arc::clone(cluster))
            .connect(&Identity::anonymous("mem://"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_get_and_revisions() {
        let cluster = MemoryCluster::new();
        let client = open(&cluster).await;

        let first = client.put("/a", Bytes::from("1"), None).await.unwrap();
        assert_eq!(first.create_revision, 1);
        assert_eq!(first.mod_revision, 1);

        let second = client.put("/a", Bytes::from("2"), None).await.unwrap();
        assert_eq!(second.create_revision, 1);
        assert_eq!(second.mod_revision, 2);

        let read = client.get("/a").await.unwrap().unwrap();
        assert_eq!(read.value, Bytes::from("2"));
        assert!(client.get("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefix_scan_is_sorted_and_bounded() {
        let cluster = MemoryCluster::new();
        cluster.insert("/foo/baz", "2").unwrap();
        cluster.insert("/foo/bar", "1").unwrap();
        cluster.insert("/fop", "x").unwrap();
        cluster.insert("/bar", "y").unwrap();
        let client = open(&cluster).await;

        let keys: Vec<String> = client
            .get_prefix("/foo")
            .await
            .unwrap()
            .into_iter()
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys, vec!["/foo/bar", "/foo/baz"]);
        assert_eq!(client.get_prefix("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn delete_single_and_prefix() {
        let cluster = MemoryCluster::new();
        cluster.insert("/d", "v").unwrap();
        cluster.insert("/d/1", "v").unwrap();
        cluster.insert("/d/2", "v").unwrap();
        let client = open(&cluster).await;

        assert_eq!(client.delete("/d").await.unwrap(), 1);
        assert_eq!(client.delete("/d").await.unwrap(), 0);
        assert_eq!(client.delete_prefix("/d/").await.unwrap(), 2);
        assert!(client.get_prefix("/d").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leases_report_remaining_time() {
        let cluster = MemoryCluster::new();
        let client = open(&cluster).await;

        let kv = client.put("/l", Bytes::from("v"), Some(60)).await.unwrap();
        let lease = kv.lease.expect("lease attached");
        let ttl = client.lease_time_to_live(lease).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);
        assert_eq!(client.lease_time_to_live(LeaseId(999_999)).await.unwrap(), -1);
        assert!(client.put("/l", Bytes::from("v"), Some(0)).await.is_err());
    }

    #[tokio::test]
    async fn oversized_lease_is_rejected_without_poisoning() {
        let cluster = MemoryCluster::new();
        let client = open(&cluster).await;

        let err = client.put("/x", Bytes::from("v"), Some(i64::MAX)).await.unwrap_err();
        assert!(matches!(err, StoreError::Protocol(_)));
        assert!(client.get("/x").await.unwrap().is_none());

        client.put("/k", Bytes::from("v"), None).await.unwrap();
        assert_eq!(client.get("/k").await.unwrap().unwrap().value, Bytes::from("v"));
    }

    #[tokio::test]
    async fn auth_rejects_bad_credentials() {
        let cluster = MemoryCluster::new();
        cluster.add_user("alice", "pw", &["reader"]).unwrap();
        cluster.enable_auth().unwrap();
        let connector = MemoryConnector::new(Arc::clone(&cluster));

        let err = connector
            .connect(&Identity::new("mem://", "alice", "wrong"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::AuthFailed { .. }));
        assert!(connector.connect(&Identity::new("mem://", "alice", "pw")).await.is_ok());
        assert_eq!(cluster.connections_opened(), 1);
    }

    #[tokio::test]
    async fn users_and_roles() {
        let cluster = MemoryCluster::new();
        cluster.add_role("reader", vec![RolePermission::new("/app/*", Access::Read)]).unwrap();
        cluster.add_user("alice", "pw", &["reader"]).unwrap();
        let client = open(&cluster).await;

        assert_eq!(client.list_users().await.unwrap(), vec!["alice"]);
        assert_eq!(client.get_user("alice").await.unwrap(), vec!["reader"]);
        assert_eq!(client.get_role("reader").await.unwrap()[0].pattern, "/app/*");
        assert!(matches!(client.get_user("bob").await, Err(StoreError::UnknownUser(_))));
        assert!(matches!(client.get_role("none").await, Err(StoreError::UnknownRole(_))));
    }

    #[tokio::test]
    async fn closed_client_rejects_calls() {
        let cluster = MemoryCluster::new();
        let client = open(&cluster).await;
        client.close().await;
        client.close().await;
        assert_eq!(cluster.connections_closed(), 1);
        assert!(matches!(client.get("/a").await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn outage_fails_calls() {
        let cluster = MemoryCluster::new();
        let client = open(&cluster).await;
        cluster.set_unavailable(true);
        assert!(matches!(
            client.get_prefix("/").await,
            Err(StoreError::Unreachable { .. })
        ));
        cluster.set_unavailable(false);
        assert!(client.get_prefix("/").await.is_ok());
    }
}

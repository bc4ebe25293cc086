//! The projection service: read, write and delete against the store on
//! behalf of an identity.

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use keyscope_session::ConnectionCache;
use keyscope_store::Connector;
use keyscope_types::path::normalize_key;
use keyscope_types::{Identity, Node};
use serde::Serialize;

use crate::config::ProjectionConfig;
use crate::deadline::within;
use crate::error::{ProjectionError, ProjectionResult};
use crate::permission::PermissionResolver;
use crate::tree::TreeBuilder;

/// Cluster summary shown when a client first connects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    pub version: String,
    /// Database size in its largest whole unit, e.g. `12M`.
    pub size: String,
    /// Name of the current leader member.
    pub name: String,
}

/// Entry point for every request.
///
/// Each call resolves permissions and builds its result from scratch; the
/// only state shared across requests is the connection cache.
pub struct ProjectionService {
    config: ProjectionConfig,
    cache: Arc<ConnectionCache>,
    resolver: PermissionResolver,
    builder: TreeBuilder,
}

impl ProjectionService {
    pub fn new(config: ProjectionConfig, connector: Arc<dyn Connector>) -> ProjectionResult<Self> {
        let cache = Arc::new(ConnectionCache::new(connector, config.connect_timeout()));
        Self::with_cache(config, cache)
    }

    /// Build a service around an existing cache.
    pub fn with_cache(config: ProjectionConfig, cache: Arc<ConnectionCache>) -> ProjectionResult<Self> {
        config.validate()?;
        let resolver = PermissionResolver::new(Arc::clone(&cache), config.clone());
        let builder = TreeBuilder::new(config.separator.clone(), config.request_timeout());
        Ok(Self {
            config,
            cache,
            resolver,
            builder,
        })
    }

    pub fn separator(&self) -> &str {
        &self.config.separator
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Read `key`.
    ///
    /// With `want_descendants` the whole visible subtree is returned.
    /// Without it, `key` must fall inside one of the caller's ranges and is
    /// returned as a single leaf. Either way, keys the caller may not see are
    /// reported as [`ProjectionError::NotFound`].
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn project(
        &self,
        identity: &Identity,
        key: &str,
        want_descendants: bool,
    ) -> ProjectionResult<Node> {
        let key = self.normalize(key)?;
        let ranges = self.resolver.resolve(identity, &key).await?;
        let handle = self.cache.acquire(&self.session_identity(identity)).await?;

        if want_descendants {
            return self.builder.build(&key, &ranges, handle.client()).await;
        }

        if !ranges.iter().any(|r| r.covers(&key, self.separator())) {
            tracing::debug!(%key, "key outside every permitted range");
            return Err(ProjectionError::NotFound(key));
        }
        let entry = within(self.config.request_timeout(), handle.client().get(&key))
            .await
            .map_err(ProjectionError::store)?
            .ok_or_else(|| ProjectionError::NotFound(key.clone()))?;

        let mut node = Node::from_entry(&entry);
        if let Some(lease) = entry.lease {
            node.ttl_seconds = self.builder.time_to_live(lease, handle.client()).await;
        }
        Ok(node)
    }

    /// Store `value` under `key`, optionally bound to a fresh lease of
    /// `lease_seconds`, and return the stored node.
    ///
    /// Write permission is enforced by the store itself.
    #[tracing::instrument(skip(self, identity, value), fields(identity = %identity, len = value.len()))]
    pub async fn write(
        &self,
        identity: &Identity,
        key: &str,
        value: Bytes,
        lease_seconds: Option<i64>,
    ) -> ProjectionResult<Node> {
        let key = self.normalize(key)?;
        if let Some(seconds) = lease_seconds {
            if seconds <= 0 {
                return Err(ProjectionError::InvalidInput(format!(
                    "ttl must be positive, got {seconds}"
                )));
            }
        }

        let handle = self.cache.acquire(&self.session_identity(identity)).await?;
        let client = handle.client();
        let limit = self.config.request_timeout();

        let written = within(limit, client.put(&key, value, lease_seconds))
            .await
            .map_err(ProjectionError::store)?;
        let stored = within(limit, client.get(&key))
            .await
            .map_err(ProjectionError::store)?
            .unwrap_or(written);

        let mut node = Node::from_entry(&stored);
        if let Some(lease) = stored.lease {
            node.ttl_seconds = self.builder.time_to_live(lease, client).await;
        }
        tracing::info!(%key, revision = stored.mod_revision, "wrote key");
        Ok(node)
    }

    /// Delete `key`, and with `recursive` every key nested under it.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn remove(&self, identity: &Identity, key: &str, recursive: bool) -> ProjectionResult<()> {
        let key = self.normalize(key)?;
        let handle = self.cache.acquire(&self.session_identity(identity)).await?;
        let client = handle.client();
        let limit = self.config.request_timeout();

        let mut removed = within(limit, client.delete(&key))
            .await
            .map_err(ProjectionError::store)?;
        if recursive {
            let sep = self.separator();
            let nested = if key == sep { key.clone() } else { format!("{key}{sep}") };
            removed += within(limit, client.delete_prefix(&nested))
                .await
                .map_err(ProjectionError::store)?;
        }
        tracing::info!(%key, removed, recursive, "removed keys");
        Ok(())
    }

    /// Version, database size and leader name of the cluster behind
    /// `identity`'s endpoint.
    #[tracing::instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn info(&self, identity: &Identity) -> ProjectionResult<ClusterInfo> {
        let handle = self.cache.acquire(&self.session_identity(identity)).await?;
        let status = within(self.config.request_timeout(), handle.client().status())
            .await
            .map_err(ProjectionError::store)?;
        Ok(ClusterInfo {
            version: status.version,
            size: format_size(status.db_size),
            name: status.leader_name,
        })
    }

    /// Close every cached session.
    pub async fn shutdown(&self) {
        self.cache.close_all().await;
    }

    /// The identity sessions are opened with. Without auth the store is
    /// reached anonymously whatever credentials the caller sent.
    fn session_identity<'a>(&self, identity: &'a Identity) -> Cow<'a, Identity> {
        if self.config.use_auth || identity.is_anonymous() {
            Cow::Borrowed(identity)
        } else {
            Cow::Owned(Identity::anonymous(identity.endpoint.clone()))
        }
    }

    fn normalize(&self, key: &str) -> ProjectionResult<String> {
        if key.is_empty() {
            return Err(ProjectionError::InvalidInput("key must not be empty".into()));
        }
        Ok(normalize_key(key, self.separator()))
    }
}

/// Render `bytes` in its largest whole unit: `3G`, `12M`, `5K` or `100Byte`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{}G", b / GB),
        b if b >= MB => format!("{}M", b / MB),
        b if b >= KB => format!("{}K", b / KB),
        b => format!("{b}Byte"),
    }
}

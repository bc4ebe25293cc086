//! Permission resolution: which key ranges may an identity read?
//!
//! Role permissions arrive as glob patterns and are classified exactly once,
//! here, into the closed [`RangeKind`] set:
//!
//! | pattern   | range                          |
//! |-----------|--------------------------------|
//! | `/foo/*`  | `SubtreePrefix` over `/foo`    |
//! | `/foo*`   | `Prefix` over `/foo`           |
//! | `/foo`    | `Exact` on `/foo`              |
//!
//! The subtree glob is the configured separator followed by `*`.

use std::collections::BTreeMap;
use std::sync::Arc;

use keyscope_session::ConnectionCache;
use keyscope_types::{Identity, PermissionRange, RangeKind};

use crate::config::ProjectionConfig;
use crate::deadline::within;
use crate::error::{ProjectionError, ProjectionResult};

/// Classify a remote permission pattern.
pub fn classify(pattern: &str, separator: &str) -> PermissionRange {
    let subtree_glob = format!("{separator}*");
    if let Some(prefix) = pattern.strip_suffix(subtree_glob.as_str()) {
        PermissionRange::subtree(prefix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        PermissionRange::prefix(prefix)
    } else {
        PermissionRange::exact(pattern)
    }
}

pub struct PermissionResolver {
    cache: Arc<ConnectionCache>,
    config: ProjectionConfig,
}

impl PermissionResolver {
    pub fn new(cache: Arc<ConnectionCache>, config: ProjectionConfig) -> Self {
        Self { cache, config }
    }

    /// Readable ranges for `identity`, sorted by prefix.
    ///
    /// Deployments without auth and the root user get the single universal
    /// range `{key, Prefix}`. Everyone else gets the union of their roles'
    /// readable permissions; when two permissions share a prefix the later
    /// one (in role order) decides the kind.
    pub async fn resolve(&self, identity: &Identity, key: &str) -> ProjectionResult<Vec<PermissionRange>> {
        if !self.config.use_auth || identity.username == self.config.root_username {
            return Ok(vec![PermissionRange::prefix(key)]);
        }

        let elevated = self.elevated(identity);
        let handle = self.cache.acquire(&elevated).await?;
        let client = handle.client();
        let limit = self.config.request_timeout();

        let users = within(limit, client.list_users())
            .await
            .map_err(ProjectionError::auth_query)?;
        if !users.iter().any(|u| *u == identity.username) {
            tracing::debug!(user = %identity.username, "user not listed by store; no ranges");
            return Ok(Vec::new());
        }

        let roles = within(limit, client.get_user(&identity.username))
            .await
            .map_err(ProjectionError::auth_query)?;

        let mut ranges: BTreeMap<String, RangeKind> = BTreeMap::new();
        for role in &roles {
            let permissions = within(limit, client.get_role(role))
                .await
                .map_err(ProjectionError::auth_query)?;
            for permission in permissions.iter().filter(|p| p.access.can_read()) {
                let range = classify(&permission.pattern, &self.config.separator);
                ranges.insert(range.prefix, range.kind);
            }
        }

        tracing::debug!(
            user = %identity.username,
            roles = roles.len(),
            ranges = ranges.len(),
            "resolved permission ranges"
        );
        Ok(ranges
            .into_iter()
            .map(|(prefix, kind)| PermissionRange { prefix, kind })
            .collect())
    }

    fn elevated(&self, identity: &Identity) -> Identity {
        match &self.config.root_secret {
            Some(secret) => Identity::new(
                identity.endpoint.clone(),
                self.config.root_username.clone(),
                secret.clone(),
            ),
            None => identity.clone(),
        }
    }
}

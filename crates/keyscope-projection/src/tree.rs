//! Tree assembly over a flat, separator-delimited key space.
//!
//! [`TreeBuilder::build`] fetches every entry visible through the caller's
//! permission ranges and folds them into a [`Node`] tree rooted at the
//! requested key. Assembly runs in three passes over an index-based arena:
//!
//! 1. every fetched key is decomposed into its ancestor chain and each
//!    ancestor gets exactly one slot per `(level, key)`;
//! 2. slots are linked to their parents from the deepest level up to the
//!    level just below the requested key;
//! 3. the requested key's slot is materialized into owned nodes, children
//!    sorted by key.
//!
//! Only the returned root gets its lease TTL resolved.

use std::collections::BTreeMap;
use std::time::Duration;

use keyscope_store::StoreClient;
use keyscope_types::path::{ancestors, is_absolute, level, normalize_key};
use keyscope_types::{KeyValue, LeaseId, Node, PermissionRange};

use crate::deadline::within;
use crate::error::{ProjectionError, ProjectionResult};

#[derive(Clone, Debug)]
pub struct TreeBuilder {
    separator: String,
    request_timeout: Duration,
}

impl TreeBuilder {
    pub fn new(separator: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            separator: separator.into(),
            request_timeout,
        }
    }

    /// Build the tree rooted at `requested_key` from everything `ranges`
    /// lets the caller see.
    ///
    /// Fails with [`ProjectionError::StoreUnavailable`] if any fetch fails or
    /// times out, and with [`ProjectionError::NotFound`] if the key has no
    /// value and no visible descendants. The namespace root never fails
    /// with `NotFound`.
    pub async fn build(
        &self,
        requested_key: &str,
        ranges: &[PermissionRange],
        source: &dyn StoreClient,
    ) -> ProjectionResult<Node> {
        let requested = normalize_key(requested_key, &self.separator);
        let entries = self.fetch_scope(ranges, source).await?;
        let (mut root, lease) = self.assemble(&requested, &entries)?;
        if let Some(lease) = lease {
            root.ttl_seconds = self.time_to_live(lease, source).await;
        }
        Ok(root)
    }

    /// Fetch every entry covered by `ranges`, deduplicated by key.
    async fn fetch_scope(
        &self,
        ranges: &[PermissionRange],
        source: &dyn StoreClient,
    ) -> ProjectionResult<BTreeMap<String, KeyValue>> {
        let mut entries = BTreeMap::new();
        for range in ranges {
            let fetched = match range.scan_prefix(&self.separator) {
                None => within(self.request_timeout, source.get(&range.prefix))
                    .await
                    .map_err(ProjectionError::store)?
                    .into_iter()
                    .collect(),
                Some(prefix) => within(self.request_timeout, source.get_prefix(&prefix))
                    .await
                    .map_err(ProjectionError::store)?,
            };
            for entry in fetched {
                if range.covers(&entry.key, &self.separator) {
                    entries.insert(entry.key.clone(), entry);
                }
            }
        }
        tracing::debug!(ranges = ranges.len(), entries = entries.len(), "fetched scope");
        Ok(entries)
    }

    /// Fold `entries` into the tree rooted at `requested`, returning the
    /// root together with its lease if it carries one.
    fn assemble(
        &self,
        requested: &str,
        entries: &BTreeMap<String, KeyValue>,
    ) -> ProjectionResult<(Node, Option<LeaseId>)> {
        let sep = self.separator.as_str();
        let is_namespace_root = requested == sep;
        let subtree = format!("{requested}{sep}");

        let mut arena = Arena::default();
        let min = level(requested, sep);
        let root = arena.slot(min, requested);
        let mut matched = false;

        for (key, entry) in entries {
            if !is_absolute(key, sep) {
                tracing::warn!(%key, "skipping key without leading separator");
                continue;
            }
            if !is_namespace_root && key != requested && !key.starts_with(&subtree) {
                continue;
            }
            matched = true;
            if key == sep {
                arena.slots[root].entry = Some(entry.clone());
                continue;
            }
            for ancestor in ancestors(key, sep) {
                let lvl = level(&ancestor, sep);
                if lvl < min {
                    continue;
                }
                let id = arena.slot(lvl, &ancestor);
                if ancestor == *key {
                    arena.slots[id].entry = Some(entry.clone());
                }
            }
        }

        if !matched && !is_namespace_root {
            return Err(ProjectionError::NotFound(requested.to_string()));
        }

        arena.link(min, root, sep);
        let lease = arena.slots[root].entry.as_ref().and_then(|e| e.lease);
        Ok((arena.materialize(root), lease))
    }

    pub(crate) async fn time_to_live(&self, lease: LeaseId, source: &dyn StoreClient) -> Option<i64> {
        match within(self.request_timeout, source.lease_time_to_live(lease)).await {
            Ok(ttl) if ttl >= 0 => Some(ttl),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(lease = lease.0, error = %err, "lease lookup failed; omitting ttl");
                None
            }
        }
    }
}

#[derive(Debug)]
struct Slot {
    key: String,
    entry: Option<KeyValue>,
    children: Vec<usize>,
}

/// Slots indexed by `(level, key)`, one per distinct key per level.
#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    levels: BTreeMap<usize, BTreeMap<String, usize>>,
}

impl Arena {
    fn slot(&mut self, lvl: usize, key: &str) -> usize {
        let by_key = self.levels.entry(lvl).or_default();
        if let Some(&id) = by_key.get(key) {
            return id;
        }
        let id = self.slots.len();
        self.slots.push(Slot {
            key: key.to_string(),
            entry: None,
            children: Vec::new(),
        });
        by_key.insert(key.to_string(), id);
        id
    }

    fn lookup(&self, lvl: usize, key: &str) -> Option<usize> {
        self.levels.get(&lvl).and_then(|by_key| by_key.get(key)).copied()
    }

    /// Attach every slot below level `min` to its parent, deepest first.
    ///
    /// Level-2 slots hang off the level-1 root. Deeper slots hang off the
    /// slot whose key is their own minus the last segment.
    fn link(&mut self, min: usize, root: usize, sep: &str) {
        let depths: Vec<usize> = self.levels.range(min + 1..).rev().map(|(l, _)| *l).collect();
        for lvl in depths {
            let members: Vec<(String, usize)> = self.levels[&lvl]
                .iter()
                .map(|(k, id)| (k.clone(), *id))
                .collect();
            for (key, id) in members {
                let parent = if lvl == 2 {
                    Some(root)
                } else {
                    parent_key(&key, sep).and_then(|p| self.lookup(level(&p, sep), &p))
                };
                match parent {
                    Some(parent) => self.slots[parent].children.push(id),
                    None => tracing::debug!(%key, "no parent slot; node left detached"),
                }
            }
        }
    }

    fn materialize(&self, id: usize) -> Node {
        let slot = &self.slots[id];
        let mut node = Node::synthetic(slot.key.clone());
        if let Some(entry) = &slot.entry {
            node.attach_entry(entry);
        }
        node.children = slot.children.iter().map(|&c| self.materialize(c)).collect();
        node.children.sort_by(|a, b| a.key.cmp(&b.key));
        node.is_directory = !node.children.is_empty();
        node
    }
}

fn parent_key(key: &str, sep: &str) -> Option<String> {
    let segments: Vec<&str> = key.split(sep).collect();
    if segments.len() < 2 {
        return None;
    }
    let parent = segments[..segments.len() - 1].join(sep);
    (!parent.is_empty()).then_some(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use keyscope_store::{ClusterStatus, Connector, MemoryCluster, MemoryConnector, StoreResult};
    use keyscope_types::{Identity, RolePermission};
    use proptest::prelude::*;

    fn builder() -> TreeBuilder {
        TreeBuilder::new("/", Duration::from_secs(5))
    }

    async fn seeded(pairs: &[(&str, &str)]) -> (Arc<MemoryCluster>, Arc<dyn StoreClient>) {
        let cluster = MemoryCluster::new();
        for (k, v) in pairs {
            cluster.insert(k, v.to_string()).unwrap();
        }
        let client = MemoryConnector::new(Arc::clone(&cluster))
            .connect(&Identity::anonymous("mem://"))
            .await
            .unwrap();
        (cluster, client)
    }

    fn keys(node: &Node) -> Vec<&str> {
        node.children.iter().map(|c| c.key.as_str()).collect()
    }

    #[tokio::test]
    async fn subtree_with_sorted_children() {
        let (_c, client) = seeded(&[("/foo/baz", "2"), ("/foo/bar", "1")]).await;
        let root = builder()
            .build("/foo", &[PermissionRange::prefix("/foo")], client.as_ref())
            .await
            .unwrap();

        assert_eq!(root.key, "/foo");
        assert!(root.is_directory);
        assert!(!root.has_value());
        assert_eq!(keys(&root), vec!["/foo/bar", "/foo/baz"]);
        assert_eq!(root.children[0].value_text().as_deref(), Some("1"));
        assert_eq!(root.children[1].value_text().as_deref(), Some("2"));
        assert!(!root.children[0].is_directory);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let (_c, client) = seeded(&[]).await;
        let err = builder()
            .build("/missing", &[PermissionRange::prefix("/missing")], client.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::NotFound(k) if k == "/missing"));
    }

    #[tokio::test]
    async fn empty_namespace_root_is_a_bare_node() {
        let (_c, client) = seeded(&[]).await;
        let root = builder()
            .build("/", &[PermissionRange::prefix("/")], client.as_ref())
            .await
            .unwrap();
        assert_eq!(root.key, "/");
        assert!(root.children.is_empty());
        assert!(!root.is_directory);
    }

    #[tokio::test]
    async fn subtree_range_hides_siblings() {
        let (_c, client) = seeded(&[("/foo/a", "1"), ("/foo/b/c", "2"), ("/bar", "x")]).await;
        let root = builder()
            .build("/", &[PermissionRange::subtree("/foo")], client.as_ref())
            .await
            .unwrap();

        assert!(root.find("/bar").is_none());
        assert_eq!(keys(&root), vec!["/foo"]);
        let foo = &root.children[0];
        assert!(!foo.has_value());
        assert_eq!(keys(foo), vec!["/foo/a", "/foo/b"]);
        assert_eq!(keys(&foo.children[1]), vec!["/foo/b/c"]);
    }

    #[tokio::test]
    async fn subtree_range_excludes_its_own_prefix() {
        let (_c, client) = seeded(&[("/foo", "top"), ("/foo/", "slash"), ("/foo/a", "1")]).await;
        let root = builder()
            .build("/", &[PermissionRange::subtree("/foo")], client.as_ref())
            .await
            .unwrap();
        let foo = root.find("/foo").unwrap();
        assert!(!foo.has_value());
        assert!(root.find("/foo/").is_none());
    }

    #[tokio::test]
    async fn value_and_children_coexist() {
        let (_c, client) = seeded(&[("/foo", "x"), ("/foo/bar", "y")]).await;
        let root = builder()
            .build("/", &[PermissionRange::prefix("/")], client.as_ref())
            .await
            .unwrap();
        let foo = root.find("/foo").unwrap();
        assert!(foo.is_directory);
        assert_eq!(foo.value_text().as_deref(), Some("x"));
        assert_eq!(keys(foo), vec!["/foo/bar"]);
    }

    #[tokio::test]
    async fn prefix_range_does_not_adopt_lookalike_keys() {
        let (_c, client) = seeded(&[("/foo/a", "1"), ("/foobar", "2")]).await;
        let root = builder()
            .build("/foo", &[PermissionRange::prefix("/foo")], client.as_ref())
            .await
            .unwrap();
        assert_eq!(keys(&root), vec!["/foo/a"]);
        assert!(root.find("/foobar").is_none());
    }

    #[tokio::test]
    async fn overlapping_ranges_yield_one_node_per_key() {
        let (_c, client) = seeded(&[("/foo/bar", "1"), ("/foo/baz", "2")]).await;
        let ranges = [
            PermissionRange::prefix("/foo"),
            PermissionRange::subtree("/foo"),
            PermissionRange::exact("/foo/bar"),
        ];
        let root = builder().build("/", &ranges, client.as_ref()).await.unwrap();
        let bars = root.walk().into_iter().filter(|n| n.key == "/foo/bar").count();
        assert_eq!(bars, 1);
        assert_eq!(root.len(), 4);
    }

    #[tokio::test]
    async fn exact_range_fetches_a_single_key() {
        let (_c, client) = seeded(&[("/app/cfg", "1"), ("/app/other", "2")]).await;
        let root = builder()
            .build("/", &[PermissionRange::exact("/app/cfg")], client.as_ref())
            .await
            .unwrap();
        let app = root.find("/app").unwrap();
        assert_eq!(keys(app), vec!["/app/cfg"]);
    }

    #[tokio::test]
    async fn ttl_only_on_requested_key() {
        let (_c, client) = seeded(&[]).await;
        client.put("/foo", Bytes::from("v"), Some(100)).await.unwrap();
        client.put("/foo/bar", Bytes::from("w"), Some(100)).await.unwrap();

        let root = builder()
            .build("/foo", &[PermissionRange::prefix("/foo")], client.as_ref())
            .await
            .unwrap();
        let ttl = root.ttl_seconds.unwrap();
        assert!(ttl > 90 && ttl <= 100);
        assert_eq!(root.children[0].ttl_seconds, None);

        let whole = builder()
            .build("/", &[PermissionRange::prefix("/")], client.as_ref())
            .await
            .unwrap();
        assert!(whole.walk().iter().all(|n| n.ttl_seconds.is_none()));
    }

    #[tokio::test]
    async fn relative_request_is_treated_as_top_level() {
        let (_c, client) = seeded(&[("/foo/bar", "1")]).await;
        let root = builder()
            .build("foo", &[PermissionRange::prefix("/foo")], client.as_ref())
            .await
            .unwrap();
        assert_eq!(root.key, "/foo");
        assert_eq!(keys(&root), vec!["/foo/bar"]);
    }

    #[tokio::test]
    async fn custom_separator() {
        let (_c, client) = seeded(&[(".svc.web", "1"), (".svc.db", "2")]).await;
        let root = TreeBuilder::new(".", Duration::from_secs(5))
            .build(".", &[PermissionRange::prefix(".")], client.as_ref())
            .await
            .unwrap();
        assert_eq!(keys(&root), vec![".svc"]);
        assert_eq!(keys(&root.children[0]), vec![".svc.db", ".svc.web"]);
    }

    #[tokio::test]
    async fn repeated_builds_are_identical() {
        let (_c, client) = seeded(&[("/a/b", "1"), ("/a/c/d", "2"), ("/e", "3")]).await;
        let ranges = [PermissionRange::prefix("/")];
        let first = builder().build("/", &ranges, client.as_ref()).await.unwrap();
        let second = builder().build("/", &ranges, client.as_ref()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn outage_fails_the_whole_build() {
        let (cluster, client) = seeded(&[("/a", "1")]).await;
        cluster.set_unavailable(true);
        let err = builder()
            .build("/", &[PermissionRange::prefix("/")], client.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::StoreUnavailable(_)));
    }

    /// A client whose calls never complete.
    struct Stalled;

    #[async_trait]
    impl StoreClient for Stalled {
        async fn get(&self, _: &str) -> StoreResult<Option<KeyValue>> {
            std::future::pending().await
        }
        async fn get_prefix(&self, _: &str) -> StoreResult<Vec<KeyValue>> {
            std::future::pending().await
        }
        async fn put(&self, _: &str, _: Bytes, _: Option<i64>) -> StoreResult<KeyValue> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str) -> StoreResult<u64> {
            std::future::pending().await
        }
        async fn delete_prefix(&self, _: &str) -> StoreResult<u64> {
            std::future::pending().await
        }
        async fn lease_time_to_live(&self, _: LeaseId) -> StoreResult<i64> {
            std::future::pending().await
        }
        async fn list_users(&self) -> StoreResult<Vec<String>> {
            std::future::pending().await
        }
        async fn get_user(&self, _: &str) -> StoreResult<Vec<String>> {
            std::future::pending().await
        }
        async fn get_role(&self, _: &str) -> StoreResult<Vec<RolePermission>> {
            std::future::pending().await
        }
        async fn status(&self) -> StoreResult<ClusterStatus> {
            std::future::pending().await
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn stalled_fetch_times_out() {
        let err = TreeBuilder::new("/", Duration::from_millis(50))
            .build("/", &[PermissionRange::prefix("/")], &Stalled)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectionError::StoreUnavailable(_)));
    }

    fn entries_for(keys: &HashSet<String>) -> BTreeMap<String, KeyValue> {
        keys.iter()
            .map(|k| (k.clone(), KeyValue::new(k.clone(), "v")))
            .collect()
    }

    fn check_invariants(node: &Node, sep: &str, seen: &mut HashSet<String>) {
        assert!(seen.insert(node.key.clone()), "duplicate node {}", node.key);
        assert_eq!(node.is_directory, !node.children.is_empty());
        for pair in node.children.windows(2) {
            assert!(pair[0].key < pair[1].key);
        }
        for child in &node.children {
            assert_eq!(level(&child.key, sep), level(&node.key, sep) + 1);
            if level(&child.key, sep) > 2 {
                assert!(child.key.starts_with(&format!("{}{sep}", node.key)));
            }
            check_invariants(child, sep, seen);
        }
    }

    fn key_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-c]{1,2}", 1..5).prop_map(|segs| format!("/{}", segs.join("/")))
    }

    proptest! {
        #[test]
        fn assembled_trees_hold_structural_invariants(
            keys in prop::collection::hash_set(key_strategy(), 0..40)
        ) {
            let entries = entries_for(&keys);
            let (root, _) = builder().assemble("/", &entries).unwrap();

            let mut seen = HashSet::new();
            check_invariants(&root, "/", &mut seen);
            for key in &keys {
                let node = root.find(key).unwrap();
                prop_assert!(node.has_value());
            }
            for node in root.walk() {
                if !keys.contains(&node.key) {
                    prop_assert!(!node.has_value());
                }
            }
        }

        #[test]
        fn subtrees_match_their_slice_of_the_whole_tree(
            keys in prop::collection::hash_set(key_strategy(), 1..40)
        ) {
            let entries = entries_for(&keys);
            let (whole, _) = builder().assemble("/", &entries).unwrap();
            for top in &whole.children {
                let (sub, _) = builder().assemble(&top.key, &entries).unwrap();
                prop_assert_eq!(&sub, top);
            }
        }
    }
}

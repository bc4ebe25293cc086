//! The projected tree node.
//!
//! A [`Node`] is either a value-bearing leaf, a directory with children, or
//! both at once: flat key spaces allow `/foo` to hold a value while `/foo/bar`
//! also exists. Synthetic ancestors that only bridge levels carry no value.
//!
//! Serialization uses the field names the browser front end expects
//! (`dir`, `ttl`, `createdIndex`, `modifiedIndex`, `nodes`).

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::entry::KeyValue;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Node {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "value_as_text")]
    pub value: Option<Bytes>,
    #[serde(rename = "dir")]
    pub is_directory: bool,
    #[serde(rename = "ttl", skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    #[serde(rename = "createdIndex", skip_serializing_if = "Option::is_none")]
    pub created_revision: Option<i64>,
    #[serde(rename = "modifiedIndex", skip_serializing_if = "Option::is_none")]
    pub modified_revision: Option<i64>,
    #[serde(rename = "nodes")]
    pub children: Vec<Node>,
}

impl Node {
    /// A node with no value and no children.
    pub fn synthetic(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// A leaf built from a store entry. The TTL is left unresolved.
    pub fn from_entry(entry: &KeyValue) -> Self {
        let mut node = Self::synthetic(entry.key.clone());
        node.attach_entry(entry);
        node
    }

    /// Copy value and revisions from `entry` onto this node.
    pub fn attach_entry(&mut self, entry: &KeyValue) {
        self.value = Some(entry.value.clone());
        self.created_revision = Some(entry.create_revision);
        self.modified_revision = Some(entry.mod_revision);
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The value as UTF-8 text, replacing invalid sequences.
    pub fn value_text(&self) -> Option<String> {
        self.value
            .as_ref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Depth-first search for the node with `key`.
    pub fn find(&self, key: &str) -> Option<&Node> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Node::len).sum::<usize>()
    }

    /// Always `false`: a subtree contains at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Pre-order traversal of this subtree.
    pub fn walk(&self) -> Vec<&Node> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

fn value_as_text<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        let mut root = Node::synthetic("/foo");
        root.is_directory = true;
        root.children.push(Node::from_entry(&KeyValue::new("/foo/bar", "1").with_revisions(2, 3)));
        root.children.push(Node::from_entry(&KeyValue::new("/foo/baz", "2")));
        root
    }

    #[test]
    fn from_entry_copies_value_and_revisions() {
        let node = Node::from_entry(&KeyValue::new("/a", "v").with_revisions(4, 9));
        assert_eq!(node.value_text().as_deref(), Some("v"));
        assert_eq!(node.created_revision, Some(4));
        assert_eq!(node.modified_revision, Some(9));
        assert!(!node.is_directory);
        assert_eq!(node.ttl_seconds, None);
    }

    #[test]
    fn find_and_walk() {
        let root = sample();
        assert_eq!(root.len(), 3);
        assert!(root.find("/foo/baz").is_some());
        assert!(root.find("/nope").is_none());
        let keys: Vec<&str> = root.walk().iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["/foo", "/foo/bar", "/foo/baz"]);
    }

    #[test]
    fn serializes_with_front_end_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["key"], "/foo");
        assert_eq!(json["dir"], true);
        assert!(json.get("value").is_none());
        assert_eq!(json["nodes"][0]["value"], "1");
        assert_eq!(json["nodes"][0]["createdIndex"], 2);
        assert_eq!(json["nodes"][0]["modifiedIndex"], 3);
        assert_eq!(json["nodes"][1]["dir"], false);
    }
}

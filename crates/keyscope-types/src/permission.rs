//! Role permissions and the key ranges they grant.
//!
//! Remote roles carry permissions as glob-style patterns. The permission
//! resolver classifies each pattern once into a [`PermissionRange`]; nothing
//! downstream parses globs again.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a role permission allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// A permission entry as the store reports it for a role.
///
/// `pattern` is `/foo` for a single key, `/foo*` for every key with that
/// string prefix and `/foo/*` for every key nested under `/foo/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub pattern: String,
    pub access: Access,
}

impl RolePermission {
    pub fn new(pattern: impl Into<String>, access: Access) -> Self {
        Self {
            pattern: pattern.into(),
            access,
        }
    }
}

/// How a [`PermissionRange`] matches keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeKind {
    /// Only the literal key.
    Exact,
    /// The key and every key sharing it as a string prefix.
    Prefix,
    /// Only keys strictly nested under `prefix + separator`.
    SubtreePrefix,
}

/// A normalized key range an identity may access.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRange {
    pub prefix: String,
    pub kind: RangeKind,
}

impl PermissionRange {
    pub fn exact(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), kind: RangeKind::Exact }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), kind: RangeKind::Prefix }
    }

    pub fn subtree(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), kind: RangeKind::SubtreePrefix }
    }

    /// The string prefix to scan for this range, or `None` for a point lookup.
    pub fn scan_prefix(&self, separator: &str) -> Option<String> {
        match self.kind {
            RangeKind::Exact => None,
            RangeKind::Prefix => Some(self.prefix.clone()),
            RangeKind::SubtreePrefix => Some(format!("{}{separator}", self.prefix)),
        }
    }

    /// Returns `true` if `key` falls inside this range.
    pub fn covers(&self, key: &str, separator: &str) -> bool {
        match self.kind {
            RangeKind::Exact => key == self.prefix,
            RangeKind::Prefix => key.starts_with(&self.prefix),
            RangeKind::SubtreePrefix => key
                .strip_prefix(&self.prefix)
                .and_then(|rest| rest.strip_prefix(separator))
                .is_some_and(|rest| !rest.is_empty()),
        }
    }
}

impl fmt::Display for PermissionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RangeKind::Exact => write!(f, "{}", self.prefix),
            RangeKind::Prefix => write!(f, "{}*", self.prefix),
            RangeKind::SubtreePrefix => write!(f, "{}/*", self.prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_covers_only_itself() {
        let r = PermissionRange::exact("/foo");
        assert!(r.covers("/foo", "/"));
        assert!(!r.covers("/foo/bar", "/"));
        assert!(!r.covers("/foobar", "/"));
        assert_eq!(r.scan_prefix("/"), None);
    }

    #[test]
    fn prefix_covers_string_prefix() {
        let r = PermissionRange::prefix("/foo");
        assert!(r.covers("/foo", "/"));
        assert!(r.covers("/foobar", "/"));
        assert!(r.covers("/foo/bar", "/"));
        assert!(!r.covers("/fo", "/"));
        assert_eq!(r.scan_prefix("/").as_deref(), Some("/foo"));
    }

    #[test]
    fn subtree_covers_strict_descendants() {
        let r = PermissionRange::subtree("/foo");
        assert!(!r.covers("/foo", "/"));
        assert!(!r.covers("/foo/", "/"));
        assert!(!r.covers("/foobar", "/"));
        assert!(r.covers("/foo/bar", "/"));
        assert!(r.covers("/foo/bar/baz", "/"));
        assert_eq!(r.scan_prefix("/").as_deref(), Some("/foo/"));
    }

    #[test]
    fn access_flags() {
        assert!(Access::Read.can_read());
        assert!(!Access::Read.can_write());
        assert!(Access::Write.can_write());
        assert!(!Access::Write.can_read());
        assert!(Access::ReadWrite.can_read() && Access::ReadWrite.can_write());
    }

    #[test]
    fn display_uses_glob_form() {
        assert_eq!(PermissionRange::exact("/a").to_string(), "/a");
        assert_eq!(PermissionRange::prefix("/a").to_string(), "/a*");
        assert_eq!(PermissionRange::subtree("/a").to_string(), "/a/*");
    }
}

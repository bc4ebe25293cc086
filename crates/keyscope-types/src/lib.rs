//! Shared types for keyscope.
//!
//! keyscope projects the flat, separator-delimited key space of a remote
//! key-value store as a navigable tree. The types in this crate are the
//! vocabulary every other crate speaks:
//!
//! - [`identity`]: the (endpoint, username, secret) tuple a session is opened for
//! - [`entry`]: key/value entries as returned by the store, with lease and revisions
//! - [`permission`]: role permissions as stored remotely and the normalized
//!   [`PermissionRange`] the tree builder consumes
//! - [`node`]: the projected tree [`Node`]
//! - [`path`]: separator-aware key helpers (level, ancestors, normalization)

pub mod entry;
pub mod identity;
pub mod node;
pub mod path;
pub mod permission;

pub use entry::{KeyValue, LeaseId};
pub use identity::Identity;
pub use node::Node;
pub use path::{ancestors, is_absolute, level, normalize_key};
pub use permission::{Access, PermissionRange, RangeKind, RolePermission};

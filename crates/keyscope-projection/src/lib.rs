//! Hierarchical projection of a flat key space.
//!
//! A remote key-value store exposes a flat, separator-delimited namespace.
//! This crate turns it into a navigable tree for a given identity:
//!
//! 1. [`PermissionResolver`] works out which key ranges the identity may read,
//! 2. [`TreeBuilder`] fetches those ranges and assembles the sorted,
//!    deduplicated tree rooted at the requested key,
//! 3. [`ProjectionService`] ties both to the connection cache and adds the
//!    write, delete and cluster-info paths.
//!
//! # Modules
//!
//! - [`config`]: [`ProjectionConfig`]
//! - [`error`]: [`ProjectionError`] and [`ProjectionResult`]
//! - [`permission`]: permission resolution and glob classification
//! - [`tree`]: tree assembly
//! - [`service`]: the request entry points

pub mod config;
pub mod error;
pub mod permission;
pub mod service;
pub mod tree;

mod deadline;

pub use config::ProjectionConfig;
pub use error::{ProjectionError, ProjectionResult};
pub use permission::{classify, PermissionResolver};
pub use service::{format_size, ClusterInfo, ProjectionService};
pub use tree::TreeBuilder;

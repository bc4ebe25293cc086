//! Store client capability for keyscope.
//!
//! keyscope never speaks to the remote key-value store directly; it consumes
//! the [`StoreClient`] capability (point get, prefix get, put with optional
//! lease, delete, lease TTL, user/role listing) and opens sessions through a
//! [`Connector`].
//!
//! # Backends
//!
//! - [`MemoryCluster`] / [`MemoryConnector`]: in-memory cluster with users,
//!   roles and leases, for tests and the `memory` server backend
//! - [`GatewayConnector`]: HTTP client for the store's JSON gateway
//!
//! # Modules
//!
//! - [`error`]: [`StoreError`] and [`StoreResult`]
//! - [`traits`]: [`StoreClient`], [`Connector`], [`ClusterStatus`]
//! - [`memory`]: in-memory backend
//! - [`gateway`]: JSON gateway backend
//! - [`tls`]: [`TlsConfig`] for the gateway client

pub mod error;
pub mod gateway;
pub mod memory;
pub mod tls;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use gateway::{GatewayClient, GatewayConnector};
pub use memory::{MemoryClient, MemoryCluster, MemoryConnector};
pub use tls::TlsConfig;
pub use traits::{ClusterStatus, Connector, StoreClient};

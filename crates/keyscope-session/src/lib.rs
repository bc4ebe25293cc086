//! Store session cache for keyscope.
//!
//! [`ConnectionCache`] maps identities to live [`ConnectionHandle`]s. It is an
//! explicitly owned object handed to the projection service, not ambient
//! global state. Sessions live for the life of the cache unless superseded
//! by a credential change for the same `(endpoint, username)` pair.

pub mod cache;
pub mod error;

pub use cache::{ConnectionCache, ConnectionHandle};
pub use error::{SessionError, SessionResult};

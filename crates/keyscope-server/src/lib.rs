//! HTTP front end for keyscope.
//!
//! Exposes the projection service over the `/v3` routes the browser front
//! end speaks: separator lookup, connect, single-key and subtree reads,
//! writes and deletes. Every response body is JSON; failures carry an
//! `errorCode` and a `message`.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{BasicAuthExtractor, IdentityExtractor, ENDPOINT_HEADER};
pub use config::{Backend, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::{connector_for, KeyscopeServer};

//! Turning request headers into a store [`Identity`].
//!
//! Credential transport is pluggable through [`IdentityExtractor`]. The
//! bundled [`BasicAuthExtractor`] reads HTTP Basic credentials and an
//! optional endpoint header.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyscope_types::Identity;

use crate::error::{ServerError, ServerResult};

/// Header naming the store endpoint a request targets.
pub const ENDPOINT_HEADER: &str = "x-keyscope-endpoint";

#[async_trait]
pub trait IdentityExtractor: Send + Sync {
    async fn extract(&self, headers: &HeaderMap) -> ServerResult<Identity>;
}

/// Reads `Authorization: Basic ...`. Requests without credentials are
/// anonymous.
#[derive(Clone, Debug)]
pub struct BasicAuthExtractor {
    default_endpoint: String,
}

impl BasicAuthExtractor {
    pub fn new(default_endpoint: impl Into<String>) -> Self {
        Self {
            default_endpoint: default_endpoint.into(),
        }
    }

    fn endpoint(&self, headers: &HeaderMap) -> ServerResult<String> {
        match headers.get(ENDPOINT_HEADER) {
            None => Ok(self.default_endpoint.clone()),
            Some(value) => {
                let endpoint = value
                    .to_str()
                    .map_err(|_| ServerError::Unauthorized("endpoint header is not ASCII".into()))?
                    .trim();
                if endpoint.is_empty() {
                    Ok(self.default_endpoint.clone())
                } else {
                    Ok(endpoint.to_string())
                }
            }
        }
    }
}

#[async_trait]
impl IdentityExtractor for BasicAuthExtractor {
    async fn extract(&self, headers: &HeaderMap) -> ServerResult<Identity> {
        let endpoint = self.endpoint(headers)?;
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(Identity::anonymous(endpoint));
        };
        let value = value
            .to_str()
            .map_err(|_| ServerError::Unauthorized("authorization header is not ASCII".into()))?;
        let encoded = value
            .strip_prefix("Basic ")
            .ok_or_else(|| ServerError::Unauthorized("expected Basic credentials".into()))?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ServerError::Unauthorized(format!("malformed credentials: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| ServerError::Unauthorized("credentials are not UTF-8".into()))?;
        let (username, secret) = decoded
            .split_once(':')
            .ok_or_else(|| ServerError::Unauthorized("credentials lack a ':' separator".into()))?;
        if username.is_empty() {
            return Ok(Identity::anonymous(endpoint));
        }
        Ok(Identity::new(endpoint, username, secret))
    }
}

//! TLS material for the gateway client.
//!
//! A private CA bundle is added to the trusted roots; a client certificate
//! and its key are presented together on every connection. Files are read
//! once, when the connector is built.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::{Certificate, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle of CA certificates to trust besides the system roots.
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate. Requires `key_file`.
    pub cert_file: Option<PathBuf>,
    /// PEM private key for `cert_file`.
    pub key_file: Option<PathBuf>,
}

impl TlsConfig {
    /// Whether any TLS material is configured. Bare endpoints then default
    /// to `https`.
    pub fn is_enabled(&self) -> bool {
        self.ca_file.is_some() || self.cert_file.is_some() || self.key_file.is_some()
    }

    pub fn validate(&self) -> StoreResult<()> {
        match (&self.cert_file, &self.key_file) {
            (Some(_), None) => Err(StoreError::Tls("cert_file is set without key_file".into())),
            (None, Some(_)) => Err(StoreError::Tls("key_file is set without cert_file".into())),
            _ => Ok(()),
        }
    }

    /// Install the configured roots and client identity on `builder`.
    pub(crate) fn apply(&self, mut builder: ClientBuilder) -> StoreResult<ClientBuilder> {
        self.validate()?;
        if let Some(path) = &self.ca_file {
            let pem = read(path)?;
            let roots = Certificate::from_pem_bundle(&pem)
                .map_err(|e| StoreError::Tls(format!("{}: {e}", path.display())))?;
            if roots.is_empty() {
                return Err(StoreError::Tls(format!(
                    "{}: no certificates found",
                    path.display()
                )));
            }
            for root in roots {
                builder = builder.add_root_certificate(root);
            }
        }
        if let (Some(cert), Some(key)) = (&self.cert_file, &self.key_file) {
            let mut pem = read(cert)?;
            pem.push(b'\n');
            pem.extend(read(key)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                StoreError::Tls(format!("{} / {}: {e}", cert.display(), key.display()))
            })?;
            builder = builder.identity(identity);
        }
        Ok(builder)
    }
}

fn read(path: &Path) -> StoreResult<Vec<u8>> {
    fs::read(path).map_err(|e| StoreError::Tls(format!("{}: {e}", path.display())))
}

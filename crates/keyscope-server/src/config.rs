use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use keyscope_projection::ProjectionConfig;
use keyscope_store::TlsConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Which store backend the server talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The store's HTTP/JSON gateway at each identity's endpoint.
    #[default]
    Gateway,
    /// A process-local in-memory cluster, empty on start.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway => write!(f, "gateway"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(Self::Gateway),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend `{other}` (expected gateway or memory)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Store endpoint used when a request does not name one.
    pub default_endpoint: String,
    pub backend: Backend,
    pub projection: ProjectionConfig,
    /// Client TLS for the gateway backend.
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            default_endpoint: "http://127.0.0.1:2379".into(),
            backend: Backend::Gateway,
            projection: ProjectionConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a TOML config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.default_endpoint.trim().is_empty() {
            return Err(ServerError::Config("default_endpoint must not be empty".into()));
        }
        self.tls
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        self.projection
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.default_endpoint, "http://127.0.0.1:2379");
        assert_eq!(c.backend, Backend::Gateway);
        assert_eq!(c.projection.separator, "/");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind_addr = "127.0.0.1:9000"
backend = "memory"

[projection]
separator = "."
use_auth = false
"#
        )
        .unwrap();

        let c = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.backend, Backend::Memory);
        assert_eq!(c.projection.separator, ".");
        assert!(!c.projection.use_auth);
        assert_eq!(c.projection.root_username, "root");
        assert_eq!(c.default_endpoint, "http://127.0.0.1:2379");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"carrier-pigeon\"").unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ServerConfig::from_file(dir.path().join("absent.toml")),
            Err(ServerError::Io(_))
        ));
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("memory".parse::<Backend>(), Ok(Backend::Memory));
        assert_eq!(Backend::Gateway.to_string(), "gateway");
        assert!("etcd".parse::<Backend>().is_err());
    }

    #[test]
    fn load_tls_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_endpoint = "db.internal:2379"

[tls]
ca_file = "/etc/keyscope/ca.pem"
cert_file = "/etc/keyscope/client.pem"
key_file = "/etc/keyscope/client-key.pem"
"#
        )
        .unwrap();

        let c = ServerConfig::from_file(file.path()).unwrap();
        assert!(c.tls.is_enabled());
        assert_eq!(c.tls.ca_file.as_deref(), Some(Path::new("/etc/keyscope/ca.pem")));
        assert_eq!(
            c.tls.key_file.as_deref(),
            Some(Path::new("/etc/keyscope/client-key.pem"))
        );
        assert!(c.validate().is_ok());
        assert!(!ServerConfig::default().tls.is_enabled());
    }

    #[test]
    fn half_a_client_identity_is_rejected() {
        let mut c = ServerConfig::default();
        c.tls.cert_file = Some("/etc/keyscope/client.pem".into());
        assert!(matches!(c.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn invalid_projection_is_rejected() {
        let mut c = ServerConfig::default();
        c.projection.separator.clear();
        assert!(matches!(c.validate(), Err(ServerError::Config(_))));
    }
}

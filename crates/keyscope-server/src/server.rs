use std::future::Future;
use std::sync::Arc;

use keyscope_projection::ProjectionService;
use keyscope_store::{Connector, GatewayConnector, MemoryCluster, MemoryConnector};
use tokio::net::TcpListener;

use crate::auth::BasicAuthExtractor;
use crate::config::{Backend, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Open the store connector selected by `config.backend`.
pub fn connector_for(config: &ServerConfig) -> ServerResult<Arc<dyn Connector>> {
    match config.backend {
        Backend::Gateway => {
            let connector = GatewayConnector::new(
                config.projection.connect_timeout(),
                config.projection.request_timeout(),
                &config.tls,
            )
            .map_err(|e| ServerError::Config(e.to_string()))?;
            Ok(Arc::new(connector))
        }
        Backend::Memory => Ok(Arc::new(MemoryConnector::new(MemoryCluster::new()))),
    }
}

/// keyscope HTTP server.
pub struct KeyscopeServer {
    config: ServerConfig,
    state: AppState,
}

impl KeyscopeServer {
    pub fn new(config: ServerConfig, connector: Arc<dyn Connector>) -> ServerResult<Self> {
        config.validate()?;
        let service = ProjectionService::new(config.projection.clone(), connector)?;
        let state = AppState {
            service: Arc::new(service),
            identities: Arc::new(BasicAuthExtractor::new(config.default_endpoint.clone())),
        };
        Ok(Self { config, state })
    }

    /// Build a server whose backend comes from the config.
    pub fn from_config(config: ServerConfig) -> ServerResult<Self> {
        let connector = connector_for(&config)?;
        Self::new(config, connector)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<ProjectionService> {
        &self.state.service
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then close every cached session.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            backend = %self.config.backend,
            separator = %self.config.projection.separator,
            "keyscope server listening"
        );
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));
        self.state.service.shutdown().await;
        tracing::info!("keyscope server stopped");
        served
    }
}

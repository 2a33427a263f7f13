//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles the router state, `start()` binds the TCP listener and
//! `serve()` accepts connections until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{edge_handler, AppState};
use super::middleware::build_http_layers;
use crate::edge::EdgeService;

/// Owns the inbound HTTP listener of the edge.
///
/// 1. `new()`: keeps configuration and the edge service
/// 2. `start()`: binds the listener, reporting the actual port
/// 3. `serve()`: accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    edge: Arc<EdgeService>,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, edge: Arc<EdgeService>) -> Self {
        Self {
            config,
            edge,
            listener: None,
        }
    }

    /// Assembles the router: a single fallback handler behind the HTTP
    /// middleware stack.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            edge: Arc::clone(&self.edge),
            max_body_bytes: self.config.max_body_bytes,
        };

        Router::new()
            .fallback(edge_handler)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then lets in-flight
    /// requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;

        info!("Serving plain HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

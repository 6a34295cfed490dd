//! Plugin API Server
//!
//! Serves the REST plugin protocol and, optionally, the Prometheus metrics
//! endpoint until the shutdown token is cancelled.

use crate::error::{Error, Result};
use crate::metrics::ProviderMetrics;
use crate::provider::Provider;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::rest::RestRouter;

/// Protocol name announced on the handshake line
pub const HANDSHAKE_PROTOCOL: &str = "VOLUME_TYPE_PROVIDER";

/// Protocol version announced on the handshake line
pub const HANDSHAKE_VERSION: u32 = 1;

/// Handshake line printed once the server accepts connections
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PROTOCOL, HANDSHAKE_VERSION, addr)
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Plugin API bind address; port 0 picks a free port
    pub listen_addr: SocketAddr,
    /// Metrics bind address; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            metrics_addr: None,
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// Plugin API server
pub struct ApiServer {
    config: ApiServerConfig,
    provider: Arc<Provider>,
    shutdown: CancellationToken,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, provider: Arc<Provider>) -> Self {
        Self {
            config,
            provider,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind the plugin API and metrics listeners
    ///
    /// Both addresses are bound before anything is announced, so a bad
    /// address fails startup instead of a background task.
    pub async fn bind(&self) -> Result<Listeners> {
        let api = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind plugin API server: {}", e)))?;

        let metrics = self.config.metrics_addr.map(bind_metrics_server).transpose()?;

        Ok(Listeners { api, metrics })
    }

    /// Serve on bound listeners until shutdown
    pub async fn serve(&self, listeners: Listeners) -> Result<()> {
        let Listeners { api, metrics } = listeners;

        if let Some(builder) = metrics {
            let metrics = self.provider.metrics().clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(builder, metrics, shutdown.clone()).await {
                    error!("Metrics server error: {}", e);
                    shutdown.cancel();
                }
            });
        }

        let app = RestRouter::new(self.provider.clone()).build();
        let shutdown = self.shutdown.clone();

        if let Ok(addr) = api.local_addr() {
            info!("Plugin API listening on {}", addr);
        }

        axum::serve(api, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Plugin API server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Plugin API server error: {}", e)))
    }

    /// Bind and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listeners = self.bind().await?;
        self.serve(listeners).await
    }
}

/// Listeners bound ahead of serving
pub struct Listeners {
    api: TcpListener,
    metrics: Option<MetricsBuilder>,
}

impl Listeners {
    /// Address of the plugin API listener
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.api
            .local_addr()
            .map_err(|e| Error::Internal(format!("Failed to read plugin API address: {}", e)))
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

type MetricsBuilder = hyper::server::Builder<hyper::server::conn::AddrIncoming>;

/// Bind the metrics listener
pub fn bind_metrics_server(addr: SocketAddr) -> Result<MetricsBuilder> {
    let builder = hyper::Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server on {}: {}", addr, e)))?;
    info!("Metrics server listening on {}", addr);
    Ok(builder)
}

/// Serve `/metrics` from the provider registry until shutdown
pub async fn serve_metrics(
    builder: MetricsBuilder,
    metrics: Arc<ProviderMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let mut response = Response::new(Body::empty());
                    match (req.uri().path(), metrics.encode()) {
                        ("/metrics", Ok((content_type, buffer))) => {
                            if let Ok(value) = content_type.parse::<hyper::header::HeaderValue>() {
                                response.headers_mut().insert("Content-Type", value);
                            }
                            *response.body_mut() = Body::from(buffer);
                        }
                        ("/metrics", Err(e)) => {
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            *response.body_mut() = Body::from(e.to_string());
                        }
                        _ => {
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            *response.body_mut() = Body::from("not found");
                        }
                    }
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    builder
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Outcome;
    use crate::openstack::InMemoryCloud;
    use std::time::Duration;

    fn provider() -> Arc<Provider> {
        let cloud = Arc::new(InMemoryCloud::new("RegionOne"));
        let metrics = Arc::new(ProviderMetrics::new().unwrap());
        Arc::new(Provider::new(cloud, metrics))
    }

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.listen_addr.port(), 0);
        assert!(config.listen_addr.ip().is_loopback());
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:40123".parse().unwrap();
        assert_eq!(handshake_line(addr), "VOLUME_TYPE_PROVIDER|1|127.0.0.1:40123");
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let server = Arc::new(ApiServer::new(ApiServerConfig::default(), provider()));
        let listeners = server.bind().await.unwrap();
        let addr = listeners.local_addr().unwrap();

        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listeners).await }
        });

        let body = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_metrics_address_in_use_fails_bind() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ApiServerConfig {
            metrics_addr: Some(taken.local_addr().unwrap()),
            ..Default::default()
        };

        let server = ApiServer::new(config, provider());
        let err = server.bind().await.err().unwrap();
        assert!(err.to_string().contains("Failed to bind metrics server"));
    }

    #[tokio::test]
    async fn test_metrics_served_from_provider_registry() {
        let metrics = Arc::new(ProviderMetrics::new().unwrap());
        metrics.observe("resource", "read", Outcome::Gone, Duration::from_millis(1));

        let port = {
            let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            free.local_addr().unwrap().port()
        };
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let builder = bind_metrics_server(addr).unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve_metrics(builder, metrics, shutdown.clone()));

        let body = reqwest::get(format!("http://{}/metrics", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("volume_type_provider_operations_total"));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}

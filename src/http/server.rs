//! HTTP server wiring the admission middleware in front of a router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::middleware::admission;
use crate::error::{Result, TollgateError};
use crate::ratelimit::BucketStore;

/// HTTP server for the admission-controlled API.
///
/// The bucket store is injected at construction and shared with the
/// middleware; the server itself holds no other mutable state.
pub struct HttpServer {
    addr: SocketAddr,
    store: Arc<BucketStore>,
    router: Router,
}

impl HttpServer {
    /// Create a server that guards `router` with admission control.
    pub fn new(addr: SocketAddr, store: Arc<BucketStore>, router: Router) -> Self {
        Self { addr, store, router }
    }

    /// Compose the final router: application routes sit behind the
    /// admission middleware, with request tracing outermost. The health
    /// route is registered after the admission layer so load-balancer
    /// probes never spend client quota.
    fn app(&self) -> Router {
        self.router
            .clone()
            .layer(axum::middleware::from_fn_with_state(
                self.store.clone(),
                admission,
            ))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server shuts down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.app();

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Io(e)
        })
    }
}

async fn health() -> &'static str {
    "OK"
}

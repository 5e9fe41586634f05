//! Webhook Server
//!
//! Serves the admission endpoints over plain HTTP. TLS is terminated in
//! front of the process.

use super::routes::WebhookRouter;
use crate::admission::AdmissionValidator;
use crate::error::{Error, Result};
use crate::metrics::AdmissionMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Webhook HTTP server
pub struct WebhookServer {
    addr: SocketAddr,
    validator: Arc<AdmissionValidator>,
    metrics: Arc<AdmissionMetrics>,
}

impl WebhookServer {
    pub fn new(
        addr: SocketAddr,
        validator: Arc<AdmissionValidator>,
        metrics: Arc<AdmissionMetrics>,
    ) -> Self {
        Self {
            addr,
            validator,
            metrics,
        }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let app = WebhookRouter::new(self.validator, self.metrics)
            .build()
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind webhook server: {}", e)))?;

        info!("Webhook server listening on {}", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Webhook server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Webhook server error: {}", e)))?;

        Ok(())
    }
}

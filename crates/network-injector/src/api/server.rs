use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers::get_metrics;
use crate::infrastructure::metrics::Metrics;

/// HTTP server exposing `/metrics`
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    listen_addr: String,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>, listen_addr: String) -> Self {
        Self {
            metrics,
            listen_addr,
        }
    }

    /// Serve until `cancellation_token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to bind or run
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting metrics server on {}", self.listen_addr);

        let app = Route::new()
            .at("/metrics", get(get_metrics))
            .data(self.metrics)
            .with(Tracing);

        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("Metrics server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("Metrics server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = cancellation_token.cancelled() => {
                info!("Metrics server shutdown requested");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_returns_when_cancelled() {
        let metrics = Arc::new(Metrics::new().expect("metrics should register"));
        let server = MetricsServer::new(metrics, "127.0.0.1:0".to_string());
        let token = CancellationToken::new();
        token.cancel();

        server
            .run(token)
            .await
            .expect("cancelled server should stop cleanly");
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let metrics = Arc::new(Metrics::new().expect("metrics should register"));
        let server = MetricsServer::new(metrics, "256.0.0.1:80".to_string());

        let err = server
            .run(CancellationToken::new())
            .await
            .expect_err("invalid address must fail");
        assert!(matches!(
            err.current_context(),
            ApiError::ServerError { .. }
        ));
    }
}

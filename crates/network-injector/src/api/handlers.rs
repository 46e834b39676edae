use std::sync::Arc;

use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::Response;
use tracing::error;

use crate::infrastructure::metrics::Metrics;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Prometheus text exposition of all registered metrics
#[handler]
pub async fn get_metrics(metrics: Data<&Arc<Metrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => Response::builder()
            .content_type(TEXT_FORMAT)
            .body(body),
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body("failed to encode metrics")
        }
    }
}

//! HTTP surface of the adapter
//!
//! One listener serves the probes, metrics, the operation endpoints and the
//! progress event stream.

mod api;
mod health;
pub mod metrics;

pub use api::{Accepted, AppState, ErrorBody};
pub use health::ReadinessState;
pub use metrics::{create_metrics, AdapterMetrics, SharedMetrics};

use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(api::metrics))
        .route(
            "/operations",
            get(api::list_operations).post(api::apply_operation),
        )
        .route("/events", get(api::stream_events))
        .with_state(state)
}

/// Serve `app` on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind `0.0.0.0:port` and serve `app`
pub async fn run_server<F>(port: u16, app: Router, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Adapter listening");
    serve(listener, app, shutdown).await
}

#[cfg(test)]
#[path = "health_test.rs"]
mod tests;

use nsm_adapter::adapter::{Adapter, ClusterConnector, HelmCliRenderer, KubeConnector};
use nsm_adapter::config::AdapterConfig;
use nsm_adapter::events::EventBroadcaster;
use nsm_adapter::server::{create_metrics, router, run_server, AppState, ReadinessState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Resolves on Ctrl-C and withdraws readiness so probes stop routing to us
async fn shutdown_signal(readiness: ReadinessState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.set_not_ready();
    info!("Shutdown requested, draining connections");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting NSM adapter");

    let config = match AdapterConfig::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        port = config.port,
        component_name = %config.component_name,
        helm_repository = %config.charts.repository,
        operation_timeout_secs = config.operation_timeout.as_secs(),
        "Configuration loaded"
    );

    let metrics = create_metrics()?;
    let broadcaster =
        Arc::new(EventBroadcaster::new(&config.events).with_metrics(metrics.clone()));
    let connector = Arc::new(KubeConnector::new(config.insecure_skip_tls_verify));
    let renderer = Arc::new(HelmCliRenderer::new(&config.charts));
    let adapter = Adapter::new(
        config.clone(),
        connector.clone(),
        renderer,
        broadcaster.publisher(),
        metrics.clone(),
    );

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();
    let app = router(AppState {
        adapter,
        broadcaster,
        readiness: readiness.clone(),
        metrics,
    });
    let server = tokio::spawn(run_server(
        config.port,
        app,
        shutdown_signal(readiness.clone()),
    ));

    // Requests without kubeconfigs need the ambient cluster; others do not
    match connector.connect_default().await {
        Ok(_) => info!("Ambient cluster client configured"),
        Err(e) => warn!(
            error = %e,
            "No ambient cluster, operations must carry kubeconfigs"
        ),
    }

    readiness.set_ready();
    info!("Adapter ready");

    server.await??;
    info!("Adapter stopped");
    Ok(())
}

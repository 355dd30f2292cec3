//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::Config;
use monitoring::spawn_monitor;
use saga::InMemorySagaStateStore;
use saga_log::{JsonlSink, SagaLog, read_entries};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Read back any persisted saga log entries
    let recovered = match &config.saga_log_path {
        Some(path) if path.exists() => {
            read_entries(path).expect("failed to read persisted saga log")
        }
        _ => Vec::new(),
    };

    // 4. Build the saga log, mirroring to a JSONL sink when configured
    let mut log = SagaLog::with_capacity(config.saga_log_capacity);
    if let Some(path) = &config.saga_log_path {
        let sink = JsonlSink::open(path).expect("failed to open saga log sink");
        log = log.with_sink(sink);
    }
    let log = Arc::new(log);

    // 5. Wire application state: consumers, bus, orchestrator, step services
    let state = api::create_default_state(InMemorySagaStateStore::new(), log.clone()).await;

    // 6. Replay recovered entries through the attached consumers
    if !recovered.is_empty() {
        tracing::info!(entries = recovered.len(), "restoring saga log");
        log.restore(recovered);
    }

    // 7. Start the background health monitor
    let monitor = spawn_monitor(
        state.metrics.clone(),
        Duration::from_secs(config.monitor_interval_secs),
    );

    // 8. Build the application and start the server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    monitor.abort();
    tracing::info!("server shut down gracefully");
}

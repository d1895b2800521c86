//! API server entry point.

use std::sync::Arc;

use api::config::{Config, Storage};
use api::state::{AppState, Backend};
use event_bus::{EventPublisher, LogPublisher};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tokio::sync::watch;
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

async fn serve<B: Backend>(state: Arc<AppState<B>>, config: &Config, metrics_handle: PrometheusHandle) {
    // The reconciler and both listeners stop on the same signal.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let reconciler =
        api::spawn_reconciler(&state, config.reconcile_interval, stopped(stop_rx.clone()));

    let app = api::create_app(state.clone(), metrics_handle, config.request_timeout);
    let internal_app = api::create_internal_app(state.clone(), config.request_timeout);

    let addr = config.addr();
    let internal_addr = config.internal_addr();
    tracing::info!(%addr, %internal_addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    let internal_listener = tokio::net::TcpListener::bind(&internal_addr)
        .await
        .expect("failed to bind internal address");

    let public = axum::serve(listener, app)
        .with_graceful_shutdown(stopped(stop_rx.clone()))
        .into_future();
    let internal = axum::serve(internal_listener, internal_app)
        .with_graceful_shutdown(stopped(stop_rx))
        .into_future();
    let (public, internal) = tokio::join!(public, internal);
    public.expect("server error");
    internal.expect("internal server error");

    if let Err(e) = reconciler.await {
        tracing::error!(error = %e, "reconciler task failed");
    }

    // Let queued events and cart clears finish before exiting.
    state.tasks.wait_idle().await;
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the storage backends and wire the services
    let publisher: Arc<dyn EventPublisher> = Arc::new(LogPublisher);
    let storage = config.storage().expect("invalid storage configuration");

    match storage {
        Storage::InMemory => {
            tracing::warn!("DATABASE_URL and REDIS_URL not set, data is kept in memory");
            let state = AppState::in_memory(publisher, &config);
            serve(state, &config, metrics_handle).await;
        }
        Storage::Persistent {
            database_url,
            redis_url,
        } => {
            let state = AppState::connect(&database_url, &redis_url, publisher, &config)
                .await
                .expect("failed to connect to storage");
            serve(state, &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}

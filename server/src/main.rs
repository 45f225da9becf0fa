//! Seatlock HTTP server.
//!
//! Seat leases, per-event request queues and load-adaptive admission over
//! Redis (or an in-memory store for local development).

use axum::{Router, routing::get};
use seatlock_core::LockStore;
use seatlock_redis::RedisLockStore;
use seatlock_runtime::AdmissionController;
use seatlock_runtime::metrics::MetricsServer;
use seatlock_server::{Config, StoreBackend};
use seatlock_testing::InMemoryLockStore;
use seatlock_web::{AppState, build_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seatlock=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting seatlock server");

    let config = Config::from_env();
    info!(
        backend = ?config.backend,
        host = %config.server.host,
        port = config.server.port,
        metrics_port = config.server.metrics_port,
        load_threshold = config.lock.load_threshold,
        lock_ttl_secs = config.lock.lock_ttl.as_secs(),
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(socket_addr(&config.server.host, config.server.metrics_port)?);
    metrics.start()?;

    match config.backend {
        StoreBackend::Redis => {
            info!("Connecting to Redis...");
            let store = RedisLockStore::new(&config.redis.url).await?;
            run(config, Arc::new(store), metrics).await
        }
        StoreBackend::Memory => {
            warn!("Using in-memory lock store; locks are not shared between instances");
            let store = InMemoryLockStore::new();
            let _sweeper = store.start_sweeper(config.sweep_interval());
            run(config, Arc::new(store), metrics).await
        }
    }
}

async fn run<S: LockStore>(config: Config, store: Arc<S>, metrics: MetricsServer) -> anyhow::Result<()> {
    let controller = AdmissionController::from_store(Arc::clone(&store), config.lock.clone());

    match controller.queue().resume_pending().await {
        Ok(0) => {}
        Ok(resumed) => info!(resumed, "Resumed workers for pending queues"),
        Err(e) => warn!(error = %e, "Could not scan for pending queues"),
    }

    let app = build_router(AppState::new(controller.clone(), store));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let addr = socket_addr(&config.server.host, config.server.port)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening");

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.recv().await;
            })
            .await
    });

    let metrics_addr = metrics.addr();
    let metrics_app = match metrics.handle().cloned() {
        Some(handle) => Router::new().route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        ),
        None => Router::new(),
    };
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    info!(address = %metrics_addr, "Prometheus metrics available at /metrics");

    let mut metrics_shutdown = shutdown_tx.subscribe();
    let metrics_server = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.recv().await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    let drained = tokio::time::timeout(config.shutdown_timeout(), async {
        for (name, task) in [("HTTP", api_server), ("metrics", metrics_server)] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(server = name, error = %e, "Server error during shutdown"),
                Err(e) => error!(server = name, error = %e, "Server task failed"),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            timeout_secs = config.server.shutdown_timeout,
            "Shutdown timed out with requests still in flight"
        );
    }

    // Items still waiting stay in the store; in-flight ones are lost
    let running = controller.queue().running_workers();
    controller.queue().shutdown();
    info!(stopped_workers = running.len(), "Server stopped");
    Ok(())
}

fn socket_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    Ok(format!("{host}:{port}").parse()?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

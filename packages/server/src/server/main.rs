// Main entry point for the event processing server

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::kernel::{ActionDispatcher, EventProcessor, EventWorker, StreamHub, WorkerConfig};
use server_core::server::build_app;
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting event processing API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(2))
        .idle_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let config = Arc::new(config);
    let hub = StreamHub::new();
    let dispatcher = Arc::new(ActionDispatcher::new(
        config.webhook_timeout,
        config.email_mode,
    ));
    let processor = Arc::new(EventProcessor::new(
        pool.clone(),
        dispatcher,
        hub.clone(),
    ));

    // Spawn the worker fleet; each loop is sequential within itself and
    // coordination happens entirely through the claim primitive.
    let shutdown = CancellationToken::new();
    for _ in 0..config.worker_count.max(1) {
        let worker = EventWorker::with_config(
            pool.clone(),
            processor.clone(),
            WorkerConfig {
                poll_interval: config.poll_interval,
                processing_timeout: config.processing_timeout,
                worker_id: format!("worker-{}", Uuid::new_v4()),
            },
        );
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run(token).await {
                tracing::error!(error = %e, "event worker exited with error");
            }
        });
    }

    // Build application
    let app = build_app(pool, hub, config.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    Ok(())
}

/// Resolve on SIGINT/SIGTERM; workers stop after their current event's
/// finalization completes, then the HTTP server drains.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl-c handler can always be installed");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler can always be installed")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

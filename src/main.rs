use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use trade_notification_service::config::Settings;
use trade_notification_service::consumer::StreamConsumer;
use trade_notification_service::dispatch::DispatchEngine;
use trade_notification_service::infrastructure::postgres::PostgresPool;
use trade_notification_service::providers::ChannelProviders;
use trade_notification_service::server::{create_app, AppState};
use trade_notification_service::service::NotificationService;
use trade_notification_service::store::create_stores;
use trade_notification_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing (and OpenTelemetry when enabled)
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Storage backend
    let postgres_pool = if settings.store.backend == "postgres" {
        let pool = PostgresPool::connect(&settings.database).await?;
        tracing::info!(url = %pool.database_url_masked(), "PostgreSQL pool connected");
        Some(pool)
    } else {
        None
    };
    let stores = create_stores(&settings.store, postgres_pool.as_ref()).await?;

    // Providers and engine
    let providers = ChannelProviders::from_settings(&settings)?;
    let engine = Arc::new(
        DispatchEngine::new(stores.clone(), providers)?
            .with_dashboard_url(settings.content.dashboard_url.clone()),
    );
    let service = NotificationService::new(stores, engine.clone());

    let mut state = AppState::new(settings.clone(), service);
    if let Some(pool) = postgres_pool.clone() {
        state = state.with_postgres_pool(pool);
    }

    // Broker consumer in background
    let (shutdown_signal, consumer_handle) = if settings.broker.enabled {
        let consumer = Arc::new(StreamConsumer::new(settings.broker.clone(), engine.clone()));
        state = state.with_consumer_status(consumer.status());
        let shutdown_signal = consumer.shutdown_signal();

        let handle = tokio::spawn(async move {
            if let Err(e) = consumer.start().await {
                tracing::error!(error = %e, "Event consumer failed");
            }
        });
        (shutdown_signal, Some(handle))
    } else {
        tracing::info!("Broker consumer disabled");
        let (shutdown_signal, _) = broadcast::channel(1);
        (shutdown_signal, None)
    };

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_signal))
        .await?;

    // Wait for the consumer to finish its current entry
    if let Some(handle) = consumer_handle {
        tracing::info!("Waiting for event consumer to stop...");
        let _ = handle.await;
    }

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the event consumer
    let _ = shutdown_tx.send(());
}

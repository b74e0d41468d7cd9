//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::consumer::ConsumerStatusSnapshot;
use crate::dispatch::DispatchStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: StoreHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
    pub broker: BrokerHealthResponse,
    pub dispatch: DispatchStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct StoreHealthResponse {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct BrokerHealthResponse {
    pub enabled: bool,
    #[serde(flatten)]
    pub consumer: Option<ConsumerStatusSnapshot>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state.start_time.elapsed().as_secs();

    let postgres = match state.postgres_pool {
        Some(ref pool) => {
            let inner_pool = pool.pool();
            Some(PostgresHealthResponse {
                connected: pool.ping().await,
                pool_size: inner_pool.size(),
                idle_connections: inner_pool.num_idle() as u32,
            })
        }
        None => None,
    };

    let consumer = state.consumer_status.as_ref().map(|s| s.snapshot());
    let broker_down = consumer.as_ref().is_some_and(|c| !c.connected);
    let postgres_down = postgres.as_ref().is_some_and(|p| !p.connected);

    let status = if broker_down || postgres_down { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        store: StoreHealthResponse {
            backend: state.settings.store.backend.clone(),
        },
        postgres,
        broker: BrokerHealthResponse {
            enabled: state.consumer_status.is_some(),
            consumer,
        },
        dispatch: state.service.engine().stats(),
    })
}

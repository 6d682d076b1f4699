//! Bikehood Dashboard API Server
//!
//! REST API and WebSocket server for the sensor dashboard.

use aggregator::TimeSeriesAggregator;
use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{MemoryStore, Series, SeriesStore, SqliteStore};
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;

use config::{AppConfig, CorsConfig, LogConfig};
use rate_limit::create_governor_config;
use routes::live::LiveHub;

/// Application state shared across handlers
pub struct AppState {
    /// Query layer over the configured store
    pub aggregator: TimeSeriesAggregator,
    /// Relay for WebSocket client events
    pub hub: LiveHub,
    /// Interval between live snapshot pushes
    pub live_interval: Duration,
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state around a store
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self {
            aggregator: TimeSeriesAggregator::new(store),
            hub: LiveHub::new(64),
            live_interval: Duration::from_secs(10),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub ws_clients: usize,
}

/// Per-series status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub environment: ComponentHealth,
    pub traffic: ComponentHealth,
    pub noise: ComponentHealth,
}

/// Individual series health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latest_timestamp: Option<i64>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ping", get(ping_handler))
        .route("/api/health", get(health_handler))
        .route("/api/environment/latest", get(routes::environment::get_latest))
        .route("/api/environment/snapshot", get(routes::environment::get_snapshot))
        .route(
            "/api/environment/hourly-average-pm25",
            get(routes::environment::get_hourly_average_pm25),
        )
        .route(
            "/api/environment/daily-average-pm25",
            get(routes::environment::get_daily_average_pm25),
        )
        .route("/api/environment/hourly", get(routes::environment::get_hourly))
        .route("/api/traffic/latest", get(routes::traffic::get_latest))
        .route("/api/traffic/snapshot", get(routes::traffic::get_snapshot))
        .route("/api/traffic/hourly", get(routes::traffic::get_hourly))
        .route("/api/traffic/roads/:road/hourly", get(routes::traffic::get_road_hourly))
        .route("/api/noise/latest", get(routes::noise::get_latest))
        .route("/api/noise/snapshot", get(routes::noise::get_snapshot))
        .route("/api/noise/hourly", get(routes::noise::get_hourly))
        .route("/api/noise/hourly-average", get(routes::noise::get_hourly_average))
        .route("/api/noise/daily-average", get(routes::noise::get_daily_average))
        .route("/api/compare/traffic-noise", get(routes::compare::traffic_vs_noise))
        .route("/api/compare/traffic-pm25", get(routes::compare::traffic_vs_pm25))
        .route("/api/compare/noise-pm25", get(routes::compare::noise_vs_pm25))
        .route("/ws", get(routes::live::ws_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct PingResponse {
    message: &'static str,
}

async fn ping_handler() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

async fn component_health(state: &AppState, series: Series) -> ComponentHealth {
    match state.aggregator.store().max_timestamp(series).await {
        Ok(latest_timestamp) => ComponentHealth {
            status: "ok".to_string(),
            latest_timestamp,
        },
        Err(e) => {
            warn!("Health probe for {} failed: {}", series, e);
            ComponentHealth {
                status: "error".to_string(),
                latest_timestamp: None,
            }
        }
    }
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let components = ComponentStatus {
        environment: component_health(&state, Series::Environment).await,
        traffic: component_health(&state, Series::Traffic).await,
        noise: component_health(&state, Series::Noise).await,
    };

    let healthy = [&components.environment, &components.traffic, &components.noise]
        .iter()
        .all(|c| c.status == "ok");

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components,
        ws_clients: state.hub.client_count(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Count requests and record latency per route
async fn track_requests(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!("api_requests_total", "path" => path, "status" => status).increment(1);
    metrics::histogram!("api_request_duration_seconds").record(started.elapsed().as_secs_f64());
    response
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if config.origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Initialize logging
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let level = Level::from_str(&config.level).unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SeriesStore>> {
    if config.database.is_memory() {
        warn!("Using in-memory store, samples are lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    Ok(Arc::new(store))
}

/// Run the server
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let store = open_store(&config).await?;

    let mut state = AppState::new(store);
    state.hub = LiveHub::new(config.live.channel_capacity);
    state.live_interval = config.live.interval();
    state.metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed: {}", e);
            None
        }
    };

    let mut app = create_router(Arc::new(state))
        .layer(cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http());

    if config.rate_limit.enabled {
        let governor = create_governor_config(&config.rate_limit)
            .context("Invalid rate limit settings")?;
        app = app.layer(GovernorLayer { config: governor });
        info!(
            "Rate limiting enabled: burst {}, one request per {}s",
            config.rate_limit.burst_size, config.rate_limit.per_second
        );
    }

    info!("Starting API server on {}", config.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_lists() {
        let config = CorsConfig {
            origins: vec!["http://localhost:5173".to_string(), "bad\norigin".to_string()],
        };
        // Building must not panic on an invalid entry
        let _ = cors_layer(&config);
    }
}

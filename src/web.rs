//! Axum-based HTTP server exposing fleet state and monitor controls
//!
//! All state flows through the [`MonitorHandle`]: reads come straight from
//! the published watch channels, mutations go through the command channel
//! and wait for the monitor's reply.

use crate::config::Config;
use crate::error::HyperionError;
use crate::monitor::MonitorHandle;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub monitor: MonitorHandle,
    pub config: Config,
}

#[derive(Deserialize)]
pub struct DismissBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct NotificationsBody {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct PrimarySystemBody {
    #[serde(default)]
    pub system_id: Option<String>,
}

/// Map a monitor error onto an HTTP response
fn error_response(err: &HyperionError) -> Response {
    let status = match err {
        HyperionError::NotFound { .. } => StatusCode::NOT_FOUND,
        HyperionError::Permission { .. } => StatusCode::FORBIDDEN,
        HyperionError::Config { .. } | HyperionError::Validation { .. } => StatusCode::BAD_REQUEST,
        HyperionError::Session { .. } | HyperionError::Network { .. } | HyperionError::Timeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn version() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("APP_VERSION"),
    }))
}

/// Latest published fleet snapshot
async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.snapshot().as_ref().clone())
}

/// Current incident board, grouped by lifecycle state
async fn incidents(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.incidents().as_ref().clone())
}

/// Run a refresh cycle now instead of waiting for the next poll tick
async fn refresh(State(state): State<AppState>) -> Response {
    match state.monitor.refresh().await {
        Ok(outcome) => Json(json!({
            "generation": outcome.snapshot.generation,
            "systems": outcome.snapshot.counts.total,
            "failures": outcome.failures,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn dismiss_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
    Json(body): Json<DismissBody>,
) -> Response {
    match state.monitor.dismiss_incident(&incident_id, body.reason).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn notification_status(State(state): State<AppState>) -> Response {
    match state.monitor.notification_status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn set_notifications(
    State(state): State<AppState>,
    Json(body): Json<NotificationsBody>,
) -> Response {
    match state.monitor.set_notifications(body.enabled).await {
        Ok(enabled) => Json(json!({"enabled": enabled})).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn schedule_daily(State(state): State<AppState>) -> Response {
    match state.monitor.schedule_daily().await {
        Ok(triggers) => Json(triggers).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn set_primary_system(
    State(state): State<AppState>,
    Json(body): Json<PrimarySystemBody>,
) -> Response {
    match state.monitor.set_primary_system(body.system_id).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Running configuration with backend credentials redacted
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let mut config =
        serde_json::to_value(&state.config).unwrap_or(json!({"error": "serialization"}));
    if let Some(api) = config.get_mut("api").and_then(serde_json::Value::as_object_mut) {
        api.remove("access_key_id");
        api.remove("access_key_value");
        api.remove("password");
    }
    Json(config)
}

/// Server-sent snapshot stream. Clients get the current snapshot on connect
/// and a new event after every published refresh.
async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let stream = WatchStream::new(state.monitor.subscribe_snapshot()).map(|snapshot| {
        let data =
            serde_json::to_string(snapshot.as_ref()).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, std::convert::Infallible>(Event::default().event("snapshot").data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .route("/api/snapshot", get(snapshot))
        .route("/api/incidents", get(incidents))
        .route("/api/incidents/{id}/dismiss", post(dismiss_incident))
        .route("/api/refresh", post(refresh))
        .route(
            "/api/notifications",
            get(notification_status).post(set_notifications),
        )
        .route("/api/notifications/schedule", post(schedule_daily))
        .route("/api/notifications/primary", post(set_primary_system))
        .route("/api/config", get(get_config))
        .route("/api/events", get(events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(monitor: MonitorHandle, config: Config) -> anyhow::Result<()> {
    let logger = crate::logging::get_logger("web");
    let host = config.web.host.clone();
    let port = config.web.port;

    let state = AppState { monitor, config };
    let router = build_router(state);

    let addr: SocketAddr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::shared::AppState;

const SERVICE_NAME: &str = "timechat-backend";

/// Health check endpoint - always returns healthy if the service is running
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness check endpoint - pings MongoDB and Redis
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Value>, (StatusCode, Json<Value>)> {
    let db_status = match state.database.health_check().await {
        Ok(_) => "ok",
        Err(_) => "error",
    };

    let redis_status = match state.redis.health_check().await {
        Ok(_) => "ok",
        Err(_) => "error",
    };

    let ready = db_status == "ok" && redis_status == "ok";
    let body = Json(json!({
        "status": if ready { "ready" } else { "not_ready" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "database": db_status,
            "redis": redis_status
        }
    }));

    if ready {
        Ok(body)
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, body))
    }
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Root handler - basic API information
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "TimeChat Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-tenant time tracking, chat, invoicing and accounting",
        "endpoints": {
            "health": "/health",
            "ready": "/ready",
            "metrics": "/metrics",
            "api_v1": "/api/v1"
        }
    }))
}

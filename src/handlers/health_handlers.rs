//! Health & readiness handlers.
//!
//! - GET /health  -> liveness, never touches the store
//! - GET /readyz  -> readiness, pings the configured object store

use crate::services::gateway::ObjectGateway;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

pub const SERVICE_NAME: &str = "object-gateway";

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
            service: SERVICE_NAME.into(),
        }),
    )
}

/// `GET /readyz`
///
/// HTTP 200 when the store answers its ping, HTTP 503 otherwise.
pub async fn readyz(State(gateway): State<ObjectGateway>) -> impl IntoResponse {
    let store_check = match gateway.store().ping().await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(e.to_string()),
        },
    };

    let overall_ok = store_check.ok;
    let mut checks = HashMap::new();
    checks.insert("store", store_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

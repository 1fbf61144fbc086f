//! Health check handlers

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub persistence: CheckResult,
    pub chat_model: CheckResult,
    pub identity: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            latency_ms: None,
            error: None,
        }
    }
}

/// Liveness check, always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: linguachat_common::VERSION.to_string(),
    })
}

/// Readiness check. Only a configured but unreachable backend makes the
/// gateway not ready; disabled features are reported as such.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let persistence = match state.store.as_ref() {
        None => CheckResult::status("disabled"),
        Some(store) => {
            let start = std::time::Instant::now();
            match store.ping().await {
                Ok(()) => CheckResult {
                    status: "up".to_string(),
                    latency_ms: Some(start.elapsed().as_millis() as u64),
                    error: None,
                },
                Err(e) => CheckResult {
                    status: "down".to_string(),
                    latency_ms: None,
                    error: Some(e.to_string()),
                },
            }
        }
    };

    let chat_model = if state.service.chat_available() {
        CheckResult::status("configured")
    } else {
        CheckResult::status("disabled")
    };
    let identity = if state.service.login_available() {
        CheckResult::status("configured")
    } else {
        CheckResult::status("disabled")
    };

    let ready = persistence.status != "down";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                persistence,
                chat_model,
                identity,
            },
        }),
    )
}

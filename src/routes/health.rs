//! Health and readiness endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub data_root: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub healthy: bool,
    pub message: String,
}

/// GET /health
///
/// Basic health check - returns 200 if the server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /ready
///
/// Readiness check - creates and removes a scratch file in the data root
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let data_root = state.settings.data_root.clone();

    let data_root_check = match write_check(&data_root).await {
        Ok(()) => CheckStatus {
            healthy: true,
            message: format!("Writable: {}", data_root.display()),
        },
        Err(e) => {
            warn!(error = %e, path = %data_root.display(), "Data root not writable");
            CheckStatus {
                healthy: false,
                message: format!("Unavailable {}: {}", data_root.display(), e),
            }
        }
    };

    let status_code = if data_root_check.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let status = if data_root_check.healthy { "ready" } else { "not_ready" };

    (
        status_code,
        Json(ReadinessResponse {
            status,
            checks: ReadinessChecks {
                data_root: data_root_check,
            },
        }),
    )
}

async fn write_check(data_root: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_root).await?;
    let scratch = data_root.join(format!(".ready-{}", Uuid::new_v4()));
    tokio::fs::write(&scratch, b"ok").await?;
    tokio::fs::remove_file(&scratch).await
}

//! Data endpoint: resolve the configured response, record the transaction, reply

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{blocking, header_set, RequestHost};
use crate::config::LogPersistence;
use crate::error::{AppError, Result};
use crate::models::{CapturedRequest, Configuration, EffectiveResponse, StatKind, TransactionRecord};
use crate::resolver::{relative_path, resolve};
use crate::state::AppState;
use crate::storage::StoreError;

const NO_ID_MESSAGE: &str =
    "You did not include a config GUID. Go to the app URL to learn how to use this endpoint.";
const NOT_FOUND_MESSAGE: &str =
    "Config file not found. Go to the app URL to learn how to use this endpoint.";
const READ_ERROR_MESSAGE: &str =
    "Error reading config file. Go to the app URL to learn how to use this endpoint.";

/// ANY /api/{*path}
///
/// Answers with the response of the selected configuration and writes one
/// transaction record. The configuration id comes from the config key header,
/// or from the query parameter of the same name when the header is absent or blank.
pub async fn capture(
    State(state): State<AppState>,
    host: RequestHost,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response> {
    state.metrics.inc_requests();

    let config_guid = select_config_id(&headers, &params, &state.settings.config_key);
    let data = state.tenant(&host.tenant);
    let app_url = host.app_url();

    let response = match &config_guid {
        None => {
            state.metrics.inc_resolution_errors();
            EffectiveResponse::diagnostic(200, NO_ID_MESSAGE, &app_url)
        }
        Some(id) => {
            let configs = data.configs.clone();
            let lookup_id = id.clone();
            let loaded = blocking(move || Ok(configs.get_and_touch(&lookup_id))).await?;

            match loaded {
                Ok(config) => {
                    let path = relative_path(uri.path()).to_string();
                    evaluate(&state, config, path).await?
                }
                Err(e) => {
                    warn!(tenant = %host.tenant, config = %id, error = %e, "Config resolution failed");
                    state.metrics.inc_resolution_errors();
                    let message = match e {
                        StoreError::NotFound(_) => NOT_FOUND_MESSAGE.to_string(),
                        other => format!("{}\n\n{}", READ_ERROR_MESSAGE, other),
                    };
                    EffectiveResponse::diagnostic(500, message, &app_url)
                }
            }
        }
    };

    // Reject unsendable status or headers before anything is recorded
    let reply = build_reply(&response)?;

    let request = CapturedRequest {
        method: method.to_string(),
        url: host.display_url(&uri),
        headers: header_set(&headers),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let record = TransactionRecord::new(request, config_guid, &response);
    let logger = data.logger.clone();

    match blocking(move || Ok(logger.log(&record)?)).await {
        Ok(path) => debug!(path = %path.display(), "Transaction recorded"),
        Err(e) => {
            state.metrics.inc_record_failures();
            error!(tenant = %host.tenant, error = %e, "Failed to write transaction record");
            if state.settings.log_persistence == LogPersistence::Fatal {
                return Err(e);
            }
        }
    }

    if response.delay > 0 {
        tokio::time::sleep(Duration::from_millis(response.delay)).await;
    }

    let stats = data.stats.clone();
    blocking(move || {
        stats.increment(StatKind::ApiInvoked)?;
        Ok(())
    })
    .await?;

    Ok(reply)
}

/// Header value first, query parameter as fallback; blank values count as absent.
fn select_config_id(
    headers: &HeaderMap,
    params: &HashMap<String, String>,
    key: &str,
) -> Option<String> {
    let from_header = headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    from_header
        .or_else(|| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// Resolve override rules off the async workers, bounded by the match budget.
async fn evaluate(state: &AppState, config: Configuration, path: String) -> Result<EffectiveResponse> {
    let budget = state.settings.rule_match_budget;
    let task = tokio::task::spawn_blocking(move || resolve(&config, &path));

    let resolution = match tokio::time::timeout(budget, task).await {
        Ok(joined) => joined??,
        Err(_) => {
            return Err(AppError::InternalError(format!(
                "Override rule evaluation exceeded {} ms",
                budget.as_millis()
            )));
        }
    };

    if let Some(index) = resolution.matched_rule {
        debug!(rule = index, "Override rule matched");
        state.metrics.inc_rule_matches();
    }
    Ok(resolution.response)
}

fn build_reply(response: &EffectiveResponse) -> Result<Response> {
    let status = StatusCode::from_u16(response.status_code).map_err(|_| {
        AppError::InternalError(format!("Invalid status code {}", response.status_code))
    })?;

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AppError::InternalError(format!("Invalid response header name '{}'", name)))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            AppError::InternalError(format!("Invalid value for response header '{}'", name))
        })?;
        headers.insert(header_name, header_value);
    }

    let mut reply = Response::new(Body::from(response.body.clone()));
    *reply.status_mut() = status;
    *reply.headers_mut() = headers;
    Ok(reply)
}

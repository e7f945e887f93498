//! HTTP routes: data endpoint, management endpoints and operational probes

pub mod capture;
pub mod health;
pub mod manage;
pub mod metrics;

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header, request::Parts, HeaderMap, Uri},
    routing::{any, delete, get, put},
    Router,
};
use std::convert::Infallible;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::models::HeaderSet;
use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let static_dir = state.settings.static_dir.clone();
    // Captured bodies are recorded in full unless a cap is configured
    let body_limit = match state.settings.max_body_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    let app = Router::new()
        // Health and metrics
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::prometheus_metrics))
        // Data endpoint, any method and any path below /api
        .route("/api", any(capture::capture).layer(body_limit))
        .route("/api/", any(capture::capture).layer(body_limit))
        .route("/api/{*path}", any(capture::capture).layer(body_limit))
        // Management
        .route("/ui", get(manage::list_logs))
        .route("/ui/configs", get(manage::list_configs))
        .route("/ui/get-config", get(manage::get_config))
        .route("/ui/set-config", put(manage::set_config))
        .route("/ui/delete-config", delete(manage::delete_config))
        .route("/ui/get-key", get(manage::get_key))
        .route("/ui/stats", get(manage::get_stats));

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true),
        )
}

/// Host information of the inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHost {
    /// Host name without port; selects the tenant's data folder
    pub tenant: String,
    /// Host header as received, port included
    pub authority: String,
    pub scheme: String,
}

impl RequestHost {
    pub fn from_parts(headers: &HeaderMap, uri: &Uri) -> Self {
        let authority = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        Self {
            tenant: host_name(&authority).to_string(),
            authority,
            scheme,
        }
    }

    /// Address of the UI explaining how to call the data endpoint.
    pub fn app_url(&self) -> String {
        format!("{}://{}/", self.scheme, self.authority)
    }

    /// Full URL of the request, query string included.
    pub fn display_url(&self, uri: &Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}://{}{}", self.scheme, self.authority, path_and_query)
    }
}

impl<S> FromRequestParts<S> for RequestHost
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.uri))
    }
}

/// Host name part of an authority (`host:port` or `[v6]:port`).
fn host_name(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    authority.split(':').next().unwrap_or(authority)
}

/// Flatten request headers; repeated headers are joined with `, `.
pub fn header_set(headers: &HeaderMap) -> HeaderSet {
    let mut set = HeaderSet::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        set.entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    set
}

/// Run blocking file work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_host_name() {
        assert_eq!(host_name("example.com:8080"), "example.com");
        assert_eq!(host_name("example.com"), "example.com");
        assert_eq!(host_name("[::1]:3000"), "::1");
        assert_eq!(host_name(""), "");
    }

    #[test]
    fn test_request_host_urls() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("mock.local:3000"));
        let uri: Uri = "/api/orders?x=1".parse().unwrap();

        let host = RequestHost::from_parts(&headers, &uri);
        assert_eq!(host.tenant, "mock.local");
        assert_eq!(host.app_url(), "http://mock.local:3000/");
        assert_eq!(host.display_url(&uri), "http://mock.local:3000/api/orders?x=1");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("HTTPS"));
        assert_eq!(RequestHost::from_parts(&headers, &uri).app_url(), "https://mock.local:3000/");
    }

    #[test]
    fn test_header_set_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.insert("x-one", HeaderValue::from_static("1"));

        let set = header_set(&headers);
        assert_eq!(set["accept"], "text/html, application/json");
        assert_eq!(set["x-one"], "1");
    }
}

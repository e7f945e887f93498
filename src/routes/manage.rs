//! Management endpoints: configuration CRUD, log browsing and statistics

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{blocking, RequestHost};
use crate::error::{AppError, Result};
use crate::models::{ConfigAck, ConfigSummary, Configuration, StatKind, StatisticsRecord};
use crate::state::AppState;
use crate::storage::records::today_partition;

/// Query parameters for the log listing
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Partition to read, yyyy-MM-dd (default: today)
    pub date: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_count")]
    pub count: usize,
    /// Only records written for this configuration id
    pub guid: Option<String>,
}

fn default_count() -> usize {
    1
}

/// Query parameters carrying a configuration id
#[derive(Debug, Deserialize)]
pub struct ConfigIdQuery {
    #[serde(rename = "config-guid")]
    pub config_guid: Option<String>,
}

impl ConfigIdQuery {
    fn required(self) -> Result<String> {
        self.config_guid
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("Missing config-guid parameter".into()))
    }
}

/// GET /ui?date=yyyy-MM-dd&offset=N&count=N&guid=ID
///
/// Lists transaction records of one day, newest first. The guid filter is applied
/// before offset/count. 404 when nothing was logged on that date.
pub async fn list_logs(
    State(state): State<AppState>,
    host: RequestHost,
    params: std::result::Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<Vec<Value>>> {
    state.metrics.inc_management();
    let Query(params) = params?;
    let data = state.tenant(&host.tenant);
    let date = params
        .date
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(today_partition);

    let records = blocking(move || {
        let records = data
            .logs
            .list(&date, params.offset, params.count, params.guid.as_deref())?;
        data.stats.increment(StatKind::LogsViewed)?;
        Ok(records)
    })
    .await?;

    Ok(Json(records))
}

/// GET /ui/configs
///
/// Lists configuration summaries, most recently modified first.
pub async fn list_configs(
    State(state): State<AppState>,
    host: RequestHost,
) -> Result<Json<Vec<ConfigSummary>>> {
    state.metrics.inc_management();
    let data = state.tenant(&host.tenant);

    let summaries = blocking(move || {
        let summaries = data.configs.list()?;
        data.stats.increment(StatKind::ConfigListFetched)?;
        Ok(summaries)
    })
    .await?;

    Ok(Json(summaries))
}

/// GET /ui/get-config?config-guid=ID
pub async fn get_config(
    State(state): State<AppState>,
    host: RequestHost,
    params: std::result::Result<Query<ConfigIdQuery>, QueryRejection>,
) -> Result<Json<Configuration>> {
    state.metrics.inc_management();
    let Query(params) = params?;
    let id = params.required()?;
    let data = state.tenant(&host.tenant);

    let config = blocking(move || {
        let config = data.configs.get(&id)?;
        data.stats.increment(StatKind::ConfigRead)?;
        Ok(config)
    })
    .await?;

    Ok(Json(config))
}

/// PUT /ui/set-config?config-guid=ID
///
/// Creates or replaces the configuration stored under ID.
pub async fn set_config(
    State(state): State<AppState>,
    host: RequestHost,
    params: std::result::Result<Query<ConfigIdQuery>, QueryRejection>,
    config: std::result::Result<Json<Configuration>, JsonRejection>,
) -> Result<Json<ConfigAck>> {
    state.metrics.inc_management();
    let Query(params) = params?;
    let Json(config) = config?;
    let id = params.required()?;
    let data = state.tenant(&host.tenant);

    let guid = id.clone();
    blocking(move || {
        data.configs.put(&id, &config)?;
        data.stats.increment(StatKind::ConfigSaved)?;
        Ok(())
    })
    .await?;

    info!(tenant = %host.tenant, config = %guid, "Config saved");
    Ok(Json(ConfigAck {
        message: "Config saved",
        guid,
    }))
}

/// DELETE /ui/delete-config?config-guid=ID
pub async fn delete_config(
    State(state): State<AppState>,
    host: RequestHost,
    params: std::result::Result<Query<ConfigIdQuery>, QueryRejection>,
) -> Result<Json<ConfigAck>> {
    state.metrics.inc_management();
    let Query(params) = params?;
    let id = params.required()?;
    let data = state.tenant(&host.tenant);

    let guid = id.clone();
    blocking(move || {
        data.configs.delete(&id)?;
        data.stats.increment(StatKind::ConfigDeleted)?;
        Ok(())
    })
    .await?;

    info!(tenant = %host.tenant, config = %guid, "Config deleted");
    Ok(Json(ConfigAck {
        message: "Config deleted",
        guid,
    }))
}

/// GET /ui/get-key
///
/// Name of the header / query parameter that selects a configuration.
pub async fn get_key(State(state): State<AppState>) -> Json<String> {
    state.metrics.inc_management();
    Json(state.settings.config_key.clone())
}

/// GET /ui/stats
///
/// Returns the tenant's counters as they were before this call was counted.
pub async fn get_stats(
    State(state): State<AppState>,
    host: RequestHost,
) -> Result<Json<StatisticsRecord>> {
    state.metrics.inc_management();
    let data = state.tenant(&host.tenant);

    let stats = blocking(move || {
        let stats = data.stats.read()?;
        data.stats.increment(StatKind::StatsViewed)?;
        Ok(stats)
    })
    .await?;

    Ok(Json(stats))
}

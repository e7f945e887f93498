//! Application state shared across handlers

use crate::config::Settings;
use crate::routes::metrics::Metrics;
use crate::storage::{ConfigStore, DataRootResolver, LogQuery, RequestLogger, StatsStore};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Immutable runtime settings
    pub settings: Arc<Settings>,
    /// Tenant to data folder mapping
    pub roots: Arc<dyn DataRootResolver>,
    /// Application metrics for Prometheus
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let roots = settings.data_roots();
        Self::with_roots(settings, roots)
    }

    /// State with an explicit root resolver (tests use an isolated folder).
    pub fn with_roots(settings: Settings, roots: Arc<dyn DataRootResolver>) -> Self {
        Self {
            settings: Arc::new(settings),
            roots,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Stores bound to one tenant's data folder.
    pub fn tenant(&self, tenant: &str) -> TenantData {
        let root = self.roots.root_for(tenant);
        TenantData {
            configs: ConfigStore::new(&root),
            logger: RequestLogger::new(&root),
            logs: LogQuery::new(&root),
            stats: StatsStore::new(&root, self.settings.stats_lock),
        }
    }
}

/// Per-request view over a tenant's files
#[derive(Debug, Clone)]
pub struct TenantData {
    pub configs: ConfigStore,
    pub logger: RequestLogger,
    pub logs: LogQuery,
    pub stats: StatsStore,
}

//! Runtime settings read from the environment

use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::{DataRootResolver, HostDataRoot, LockPolicy, SharedDataRoot};

/// Default header / query parameter carrying the configuration id.
pub const DEFAULT_CONFIG_KEY: &str = "httplogger-config";

/// How tenants map onto folders under the data root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPartition {
    /// `{DATA_ROOT}/{host}`
    Host,
    /// Every tenant writes to `{DATA_ROOT}`
    Shared,
}

/// What happens when a transaction record cannot be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPersistence {
    /// The request fails with 500
    Fatal,
    /// The failure is logged and the configured response is still returned
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for DataPartition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(DataPartition::Host),
            "shared" => Ok(DataPartition::Shared),
            other => bail!("expected 'host' or 'shared', got '{}'", other),
        }
    }
}

impl FromStr for LogPersistence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" => Ok(LogPersistence::Fatal),
            "best-effort" | "best_effort" => Ok(LogPersistence::BestEffort),
            other => bail!("expected 'fatal' or 'best-effort', got '{}'", other),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("expected 'text' or 'json', got '{}'", other),
        }
    }
}

/// Service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: SocketAddr,
    pub data_root: PathBuf,
    pub partition: DataPartition,
    pub config_key: String,
    pub stats_lock: LockPolicy,
    /// Wall-clock budget for override rule evaluation
    pub rule_match_budget: Duration,
    pub log_persistence: LogPersistence,
    /// Request body cap on the data endpoint; `None` records bodies of any size
    pub max_body_bytes: Option<usize>,
    /// Folder with the editor UI, served for unmatched paths
    pub static_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Settings {
    /// Defaults rooted at `data_root`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_root: data_root.into(),
            partition: DataPartition::Host,
            config_key: DEFAULT_CONFIG_KEY.to_string(),
            stats_lock: LockPolicy::default(),
            rule_match_budget: Duration::from_millis(100),
            log_persistence: LogPersistence::Fatal,
            max_body_bytes: None,
            static_dir: None,
            log_format: LogFormat::Text,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::new(default_data_root());

        if let Some(v) = get("LISTEN_ADDR") {
            settings.listen_addr = parse(&v, "LISTEN_ADDR")?;
        }
        if let Some(v) = get("DATA_ROOT") {
            settings.data_root = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_PARTITION") {
            settings.partition = parse(&v, "DATA_PARTITION")?;
        }
        if let Some(v) = get("CONFIG_KEY") {
            settings.config_key = v.trim().to_string();
        }
        if let Some(v) = get("STATS_LOCK_ATTEMPTS") {
            settings.stats_lock.attempts = parse(&v, "STATS_LOCK_ATTEMPTS")?;
        }
        if let Some(v) = get("STATS_LOCK_INTERVAL_MS") {
            settings.stats_lock.interval =
                Duration::from_millis(parse(&v, "STATS_LOCK_INTERVAL_MS")?);
        }
        if let Some(v) = get("RULE_MATCH_BUDGET_MS") {
            settings.rule_match_budget = Duration::from_millis(parse(&v, "RULE_MATCH_BUDGET_MS")?);
        }
        if let Some(v) = get("LOG_PERSISTENCE") {
            settings.log_persistence = parse(&v, "LOG_PERSISTENCE")?;
        }
        if let Some(v) = get("MAX_BODY_BYTES") {
            settings.max_body_bytes = Some(parse(&v, "MAX_BODY_BYTES")?);
        }
        if let Some(v) = get("STATIC_DIR") {
            settings.static_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LOG_FORMAT") {
            settings.log_format = parse(&v, "LOG_FORMAT")?;
        }

        if settings.stats_lock.attempts == 0 {
            bail!("Invalid STATS_LOCK_ATTEMPTS: must be at least 1");
        }
        Ok(settings)
    }

    /// Resolver matching the configured partitioning.
    pub fn data_roots(&self) -> Arc<dyn DataRootResolver> {
        match self.partition {
            DataPartition::Host => Arc::new(HostDataRoot::new(&self.data_root)),
            DataPartition::Shared => Arc::new(SharedDataRoot::new(&self.data_root)),
        }
    }
}

fn parse<T>(value: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid {}", key))
}

fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("httplogger")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.listen_addr.port(), 3000);
        assert_eq!(settings.partition, DataPartition::Host);
        assert_eq!(settings.config_key, DEFAULT_CONFIG_KEY);
        assert_eq!(settings.stats_lock, LockPolicy::default());
        assert_eq!(settings.rule_match_budget, Duration::from_millis(100));
        assert_eq!(settings.log_persistence, LogPersistence::Fatal);
        assert_eq!(settings.max_body_bytes, None);
        assert!(settings.data_root.ends_with("httplogger"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("LISTEN_ADDR", "127.0.0.1:8080"),
            ("DATA_ROOT", "/srv/httplogger"),
            ("DATA_PARTITION", "shared"),
            ("CONFIG_KEY", "x-mock-config"),
            ("STATS_LOCK_ATTEMPTS", "5"),
            ("STATS_LOCK_INTERVAL_MS", "10"),
            ("RULE_MATCH_BUDGET_MS", "250"),
            ("LOG_PERSISTENCE", "best-effort"),
            ("MAX_BODY_BYTES", "10485760"),
            ("STATIC_DIR", "/srv/ui"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(settings.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(settings.data_root, PathBuf::from("/srv/httplogger"));
        assert_eq!(settings.partition, DataPartition::Shared);
        assert_eq!(settings.config_key, "x-mock-config");
        assert_eq!(settings.stats_lock.attempts, 5);
        assert_eq!(settings.stats_lock.interval, Duration::from_millis(10));
        assert_eq!(settings.rule_match_budget, Duration::from_millis(250));
        assert_eq!(settings.log_persistence, LogPersistence::BestEffort);
        assert_eq!(settings.max_body_bytes, Some(10 * 1024 * 1024));
        assert_eq!(settings.static_dir, Some(PathBuf::from("/srv/ui")));
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(
            settings.data_roots().root_for("any.host"),
            PathBuf::from("/srv/httplogger")
        );
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = Settings::from_lookup(lookup(&[("STATS_LOCK_ATTEMPTS", "many")])).unwrap_err();
        assert!(err.to_string().contains("STATS_LOCK_ATTEMPTS"));

        let err = Settings::from_lookup(lookup(&[("DATA_PARTITION", "tenant")])).unwrap_err();
        assert!(err.to_string().contains("DATA_PARTITION"));

        assert!(Settings::from_lookup(lookup(&[("STATS_LOCK_ATTEMPTS", "0")])).is_err());
    }
}

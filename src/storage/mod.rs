//! File-backed persistence: configurations, transaction records and statistics
//!
//! Every tenant owns a data root laid out as:
//!
//! ```text
//! {root}/config/{id}.json
//! {root}/{yyyy-MM-dd}/{uuid}.json
//! {root}/statistics.json
//! ```

pub mod configs;
pub mod records;
pub mod stats;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use configs::ConfigStore;
pub use records::{LogQuery, RequestLogger};
pub use stats::{LockPolicy, StatsStore};

const MAX_ID_LEN: usize = 128;

/// Storage error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid config identifier '{0}'")]
    InvalidId(String),

    #[error("Invalid date '{0}', expected yyyy-MM-dd")]
    InvalidDate(String),

    #[error("Unable to obtain exclusive access to {} after {attempts} attempts", path.display())]
    LockExhausted { path: PathBuf, attempts: u32 },
}

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Maps a tenant key to the folder holding that tenant's data.
pub trait DataRootResolver: Send + Sync {
    fn root_for(&self, tenant: &str) -> PathBuf;
}

/// All tenants share one folder.
#[derive(Debug, Clone)]
pub struct SharedDataRoot {
    root: PathBuf,
}

impl SharedDataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DataRootResolver for SharedDataRoot {
    fn root_for(&self, _tenant: &str) -> PathBuf {
        self.root.clone()
    }
}

/// One sub-folder per tenant host name.
#[derive(Debug, Clone)]
pub struct HostDataRoot {
    base: PathBuf,
}

impl HostDataRoot {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl DataRootResolver for HostDataRoot {
    fn root_for(&self, tenant: &str) -> PathBuf {
        self.base.join(sanitize_tenant(tenant))
    }
}

/// Reduce a host name to a safe single folder name.
pub fn sanitize_tenant(tenant: &str) -> String {
    let mut folder: String = tenant
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '-' => c,
            _ => '_',
        })
        .collect();

    if folder.starts_with('.') {
        folder = folder.replacen('.', "_", 1);
    }
    if folder.is_empty() {
        folder.push_str("default");
    }
    folder
}

/// Check a caller-chosen configuration id before it becomes a file name.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_tenant() {
        assert_eq!(sanitize_tenant("Example.COM"), "example.com");
        assert_eq!(sanitize_tenant("../etc"), "_._etc");
        assert_eq!(sanitize_tenant("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_tenant(""), "default");
    }

    #[test]
    fn test_host_root_partitions_by_tenant() {
        let roots = HostDataRoot::new("/data");
        assert_eq!(roots.root_for("Api.Example.com"), PathBuf::from("/data/api.example.com"));

        let shared = SharedDataRoot::new("/data");
        assert_eq!(shared.root_for("anything"), PathBuf::from("/data"));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("3f2b8c1e-0d4a-4d4e-9a55-1c2d3e4f5a6b").is_ok());
        assert!(validate_id("my_config.v2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id("../secret").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("with space").is_err());
        assert!(validate_id(&"x".repeat(129)).is_err());
    }
}

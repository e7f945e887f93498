//! Configuration files, one per identifier

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::{read_json, validate_id, Result, StoreError};
use crate::models::{ConfigSummary, Configuration};

const CONFIG_DIR: &str = "config";

/// Reads and writes `{root}/config/{id}.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(CONFIG_DIR),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Load a configuration.
    pub fn get(&self, id: &str) -> Result<Configuration> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("Config '{id}' not found")));
        }
        read_json(&path)
    }

    /// Load a configuration and mark it as recently used.
    pub fn get_and_touch(&self, id: &str) -> Result<Configuration> {
        let config = self.get(id)?;
        let path = self.path_for(id)?;
        File::options()
            .write(true)
            .open(&path)?
            .set_modified(SystemTime::now())?;
        debug!(config = %id, "Touched config file");
        Ok(config)
    }

    /// Create or replace a configuration.
    pub fn put(&self, id: &str, config: &Configuration) -> Result<()> {
        let path = self.path_for(id)?;
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(config).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json)?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("Config '{id}' not found")));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Summaries of all configurations, most recently modified first.
    ///
    /// Files that fail to parse are still listed with an empty name.
    pub fn list(&self) -> Result<Vec<ConfigSummary>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(guid) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let modified = fs::metadata(&path)?.modified()?;
            let name = match read_json::<Configuration>(&path) {
                Ok(config) => config.name.unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "Unreadable config listed without name");
                    String::new()
                }
            };

            summaries.push(ConfigSummary {
                guid: guid.to_string(),
                name,
                last_update: DateTime::<Local>::from(modified),
            });
        }

        summaries.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        Ok(summaries)
    }
}

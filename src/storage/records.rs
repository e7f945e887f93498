//! Transaction records, one immutable file per data-endpoint request

use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

use super::{read_json, Result, StoreError};
use crate::models::TransactionRecord;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Folder name of today's partition.
pub fn today_partition() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// Writes records into `{root}/{yyyy-MM-dd}/{uuid}.json`.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    root: PathBuf,
}

impl RequestLogger {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Persist `record` under the partition of its own timestamp and return the file path.
    pub fn log(&self, record: &TransactionRecord) -> Result<PathBuf> {
        let folder = self
            .root
            .join(record.timestamp.format(DATE_FORMAT).to_string());
        fs::create_dir_all(&folder)?;

        let path = folder.join(format!("{}.json", Uuid::new_v4()));
        let json = serde_json::to_string_pretty(record).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;

        // create_new: a record file is never overwritten
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(json.as_bytes())?;
        file.sync_data()?;
        Ok(path)
    }
}

/// Reads back the records of one date partition.
#[derive(Debug, Clone)]
pub struct LogQuery {
    root: PathBuf,
}

impl LogQuery {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Records of `date`, newest file first, filtered by `config_guid` (case-insensitive)
    /// and then paginated with `offset`/`count`.
    ///
    /// Records are returned as stored, without re-validation against the current model.
    pub fn list(
        &self,
        date: &str,
        offset: usize,
        count: usize,
        config_guid: Option<&str>,
    ) -> Result<Vec<Value>> {
        NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| StoreError::InvalidDate(date.to_string()))?;

        let folder = self.root.join(date);
        if !folder.is_dir() {
            return Err(StoreError::NotFound(format!(
                "No log folder found for date {date}"
            )));
        }

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&folder)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let metadata = entry.metadata()?;
            let created = metadata.created().or_else(|_| metadata.modified())?;
            files.push((created, path));
        }
        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let guid = config_guid.map(str::trim).filter(|g| !g.is_empty());
        let mut records = Vec::new();
        for (_, path) in files {
            let record: Value = read_json(&path)?;
            if let Some(guid) = guid {
                let matches = record
                    .get("configGuid")
                    .and_then(Value::as_str)
                    .is_some_and(|stored| stored.eq_ignore_ascii_case(guid));
                if !matches {
                    continue;
                }
            }
            records.push(record);
        }

        Ok(records.into_iter().skip(offset).take(count).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CapturedRequest, EffectiveResponse, HeaderSet};
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(url: &str, guid: Option<&str>) -> TransactionRecord {
        let request = CapturedRequest {
            method: "POST".into(),
            url: url.into(),
            headers: HeaderSet::new(),
            body: "payload".into(),
        };
        let response = EffectiveResponse {
            status_code: 200,
            headers: EffectiveResponse::headers_with(None),
            body: "{}".into(),
            delay: 0,
        };
        TransactionRecord::new(request, guid.map(String::from), &response)
    }

    fn urls(records: &[Value]) -> Vec<&str> {
        records.iter().map(|r| r["url"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_log_writes_one_file_per_record() {
        let dir = TempDir::new().unwrap();
        let logger = RequestLogger::new(dir.path());

        let first = logger.log(&record("http://h/api/a", None)).unwrap();
        let second = logger.log(&record("http://h/api/a", None)).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.parent().unwrap(), dir.path().join(today_partition()));

        let stored: TransactionRecord = read_json(&first).unwrap();
        assert_eq!(stored.request_body, "payload");
        assert_eq!(stored.config_guid, None);
    }

    #[test]
    fn test_list_orders_then_paginates() {
        let dir = TempDir::new().unwrap();
        let logger = RequestLogger::new(dir.path());
        for url in ["t3", "t2", "t1"] {
            logger.log(&record(url, None)).unwrap();
            std::thread::sleep(Duration::from_millis(15));
        }

        let query = LogQuery::new(dir.path());
        let all = query.list(&today_partition(), 0, 10, None).unwrap();
        assert_eq!(urls(&all), vec!["t1", "t2", "t3"]);

        let page = query.list(&today_partition(), 1, 1, None).unwrap();
        assert_eq!(urls(&page), vec!["t2"]);
    }

    #[test]
    fn test_filter_applies_before_pagination() {
        let dir = TempDir::new().unwrap();
        let logger = RequestLogger::new(dir.path());
        for (url, guid) in [("a1", "cfg-a"), ("b1", "cfg-b"), ("a2", "CFG-A"), ("b2", "cfg-b")] {
            logger.log(&record(url, Some(guid))).unwrap();
            std::thread::sleep(Duration::from_millis(15));
        }

        let query = LogQuery::new(dir.path());
        let filtered = query.list(&today_partition(), 0, 10, Some("cfg-a")).unwrap();
        assert_eq!(urls(&filtered), vec!["a2", "a1"]);

        let page = query.list(&today_partition(), 1, 1, Some("cfg-a")).unwrap();
        assert_eq!(urls(&page), vec!["a1"]);
    }

    #[test]
    fn test_missing_partition_and_bad_date() {
        let dir = TempDir::new().unwrap();
        let query = LogQuery::new(dir.path());

        assert!(matches!(
            query.list("2001-01-01", 0, 1, None),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            query.list("../config", 0, 1, None),
            Err(StoreError::InvalidDate(_))
        ));
    }
}

//! Core domain models for HttpLogger

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header every response starts from before configuration headers are merged on top.
pub const DEFAULT_CONTENT_TYPE: (&str, &str) = ("Content-Type", "application/json");

/// Header map as persisted in configuration and record files.
pub type HeaderSet = BTreeMap<String, String>;

fn default_status_code() -> u16 {
    200
}

fn default_ignore_case() -> bool {
    true
}

/// A persisted response configuration, selected by its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Identifier as echoed by the editor; the file name is authoritative
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    /// Optional human label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HeaderSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Artificial delay in milliseconds, applied once per request
    #[serde(default)]
    pub response_delay: u64,
    /// Ordered override rules; first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_specific_response: Vec<OverrideRule>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            guid: None,
            name: None,
            status_code: default_status_code(),
            response_headers: None,
            body: None,
            response_delay: 0,
            path_specific_response: Vec::new(),
        }
    }
}

/// How an override rule tests the relative request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Slash-insensitive, case-sensitive equality
    Literal(String),
    /// Unanchored regular expression search
    Regex { pattern: String, ignore_case: bool },
}

/// A path-specific response that replaces the configuration's own response on match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OverrideRuleWire", into = "OverrideRuleWire")]
pub struct OverrideRule {
    /// `None` when the rule was saved without a pattern; such rules never match
    pub pattern: Option<PathPattern>,
    pub response: PathResponse,
}

impl OverrideRule {
    pub fn literal(pattern: impl Into<String>, response: PathResponse) -> Self {
        Self {
            pattern: Some(PathPattern::Literal(pattern.into())),
            response,
        }
    }

    pub fn regex(pattern: impl Into<String>, ignore_case: bool, response: PathResponse) -> Self {
        Self {
            pattern: Some(PathPattern::Regex {
                pattern: pattern.into(),
                ignore_case,
            }),
            response,
        }
    }
}

/// On-disk shape of an override rule, shared with the editor UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideRuleWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default)]
    is_regular_expression: bool,
    #[serde(default = "default_ignore_case")]
    ignore_case: bool,
    #[serde(default)]
    response: PathResponse,
}

impl From<OverrideRuleWire> for OverrideRule {
    fn from(wire: OverrideRuleWire) -> Self {
        let pattern = wire.pattern.map(|pattern| {
            if wire.is_regular_expression {
                PathPattern::Regex {
                    pattern,
                    ignore_case: wire.ignore_case,
                }
            } else {
                PathPattern::Literal(pattern)
            }
        });
        Self {
            pattern,
            response: wire.response,
        }
    }
}

impl From<OverrideRule> for OverrideRuleWire {
    fn from(rule: OverrideRule) -> Self {
        let (pattern, is_regular_expression, ignore_case) = match rule.pattern {
            None => (None, false, true),
            Some(PathPattern::Literal(pattern)) => (Some(pattern), false, true),
            Some(PathPattern::Regex {
                pattern,
                ignore_case,
            }) => (Some(pattern), true, ignore_case),
        };
        Self {
            pattern,
            is_regular_expression,
            ignore_case,
            response: rule.response,
        }
    }
}

/// Response supplied by a matching override rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResponse {
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HeaderSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Default for PathResponse {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            response_headers: None,
            body: None,
        }
    }
}

/// The response actually sent for a data-endpoint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveResponse {
    pub status_code: u16,
    pub headers: HeaderSet,
    pub body: String,
    /// Milliseconds to hold the reply after the record is written
    pub delay: u64,
}

impl EffectiveResponse {
    /// Base header set with `overrides` merged on top.
    pub fn headers_with(overrides: Option<&HeaderSet>) -> HeaderSet {
        let mut headers = HeaderSet::new();
        headers.insert(
            DEFAULT_CONTENT_TYPE.0.to_string(),
            DEFAULT_CONTENT_TYPE.1.to_string(),
        );
        if let Some(overrides) = overrides {
            for (name, value) in overrides {
                headers.insert(name.clone(), value.clone());
            }
        }
        headers
    }

    /// Synthetic response used when no configuration could be applied.
    pub fn diagnostic(status_code: u16, message: impl Into<String>, app_url: &str) -> Self {
        let body = serde_json::json!({
            "message": message.into(),
            "appUrl": app_url,
        });
        Self {
            status_code,
            headers: Self::headers_with(None),
            body: body.to_string(),
            delay: 0,
        }
    }
}

/// One persisted data-endpoint transaction. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub http_method: String,
    pub url: String,
    pub request_headers: HeaderSet,
    pub request_body: String,
    pub response_headers: HeaderSet,
    pub response_body: String,
    pub http_status_code: u16,
    pub config_guid: Option<String>,
    pub response_delay: u64,
}

impl TransactionRecord {
    /// Build a record stamped with the current local time.
    pub fn new(request: CapturedRequest, config_guid: Option<String>, response: &EffectiveResponse) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            http_method: request.method,
            url: request.url,
            request_headers: request.headers,
            request_body: request.body,
            response_headers: response.headers.clone(),
            response_body: response.body.clone(),
            http_status_code: response.status_code,
            config_guid,
            response_delay: response.delay,
        }
    }
}

/// Raw request as captured by the data endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderSet,
    pub body: String,
}

/// Tracked management and data-endpoint events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    ApiInvoked,
    LogsViewed,
    ConfigListFetched,
    ConfigRead,
    ConfigSaved,
    ConfigDeleted,
    StatsViewed,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::ApiInvoked => "ApiInvoked",
            StatKind::LogsViewed => "LogsViewed",
            StatKind::ConfigListFetched => "ConfigListFetched",
            StatKind::ConfigRead => "ConfigRead",
            StatKind::ConfigSaved => "ConfigSaved",
            StatKind::ConfigDeleted => "ConfigDeleted",
            StatKind::StatsViewed => "StatsViewed",
        }
    }
}

/// Per-tenant usage counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsRecord {
    pub creation_timestamp: DateTime<FixedOffset>,
    pub update_timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
}

impl StatisticsRecord {
    pub fn new() -> Self {
        let now = Local::now().fixed_offset();
        Self {
            creation_timestamp: now,
            update_timestamp: now,
            counts: BTreeMap::new(),
        }
    }

    /// Bump the counter for `kind` and refresh the update timestamp.
    pub fn register(&mut self, kind: StatKind) {
        self.update_timestamp = Local::now().fixed_offset();
        *self.counts.entry(kind.as_str().to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, kind: StatKind) -> u64 {
        self.counts.get(kind.as_str()).copied().unwrap_or(0)
    }
}

impl Default for StatisticsRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry of the configuration listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub guid: String,
    pub name: String,
    pub last_update: DateTime<Local>,
}

/// Reply to set-config and delete-config.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigAck {
    pub message: &'static str,
    pub guid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_defaults() {
        let config: Configuration = serde_json::from_str(r#"{"name":"empty"}"#).unwrap();
        assert_eq!(config.status_code, 200);
        assert_eq!(config.response_delay, 0);
        assert!(config.path_specific_response.is_empty());
        assert!(config.response_headers.is_none());
    }

    #[test]
    fn test_override_rule_wire_shape() {
        let json = r#"{
            "pattern": "^users/\\d+$",
            "isRegularExpression": true,
            "response": { "statusCode": 404 }
        }"#;
        let rule: OverrideRule = serde_json::from_str(json).unwrap();
        assert_eq!(
            rule.pattern,
            Some(PathPattern::Regex {
                pattern: "^users/\\d+$".into(),
                ignore_case: true,
            })
        );
        assert_eq!(rule.response.status_code, 404);

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["isRegularExpression"], true);
        assert_eq!(value["ignoreCase"], true);
    }

    #[test]
    fn test_literal_rule_is_default() {
        let rule: OverrideRule = serde_json::from_str(r#"{"pattern":"/orders"}"#).unwrap();
        assert_eq!(rule.pattern, Some(PathPattern::Literal("/orders".into())));
        assert_eq!(rule.response, PathResponse::default());
    }

    #[test]
    fn test_headers_with_overrides_default() {
        let mut overrides = HeaderSet::new();
        overrides.insert("Content-Type".into(), "text/plain".into());
        overrides.insert("X-Trace".into(), "1".into());

        let headers = EffectiveResponse::headers_with(Some(&overrides));
        assert_eq!(headers["Content-Type"], "text/plain");
        assert_eq!(headers["X-Trace"], "1");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_statistics_register() {
        let mut stats = StatisticsRecord::new();
        stats.register(StatKind::ApiInvoked);
        stats.register(StatKind::ApiInvoked);
        stats.register(StatKind::StatsViewed);
        assert_eq!(stats.count(StatKind::ApiInvoked), 2);
        assert_eq!(stats.count(StatKind::StatsViewed), 1);
        assert_eq!(stats.count(StatKind::ConfigSaved), 0);
    }
}

//! Request-to-response resolution: override rule matching over a configuration

use regex::RegexBuilder;
use thiserror::Error;

use crate::models::{Configuration, EffectiveResponse, OverrideRule, PathPattern};

/// Route segment that separates the service prefix from the caller's path.
pub const API_SEGMENT: &str = "/api";

/// Compiled-size ceiling for rule patterns (bytes of compiled program).
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid override pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Strip everything through the first case-insensitive `/api`, then a single leading `/`.
///
/// A path without the segment yields an empty relative path.
pub fn relative_path(path: &str) -> &str {
    let needle = API_SEGMENT.as_bytes();
    let found = path
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle));

    match found {
        Some(index) => {
            let rest = &path[index + needle.len()..];
            rest.strip_prefix('/').unwrap_or(rest)
        }
        None => "",
    }
}

/// Resolve the effective response for `config` at `relative_path`.
///
/// Rules are tried in order and the first match replaces status, body and headers.
/// Headers of a matching rule are merged onto the default base only; the configuration's
/// own headers are dropped. The delay always comes from the configuration.
pub fn resolve(config: &Configuration, relative_path: &str) -> Result<Resolution, ResolveError> {
    let delay = config.response_delay;

    for (index, rule) in config.path_specific_response.iter().enumerate() {
        if rule_matches(rule, relative_path)? {
            let response = &rule.response;
            return Ok(Resolution {
                response: EffectiveResponse {
                    status_code: response.status_code,
                    headers: EffectiveResponse::headers_with(response.response_headers.as_ref()),
                    body: response.body.clone().unwrap_or_default(),
                    delay,
                },
                matched_rule: Some(index),
            });
        }
    }

    Ok(Resolution {
        response: EffectiveResponse {
            status_code: config.status_code,
            headers: EffectiveResponse::headers_with(config.response_headers.as_ref()),
            body: config.body.clone().unwrap_or_default(),
            delay,
        },
        matched_rule: None,
    })
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub response: EffectiveResponse,
    /// Index of the rule that supplied the response, if any
    pub matched_rule: Option<usize>,
}

fn rule_matches(rule: &OverrideRule, relative_path: &str) -> Result<bool, ResolveError> {
    match &rule.pattern {
        None => Ok(false),
        Some(PathPattern::Literal(pattern)) => Ok(literal_matches(pattern, relative_path)),
        Some(PathPattern::Regex {
            pattern,
            ignore_case,
        }) => {
            if pattern.trim().is_empty() {
                return Ok(false);
            }
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(*ignore_case)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|source| ResolveError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            Ok(regex.is_match(relative_path))
        }
    }
}

fn literal_matches(pattern: &str, relative_path: &str) -> bool {
    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    pattern == relative_path.trim_end_matches('/')
}

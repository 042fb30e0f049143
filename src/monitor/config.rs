// SPDX-License-Identifier: Apache-2.0

//! Monitor Configuration
//!
//! Policies are loaded once at startup and never mutated afterwards. The JSON
//! keys follow the camelCase names used by `querymonitor` configuration files;
//! every key is optional and falls back to a disabled default. The legacy key
//! names (`attiva`, `maxExecutionTime`, `sqlRegEx`, `methodRegEx`,
//! `query_builder`) and their `QUERYMONITOR_*` variables are still accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{MonitorError, MonitorResult};

const ENV_PREFIX: &str = "QUERYMONITOR";

/// Per-operation filter policy (raw statements or builder methods)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPolicy {
    /// Whether this class of operation is monitored at all
    #[serde(default, alias = "attiva")]
    pub enabled: bool,
    /// Operations faster than this are ignored (absent = no time gate)
    #[serde(default, alias = "maxExecutionTime")]
    pub min_elapsed_millis: Option<f64>,
    /// Regex the representation must match (absent or empty = match-all)
    #[serde(
        default = "default_pattern",
        alias = "sqlRegEx",
        alias = "methodRegEx"
    )]
    pub pattern: Option<String>,
}

fn default_pattern() -> Option<String> {
    Some("^.*$".to_string())
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_elapsed_millis: None,
            pattern: default_pattern(),
        }
    }
}

impl FilterPolicy {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_min_elapsed(mut self, millis: f64) -> Self {
        self.min_elapsed_millis = Some(millis);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// Aggregate (per unit of work) query-count policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Counts strictly above this are violations. Must be positive.
    #[serde(default = "default_ceiling")]
    pub ceiling: u64,
    /// Regex matched against the scope identifier (URL, command, script)
    #[serde(default)]
    pub scope_pattern: Option<String>,
}

fn default_ceiling() -> u64 {
    500
}

impl Default for AggregatePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ceiling: default_ceiling(),
            scope_pattern: None,
        }
    }
}

impl AggregatePolicy {
    /// Enabled policy with the given ceiling
    pub fn enabled(ceiling: u64) -> Self {
        Self {
            enabled: true,
            ceiling,
            scope_pattern: None,
        }
    }

    pub fn with_scope_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.scope_pattern = Some(pattern.into());
        self
    }
}

/// Full monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default)]
    pub query: FilterPolicy,
    #[serde(default, alias = "query_builder")]
    pub builder_method: FilterPolicy,
    #[serde(default)]
    pub aggregate: AggregatePolicy,
    /// Frames captured per slow-operation record; 0 disables capture
    #[serde(default = "default_max_stack_depth")]
    pub max_stack_depth: usize,
}

fn default_max_stack_depth() -> usize {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            query: FilterPolicy::default(),
            builder_method: FilterPolicy::default(),
            aggregate: AggregatePolicy::default(),
            max_stack_depth: default_max_stack_depth(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::configuration_unavailable(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: MonitorConfig = serde_json::from_str(&content).map_err(|e| {
            MonitorError::configuration_unavailable(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        debug!("Loaded monitor configuration from {:?}", path);
        Ok(config)
    }

    /// Rejects values the monitor cannot run with
    pub fn validate(&self) -> MonitorResult<()> {
        if self.aggregate.ceiling == 0 {
            return Err(MonitorError::invalid_value(
                "aggregate.ceiling",
                "must be a positive integer",
            ));
        }
        Ok(())
    }

    /// Overlay `QUERYMONITOR_*` environment variables
    pub fn apply_env(self) -> MonitorResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> MonitorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // first key present wins; legacy names come last
        let get = |suffixes: &[&str]| {
            suffixes.iter().find_map(|suffix| {
                let key = format!("{}_{}", ENV_PREFIX, suffix);
                lookup(&key).map(|value| (key, value.trim().to_string()))
            })
        };

        for (prefix, legacy_pattern, policy) in [
            ("QUERY", "SQL_REGEX", &mut self.query),
            ("BUILDER", "METHOD_REGEX", &mut self.builder_method),
        ] {
            let enabled = [format!("{}_ENABLED", prefix), format!("{}_ATTIVA", prefix)];
            let min_elapsed = [
                format!("{}_MIN_ELAPSED_MS", prefix),
                format!("{}_MAX_EXECUTION_TIME", prefix),
            ];
            let pattern = [
                format!("{}_PATTERN", prefix),
                format!("{}_{}", prefix, legacy_pattern),
            ];

            if let Some((key, value)) = get(&[enabled[0].as_str(), enabled[1].as_str()]) {
                policy.enabled = parse_bool(&key, &value)?;
            }
            if let Some((key, value)) = get(&[min_elapsed[0].as_str(), min_elapsed[1].as_str()]) {
                policy.min_elapsed_millis = parse_optional(&key, &value)?;
            }
            if let Some((_, value)) = get(&[pattern[0].as_str(), pattern[1].as_str()]) {
                policy.pattern = non_empty(value);
            }
        }

        if let Some((key, value)) = get(&["AGGREGATE_ENABLED"]) {
            self.aggregate.enabled = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = get(&["AGGREGATE_CEILING"]) {
            self.aggregate.ceiling = parse_value(&key, &value)?;
        }
        if let Some((_, value)) = get(&["AGGREGATE_SCOPE_PATTERN"]) {
            self.aggregate.scope_pattern = non_empty(value);
        }
        if let Some((key, value)) = get(&["MAX_STACK_DEPTH", "BUILDER_MAX_STACK_DEPTH"]) {
            self.max_stack_depth = parse_value(&key, &value)?;
        }

        self.validate()?;
        Ok(self)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(key: &str, value: &str) -> MonitorResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(MonitorError::invalid_value(
            key,
            format!("expected a boolean, got '{}'", other),
        )),
    }
}

fn parse_value<T>(key: &str, value: &str) -> MonitorResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| MonitorError::invalid_value(key, e.to_string()))
}

fn parse_optional<T>(key: &str, value: &str) -> MonitorResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    parse_value(key, value).map(Some)
}

// SPDX-License-Identifier: Apache-2.0

//! Monitor Types
//!
//! Type definitions shared by the filter, the aggregate counter and the sinks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Class of an observed data-access operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A parameterized statement reported by the execution engine
    RawStatement,
    /// A named high-level builder method (`get`, `count`, ...)
    NamedMethod,
}

impl OperationKind {
    /// Fixed classification label carried by emitted records
    pub fn label(&self) -> &'static str {
        match self {
            Self::RawStatement => "slow statement",
            Self::NamedMethod => "slow operation",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::RawStatement => "Slow SQL query detected",
            Self::NamedMethod => "Slow builder method detected",
        }
    }
}

/// A bound parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl BindingValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Renders the value as a statement literal.
    ///
    /// Numbers are unquoted; text is single-quoted with backslash escaping so
    /// the literal cannot be terminated early by the value itself.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => {
                if f.is_nan() {
                    "'NaN'".to_string()
                } else if f.is_infinite() {
                    let literal = if *f > 0.0 { "'Infinity'" } else { "'-Infinity'" };
                    literal.to_string()
                } else {
                    format!("{}", f)
                }
            }
            Self::Text(s) => quote_text(s),
        }
    }
}

impl From<i64> for BindingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for BindingValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for BindingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for BindingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BindingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<BindingValue>> From<Option<T>> for BindingValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

fn quote_text(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    escaped.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\0' => escaped.push_str("\\0"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

/// One completed operation, built right after it finishes and consumed
/// synchronously by the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub kind: OperationKind,
    /// Parameterized statement text, or the method name for named methods
    pub representation: String,
    /// Positional bindings, in placeholder order
    pub parameters: Vec<BindingValue>,
    pub elapsed_ms: f64,
    /// Statement behind a named method, when the builder can produce one
    pub statement: Option<String>,
}

impl OperationRecord {
    pub fn raw(sql: impl Into<String>, parameters: Vec<BindingValue>, elapsed_ms: f64) -> Self {
        Self {
            kind: OperationKind::RawStatement,
            representation: sql.into(),
            parameters,
            elapsed_ms: elapsed_ms.max(0.0),
            statement: None,
        }
    }

    pub fn named(method: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            kind: OperationKind::NamedMethod,
            representation: method.into(),
            parameters: Vec::new(),
            elapsed_ms: elapsed_ms.max(0.0),
            statement: None,
        }
    }

    /// Attaches the SQL a named method ran, with its bindings.
    pub fn with_statement(mut self, sql: impl Into<String>, parameters: Vec<BindingValue>) -> Self {
        self.statement = Some(sql.into());
        self.parameters = parameters;
        self
    }
}

/// Describes the unit of work an aggregate counter is tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScopeContext {
    Request {
        url: String,
        method: String,
    },
    Command {
        command: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
    Cli {
        script: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
}

impl ScopeContext {
    pub fn request(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Request {
            url: url.into(),
            method: method.into(),
        }
    }

    pub fn command(command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self::Command {
            command: command.into(),
            arguments,
        }
    }

    pub fn cli(script: impl Into<String>, arguments: Vec<String>) -> Self {
        Self::Cli {
            script: script.into(),
            arguments,
        }
    }

    /// Builds a generic CLI context from the current process arguments.
    pub fn cli_from_env() -> Self {
        let mut args = std::env::args();
        let script = args.next().unwrap_or_else(|| "unknown-script".to_string());
        Self::cli(script, args.collect())
    }

    /// The string matched against `aggregate.scopePattern`
    pub fn identifier(&self) -> &str {
        match self {
            Self::Request { url, .. } => url,
            Self::Command { command, .. } => command,
            Self::Cli { script, .. } => script,
        }
    }

    /// Label written to the `context` field of violation records
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Command { .. } => "command",
            Self::Cli { .. } => "cli-service",
        }
    }
}

impl fmt::Display for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { url, method } => write!(f, "{} {}", method, url),
            Self::Command { command, .. } => write!(f, "command {}", command),
            Self::Cli { script, .. } => write!(f, "cli {}", script),
        }
    }
}

/// Per-operation diagnostic produced by the filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowOperationRecord {
    pub label: String,
    pub message: String,
    /// Rendered statement, absent for named methods without SQL
    pub query: Option<String>,
    /// Method name, only for named methods
    pub method: Option<String>,
    /// Elapsed time with unit suffix, e.g. `12.5 ms`
    pub execution_time: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
}

/// Emitted when a scope ran more operations than the ceiling allows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub message: String,
    /// `request`, `command` or `cli-service`
    pub context: String,
    pub scope: ScopeContext,
    pub count: u64,
    pub ceiling: u64,
}

impl ViolationRecord {
    pub fn new(scope: ScopeContext, count: u64, ceiling: u64) -> Self {
        Self {
            message: format!(
                "Exceeded maximum total queries: {} queries (max: {}).",
                count, ceiling
            ),
            context: scope.kind_label().to_string(),
            scope,
            count,
            ceiling,
        }
    }
}

/// Anything forwarded to a [`DiagnosticSink`](super::sink::DiagnosticSink)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticRecord {
    SlowOperation(SlowOperationRecord),
    Violation(ViolationRecord),
}

impl DiagnosticRecord {
    pub fn message(&self) -> &str {
        match self {
            Self::SlowOperation(r) => &r.message,
            Self::Violation(r) => &r.message,
        }
    }
}

impl From<SlowOperationRecord> for DiagnosticRecord {
    fn from(record: SlowOperationRecord) -> Self {
        Self::SlowOperation(record)
    }
}

impl From<ViolationRecord> for DiagnosticRecord {
    fn from(record: ViolationRecord) -> Self {
        Self::Violation(record)
    }
}

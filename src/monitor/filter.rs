// SPDX-License-Identifier: Apache-2.0

//! Operation Filter & Formatter
//!
//! Decides whether a single completed operation is worth reporting and, when
//! it is, renders a readable statement and builds the diagnostic record.
//! Nothing here logs or touches shared state; the caller forwards the record
//! to a sink.

use regex::Regex;
use tracing::warn;

use super::config::FilterPolicy;
use super::error::MonitorError;
use super::types::{BindingValue, OperationKind, OperationRecord, SlowOperationRecord};

const PLACEHOLDER: char = '?';

/// A [`FilterPolicy`] with its pattern compiled once
#[derive(Debug, Clone)]
pub struct OperationFilter {
    enabled: bool,
    min_elapsed_ms: Option<f64>,
    pattern: Option<Regex>,
}

impl OperationFilter {
    /// Compiles the policy. A pattern that fails to compile is logged and
    /// treated as match-all.
    pub fn new(policy: &FilterPolicy) -> Self {
        let pattern = match policy.pattern.as_deref() {
            Some(p) if !p.is_empty() => match compile_pattern(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("{}; matching every operation instead", e);
                    None
                }
            },
            _ => None,
        };

        Self {
            enabled: policy.enabled,
            min_elapsed_ms: policy.min_elapsed_millis,
            pattern,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true when the record passes every gate of the policy
    pub fn accepts(&self, record: &OperationRecord) -> bool {
        if !self.enabled {
            return false;
        }

        if let Some(min) = self.min_elapsed_ms {
            if record.elapsed_ms < min {
                return false;
            }
        }

        if let Some(ref regex) = self.pattern {
            if !regex.is_match(&record.representation) {
                return false;
            }
        }

        true
    }

    /// Filters the record and builds its diagnostic on pass
    pub fn evaluate(&self, record: &OperationRecord) -> Option<SlowOperationRecord> {
        if !self.accepts(record) {
            return None;
        }
        Some(build_record(record))
    }
}

/// One-shot evaluation against an uncompiled policy
pub fn evaluate(record: &OperationRecord, policy: &FilterPolicy) -> Option<SlowOperationRecord> {
    if !policy.enabled {
        return None;
    }
    OperationFilter::new(policy).evaluate(record)
}

/// Compiles a user pattern for case-insensitive matching
pub fn compile_pattern(pattern: &str) -> Result<Regex, MonitorError> {
    Regex::new(&format!("(?i){}", pattern))
        .map_err(|e| MonitorError::malformed_pattern(pattern, e.to_string()))
}

/// Substitutes bindings into positional placeholders.
///
/// Each binding replaces exactly one placeholder, left to right. Text that
/// was substituted in is never scanned again. Surplus bindings or surplus
/// placeholders are left as they are.
pub fn render_statement(sql: &str, bindings: &[BindingValue]) -> String {
    let mut rendered = String::with_capacity(sql.len() + bindings.len() * 8);
    let mut remaining = bindings.iter();

    for ch in sql.chars() {
        if ch == PLACEHOLDER {
            if let Some(binding) = remaining.next() {
                rendered.push_str(&binding.to_literal());
                continue;
            }
        }
        rendered.push(ch);
    }

    rendered
}

/// Formats elapsed milliseconds with a unit suffix
pub fn format_elapsed(elapsed_ms: f64) -> String {
    format!("{} ms", elapsed_ms)
}

fn build_record(record: &OperationRecord) -> SlowOperationRecord {
    let (query, method) = match record.kind {
        OperationKind::RawStatement => (
            Some(render_statement(&record.representation, &record.parameters)),
            None,
        ),
        OperationKind::NamedMethod => (
            record
                .statement
                .as_deref()
                .map(|sql| render_statement(sql, &record.parameters)),
            Some(record.representation.clone()),
        ),
    };

    SlowOperationRecord {
        label: record.kind.label().to_string(),
        message: record.kind.message().to_string(),
        query,
        method,
        execution_time: format_elapsed(record.elapsed_ms),
        stack: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_all() -> FilterPolicy {
        FilterPolicy::enabled()
            .with_min_elapsed(0.0)
            .with_pattern("^.*$")
    }

    #[test]
    fn test_disabled_policy_rejects_everything() {
        let policy = FilterPolicy {
            enabled: false,
            min_elapsed_millis: None,
            pattern: None,
        };
        let record = OperationRecord::raw("SELECT 1", vec![], 10_000.0);
        assert!(evaluate(&record, &policy).is_none());

        let broken = FilterPolicy {
            enabled: false,
            min_elapsed_millis: Some(0.0),
            pattern: Some("(".to_string()),
        };
        assert!(evaluate(&record, &broken).is_none());
    }

    #[test]
    fn test_min_elapsed_is_inclusive() {
        let policy = FilterPolicy::enabled().with_min_elapsed(100.0);

        let below = OperationRecord::raw("SELECT 1", vec![], 99.9);
        assert!(evaluate(&below, &policy).is_none());

        let equal = OperationRecord::raw("SELECT 1", vec![], 100.0);
        assert!(evaluate(&equal, &policy).is_some());

        let above = OperationRecord::raw("SELECT 1", vec![], 250.0);
        assert!(evaluate(&above, &policy).is_some());
    }

    #[test]
    fn test_pattern_gate() {
        let policy = FilterPolicy::enabled().with_pattern("^select");

        let select = OperationRecord::raw("SELECT * FROM users", vec![], 1.0);
        assert!(evaluate(&select, &policy).is_some());

        let update = OperationRecord::raw("UPDATE users SET a = 1", vec![], 1.0);
        assert!(evaluate(&update, &policy).is_none());
    }

    #[test]
    fn test_empty_or_missing_pattern_matches_all() {
        let record = OperationRecord::raw("DELETE FROM t", vec![], 1.0);

        let empty = FilterPolicy::enabled().with_pattern("");
        let missing = FilterPolicy {
            pattern: None,
            ..FilterPolicy::enabled()
        };

        assert_eq!(evaluate(&record, &empty), evaluate(&record, &missing));
        assert!(evaluate(&record, &empty).is_some());
    }

    #[test]
    fn test_malformed_pattern_matches_all() {
        let policy = FilterPolicy::enabled().with_pattern("([unclosed");
        let record = OperationRecord::raw("SELECT 1", vec![], 1.0);
        assert!(evaluate(&record, &policy).is_some());
    }

    #[test]
    fn test_named_method_pattern_case_insensitive() {
        let policy = FilterPolicy::enabled().with_pattern("^(get|first)$");

        assert!(evaluate(&OperationRecord::named("GET", 5.0), &policy).is_some());
        assert!(evaluate(&OperationRecord::named("first", 5.0), &policy).is_some());
        assert!(evaluate(&OperationRecord::named("count", 5.0), &policy).is_none());
    }

    #[test]
    fn test_render_numeric_binding() {
        let record = OperationRecord::raw(
            "SELECT * FROM t WHERE id = ?",
            vec![BindingValue::Int(1)],
            5.0,
        );
        let out = evaluate(&record, &match_all()).unwrap();
        assert_eq!(out.query.as_deref(), Some("SELECT * FROM t WHERE id = 1"));
        assert_eq!(out.label, "slow statement");
        assert_eq!(out.execution_time, "5 ms");
        assert!(out.method.is_none());
    }

    #[test]
    fn test_render_quoted_binding() {
        let record = OperationRecord::raw(
            "SELECT * FROM t WHERE name = ?",
            vec![BindingValue::from("O'Brien")],
            5.0,
        );
        let out = evaluate(&record, &match_all()).unwrap();
        assert_eq!(
            out.query.as_deref(),
            Some(r"SELECT * FROM t WHERE name = 'O\'Brien'")
        );
    }

    #[test]
    fn test_render_placeholder_mismatch() {
        assert_eq!(
            render_statement("a = ? AND b = ?", &[BindingValue::Int(1)]),
            "a = 1 AND b = ?"
        );
        assert_eq!(
            render_statement("a = ?", &[BindingValue::Int(1), BindingValue::Int(2)]),
            "a = 1"
        );
        assert_eq!(render_statement("SELECT 1", &[]), "SELECT 1");
    }

    #[test]
    fn test_substituted_text_not_rescanned() {
        let rendered = render_statement(
            "WHERE q = ? AND id = ?",
            &[BindingValue::from("why?"), BindingValue::Int(7)],
        );
        assert_eq!(rendered, "WHERE q = 'why?' AND id = 7");
    }

    #[test]
    fn test_rendered_literal_round_trips() {
        let original = r"it's a \ test";
        let literal = BindingValue::from(original).to_literal();

        // naive unescape: strip quotes, then resolve backslash escapes
        let inner = &literal[1..literal.len() - 1];
        let mut decoded = String::new();
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('0') => decoded.push('\0'),
                    Some(next) => decoded.push(next),
                    None => {}
                }
            } else {
                assert_ne!(c, '\'', "unescaped quote in literal");
                decoded.push(c);
            }
        }
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let record = OperationRecord::raw(
            "SELECT * FROM t WHERE a = ? AND b = ?",
            vec![BindingValue::Float(2.5), BindingValue::from("x")],
            12.5,
        );
        let filter = OperationFilter::new(&match_all());
        let first = serde_json::to_string(&filter.evaluate(&record)).unwrap();
        let second = serde_json::to_string(&filter.evaluate(&record)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_named_method_record() {
        let record = OperationRecord::named("count", 42.0)
            .with_statement("select count(*) from users where active = ?", vec![BindingValue::Int(1)]);
        let out = evaluate(&record, &FilterPolicy::enabled()).unwrap();
        assert_eq!(out.label, "slow operation");
        assert_eq!(out.method.as_deref(), Some("count"));
        assert_eq!(
            out.query.as_deref(),
            Some("select count(*) from users where active = 1")
        );
        assert_eq!(out.execution_time, "42 ms");
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Boundary Controller
//!
//! Drives a [`QueryCounter`] through the lifecycle of a unit of work:
//! 1. Scope start: reset the counter if the scope should be tracked
//! 2. Per operation: increment the active counter
//! 3. Scope end: report a violation when the count exceeds the ceiling

use std::future::Future;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use super::config::AggregatePolicy;
use super::counter::{self, QueryCounter};
use super::filter::compile_pattern;
use super::sink::{emit_guarded, DiagnosticSink};
use super::types::{ScopeContext, ViolationRecord};
use crate::metrics;

pub struct AggregateController {
    enabled: bool,
    ceiling: u64,
    scope_pattern: Option<Regex>,
    sink: Arc<dyn DiagnosticSink>,
}

impl AggregateController {
    pub fn new(policy: &AggregatePolicy, sink: Arc<dyn DiagnosticSink>) -> Self {
        let scope_pattern = match policy.scope_pattern.as_deref() {
            Some(p) if !p.is_empty() => match compile_pattern(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("{}; tracking every scope instead", e);
                    None
                }
            },
            _ => None,
        };

        Self {
            enabled: policy.enabled,
            ceiling: policy.ceiling,
            scope_pattern,
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Whether a scope with this identifier should be tracked
    pub fn should_track(&self, identifier: &str) -> bool {
        match self.scope_pattern {
            Some(ref regex) => regex.is_match(identifier),
            None => true,
        }
    }

    /// Scope start. Resets `counter` to track `context` unless aggregate
    /// tracking is disabled or the identifier does not match the scope
    /// pattern; in both cases the counter is left untouched.
    pub fn scope_started(&self, counter: &QueryCounter, context: ScopeContext) -> bool {
        if !self.enabled {
            return false;
        }

        if !self.should_track(context.identifier()) {
            debug!("Not tracking {}: scope pattern did not match", context);
            return false;
        }

        debug!("Tracking query count for {}", context);
        counter.reset(Some(context));
        true
    }

    /// Counts one completed operation against the task's active counter
    pub fn operation_completed(&self) {
        if !self.enabled {
            return;
        }
        if let Some(active) = counter::current() {
            self.operation_completed_on(&active);
        }
    }

    /// Counts one completed operation against an explicitly held counter
    pub fn operation_completed_on(&self, counter: &QueryCounter) {
        if self.enabled {
            counter.increment();
        }
    }

    /// Scope end. Emits and returns a violation when the tracked count is
    /// above the ceiling.
    pub fn scope_finished(&self, counter: &QueryCounter) -> Option<ViolationRecord> {
        if !self.enabled {
            return None;
        }

        let (count, context) = counter.snapshot();
        let context = context?;

        if count <= self.ceiling {
            return None;
        }

        let record = ViolationRecord::new(context, count, self.ceiling);
        metrics::record_violation();
        emit_guarded(self.sink.as_ref(), &record.clone().into());
        Some(record)
    }

    /// Runs `fut` as one tracked unit of work with its own counter
    pub async fn track<F: Future>(&self, context: ScopeContext, fut: F) -> F::Output {
        if !self.enabled {
            return fut.await;
        }

        let counter = Arc::new(QueryCounter::new());
        self.scope_started(&counter, context);
        let output = counter::scope(Arc::clone(&counter), fut).await;
        self.scope_finished(&counter);
        output
    }

    /// Synchronous variant of [`track`](Self::track)
    pub fn track_sync<R>(&self, context: ScopeContext, f: impl FnOnce() -> R) -> R {
        if !self.enabled {
            return f();
        }

        let counter = Arc::new(QueryCounter::new());
        self.scope_started(&counter, context);
        let output = counter::sync_scope(Arc::clone(&counter), f);
        self.scope_finished(&counter);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::sink::MemorySink;
    use crate::monitor::types::DiagnosticRecord;

    fn controller(policy: AggregatePolicy) -> (AggregateController, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (AggregateController::new(&policy, sink.clone()), sink)
    }

    #[test]
    fn test_violation_above_ceiling() {
        let (controller, sink) = controller(AggregatePolicy::enabled(5));
        let counter = QueryCounter::new();

        assert!(controller.scope_started(&counter, ScopeContext::request("/api/x", "GET")));
        for _ in 0..10 {
            counter.increment();
        }

        let record = controller.scope_finished(&counter).unwrap();
        assert_eq!(record.count, 10);
        assert_eq!(record.ceiling, 5);
        assert_eq!(record.context, "request");
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0], DiagnosticRecord::Violation(record));
    }

    #[test]
    fn test_count_at_ceiling_is_not_violation() {
        let (controller, sink) = controller(AggregatePolicy::enabled(5));
        let counter = QueryCounter::new();
        controller.scope_started(&counter, ScopeContext::command("sync", vec![]));
        for _ in 0..5 {
            counter.increment();
        }
        assert!(controller.scope_finished(&counter).is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_disabled_takes_no_action() {
        let (controller, sink) = controller(AggregatePolicy {
            enabled: false,
            ceiling: 0,
            scope_pattern: None,
        });
        let counter = QueryCounter::new();
        counter.reset(Some(ScopeContext::command("old", vec![])));
        counter.increment();

        assert!(!controller.scope_started(&counter, ScopeContext::command("new", vec![])));
        assert_eq!(counter.context_info(), Some(ScopeContext::command("old", vec![])));
        assert!(controller.scope_finished(&counter).is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_scope_pattern_mismatch_skips_reset() {
        let (controller, _sink) =
            controller(AggregatePolicy::enabled(1).with_scope_pattern("^/api/"));
        let counter = QueryCounter::new();

        assert!(!controller.scope_started(&counter, ScopeContext::request("/health", "GET")));
        assert!(!counter.is_tracking());

        assert!(controller.scope_started(&counter, ScopeContext::request("/API/users", "GET")));
        assert!(counter.is_tracking());
    }

    #[test]
    fn test_untracked_scope_end_is_noop() {
        let (controller, sink) = controller(AggregatePolicy::enabled(1));
        let counter = QueryCounter::new();
        counter.increment();
        counter.increment();
        assert!(controller.scope_finished(&counter).is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_track_sync_counts_operations() {
        let (controller, sink) = controller(AggregatePolicy::enabled(2));
        let value = controller.track_sync(
            ScopeContext::command("report", vec!["--all".to_string()]),
            || {
                for _ in 0..3 {
                    controller.operation_completed();
                }
                7
            },
        );

        assert_eq!(value, 7);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_explicit_handle_lifecycle() {
        let (controller, sink) = controller(AggregatePolicy::enabled(5));
        let counter = QueryCounter::new();

        assert!(controller.scope_started(&counter, ScopeContext::request("/api/x", "GET")));
        for _ in 0..10 {
            controller.operation_completed_on(&counter);
        }
        assert_eq!(counter.count(), 10);

        let record = controller.scope_finished(&counter).unwrap();
        assert_eq!(record.count, 10);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_explicit_handle_ignored_when_disabled() {
        let (controller, _sink) = controller(AggregatePolicy::default());
        let counter = QueryCounter::new();
        counter.reset(Some(ScopeContext::command("sync", vec![])));

        controller.operation_completed_on(&counter);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_operation_outside_scope_is_not_counted() {
        let (controller, _sink) = controller(AggregatePolicy::enabled(2));
        controller.operation_completed();
        assert!(counter::current().is_none());
    }

    #[tokio::test]
    async fn test_track_async() {
        let (controller, sink) = controller(AggregatePolicy::enabled(3));
        controller
            .track(ScopeContext::request("/a", "POST"), async {
                for _ in 0..4 {
                    controller.operation_completed();
                    tokio::task::yield_now().await;
                }
            })
            .await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        match &records[0] {
            DiagnosticRecord::Violation(v) => {
                assert_eq!(v.count, 4);
                assert_eq!(v.scope, ScopeContext::request("/a", "POST"));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Query Monitor
//!
//! Entry points the host wires into its execution engine and its
//! request/command lifecycle:
//! - `statement_executed`: once per completed raw statement
//! - `statement_executed_in`: same, counted against an explicit scope handle
//! - `observe`: any pre-built operation record (builder methods)
//! - `track_request` / `track_command` / `track_cli`: unit-of-work boundaries

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::boundary::AggregateController;
use super::config::MonitorConfig;
use super::counter::QueryCounter;
use super::filter::OperationFilter;
use super::sink::{emit_guarded, DiagnosticSink, TracingSink};
use super::stack;
use super::types::{BindingValue, OperationKind, OperationRecord, ScopeContext, SlowOperationRecord};
use crate::metrics;

pub struct QueryMonitor {
    config: Arc<MonitorConfig>,
    /// False when the configuration could not be loaded
    available: bool,
    query_filter: OperationFilter,
    builder_filter: OperationFilter,
    aggregate: AggregateController,
    sink: Arc<dyn DiagnosticSink>,
}

impl QueryMonitor {
    pub fn new(config: MonitorConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let monitor = Self::build(config, sink, true);
        info!(
            query = monitor.config.query.enabled,
            builder_method = monitor.config.builder_method.enabled,
            aggregate = monitor.config.aggregate.enabled,
            "Query monitor initialized"
        );
        monitor
    }

    /// Monitor that reports through `tracing`
    pub fn with_tracing(config: MonitorConfig) -> Self {
        Self::new(config, Arc::new(TracingSink))
    }

    /// Loads the configuration file and applies `QUERYMONITOR_*` overrides.
    ///
    /// Never fails: when the configuration cannot be read, the error is
    /// logged and every observed operation passes through unmonitored.
    pub fn from_config_file(path: &Path, sink: Arc<dyn DiagnosticSink>) -> Self {
        match MonitorConfig::load(path).and_then(MonitorConfig::apply_env) {
            Ok(config) => Self::new(config, sink),
            Err(e) => {
                error!("QueryMonitor: {}; monitoring disabled", e);
                Self::unavailable(sink)
            }
        }
    }

    /// Monitor used when configuration could not be obtained
    pub fn unavailable(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::build(MonitorConfig::default(), sink, false)
    }

    fn build(config: MonitorConfig, sink: Arc<dyn DiagnosticSink>, available: bool) -> Self {
        let query_filter = OperationFilter::new(&config.query);
        let builder_filter = OperationFilter::new(&config.builder_method);
        let aggregate = AggregateController::new(&config.aggregate, Arc::clone(&sink));

        Self {
            config: Arc::new(config),
            available,
            query_filter,
            builder_filter,
            aggregate,
            sink,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn aggregate(&self) -> &AggregateController {
        &self.aggregate
    }

    // ==================== Operation events ====================

    /// Called by the execution engine after every raw statement.
    ///
    /// Counts the statement against the active scope and reports it when it
    /// passes the `query` policy.
    pub fn statement_executed(
        &self,
        sql: &str,
        bindings: &[BindingValue],
        elapsed: Duration,
    ) -> Option<SlowOperationRecord> {
        self.record_statement(None, sql, bindings, elapsed)
    }

    /// Like [`statement_executed`](Self::statement_executed), but counts the
    /// statement against `counter` instead of the task's active counter.
    ///
    /// For hosts that hold the scope handle themselves and drive
    /// `scope_started` / `scope_finished` from separate hooks.
    pub fn statement_executed_in(
        &self,
        counter: &QueryCounter,
        sql: &str,
        bindings: &[BindingValue],
        elapsed: Duration,
    ) -> Option<SlowOperationRecord> {
        self.record_statement(Some(counter), sql, bindings, elapsed)
    }

    fn record_statement(
        &self,
        counter: Option<&QueryCounter>,
        sql: &str,
        bindings: &[BindingValue],
        elapsed: Duration,
    ) -> Option<SlowOperationRecord> {
        let elapsed_ms = elapsed_millis(elapsed);
        if !self.available {
            metrics::record_skipped();
            return None;
        }

        metrics::record_observed(elapsed_ms);
        match counter {
            Some(counter) => self.aggregate.operation_completed_on(counter),
            None => self.aggregate.operation_completed(),
        }

        if !self.query_filter.is_enabled() {
            return None;
        }

        self.report(OperationRecord::raw(sql, bindings.to_vec(), elapsed_ms))
    }

    /// Filters a completed operation and reports it on pass.
    ///
    /// Does not touch the aggregate counter; builder methods are counted
    /// through the statements they execute.
    pub fn observe(&self, record: OperationRecord) -> Option<SlowOperationRecord> {
        if !self.available {
            metrics::record_skipped();
            return None;
        }

        metrics::record_observed(record.elapsed_ms);
        self.report(record)
    }

    /// Whether operations of this kind can produce a record at all
    pub fn monitors(&self, kind: OperationKind) -> bool {
        self.available && self.filter_for(kind).is_enabled()
    }

    fn filter_for(&self, kind: OperationKind) -> &OperationFilter {
        match kind {
            OperationKind::RawStatement => &self.query_filter,
            OperationKind::NamedMethod => &self.builder_filter,
        }
    }

    fn report(&self, record: OperationRecord) -> Option<SlowOperationRecord> {
        let mut slow = self.filter_for(record.kind).evaluate(&record)?;
        slow.stack = stack::capture(self.config.max_stack_depth);

        if emit_guarded(self.sink.as_ref(), &slow.clone().into()) {
            metrics::record_emitted();
        }
        Some(slow)
    }

    // ==================== Unit-of-work boundaries ====================

    /// Runs an inbound request as one tracked unit of work
    pub async fn track_request<F: Future>(
        &self,
        url: impl Into<String>,
        method: impl Into<String>,
        fut: F,
    ) -> F::Output {
        self.aggregate
            .track(ScopeContext::request(url, method), fut)
            .await
    }

    /// Runs a command as one tracked unit of work
    pub fn track_command<R>(
        &self,
        command: impl Into<String>,
        arguments: Vec<String>,
        f: impl FnOnce() -> R,
    ) -> R {
        self.aggregate
            .track_sync(ScopeContext::command(command, arguments), f)
    }

    /// Async variant of [`track_command`](Self::track_command)
    pub async fn track_command_async<F: Future>(
        &self,
        command: impl Into<String>,
        arguments: Vec<String>,
        fut: F,
    ) -> F::Output {
        self.aggregate
            .track(ScopeContext::command(command, arguments), fut)
            .await
    }

    /// Runs the current process invocation as one tracked unit of work.
    ///
    /// Never started implicitly; the host calls this around its own entry point.
    pub fn track_cli<R>(&self, f: impl FnOnce() -> R) -> R {
        self.aggregate.track_sync(ScopeContext::cli_from_env(), f)
    }
}

/// Converts a duration to fractional milliseconds
pub fn elapsed_millis(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

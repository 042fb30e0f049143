// SPDX-License-Identifier: Apache-2.0

//! Diagnostic Sinks
//!
//! Where emitted records end up. The monitor treats a sink as
//! fire-and-forget: no retries, and a panicking sink is contained.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::types::{DiagnosticRecord, ScopeContext};

/// Receives every record the monitor decides to emit
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, record: &DiagnosticRecord);
}

/// Writes records as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, record: &DiagnosticRecord) {
        match record {
            DiagnosticRecord::SlowOperation(r) => {
                info!(
                    target: "query_monitor",
                    label = %r.label,
                    query = r.query.as_deref(),
                    method = r.method.as_deref(),
                    execution_time = %r.execution_time,
                    stack = ?r.stack,
                    "QueryMonitor: {}",
                    r.message
                );
            }
            DiagnosticRecord::Violation(r) => match &r.scope {
                ScopeContext::Request { url, method } => {
                    warn!(
                        target: "query_monitor",
                        context = %r.context,
                        url = %url,
                        method = %method,
                        count = r.count,
                        ceiling = r.ceiling,
                        "{}",
                        r.message
                    );
                }
                ScopeContext::Command { command, arguments } => {
                    warn!(
                        target: "query_monitor",
                        context = %r.context,
                        command = %command,
                        arguments = ?arguments,
                        count = r.count,
                        ceiling = r.ceiling,
                        "{}",
                        r.message
                    );
                }
                ScopeContext::Cli { script, arguments } => {
                    warn!(
                        target: "query_monitor",
                        context = %r.context,
                        script = %script,
                        arguments = ?arguments,
                        count = r.count,
                        ceiling = r.ceiling,
                        "{}",
                        r.message
                    );
                }
            },
        }
    }
}

/// Keeps records in memory, for tests and in-process inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<DiagnosticRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, record: &DiagnosticRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Forwards a record, swallowing any panic raised by the sink
pub(crate) fn emit_guarded(sink: &dyn DiagnosticSink, record: &DiagnosticRecord) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(record))) {
        Ok(()) => true,
        Err(_) => {
            error!("Diagnostic sink panicked while emitting '{}'", record.message());
            false
        }
    }
}

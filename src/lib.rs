// query-monitor - slow-query and query-count instrumentation
// Core library

pub mod metrics;
pub mod monitor;
pub mod observability;

pub use monitor::{
    AggregateController, AggregatePolicy, BindingValue, DiagnosticRecord, DiagnosticSink,
    FilterPolicy, MemorySink, MonitorConfig, MonitorError, MonitorResult, MonitoredBuilder,
    OperationKind, OperationRecord, QueryBuilder, QueryCounter, QueryMonitor, ScopeContext,
    SlowOperationRecord, TracingSink, ViolationRecord,
};

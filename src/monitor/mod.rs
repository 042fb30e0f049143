//! Query Monitor
//!
//! Runtime instrumentation for data-access operations:
//! - **Slow operation detection**: per-operation filter on elapsed time and
//!   a regex over the statement or method name, with bindings rendered back
//!   into a readable statement
//! - **Query counting**: per unit of work (request, command, script run),
//!   reporting scopes that run more statements than a configured ceiling
//!
//! Monitoring never changes the outcome of the observed operation.

pub mod boundary;
pub mod builder;
pub mod config;
pub mod counter;
pub mod error;
pub mod filter;
pub mod listener;
pub mod sink;
pub mod stack;
pub mod types;

pub use boundary::AggregateController;
pub use builder::{AggregateFunction, MonitoredBuilder, Page, QueryBuilder};
pub use config::{AggregatePolicy, FilterPolicy, MonitorConfig};
pub use counter::QueryCounter;
pub use error::{MonitorError, MonitorResult};
pub use filter::{evaluate, render_statement, OperationFilter};
pub use listener::QueryMonitor;
pub use sink::{DiagnosticSink, MemorySink, TracingSink};
pub use types::*;

// SPDX-License-Identifier: Apache-2.0

//! Builder Method Decorator
//!
//! [`QueryBuilder`] is the set of outcome-producing operations a query
//! builder exposes. [`MonitoredBuilder`] implements the same trait over any
//! builder, timing each call and handing the outcome to the monitor. The
//! wrapped builder's result is always returned untouched, errors included.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::listener::{elapsed_millis, QueryMonitor};
use super::types::{BindingValue, OperationKind, OperationRecord};

/// Aggregate functions understood by [`QueryBuilder::aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Max,
    Min,
    Sum,
    Avg,
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

/// Outcome-producing operations of a query builder
#[async_trait]
pub trait QueryBuilder: Send + Sync {
    type Row: Send;
    type Value: Send;
    type Error: Send;

    /// Parameterized SQL the builder currently represents
    fn to_sql(&self) -> String;

    /// Bindings for the placeholders in [`to_sql`](Self::to_sql)
    fn bindings(&self) -> Vec<BindingValue>;

    async fn get(&self) -> Result<Vec<Self::Row>, Self::Error>;

    async fn first(&self) -> Result<Option<Self::Row>, Self::Error>;

    /// Like `first`, but an empty result is an error
    async fn first_or_fail(&self) -> Result<Self::Row, Self::Error>;

    async fn find(&self, id: BindingValue) -> Result<Option<Self::Row>, Self::Error>;

    async fn find_or_fail(&self, id: BindingValue) -> Result<Self::Row, Self::Error>;

    async fn pluck(&self, column: &str) -> Result<Vec<Self::Value>, Self::Error>;

    async fn value(&self, column: &str) -> Result<Option<Self::Value>, Self::Error>;

    async fn count(&self) -> Result<u64, Self::Error>;

    async fn exists(&self) -> Result<bool, Self::Error>;

    async fn doesnt_exist(&self) -> Result<bool, Self::Error> {
        Ok(!self.exists().await?)
    }

    async fn aggregate(
        &self,
        function: AggregateFunction,
        column: &str,
    ) -> Result<Option<Self::Value>, Self::Error>;

    async fn max(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.aggregate(AggregateFunction::Max, column).await
    }

    async fn min(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.aggregate(AggregateFunction::Min, column).await
    }

    async fn sum(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.aggregate(AggregateFunction::Sum, column).await
    }

    async fn avg(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.aggregate(AggregateFunction::Avg, column).await
    }

    async fn paginate(&self, per_page: u64, page: u64) -> Result<Page<Self::Row>, Self::Error>;
}

/// Times every [`QueryBuilder`] operation of the wrapped builder
pub struct MonitoredBuilder<B> {
    inner: B,
    monitor: Arc<QueryMonitor>,
}

impl<B: QueryBuilder> MonitoredBuilder<B> {
    pub fn new(inner: B, monitor: Arc<QueryMonitor>) -> Self {
        Self { inner, monitor }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    /// Times an arbitrary operation on the wrapped builder under `method`
    pub async fn run<'a, T, F, Fut>(&'a self, method: &str, f: F) -> T
    where
        F: FnOnce(&'a B) -> Fut,
        Fut: Future<Output = T>,
    {
        self.timed(method, f(&self.inner)).await
    }

    async fn timed<T, Fut>(&self, method: &str, fut: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let output = fut.await;
        let elapsed_ms = elapsed_millis(start.elapsed());

        if self.monitor.monitors(OperationKind::NamedMethod) {
            let record = OperationRecord::named(method, elapsed_ms)
                .with_statement(self.inner.to_sql(), self.inner.bindings());
            self.monitor.observe(record);
        }

        output
    }
}

#[async_trait]
impl<B: QueryBuilder> QueryBuilder for MonitoredBuilder<B> {
    type Row = B::Row;
    type Value = B::Value;
    type Error = B::Error;

    fn to_sql(&self) -> String {
        self.inner.to_sql()
    }

    fn bindings(&self) -> Vec<BindingValue> {
        self.inner.bindings()
    }

    async fn get(&self) -> Result<Vec<Self::Row>, Self::Error> {
        self.timed("get", self.inner.get()).await
    }

    async fn first(&self) -> Result<Option<Self::Row>, Self::Error> {
        self.timed("first", self.inner.first()).await
    }

    async fn first_or_fail(&self) -> Result<Self::Row, Self::Error> {
        self.timed("firstOrFail", self.inner.first_or_fail()).await
    }

    async fn find(&self, id: BindingValue) -> Result<Option<Self::Row>, Self::Error> {
        self.timed("find", self.inner.find(id)).await
    }

    async fn find_or_fail(&self, id: BindingValue) -> Result<Self::Row, Self::Error> {
        self.timed("findOrFail", self.inner.find_or_fail(id)).await
    }

    async fn pluck(&self, column: &str) -> Result<Vec<Self::Value>, Self::Error> {
        self.timed("pluck", self.inner.pluck(column)).await
    }

    async fn value(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.timed("value", self.inner.value(column)).await
    }

    async fn count(&self) -> Result<u64, Self::Error> {
        self.timed("count", self.inner.count()).await
    }

    async fn exists(&self) -> Result<bool, Self::Error> {
        self.timed("exists", self.inner.exists()).await
    }

    async fn doesnt_exist(&self) -> Result<bool, Self::Error> {
        self.timed("doesntExist", self.inner.doesnt_exist()).await
    }

    async fn aggregate(
        &self,
        function: AggregateFunction,
        column: &str,
    ) -> Result<Option<Self::Value>, Self::Error> {
        self.timed("aggregate", self.inner.aggregate(function, column))
            .await
    }

    async fn max(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.timed("max", self.inner.max(column)).await
    }

    async fn min(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.timed("min", self.inner.min(column)).await
    }

    async fn sum(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.timed("sum", self.inner.sum(column)).await
    }

    async fn avg(&self, column: &str) -> Result<Option<Self::Value>, Self::Error> {
        self.timed("avg", self.inner.avg(column)).await
    }

    async fn paginate(&self, per_page: u64, page: u64) -> Result<Page<Self::Row>, Self::Error> {
        self.timed("paginate", self.inner.paginate(per_page, page))
            .await
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Scoped Aggregate Counter
//!
//! Counts the operations run inside one unit of work (a request, a command,
//! a script run). Every unit of work owns its own [`QueryCounter`]; the
//! handle is either passed explicitly or installed as a task-local so that
//! concurrent units of work never share a count.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::ScopeContext;

tokio::task_local! {
    static ACTIVE_COUNTER: Arc<QueryCounter>;
}

#[derive(Debug, Default)]
struct CounterState {
    count: u64,
    /// `None` while nothing is being tracked
    context: Option<ScopeContext>,
}

/// Operation count plus the context of the scope being tracked
#[derive(Debug, Default)]
pub struct QueryCounter {
    state: Mutex<CounterState>,
}

impl QueryCounter {
    /// Creates an idle counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new scope. Count and context are replaced together;
    /// `None` marks the counter idle.
    pub fn reset(&self, context: Option<ScopeContext>) {
        let mut state = self.state.lock();
        state.count = 0;
        state.context = context;
    }

    /// Counts one operation. Does nothing while idle.
    pub fn increment(&self) {
        let mut state = self.state.lock();
        if state.context.is_some() {
            state.count += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    pub fn context_info(&self) -> Option<ScopeContext> {
        self.state.lock().context.clone()
    }

    pub fn is_tracking(&self) -> bool {
        self.state.lock().context.is_some()
    }

    /// Reads count and context under one lock
    pub fn snapshot(&self) -> (u64, Option<ScopeContext>) {
        let state = self.state.lock();
        (state.count, state.context.clone())
    }
}

/// Returns the counter installed for the current task, if any
pub fn current() -> Option<Arc<QueryCounter>> {
    ACTIVE_COUNTER.try_with(Arc::clone).ok()
}

/// Runs `fut` with `counter` installed as the task's active counter.
///
/// Tasks spawned from inside `fut` do not inherit the counter.
pub async fn scope<F: Future>(counter: Arc<QueryCounter>, fut: F) -> F::Output {
    ACTIVE_COUNTER.scope(counter, fut).await
}

/// Synchronous variant of [`scope`]
pub fn sync_scope<R>(counter: Arc<QueryCounter>, f: impl FnOnce() -> R) -> R {
    ACTIVE_COUNTER.sync_scope(counter, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_while_idle_is_noop() {
        let counter = QueryCounter::new();
        counter.increment();
        counter.increment();
        assert_eq!(counter.count(), 0);
        assert!(counter.context_info().is_none());
    }

    #[test]
    fn test_reset_and_increment() {
        let counter = QueryCounter::new();
        counter.reset(Some(ScopeContext::request("/api/x", "GET")));
        for _ in 0..3 {
            counter.increment();
        }
        assert_eq!(counter.count(), 3);
        assert_eq!(
            counter.context_info(),
            Some(ScopeContext::request("/api/x", "GET"))
        );
    }

    #[test]
    fn test_reset_empty_marks_idle() {
        let counter = QueryCounter::new();
        counter.reset(Some(ScopeContext::command("migrate", vec![])));
        counter.increment();

        counter.reset(None);
        assert_eq!(counter.count(), 0);
        assert!(counter.context_info().is_none());

        counter.increment();
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_reset_replaces_previous_scope() {
        let counter = QueryCounter::new();
        counter.reset(Some(ScopeContext::command("a", vec![])));
        counter.increment();
        counter.increment();

        counter.reset(Some(ScopeContext::command("b", vec![])));
        assert_eq!(counter.snapshot(), (0, Some(ScopeContext::command("b", vec![]))));
    }

    #[test]
    fn test_no_current_outside_scope() {
        assert!(current().is_none());
    }

    #[test]
    fn test_sync_scope_installs_counter() {
        let counter = Arc::new(QueryCounter::new());
        counter.reset(Some(ScopeContext::cli("job", vec![])));

        sync_scope(Arc::clone(&counter), || {
            let active = current().unwrap();
            active.increment();
        });

        assert_eq!(counter.count(), 1);
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let mut handles = Vec::new();
        for n in 1..=4u64 {
            handles.push(tokio::spawn(async move {
                let counter = Arc::new(QueryCounter::new());
                counter.reset(Some(ScopeContext::request(format!("/r/{}", n), "GET")));
                scope(Arc::clone(&counter), async move {
                    for _ in 0..n * 10 {
                        current().unwrap().increment();
                        tokio::task::yield_now().await;
                    }
                })
                .await;
                (n, counter.count())
            }));
        }

        for handle in handles {
            let (n, count) = handle.await.unwrap();
            assert_eq!(count, n * 10);
        }
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use cairn_common::ExecutionContext;

#[derive(Debug)]
struct StackEntry {
    context: Arc<ExecutionContext>,
    pushed_at: Instant,
    in_flight: Arc<AtomicUsize>,
}

impl StackEntry {
    fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }
}

/// Marks a stack entry as backing a running call until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded stack of recent contexts, oldest at the front.
///
/// Overflow evicts the oldest entry that is not in flight. If every entry is
/// in flight the oldest goes anyway: the bound always holds.
#[derive(Debug)]
pub struct ContextStack {
    entries: VecDeque<StackEntry>,
    max: usize,
}

/// Result of a push.
#[derive(Debug, Default)]
pub struct PushOutcome {
    pub evicted: Option<Arc<ExecutionContext>>,
    pub evicted_in_flight: bool,
}

impl ContextStack {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            entries: VecDeque::with_capacity(max.min(1024)),
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn push(&mut self, context: Arc<ExecutionContext>, now: Instant) -> PushOutcome {
        let mut outcome = PushOutcome::default();
        if self.entries.len() >= self.max {
            let idx = self
                .entries
                .iter()
                .position(|e| !e.is_in_flight())
                .unwrap_or(0);
            if let Some(entry) = self.entries.remove(idx) {
                outcome.evicted_in_flight = entry.is_in_flight();
                outcome.evicted = Some(entry.context);
            }
        }
        self.entries.push_back(StackEntry {
            context,
            pushed_at: now,
            in_flight: Arc::new(AtomicUsize::new(0)),
        });
        outcome
    }

    /// Most recently pushed context.
    pub fn peek(&self) -> Option<Arc<ExecutionContext>> {
        self.entries.back().map(|e| e.context.clone())
    }

    pub fn find(&self, request_id: &str) -> Option<Arc<ExecutionContext>> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.context.request_id == request_id)
            .map(|e| e.context.clone())
    }

    /// `None` when the context is no longer on the stack.
    pub fn begin(&self, request_id: &str) -> Option<InFlightGuard> {
        self.entries
            .iter()
            .find(|e| e.context.request_id == request_id)
            .map(|e| InFlightGuard::acquire(e.in_flight.clone()))
    }

    /// Drop entries older than `max_age`, sparing those in flight.
    pub fn remove_older_than(&mut self, now: Instant, max_age: Duration) -> Vec<Arc<ExecutionContext>> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            let expired = now.saturating_duration_since(e.pushed_at) > max_age;
            if expired && !e.is_in_flight() {
                removed.push(e.context.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<Arc<ExecutionContext>> {
        self.entries.iter().map(|e| e.context.clone()).collect()
    }
}

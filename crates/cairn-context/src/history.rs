use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use cairn_common::ExecutionResult;

#[derive(Debug)]
struct HistoryEntry {
    result: ExecutionResult,
    recorded_at: Instant,
}

/// Bounded list of recorded tool outcomes, oldest first.
#[derive(Debug)]
pub struct ExecutionHistory {
    entries: VecDeque<HistoryEntry>,
    max: usize,
}

impl ExecutionHistory {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max: max.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many old entries were dropped to make room.
    pub fn push(&mut self, result: ExecutionResult, now: Instant) -> usize {
        let mut dropped = 0;
        while self.entries.len() >= self.max {
            self.entries.pop_front();
            dropped += 1;
        }
        self.entries.push_back(HistoryEntry {
            result,
            recorded_at: now,
        });
        dropped
    }

    pub fn remove_older_than(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| now.saturating_duration_since(e.recorded_at) <= max_age);
        before - self.entries.len()
    }

    /// The newest `limit` results, oldest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ExecutionResult> {
        let limit = limit.unwrap_or(self.entries.len());
        let skip = self.entries.len().saturating_sub(limit);
        self.entries
            .iter()
            .skip(skip)
            .map(|e| e.result.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Weak};

    use cairn_common::ExecutionContext;

    fn result(id: &str) -> ExecutionResult {
        let ctx = Arc::new(ExecutionContext {
            request_id: id.to_string(),
            tool_name: "t".to_string(),
            workspace_id: None,
            workspace: None,
            auth: None,
            parent_request_id: None,
            parent: Weak::new(),
            metadata: Default::default(),
            created_at: chrono::Utc::now(),
        });
        ExecutionResult::ok(ctx, serde_json::json!({}), 1)
    }

    #[test]
    fn bounded_push_drops_oldest() {
        let now = Instant::now();
        let mut h = ExecutionHistory::new(2);
        h.push(result("a"), now);
        h.push(result("b"), now);
        assert_eq!(h.push(result("c"), now), 1);

        let ids: Vec<_> = h.recent(None).iter().map(|r| r.context.request_id.clone()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(h.recent(Some(1))[0].context.request_id, "c");
    }

    #[test]
    fn age_based_removal() {
        let t0 = Instant::now();
        let mut h = ExecutionHistory::new(10);
        h.push(result("old"), t0);
        h.push(result("new"), t0 + Duration::from_secs(30));

        assert_eq!(h.remove_older_than(t0 + Duration::from_secs(45), Duration::from_secs(20)), 1);
        assert_eq!(h.len(), 1);
    }
}

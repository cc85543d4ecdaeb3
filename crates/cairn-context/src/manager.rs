use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use cairn_common::{
    ContextEvent, ContextEventKind, ExecutionContext, ExecutionResult, WorkspaceConfig,
};
use cairn_registry::WorkspaceRegistry;

use crate::config::ContextConfig;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::history::ExecutionHistory;
use crate::ids::RequestIdGenerator;
use crate::schema::{ToolSchema, ToolSchemaRegistry};
use crate::stack::{ContextStack, InFlightGuard};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub created: AtomicU64,
    pub degraded: AtomicU64,
    pub switched: AtomicU64,
    pub switch_failures: AtomicU64,
    pub evicted: AtomicU64,
    pub evicted_in_flight: AtomicU64,
    pub expired: AtomicU64,
    pub validations: AtomicU64,
    pub validation_failures: AtomicU64,
    pub executions: AtomicU64,
    pub execution_failures: AtomicU64,
    pub sweeps: AtomicU64,
    pub sweep_failures: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub stack_depth: usize,
    pub stack_capacity: usize,
    pub history_len: usize,
    pub registered_schemas: usize,
    pub last_active_request_id: Option<String>,
    pub created_total: u64,
    pub degraded_total: u64,
    pub switched_total: u64,
    pub switch_failures_total: u64,
    pub evicted_total: u64,
    pub evicted_in_flight_total: u64,
    pub expired_total: u64,
    pub validations_total: u64,
    pub validation_failures_total: u64,
    pub executions_total: u64,
    pub execution_failures_total: u64,
    pub sweeps_total: u64,
    pub sweep_failures_total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub contexts_removed: usize,
    pub history_removed: usize,
}

pub(crate) enum Lookup {
    Found(WorkspaceConfig),
    Missing,
    Failed(String),
}

/// Owns the context stack, execution history and tool schemas for one process.
///
/// Every operation that needs "the current context" takes it as an argument.
/// `last_active` is kept for introspection only and is raced by concurrent
/// creations.
pub struct ContextManager {
    pub(crate) config: ContextConfig,
    pub(crate) registry: Arc<dyn WorkspaceRegistry>,
    pub(crate) schemas: ToolSchemaRegistry,
    pub(crate) stack: Mutex<ContextStack>,
    pub(crate) history: Mutex<ExecutionHistory>,
    pub(crate) last_active: RwLock<Option<Arc<ExecutionContext>>>,
    pub(crate) ids: RequestIdGenerator,
    pub(crate) publisher: Arc<dyn EventPublisher>,
    pub(crate) counters: Counters,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("config", &self.config)
            .field("schemas", &self.schemas.len())
            .finish()
    }
}

impl ContextManager {
    pub fn new(
        config: ContextConfig,
        registry: Arc<dyn WorkspaceRegistry>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        tracing::info!(
            max_context_stack = config.max_context_stack,
            context_timeout_ms = config.context_timeout.as_millis() as u64,
            switching = config.enable_context_switching,
            policy = ?config.unresolved_workspace_policy,
            "context manager initialized"
        );
        Ok(Arc::new(Self {
            stack: Mutex::new(ContextStack::new(config.max_context_stack)),
            history: Mutex::new(ExecutionHistory::new(config.max_execution_history)),
            config,
            registry,
            schemas: ToolSchemaRegistry::new(),
            last_active: RwLock::new(None),
            ids: RequestIdGenerator::new(),
            publisher,
            counters: Counters::default(),
        }))
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn WorkspaceRegistry> {
        &self.registry
    }

    pub(crate) fn emit(&self, event: ContextEvent) {
        self.publisher.publish(event);
    }

    /// Registry lookup bounded by `registry_timeout`. A record that is not
    /// named by `key` counts as a miss.
    pub(crate) async fn lookup(&self, key: &str) -> Lookup {
        let timeout = self.config.registry_timeout;
        match tokio::time::timeout(timeout, self.registry.get_workspace(key)).await {
            Ok(Ok(Some(ws))) if ws.matches(key) => Lookup::Found(ws),
            Ok(Ok(Some(ws))) => {
                tracing::warn!(
                    workspace_key = key,
                    returned_id=%ws.id,
                    returned_slug=%ws.slug,
                    "registry answered with a workspace the key does not name, ignoring it"
                );
                Lookup::Missing
            }
            Ok(Ok(None)) => Lookup::Missing,
            Ok(Err(e)) => Lookup::Failed(format!("{e:#}")),
            Err(_) => Lookup::Failed(format!("lookup timed out after {}ms", timeout.as_millis())),
        }
    }

    /// Push onto the stack and move the advisory pointer.
    pub(crate) async fn insert(&self, context: ExecutionContext) -> Arc<ExecutionContext> {
        let context = Arc::new(context);
        let outcome = {
            let mut stack = self.stack.lock().await;
            stack.push(context.clone(), Instant::now())
        };
        if let Some(evicted) = outcome.evicted {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            if outcome.evicted_in_flight {
                self.counters.evicted_in_flight.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    request_id=%evicted.request_id,
                    tool=%evicted.tool_name,
                    "context stack full, evicted a context that is still in flight"
                );
            } else {
                tracing::debug!(request_id=%evicted.request_id, "context evicted from stack");
            }
        }
        *self.last_active.write().await = Some(context.clone());
        context
    }

    // ── Schemas ──────────────────────────────────────────────────────

    /// Last write wins; returns the schema that was replaced.
    pub fn register_tool_schema(&self, schema: ToolSchema) -> Option<Arc<ToolSchema>> {
        tracing::debug!(tool=%schema.name, "registering tool schema");
        self.schemas.register(schema)
    }

    pub fn get_tool_schema(&self, name: &str) -> Option<Arc<ToolSchema>> {
        self.schemas.get(name)
    }

    pub fn supports_workspace_context(&self, name: &str) -> bool {
        self.schemas.supports_workspace_context(name)
    }

    pub fn tool_schemas(&self) -> Vec<Arc<ToolSchema>> {
        self.schemas.list()
    }

    // ── Execution tracking ───────────────────────────────────────────

    /// Marks `ctx` as backing a running call so overflow eviction and the
    /// sweep leave it alone. `None` if it already left the stack.
    pub async fn begin_execution(&self, ctx: &ExecutionContext) -> Option<InFlightGuard> {
        self.stack.lock().await.begin(&ctx.request_id)
    }

    pub async fn record_execution(&self, result: ExecutionResult) {
        self.counters.executions.fetch_add(1, Ordering::Relaxed);
        let ctx = result.context.clone();
        let event = if result.success {
            ContextEvent::new(ContextEventKind::Executed, &ctx.request_id).data(serde_json::json!({
                "execution_time_ms": result.execution_time_ms,
                "workspace_changed": result.workspace_changed,
            }))
        } else {
            self.counters.execution_failures.fetch_add(1, Ordering::Relaxed);
            ContextEvent::new(ContextEventKind::Error, &ctx.request_id).data(serde_json::json!({
                "error": result.error,
                "execution_time_ms": result.execution_time_ms,
            }))
        };
        let event = event.workspace(ctx.workspace_id.as_deref()).tool(&ctx.tool_name);

        if self.config.track_tool_execution {
            let dropped = self.history.lock().await.push(result, Instant::now());
            if dropped > 0 {
                tracing::debug!(dropped, "execution history full, dropped oldest records");
            }
        }
        self.emit(event);
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Last context created or switched to by any caller. Advisory only.
    pub async fn last_active(&self) -> Option<Arc<ExecutionContext>> {
        self.last_active.read().await.clone()
    }

    pub async fn find_context(&self, request_id: &str) -> Option<Arc<ExecutionContext>> {
        self.stack.lock().await.find(request_id)
    }

    /// Oldest first.
    pub async fn stack_snapshot(&self) -> Vec<Arc<ExecutionContext>> {
        self.stack.lock().await.snapshot()
    }

    pub async fn execution_history(&self, limit: Option<usize>) -> Vec<ExecutionResult> {
        self.history.lock().await.recent(limit)
    }

    pub async fn stats(&self) -> ContextStats {
        let (stack_depth, stack_capacity) = {
            let stack = self.stack.lock().await;
            (stack.len(), stack.capacity())
        };
        let history_len = self.history.lock().await.len();
        let last_active_request_id = self
            .last_active
            .read()
            .await
            .as_ref()
            .map(|c| c.request_id.clone());
        let c = &self.counters;
        ContextStats {
            stack_depth,
            stack_capacity,
            history_len,
            registered_schemas: self.schemas.len(),
            last_active_request_id,
            created_total: c.created.load(Ordering::Relaxed),
            degraded_total: c.degraded.load(Ordering::Relaxed),
            switched_total: c.switched.load(Ordering::Relaxed),
            switch_failures_total: c.switch_failures.load(Ordering::Relaxed),
            evicted_total: c.evicted.load(Ordering::Relaxed),
            evicted_in_flight_total: c.evicted_in_flight.load(Ordering::Relaxed),
            expired_total: c.expired.load(Ordering::Relaxed),
            validations_total: c.validations.load(Ordering::Relaxed),
            validation_failures_total: c.validation_failures.load(Ordering::Relaxed),
            executions_total: c.executions.load(Ordering::Relaxed),
            execution_failures_total: c.execution_failures.load(Ordering::Relaxed),
            sweeps_total: c.sweeps.load(Ordering::Relaxed),
            sweep_failures_total: c.sweep_failures.load(Ordering::Relaxed),
        }
    }

    // ── Expiration ───────────────────────────────────────────────────

    /// Remove stack and history entries older than `context_timeout`.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = Instant::now();
        let max_age = self.config.context_timeout;

        let removed = self.stack.lock().await.remove_older_than(now, max_age);
        let history_removed = self.history.lock().await.remove_older_than(now, max_age);

        if !removed.is_empty() {
            let mut last = self.last_active.write().await;
            let stale = last
                .as_ref()
                .map(|l| removed.iter().any(|r| Arc::ptr_eq(r, l)))
                .unwrap_or(false);
            if stale {
                *last = None;
            }
        }

        self.counters
            .expired
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        SweepReport {
            contexts_removed: removed.len(),
            history_removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cairn_common::ToolError;
    use cairn_registry::MemoryWorkspaceRegistry;

    use crate::events::BroadcastPublisher;

    fn manager(config: ContextConfig) -> (Arc<ContextManager>, BroadcastPublisher) {
        let publisher = BroadcastPublisher::new(64);
        let m = ContextManager::new(
            config,
            Arc::new(MemoryWorkspaceRegistry::new()),
            Arc::new(publisher.clone()),
        )
        .unwrap();
        (m, publisher)
    }

    #[tokio::test]
    async fn record_execution_keeps_history_and_emits_outcome() {
        let (m, publisher) = manager(ContextConfig::default());
        let ctx = m.create_context("get_file", None, None, Default::default()).await.unwrap();
        let mut rx = publisher.receiver();

        m.record_execution(ExecutionResult::ok(ctx.clone(), serde_json::json!({"ok": 1}), 12)).await;
        m.record_execution(ExecutionResult::failed(
            ctx.clone(),
            ToolError { code: "TIMEOUT".into(), message: "upstream slow".into() },
            3000,
        ))
        .await;

        assert_eq!(rx.recv().await.unwrap().kind, ContextEventKind::Executed);
        let failed = rx.recv().await.unwrap();
        assert_eq!(failed.kind, ContextEventKind::Error);
        assert_eq!(failed.data["error"]["code"], "TIMEOUT");

        let history = m.execution_history(None).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].success);
        assert_eq!(m.execution_history(Some(1)).await[0].execution_time_ms, 3000);

        let stats = m.stats().await;
        assert_eq!(stats.executions_total, 2);
        assert_eq!(stats.execution_failures_total, 1);
        assert_eq!(stats.history_len, 2);
    }

    #[tokio::test]
    async fn tracking_off_counts_but_keeps_nothing() {
        let (m, _) = manager(ContextConfig {
            track_tool_execution: false,
            ..Default::default()
        });
        let ctx = m.create_context("get_file", None, None, Default::default()).await.unwrap();
        m.record_execution(ExecutionResult::ok(ctx, serde_json::Value::Null, 1)).await;

        assert!(m.execution_history(None).await.is_empty());
        assert_eq!(m.stats().await.executions_total, 1);
    }

    #[tokio::test]
    async fn find_context_and_stats_follow_the_stack() {
        let (m, _) = manager(ContextConfig {
            max_context_stack: 2,
            ..Default::default()
        });
        let a = m.create_context("a", None, None, Default::default()).await.unwrap();
        let b = m.create_context("b", None, None, Default::default()).await.unwrap();
        let c = m.create_context("c", None, None, Default::default()).await.unwrap();

        assert!(m.find_context(&a.request_id).await.is_none());
        assert_eq!(m.find_context(&b.request_id).await.unwrap().tool_name, "b");
        assert_eq!(m.last_active().await.unwrap().request_id, c.request_id);

        let stats = m.stats().await;
        assert_eq!(stats.stack_depth, 2);
        assert_eq!(stats.stack_capacity, 2);
        assert_eq!(stats.created_total, 3);
        assert_eq!(stats.evicted_total, 1);
        assert_eq!(stats.last_active_request_id.as_deref(), Some(c.request_id.as_str()));
    }

    struct MisroutingRegistry;

    #[async_trait::async_trait]
    impl WorkspaceRegistry for MisroutingRegistry {
        async fn get_workspace(&self, _key: &str) -> anyhow::Result<Option<WorkspaceConfig>> {
            Ok(Some(WorkspaceConfig {
                id: "admin".to_string(),
                slug: "admin".to_string(),
                base_url: "https://admin.example.com".to_string(),
                status: cairn_common::WorkspaceStatus::Active,
                auth: Default::default(),
            }))
        }
        async fn list_workspaces(&self) -> anyhow::Result<Vec<WorkspaceConfig>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn records_not_named_by_the_key_are_misses() {
        let m = ContextManager::new(
            ContextConfig {
                unresolved_workspace_policy: crate::config::WorkspacePolicy::Strict,
                ..Default::default()
            },
            Arc::new(MisroutingRegistry),
            Arc::new(crate::events::NoopPublisher),
        )
        .unwrap();

        assert!(matches!(
            m.create_context("t", Some("../../admin"), None, Default::default()).await,
            Err(crate::error::ContextError::WorkspaceNotFound(key)) if key == "../../admin"
        ));
        assert!(matches!(
            m.switch_context(None, "ws1?x=1", true, "test").await,
            Err(crate::error::ContextError::WorkspaceNotFound(_))
        ));
        assert!(matches!(m.lookup("admin").await, Lookup::Found(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_clears_stale_last_active() {
        let (m, _) = manager(ContextConfig {
            context_timeout: Duration::from_secs(10),
            ..Default::default()
        });
        let ctx = m.create_context("a", None, None, Default::default()).await.unwrap();
        m.record_execution(ExecutionResult::ok(ctx, serde_json::Value::Null, 1)).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        let report = m.sweep_expired().await;

        assert_eq!(report, SweepReport { contexts_removed: 1, history_removed: 1 });
        assert!(m.last_active().await.is_none());
        assert_eq!(m.stats().await.expired_total, 1);
    }
}

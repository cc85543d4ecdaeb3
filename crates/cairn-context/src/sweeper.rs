use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::manager::ContextManager;

/// Background expiration task. Dropping the handle does not stop it; call
/// [`SweeperHandle::shutdown`] or cancel the token.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the current cycle to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error=%e, "context sweeper task ended abnormally");
        }
    }
}

/// Sweep `manager` every `sweep_interval` until `token` is cancelled.
pub fn spawn_sweeper(manager: Arc<ContextManager>, token: CancellationToken) -> SweeperHandle {
    let period = manager.config().sweep_interval;
    tracing::info!(interval_ms = period.as_millis() as u64, "context sweeper started");

    let on_panic = {
        let manager = manager.clone();
        move || {
            manager.counters.sweep_failures.fetch_add(1, Ordering::Relaxed);
        }
    };
    let cycle = move || {
        let manager = manager.clone();
        async move {
            manager.counters.sweeps.fetch_add(1, Ordering::Relaxed);
            let report = manager.sweep_expired().await;
            if report.contexts_removed > 0 || report.history_removed > 0 {
                tracing::debug!(
                    contexts = report.contexts_removed,
                    history = report.history_removed,
                    "swept expired entries"
                );
            }
        }
    };

    let handle = tokio::spawn(run_periodic(period, token.clone(), cycle, on_panic));
    SweeperHandle { token, handle }
}

/// Run `cycle` once per `period`, first after one full period. A panicking
/// cycle is logged and the loop keeps going.
pub(crate) async fn run_periodic<F, Fut, P>(
    period: Duration,
    token: CancellationToken,
    mut cycle: F,
    mut on_panic: P,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    P: FnMut(),
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Err(panic) = AssertUnwindSafe(cycle()).catch_unwind().await {
            on_panic();
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic=%msg, "sweep cycle panicked");
        }
    }
    tracing::info!("context sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use cairn_common::{ExecutionResult, Metadata};
    use cairn_registry::MemoryWorkspaceRegistry;
    use serde_json::json;

    use crate::config::ContextConfig;
    use crate::events::NoopPublisher;

    fn manager(timeout: Duration, interval: Duration) -> Arc<ContextManager> {
        let config = ContextConfig {
            context_timeout: timeout,
            sweep_interval: interval,
            ..ContextConfig::default()
        };
        ContextManager::new(config, Arc::new(MemoryWorkspaceRegistry::new()), Arc::new(NoopPublisher)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_leave_stack_and_history() {
        let m = manager(Duration::from_secs(10), Duration::from_secs(1));
        let sweeper = spawn_sweeper(m.clone(), CancellationToken::new());

        let old = m.create_context("old", None, None, Metadata::new()).await.unwrap();
        m.record_execution(ExecutionResult::ok(old.clone(), json!({}), 3)).await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        let young = m.create_context("young", None, None, Metadata::new()).await.unwrap();
        m.record_execution(ExecutionResult::ok(young.clone(), json!({}), 3)).await;
        tokio::time::sleep(Duration::from_millis(6500)).await;

        let stack = m.stack_snapshot().await;
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].request_id, young.request_id);
        let history = m.execution_history(None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].context.request_id, young.request_id);

        let stats = m.stats().await;
        assert_eq!(stats.expired_total, 1);
        assert!(stats.sweeps_total >= 12);
        assert_eq!(stats.last_active_request_id.as_deref(), Some(young.request_id.as_str()));
        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_context_survives_the_sweep() {
        let m = manager(Duration::from_secs(5), Duration::from_secs(1));
        let sweeper = spawn_sweeper(m.clone(), CancellationToken::new());

        let busy = m.create_context("long_running", None, None, Metadata::new()).await.unwrap();
        let guard = m.begin_execution(&busy).await.unwrap();
        tokio::time::sleep(Duration::from_millis(8500)).await;
        assert!(m.find_context(&busy.request_id).await.is_some());

        drop(guard);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(m.find_context(&busy.request_id).await.is_none());
        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_cycle_does_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let panics = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let task = tokio::spawn(run_periodic(
            Duration::from_secs(1),
            token.clone(),
            {
                let calls = calls.clone();
                move || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            panic!("first sweep blew up");
                        }
                    }
                }
            },
            {
                let panics = panics.clone();
                move || {
                    panics.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        token.cancel();
        task.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(panics.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_further_sweeps() {
        let m = manager(Duration::from_secs(10), Duration::from_secs(1));
        let sweeper = spawn_sweeper(m.clone(), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(2500)).await;

        sweeper.shutdown().await;
        let sweeps = m.stats().await.sweeps_total;
        assert_eq!(sweeps, 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(m.stats().await.sweeps_total, sweeps);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_the_sweeper() {
        let m = manager(Duration::from_secs(10), Duration::from_secs(1));
        let parent = CancellationToken::new();
        let sweeper = spawn_sweeper(m, parent.child_token());

        parent.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sweeper.is_finished());
    }
}

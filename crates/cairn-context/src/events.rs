use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::Stream;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use cairn_common::ContextEvent;

pub type EventStream = Pin<Box<dyn Stream<Item = ContextEvent> + Send>>;

/// Delivery of lifecycle events. Implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ContextEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: ContextEvent) {}
}

/// One structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: ContextEvent) {
        tracing::info!(
            target: "cairn::events",
            kind = event.kind.as_str(),
            request_id=%event.request_id,
            workspace_id = event.workspace_id.as_deref().unwrap_or("-"),
            tool = event.tool_name.as_deref().unwrap_or("-"),
            data=%event.data,
            "context event"
        );
    }
}

/// In-process fan-out over a tokio broadcast channel. Slow subscribers lose
/// events instead of stalling the publisher.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<ContextEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> EventStream {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|msg| match msg {
            Ok(ev) => Some(ev),
            Err(e) => {
                tracing::debug!(error=%e, "event subscriber lagged");
                None
            }
        });
        Box::pin(stream)
    }

    pub fn receiver(&self) -> broadcast::Receiver<ContextEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: ContextEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

#[derive(Default, Clone)]
pub struct FanoutPublisher {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventPublisher>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for FanoutPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutPublisher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventPublisher for FanoutPublisher {
    fn publish(&self, event: ContextEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_common::ContextEventKind;

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let a = BroadcastPublisher::new(8);
        let b = BroadcastPublisher::new(8);
        let mut ra = a.receiver();
        let mut rb = b.receiver();
        let fanout = FanoutPublisher::new()
            .with(Arc::new(a))
            .with(Arc::new(TracingPublisher))
            .with(Arc::new(b));

        fanout.publish(ContextEvent::new(ContextEventKind::Created, "ctx_1").tool("list_repositories"));

        assert_eq!(ra.recv().await.unwrap().request_id, "ctx_1");
        assert_eq!(rb.recv().await.unwrap().tool_name.as_deref(), Some("list_repositories"));
    }

    #[tokio::test]
    async fn subscribe_stream_yields_published_events() {
        let publisher = BroadcastPublisher::default();
        let mut stream = publisher.subscribe();
        publisher.publish(ContextEvent::new(ContextEventKind::Error, "ctx_9"));

        let ev = stream.next().await.unwrap();
        assert_eq!(ev.kind, ContextEventKind::Error);
    }
}

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cairn_context::{BroadcastPublisher, ContextManager};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ContextManager>,
    pub events: BroadcastPublisher,
    pub metrics: Arc<Metrics>,
    pub api_token: Option<Arc<str>>,
    /// Ends long-lived responses such as the event stream.
    pub shutdown: CancellationToken,
}

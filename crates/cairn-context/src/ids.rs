use std::sync::atomic::{AtomicU64, Ordering};

/// Shape every generated request id has; checked again at creation time.
pub const REQUEST_ID_PATTERN: &str = "^ctx_[0-9a-f]{12}_[0-9a-f]{8}$";

/// Process-unique ids: a monotonic counter keeps them distinct under bursts,
/// the random suffix keeps them distinct across restarts.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!("ctx_{:012x}_{}", seq & 0xffff_ffff_ffff, &random[..8])
    }

    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

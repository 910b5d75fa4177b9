use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc
};

/// Cooperative cancellation shared between the signal handler and a running pipeline.
/// The replay engine checks it before starting each match.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>
}

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

//! Unhandled-rejection reporting.
//!
//! The sink is an explicit observer list rather than process-wide state, so
//! its lifecycle is visible: the runtime owns one, test harnesses subscribe
//! and unsubscribe around cases. Reporting is best-effort and advisory —
//! emitting to a sink with no observers is a no-op.

use crate::deferred::Deferred;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Observer called with the rejection reason and the rejected value.
type RejectionObserver = Box<dyn Fn(&Value, &Arc<Deferred>) + Send + Sync>;

/// Handle for removing a subscribed observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe point for rejections observed still-unhandled one
/// scheduler turn after construction.
#[derive(Clone, Default)]
pub struct RejectionSink {
    inner: Arc<SinkInner>,
}

#[derive(Default)]
struct SinkInner {
    observers: Mutex<Vec<(u64, RejectionObserver)>>,
    next_id: AtomicU64,
}

impl RejectionSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers run in subscription order.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Value, &Arc<Deferred>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .lock()
            .push((id, Box::new(observer)));
        SubscriptionId(id)
    }

    /// Remove an observer. Returns false if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|(obs_id, _)| *obs_id != id.0);
        observers.len() != before
    }

    /// Notify all observers of a rejection nobody handled.
    pub fn emit(&self, reason: &Value, source: &Arc<Deferred>) {
        let observers = self.inner.observers.lock();
        for (_, observer) in observers.iter() {
            observer(reason, source);
        }
    }

    /// Number of subscribed observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }
}

//! Runtime facade: deferred-value construction, chaining, and combinators
//! wired to an event loop.
//!
//! [`Runtime`] owns the event loop and the rejection sink; [`DeferredHandle`]
//! pairs a deferred value with that runtime so chain calls know where to
//! enqueue the reactions they release.

use crate::event_loop::EventLoop;
use eddy_core::{
    Deferred, DeferredError, DeferredResult, DeferredState, EffectHandler, Handler, MapHandler,
    ReactionJob, ReactionKind, RejectionSink, SettleFn, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Shared {
    event_loop: Arc<EventLoop>,
    rejections: RejectionSink,
}

impl Shared {
    /// Enqueue closure bound to this runtime's reaction queue. Settle
    /// capabilities and chain registrations all go through here.
    fn enqueue_fn(&self) -> impl Fn(ReactionJob, Value) + Send + Sync + 'static {
        let queue = self.event_loop.reaction_queue().clone();
        move |job, payload| queue.enqueue(job, payload)
    }
}

/// One turn after construction, report the value if it sits rejected.
///
/// Best-effort and stateless: handlers attached before the check runs do not
/// suppress it, and each derived value in a chain is checked independently.
fn watch_unhandled(shared: &Arc<Shared>, deferred: &Arc<Deferred>) {
    let deferred = deferred.clone();
    let shared = shared.clone();
    shared.event_loop.clone().set_timeout(
        move || {
            if let DeferredState::Rejected(reason) = deferred.state() {
                tracing::debug!(%reason, "unhandled rejection");
                shared.rejections.emit(&reason, &deferred);
            }
        },
        Duration::ZERO,
    );
}

/// Entry point tying deferred values to a scheduler and a rejection sink.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Create a runtime with a fresh event loop and rejection sink.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                event_loop: EventLoop::new(),
                rejections: RejectionSink::new(),
            }),
        }
    }

    /// The event loop driving this runtime.
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.shared.event_loop
    }

    /// The sink notified of rejections left unhandled for a turn.
    pub fn rejections(&self) -> &RejectionSink {
        &self.shared.rejections
    }

    fn wrap(&self, inner: Arc<Deferred>) -> DeferredHandle {
        DeferredHandle {
            inner,
            shared: self.shared.clone(),
        }
    }

    fn wrap_watched(&self, inner: Arc<Deferred>) -> DeferredHandle {
        watch_unhandled(&self.shared, &inner);
        self.wrap(inner)
    }

    /// Create a deferred value from an executor.
    ///
    /// The executor runs synchronously, before this returns, with the two
    /// settle capabilities. An executor error is a construction failure
    /// surfaced to the caller, not a rejection of the new value.
    pub fn deferred<F>(&self, executor: F) -> DeferredResult<DeferredHandle>
    where
        F: FnOnce(SettleFn, SettleFn) -> Result<(), Value>,
    {
        let resolvers = Deferred::with_resolvers(self.shared.enqueue_fn());
        executor(resolvers.fulfill, resolvers.reject).map_err(DeferredError::Executor)?;
        Ok(self.wrap_watched(resolvers.deferred))
    }

    /// Create a pending deferred value along with its settle capabilities.
    pub fn with_resolvers(&self) -> (DeferredHandle, SettleFn, SettleFn) {
        let resolvers = Deferred::with_resolvers(self.shared.enqueue_fn());
        let handle = self.wrap_watched(resolvers.deferred);
        (handle, resolvers.fulfill, resolvers.reject)
    }

    /// A deferred value fulfilled with `value`.
    ///
    /// If `value` is itself a deferred value, it is returned as-is rather
    /// than wrapped a second time.
    pub fn resolve(&self, value: Value) -> DeferredHandle {
        if let Value::Deferred(existing) = value {
            return self.wrap(existing);
        }
        self.wrap_watched(Deferred::fulfilled(value))
    }

    /// A deferred value rejected with `reason`.
    pub fn reject(&self, reason: Value) -> DeferredHandle {
        self.wrap_watched(Deferred::rejected(reason))
    }

    /// Wait for every item, then settle with all results in input order.
    ///
    /// Plain values count as already fulfilled. The result fulfills with the
    /// list of fulfillment values once every item has settled; if any item
    /// rejected, the result rejects with the reason of the first rejection
    /// in input order, regardless of settlement timing.
    pub fn all(&self, items: Vec<Value>) -> DeferredHandle {
        let entries: Arc<Vec<Arc<Deferred>>> = Arc::new(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Deferred(d) => d,
                    plain => Deferred::fulfilled(plain),
                })
                .collect(),
        );

        let result = Deferred::new();

        if entries.is_empty() {
            result.resolve_with_jobs(Value::list(Vec::new()), &self.shared.enqueue_fn());
            return self.wrap_watched(result);
        }

        let remaining = Arc::new(AtomicUsize::new(entries.len()));

        let finish = {
            let entries = Arc::clone(&entries);
            let result = result.clone();
            let shared = self.shared.clone();
            move || {
                let shared_inner = shared.clone();
                shared.event_loop.queue_microtask(move || {
                    let enqueue = shared_inner.enqueue_fn();
                    let mut values = Vec::with_capacity(entries.len());
                    for entry in entries.iter() {
                        match entry.state() {
                            DeferredState::Fulfilled(v) => values.push(v),
                            DeferredState::Rejected(reason) => {
                                result.reject_with_jobs(reason, &enqueue);
                                return;
                            }
                            // All entries have settled by the time this runs.
                            DeferredState::Pending | DeferredState::Adopting(_) => return,
                        }
                    }
                    result.resolve_with_jobs(Value::list(values), &enqueue);
                });
            }
        };

        for entry in entries.iter() {
            let remaining = Arc::clone(&remaining);
            let finish = finish.clone();
            entry.on_settled(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    finish();
                }
            });
        }

        self.wrap_watched(result)
    }

    /// Drive the event loop until no queued or scheduled work remains.
    pub async fn run_until_complete(&self) {
        self.shared.event_loop.run_until_complete_async().await;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// A deferred value bound to its runtime.
#[derive(Clone)]
pub struct DeferredHandle {
    inner: Arc<Deferred>,
    shared: Arc<Shared>,
}

impl DeferredHandle {
    /// The underlying deferred value.
    pub fn inner(&self) -> &Arc<Deferred> {
        &self.inner
    }

    /// This handle as a payload, for settling or returning from handlers.
    pub fn as_value(&self) -> Value {
        Value::deferred(self.inner.clone())
    }

    /// Current state snapshot.
    pub fn state(&self) -> DeferredState {
        self.inner.state()
    }

    /// Check if still pending.
    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    /// Check if fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        self.inner.is_fulfilled()
    }

    /// Check if rejected.
    pub fn is_rejected(&self) -> bool {
        self.inner.is_rejected()
    }

    /// Check if settled.
    pub fn is_settled(&self) -> bool {
        self.inner.is_settled()
    }

    /// Register success and failure handlers, returning the derived value.
    ///
    /// A missing handler defaults to pass-through: fulfillment values flow
    /// to the derived value unchanged, rejection reasons are re-raised so
    /// they keep propagating down the chain.
    pub fn chain(
        &self,
        on_fulfilled: Option<MapHandler>,
        on_rejected: Option<MapHandler>,
    ) -> DeferredHandle {
        let target = Deferred::new();
        let enqueue = self.shared.enqueue_fn();

        let (kind, handler) = match on_fulfilled {
            Some(callback) => (ReactionKind::Fulfill, Some(Handler::Map(callback))),
            None => (ReactionKind::PassthroughFulfill, None),
        };
        self.inner.when_fulfilled(
            ReactionJob {
                kind,
                handler,
                target: target.clone(),
            },
            &enqueue,
        );

        let (kind, handler) = match on_rejected {
            Some(callback) => (ReactionKind::Reject, Some(Handler::Map(callback))),
            None => (ReactionKind::PassthroughReject, None),
        };
        self.inner.when_rejected(
            ReactionJob {
                kind,
                handler,
                target: target.clone(),
            },
            &enqueue,
        );

        watch_unhandled(&self.shared, &target);
        DeferredHandle {
            inner: target,
            shared: self.shared.clone(),
        }
    }

    /// Register a success handler.
    pub fn then<F>(&self, on_fulfilled: F) -> DeferredHandle
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        self.chain(Some(Box::new(on_fulfilled)), None)
    }

    /// Register success and failure handlers.
    pub fn then_catch<F, G>(&self, on_fulfilled: F, on_rejected: G) -> DeferredHandle
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
        G: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        self.chain(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Register a failure handler.
    pub fn catch<F>(&self, on_rejected: F) -> DeferredHandle
    where
        F: FnOnce(Value) -> Result<Value, Value> + Send + 'static,
    {
        self.chain(None, Some(Box::new(on_rejected)))
    }

    /// Register a cleanup handler that runs on either outcome.
    ///
    /// The derived value repeats the source outcome. The handler's return
    /// value is discarded, except that a returned deferred value is awaited
    /// and an error (returned or adopted) replaces the outcome.
    pub fn finally<F>(&self, on_settled: F) -> DeferredHandle
    where
        F: FnOnce() -> Result<Value, Value> + Send + 'static,
    {
        let target = Deferred::new();
        let enqueue = self.shared.enqueue_fn();

        // Only one of the two jobs ever runs; they share the callback.
        let callback = Arc::new(Mutex::new(Some(on_settled)));
        let effect = |cb: Arc<Mutex<Option<F>>>| -> EffectHandler {
            Box::new(move || match cb.lock().take() {
                Some(f) => f(),
                None => Ok(Value::undefined()),
            })
        };

        self.inner.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::FinallyFulfill,
                handler: Some(Handler::Effect(effect(Arc::clone(&callback)))),
                target: target.clone(),
            },
            &enqueue,
        );
        self.inner.when_rejected(
            ReactionJob {
                kind: ReactionKind::FinallyReject,
                handler: Some(Handler::Effect(effect(callback))),
                target: target.clone(),
            },
            &enqueue,
        );

        watch_unhandled(&self.shared, &target);
        DeferredHandle {
            inner: target,
            shared: self.shared.clone(),
        }
    }
}

impl From<DeferredHandle> for Value {
    fn from(handle: DeferredHandle) -> Self {
        Value::Deferred(handle.inner)
    }
}

impl std::fmt::Debug for DeferredHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

//! The deferred-value state machine.
//!
//! ## Rust API
//!
//! Create deferred values from Rust code using `with_resolvers()`:
//!
//! ```ignore
//! let resolvers = Deferred::with_resolvers(move |job, arg| queue.enqueue(job, arg));
//! // Later, settle the value
//! (resolvers.fulfill)(Value::number(42.0));
//! ```
//!
//! Settlement is idempotent: the first call to either settle function wins
//! and every later call is silently ignored. Reactions registered while the
//! value is pending are held in ordered waiter lists and handed to `enqueue`
//! exactly once, at settlement time; reactions registered after settlement
//! are handed to `enqueue` immediately.

use crate::reaction::{ReactionJob, ReactionKind};
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Settle capability: fulfills or rejects one deferred value, idempotently.
pub type SettleFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Watcher invoked once when a deferred value leaves the pending state.
type SettleWatcher = Box<dyn FnOnce() + Send>;

/// Deferred-value state.
#[derive(Debug, Clone)]
pub enum DeferredState {
    /// Not yet settled.
    Pending,
    /// Resolved to another deferred value whose outcome is still unknown.
    /// Externally indistinguishable from `Pending`; only the adoption path
    /// may complete the settlement from here.
    Adopting(Value),
    /// Settled with a success value.
    Fulfilled(Value),
    /// Settled with a failure reason.
    Rejected(Value),
}

impl DeferredState {
    /// Check if settled (fulfilled or rejected).
    pub fn is_settled(&self) -> bool {
        !matches!(self, DeferredState::Pending | DeferredState::Adopting(_))
    }
}

/// A deferred value: settles exactly once to fulfilled or rejected.
pub struct Deferred {
    /// Current state.
    state: Mutex<DeferredState>,
    /// Reactions to enqueue on fulfillment, in registration order.
    fulfill_reactions: Mutex<Vec<ReactionJob>>,
    /// Reactions to enqueue on rejection, in registration order.
    reject_reactions: Mutex<Vec<ReactionJob>>,
    /// Watchers to run on settlement of either kind (combinator bookkeeping).
    settle_watchers: Mutex<Vec<SettleWatcher>>,
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        match &*state {
            DeferredState::Pending => write!(f, "Deferred {{ <pending> }}"),
            DeferredState::Adopting(_) => write!(f, "Deferred {{ <pending> }}"),
            DeferredState::Fulfilled(v) => write!(f, "Deferred {{ <fulfilled>: {:?} }}", v),
            DeferredState::Rejected(v) => write!(f, "Deferred {{ <rejected>: {:?} }}", v),
        }
    }
}

/// Result of [`Deferred::with_resolvers`]: a deferred value along with its
/// two settle capabilities, for callers that settle it later.
pub struct DeferredResolvers {
    /// The deferred value.
    pub deferred: Arc<Deferred>,
    /// Capability that settles it as fulfilled.
    pub fulfill: SettleFn,
    /// Capability that settles it as rejected.
    pub reject: SettleFn,
}

impl Deferred {
    /// Create a new pending deferred value.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeferredState::Pending),
            fulfill_reactions: Mutex::new(Vec::new()),
            reject_reactions: Mutex::new(Vec::new()),
            settle_watchers: Mutex::new(Vec::new()),
        })
    }

    /// Create an already fulfilled deferred value.
    pub fn fulfilled(value: Value) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeferredState::Fulfilled(value)),
            fulfill_reactions: Mutex::new(Vec::new()),
            reject_reactions: Mutex::new(Vec::new()),
            settle_watchers: Mutex::new(Vec::new()),
        })
    }

    /// Create an already rejected deferred value.
    pub fn rejected(reason: Value) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeferredState::Rejected(reason)),
            fulfill_reactions: Mutex::new(Vec::new()),
            reject_reactions: Mutex::new(Vec::new()),
            settle_watchers: Mutex::new(Vec::new()),
        })
    }

    /// Create a deferred value together with its settle capabilities.
    ///
    /// Reactions released by a settlement are handed to `enqueue`; the
    /// runtime points this at its reaction queue.
    pub fn with_resolvers<E>(enqueue: E) -> DeferredResolvers
    where
        E: Fn(ReactionJob, Value) + Send + Sync + 'static,
    {
        let deferred = Deferred::new();
        let enqueue = Arc::new(enqueue);

        let fulfill = {
            let d = deferred.clone();
            let enqueue = Arc::clone(&enqueue);
            Arc::new(move |v: Value| {
                d.resolve_with_jobs(v, enqueue.as_ref());
            }) as SettleFn
        };

        let reject = {
            let d = deferred.clone();
            Arc::new(move |r: Value| {
                d.reject_with_jobs(r, enqueue.as_ref());
            }) as SettleFn
        };

        DeferredResolvers {
            deferred,
            fulfill,
            reject,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> DeferredState {
        self.state.lock().clone()
    }

    /// Check if still pending (including mid-adoption).
    pub fn is_pending(&self) -> bool {
        !self.state.lock().is_settled()
    }

    /// Check if fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.state.lock(), DeferredState::Fulfilled(_))
    }

    /// Check if rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(*self.state.lock(), DeferredState::Rejected(_))
    }

    /// Check if settled (fulfilled or rejected).
    pub fn is_settled(&self) -> bool {
        self.state.lock().is_settled()
    }

    /// Register a reaction for fulfillment.
    ///
    /// If the value is already fulfilled, the job is enqueued immediately
    /// with the settled payload. If it is already rejected, the job is
    /// dropped.
    pub fn when_fulfilled<E>(&self, job: ReactionJob, enqueue: &E)
    where
        E: Fn(ReactionJob, Value),
    {
        let state = self.state.lock().clone();
        match state {
            DeferredState::Fulfilled(value) => enqueue(job, value),
            DeferredState::Pending | DeferredState::Adopting(_) => {
                self.fulfill_reactions.lock().push(job);
            }
            DeferredState::Rejected(_) => {}
        }
    }

    /// Register a reaction for rejection.
    ///
    /// Mirror image of [`Deferred::when_fulfilled`].
    pub fn when_rejected<E>(&self, job: ReactionJob, enqueue: &E)
    where
        E: Fn(ReactionJob, Value),
    {
        let state = self.state.lock().clone();
        match state {
            DeferredState::Rejected(reason) => enqueue(job, reason),
            DeferredState::Pending | DeferredState::Adopting(_) => {
                self.reject_reactions.lock().push(job);
            }
            DeferredState::Fulfilled(_) => {}
        }
    }

    /// Register a watcher that runs once at settlement of either kind.
    ///
    /// Runs synchronously inside the settle call; if the value is already
    /// settled the watcher runs before this returns. Combinators use this
    /// for their remaining-count bookkeeping.
    pub fn on_settled<F>(&self, watcher: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let settled = self.state.lock().is_settled();
        if settled {
            watcher();
        } else {
            self.settle_watchers.lock().push(Box::new(watcher));
        }
    }

    /// Resolve with a value, releasing fulfillment reactions through
    /// `enqueue`.
    ///
    /// A `Value::Deferred` payload does not settle this value directly:
    /// it switches to the adopting state and settles with the inner value's
    /// eventual outcome instead (flattening). No-op once settled or already
    /// adopting.
    pub fn resolve_with_jobs<E>(self: &Arc<Self>, value: Value, enqueue: &E)
    where
        E: Fn(ReactionJob, Value),
    {
        self.resolve_internal(value, enqueue, false);
    }

    /// Reject with a reason, releasing rejection reactions through `enqueue`.
    ///
    /// No-op once settled or already adopting.
    pub fn reject_with_jobs<E>(self: &Arc<Self>, reason: Value, enqueue: &E)
    where
        E: Fn(ReactionJob, Value),
    {
        self.reject_internal(reason, enqueue, false);
    }

    /// Complete a fulfillment on behalf of an adopted inner value.
    pub(crate) fn resolve_from_adoption<E>(self: &Arc<Self>, value: Value, enqueue: &E)
    where
        E: Fn(ReactionJob, Value),
    {
        self.resolve_internal(value, enqueue, true);
    }

    /// Complete a rejection on behalf of an adopted inner value.
    pub(crate) fn reject_from_adoption<E>(self: &Arc<Self>, reason: Value, enqueue: &E)
    where
        E: Fn(ReactionJob, Value),
    {
        self.reject_internal(reason, enqueue, true);
    }

    fn resolve_internal<E>(self: &Arc<Self>, value: Value, enqueue: &E, from_adoption: bool)
    where
        E: Fn(ReactionJob, Value),
    {
        let mut state = self.state.lock();
        match &*state {
            DeferredState::Pending => {}
            DeferredState::Adopting(_) if from_adoption => {}
            _ => return,
        }

        if let Value::Deferred(inner) = &value {
            if Arc::ptr_eq(inner, self) {
                drop(state);
                self.reject_internal(
                    Value::str("deferred value cannot adopt itself"),
                    enqueue,
                    true,
                );
                return;
            }

            let inner = inner.clone();
            *state = DeferredState::Adopting(value);
            drop(state);

            inner.when_fulfilled(
                ReactionJob {
                    kind: ReactionKind::AdoptFulfill,
                    handler: None,
                    target: self.clone(),
                },
                enqueue,
            );
            inner.when_rejected(
                ReactionJob {
                    kind: ReactionKind::AdoptReject,
                    handler: None,
                    target: self.clone(),
                },
                enqueue,
            );
            return;
        }

        *state = DeferredState::Fulfilled(value.clone());
        drop(state);

        let jobs = std::mem::take(&mut *self.fulfill_reactions.lock());
        for job in jobs {
            enqueue(job, value.clone());
        }
        self.reject_reactions.lock().clear();

        let watchers = std::mem::take(&mut *self.settle_watchers.lock());
        for watcher in watchers {
            watcher();
        }
    }

    fn reject_internal<E>(self: &Arc<Self>, reason: Value, enqueue: &E, from_adoption: bool)
    where
        E: Fn(ReactionJob, Value),
    {
        let mut state = self.state.lock();
        match &*state {
            DeferredState::Pending => {}
            DeferredState::Adopting(_) if from_adoption => {}
            _ => return,
        }

        *state = DeferredState::Rejected(reason.clone());
        drop(state);

        let jobs = std::mem::take(&mut *self.reject_reactions.lock());
        for job in jobs {
            enqueue(job, reason.clone());
        }
        self.fulfill_reactions.lock().clear();

        let watchers = std::mem::take(&mut *self.settle_watchers.lock());
        for watcher in watchers {
            watcher();
        }
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self {
            state: Mutex::new(DeferredState::Pending),
            fulfill_reactions: Mutex::new(Vec::new()),
            reject_reactions: Mutex::new(Vec::new()),
            settle_watchers: Mutex::new(Vec::new()),
        }
    }
}

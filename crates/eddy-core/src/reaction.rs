//! Reaction jobs: the chain operator compiled to queueable units.
//!
//! A `then`/`catch`/`finally` call registers [`ReactionJob`]s on the source
//! deferred value. When the source settles, each job is handed to the
//! scheduler's `enqueue` together with the settled payload; [`run`] later
//! executes the job and settles the job's target. Handlers signal failure by
//! returning `Err`, which becomes the target's rejection.

use crate::deferred::Deferred;
use crate::value::Value;
use std::sync::Arc;

/// Fallible handler over the source payload (`then`/`catch` callbacks).
pub type MapHandler = Box<dyn FnOnce(Value) -> Result<Value, Value> + Send>;

/// Fallible handler that receives no payload (`finally` callbacks).
pub type EffectHandler = Box<dyn FnOnce() -> Result<Value, Value> + Send>;

/// The callback carried by a reaction job.
pub enum Handler {
    /// Maps the source payload to the target's outcome.
    Map(MapHandler),
    /// Runs for effect only; the source outcome passes through unless the
    /// handler fails.
    Effect(EffectHandler),
}

/// Kind of reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    /// Run the handler with the fulfillment value.
    Fulfill,
    /// Run the handler with the rejection reason.
    Reject,
    /// Run the finally handler after fulfillment.
    FinallyFulfill,
    /// Run the finally handler after rejection.
    FinallyReject,
    /// Fulfill the target with the source value unchanged (identity default).
    PassthroughFulfill,
    /// Re-raise the source reason as the target's rejection (re-raise
    /// default, so unhandled rejections keep propagating down the chain).
    PassthroughReject,
    /// Complete the target's adoption with the inner value's fulfillment.
    AdoptFulfill,
    /// Complete the target's adoption with the inner value's rejection.
    AdoptReject,
}

/// A unit of deferred work: settles `target` from a source payload.
pub struct ReactionJob {
    /// Reaction kind.
    pub kind: ReactionKind,
    /// The callback, for the handler-running kinds.
    pub handler: Option<Handler>,
    /// The derived deferred value this job settles.
    pub target: Arc<Deferred>,
}

/// Execute one reaction job with the source payload it was released with.
///
/// `enqueue` receives any follow-up jobs (adoption of a returned deferred
/// value, chained reactions of the target).
pub fn run<E>(job: ReactionJob, payload: Value, enqueue: &E)
where
    E: Fn(ReactionJob, Value),
{
    let ReactionJob {
        kind,
        handler,
        target,
    } = job;

    match kind {
        ReactionKind::PassthroughFulfill => target.resolve_with_jobs(payload, enqueue),
        ReactionKind::PassthroughReject => target.reject_with_jobs(payload, enqueue),
        ReactionKind::AdoptFulfill => target.resolve_from_adoption(payload, enqueue),
        ReactionKind::AdoptReject => target.reject_from_adoption(payload, enqueue),
        ReactionKind::Fulfill | ReactionKind::Reject => {
            let Some(Handler::Map(callback)) = handler else {
                // A handler-running job without its handler degrades to the
                // matching pass-through.
                if kind == ReactionKind::Fulfill {
                    target.resolve_with_jobs(payload, enqueue);
                } else {
                    target.reject_with_jobs(payload, enqueue);
                }
                return;
            };
            match callback(payload) {
                Ok(value) => target.resolve_with_jobs(value, enqueue),
                Err(reason) => target.reject_with_jobs(reason, enqueue),
            }
        }
        ReactionKind::FinallyFulfill | ReactionKind::FinallyReject => {
            let original = payload;
            let Some(Handler::Effect(callback)) = handler else {
                if kind == ReactionKind::FinallyFulfill {
                    target.resolve_with_jobs(original, enqueue);
                } else {
                    target.reject_with_jobs(original, enqueue);
                }
                return;
            };
            match callback() {
                // A failing finally handler overrides the source outcome.
                Err(reason) => target.reject_with_jobs(reason, enqueue),
                Ok(returned) => {
                    if let Some(inner) = returned.as_deferred() {
                        // Wait for the cleanup value: its rejection overrides
                        // the source outcome, its fulfillment value is
                        // discarded and the source outcome is restored.
                        let restore: MapHandler = match kind {
                            ReactionKind::FinallyFulfill => Box::new(move |_| Ok(original)),
                            _ => Box::new(move |_| Err(original)),
                        };
                        inner.when_fulfilled(
                            ReactionJob {
                                kind: ReactionKind::Fulfill,
                                handler: Some(Handler::Map(restore)),
                                target: target.clone(),
                            },
                            enqueue,
                        );
                        inner.when_rejected(
                            ReactionJob {
                                kind: ReactionKind::PassthroughReject,
                                handler: None,
                                target,
                            },
                            enqueue,
                        );
                    } else if kind == ReactionKind::FinallyFulfill {
                        target.resolve_with_jobs(original, enqueue);
                    } else {
                        target.reject_with_jobs(original, enqueue);
                    }
                }
            }
        }
    }
}

/// In-memory reaction queue for unit tests: collects released jobs and pumps
/// them through [`run`] until quiescent.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct QueuedReactions {
    inner: Arc<parking_lot::Mutex<std::collections::VecDeque<(ReactionJob, Value)>>>,
}

#[cfg(test)]
impl QueuedReactions {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(std::collections::VecDeque::new())),
        }
    }

    pub(crate) fn push(&self, job: ReactionJob, payload: Value) {
        self.inner.lock().push_back((job, payload));
    }

    pub(crate) fn enqueue_fn(&self) -> impl Fn(ReactionJob, Value) + Send + Sync + 'static {
        let q = self.clone();
        move |job, payload| q.push(job, payload)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Run queued jobs (and any they enqueue) until the queue is empty.
    pub(crate) fn drain(&self) {
        let enqueue = self.enqueue_fn();
        loop {
            let next = self.inner.lock().pop_front();
            match next {
                Some((job, payload)) => run(job, payload, &enqueue),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::DeferredState;

    fn fulfilled_value(d: &Arc<Deferred>) -> Value {
        match d.state() {
            DeferredState::Fulfilled(v) => v,
            other => panic!("expected fulfilled, got {other:?}"),
        }
    }

    fn rejected_reason(d: &Arc<Deferred>) -> Value {
        match d.state() {
            DeferredState::Rejected(v) => v,
            other => panic!("expected rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_passthrough_defaults() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let fulfilled_target = Deferred::new();
        let source = Deferred::fulfilled(Value::number(123.0));
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::PassthroughFulfill,
                handler: None,
                target: fulfilled_target.clone(),
            },
            &enqueue,
        );

        let rejected_target = Deferred::new();
        let failed = Deferred::rejected(Value::number(123.0));
        failed.when_rejected(
            ReactionJob {
                kind: ReactionKind::PassthroughReject,
                handler: None,
                target: rejected_target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert_eq!(fulfilled_value(&fulfilled_target), Value::number(123.0));
        assert_eq!(rejected_reason(&rejected_target), Value::number(123.0));
    }

    #[test]
    fn test_handler_failure_becomes_rejection() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let target = Deferred::new();
        let source = Deferred::fulfilled(Value::number(123.0));
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::Fulfill,
                handler: Some(Handler::Map(Box::new(|_| Err(Value::number(456.0))))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert_eq!(rejected_reason(&target), Value::number(456.0));
    }

    #[test]
    fn test_handler_returning_settled_deferred_flattens() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let inner = Deferred::fulfilled(Value::number(200.0));
        let target = Deferred::new();
        let source = Deferred::fulfilled(Value::number(123.0));
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::Fulfill,
                handler: Some(Handler::Map(Box::new(move |_| Ok(Value::deferred(inner))))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert_eq!(fulfilled_value(&target), Value::number(200.0));
    }

    #[test]
    fn test_handler_returning_pending_deferred_flattens_later() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let resolvers = Deferred::with_resolvers(queued.enqueue_fn());
        let inner = resolvers.deferred.clone();

        let target = Deferred::new();
        let source = Deferred::fulfilled(Value::undefined());
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::Fulfill,
                handler: Some(Handler::Map(Box::new(move |_| Ok(Value::deferred(inner))))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert!(target.is_pending());

        (resolvers.fulfill)(Value::number(100.0));
        queued.drain();
        assert_eq!(fulfilled_value(&target), Value::number(100.0));
    }

    #[test]
    fn test_finally_restores_source_outcome() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let target = Deferred::new();
        let source = Deferred::fulfilled(Value::number(100.0));
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::FinallyFulfill,
                handler: Some(Handler::Effect(Box::new(|| Ok(Value::number(999.0))))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        // The handler's return value is discarded.
        assert_eq!(fulfilled_value(&target), Value::number(100.0));
    }

    #[test]
    fn test_finally_failure_overrides_source_outcome() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let target = Deferred::new();
        let source = Deferred::fulfilled(Value::number(100.0));
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::FinallyFulfill,
                handler: Some(Handler::Effect(Box::new(|| Err(Value::str("x"))))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert_eq!(rejected_reason(&target), Value::str("x"));
    }

    #[test]
    fn test_finally_waits_for_returned_deferred() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        // Cleanup deferred fulfills: original rejection is restored.
        let cleanup = Deferred::with_resolvers(queued.enqueue_fn());
        let cleanup_d = cleanup.deferred.clone();
        let target = Deferred::new();
        let source = Deferred::rejected(Value::str("boom"));
        source.when_rejected(
            ReactionJob {
                kind: ReactionKind::FinallyReject,
                handler: Some(Handler::Effect(Box::new(move || {
                    Ok(Value::deferred(cleanup_d))
                }))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert!(target.is_pending());

        (cleanup.fulfill)(Value::undefined());
        queued.drain();
        assert_eq!(rejected_reason(&target), Value::str("boom"));
    }

    #[test]
    fn test_finally_returned_deferred_rejection_overrides() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        let cleanup = Deferred::rejected(Value::str("cleanup failed"));
        let target = Deferred::new();
        let source = Deferred::fulfilled(Value::number(1.0));
        source.when_fulfilled(
            ReactionJob {
                kind: ReactionKind::FinallyFulfill,
                handler: Some(Handler::Effect(Box::new(move || {
                    Ok(Value::deferred(cleanup))
                }))),
                target: target.clone(),
            },
            &enqueue,
        );

        queued.drain();
        assert_eq!(rejected_reason(&target), Value::str("cleanup failed"));
    }

    #[test]
    fn test_adoption_chain() {
        let queued = QueuedReactions::new();
        let enqueue = queued.enqueue_fn();

        // outer adopts middle, middle adopts innermost.
        let innermost = Deferred::with_resolvers(queued.enqueue_fn());
        let middle = Deferred::new();
        middle.resolve_with_jobs(Value::deferred(innermost.deferred.clone()), &enqueue);
        let outer = Deferred::new();
        outer.resolve_with_jobs(Value::deferred(middle), &enqueue);

        queued.drain();
        assert!(outer.is_pending());

        (innermost.fulfill)(Value::str("done"));
        queued.drain();
        assert_eq!(fulfilled_value(&outer), Value::str("done"));
    }
}

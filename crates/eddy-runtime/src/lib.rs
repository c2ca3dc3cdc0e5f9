//! # Eddy Runtime
//!
//! Cooperative two-tier scheduler for Eddy deferred values.
//!
//! The immediate tier (microtasks and settlement reactions, in one global
//! enqueue order) always drains completely before the delayed tier (one-shot
//! timers ordered by deadline) runs, and again after every timer callback.
//! [`Runtime`] ties the [`EventLoop`] to deferred-value construction,
//! chaining, the all-combinator, and unhandled-rejection reporting.
//!
//! ```ignore
//! let rt = Runtime::new();
//! let (handle, fulfill, _reject) = rt.with_resolvers();
//! let doubled = handle.then(|v| Ok(Value::number(v.as_number().unwrap_or(0.0) * 2.0)));
//! fulfill(Value::number(21.0));
//! rt.run_until_complete().await;
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod event_loop;
pub mod microtask;
pub mod runtime;
pub mod timer;

pub use event_loop::EventLoop;
pub use microtask::{Microtask, MicrotaskQueue, MicrotaskSequencer, QueuedReaction, ReactionQueue};
pub use runtime::{DeferredHandle, Runtime};
pub use timer::{Timer, TimerId};

pub use eddy_core::{
    Deferred, DeferredError, DeferredResult, DeferredState, RejectionSink, SettleFn,
    SubscriptionId, Value,
};

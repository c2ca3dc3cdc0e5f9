//! # Eddy Core
//!
//! Deferred-value state machine for the Eddy cooperative scheduler.
//!
//! A [`Deferred`] settles exactly once to a fulfilled value or a rejection
//! reason. Everything that needs to defer work — chain reactions, adoption of
//! a nested deferred, combinator completion — goes through an injected
//! `enqueue` callable instead of touching a scheduler directly, so this crate
//! stays scheduler-free and the runtime crate decides when reactions run.
//!
//! ## Design Principles
//!
//! - **Thread-safe**: payloads and deferred values are `Send + Sync`
//! - **Idempotent settlement**: the first settle call wins, later calls are
//!   silently ignored
//! - **Waiter lists, not polling**: a pending value holds ordered reaction
//!   lists that are drained exactly once at settlement time

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod deferred;
pub mod error;
pub mod notifier;
pub mod reaction;
pub mod value;

pub use deferred::{Deferred, DeferredResolvers, DeferredState, SettleFn};
pub use error::{DeferredError, DeferredResult};
pub use notifier::{RejectionSink, SubscriptionId};
pub use reaction::{EffectHandler, Handler, MapHandler, ReactionJob, ReactionKind};
pub use value::Value;

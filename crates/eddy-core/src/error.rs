//! Error types.

use crate::value::Value;
use thiserror::Error;

/// Errors surfaced synchronously to callers.
///
/// Handler failures never show up here: the chain operator converts them
/// into rejections of the derived value. Rejections themselves are ordinary
/// settled states, not errors.
#[derive(Debug, Error)]
pub enum DeferredError {
    /// The executor failed while the deferred value was being constructed.
    ///
    /// Deliberately not converted into a rejection of the new value: the
    /// failure belongs to the constructing caller.
    #[error("deferred executor failed: {0}")]
    Executor(Value),
}

/// Result alias for fallible construction.
pub type DeferredResult<T> = Result<T, DeferredError>;

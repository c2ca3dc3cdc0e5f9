//! Cleanup handlers: outcome pass-through, override on failure, and waiting
//! for a returned deferred value.

use eddy_runtime::{DeferredHandle, DeferredState, Runtime, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn fulfilled_value(handle: &DeferredHandle) -> Value {
    match handle.state() {
        DeferredState::Fulfilled(v) => v,
        other => panic!("expected fulfilled, got {other:?}"),
    }
}

fn rejected_reason(handle: &DeferredHandle) -> Value {
    match handle.state() {
        DeferredState::Rejected(v) => v,
        other => panic!("expected rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn runs_on_fulfillment_and_preserves_value() {
    let rt = Runtime::new();
    let ran = Arc::new(Mutex::new(false));

    let r = ran.clone();
    let result = rt.resolve(Value::number(42.0)).finally(move || {
        *r.lock() = true;
        Ok(Value::undefined())
    });

    rt.run_until_complete().await;
    assert!(*ran.lock());
    assert_eq!(fulfilled_value(&result), Value::number(42.0));
}

#[tokio::test]
async fn runs_on_rejection_and_preserves_reason() {
    let rt = Runtime::new();
    let ran = Arc::new(Mutex::new(false));

    let r = ran.clone();
    let result = rt.reject(Value::str("boom")).finally(move || {
        *r.lock() = true;
        Ok(Value::undefined())
    });

    rt.run_until_complete().await;
    assert!(*ran.lock());
    assert_eq!(rejected_reason(&result), Value::str("boom"));
}

#[tokio::test]
async fn return_value_is_discarded() {
    let rt = Runtime::new();
    let result = rt
        .resolve(Value::number(1.0))
        .finally(|| Ok(Value::number(999.0)));

    rt.run_until_complete().await;
    assert_eq!(fulfilled_value(&result), Value::number(1.0));
}

#[tokio::test]
async fn handler_error_overrides_either_outcome() {
    let rt = Runtime::new();
    let from_fulfilled = rt
        .resolve(Value::number(1.0))
        .finally(|| Err(Value::str("cleanup failed")));
    let from_rejected = rt
        .reject(Value::str("original"))
        .finally(|| Err(Value::str("cleanup failed")));

    rt.run_until_complete().await;
    assert_eq!(rejected_reason(&from_fulfilled), Value::str("cleanup failed"));
    assert_eq!(rejected_reason(&from_rejected), Value::str("cleanup failed"));
}

#[tokio::test]
async fn waits_for_returned_deferred_then_restores_outcome() {
    let rt = Runtime::new();
    let (cleanup, fulfill_cleanup, _reject) = rt.with_resolvers();

    let cleanup_value = cleanup.as_value();
    let result = rt
        .reject(Value::str("boom"))
        .finally(move || Ok(cleanup_value));

    rt.event_loop().set_timeout(
        move || fulfill_cleanup(Value::str("cleanup done")),
        Duration::from_millis(5),
    );

    rt.run_until_complete().await;
    // The cleanup value is discarded; the original rejection survives.
    assert_eq!(rejected_reason(&result), Value::str("boom"));
}

#[tokio::test]
async fn returned_deferred_rejection_overrides_outcome() {
    let rt = Runtime::new();
    let failing_cleanup = rt.reject(Value::str("cleanup failed"));

    let result = rt
        .resolve(Value::number(1.0))
        .finally(move || Ok(failing_cleanup.as_value()));

    rt.run_until_complete().await;
    assert_eq!(rejected_reason(&result), Value::str("cleanup failed"));
}

#[tokio::test]
async fn chains_through_finally() {
    let rt = Runtime::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let o1 = order.clone();
    let o2 = order.clone();
    let result = rt
        .resolve(Value::number(3.0))
        .finally(move || {
            o1.lock().push("cleanup");
            Ok(Value::undefined())
        })
        .then(move |v| {
            o2.lock().push("then");
            Ok(v)
        });

    rt.run_until_complete().await;
    assert_eq!(*order.lock(), vec!["cleanup", "then"]);
    assert_eq!(fulfilled_value(&result), Value::number(3.0));
}

//! Unhandled-rejection reporting: best-effort, one check per constructed
//! value, no handled-tracking.

use eddy_runtime::{Runtime, Value};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn bare_rejections_are_reported_once_each() {
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    rt.rejections().subscribe(move |reason, _source| {
        s.lock().push(reason.clone());
    });

    let _a = rt.reject(Value::str("first"));
    let _b = rt.reject(Value::str("second"));

    rt.run_until_complete().await;
    assert_eq!(*seen.lock(), vec![Value::str("first"), Value::str("second")]);
}

#[tokio::test]
async fn fulfillments_are_never_reported() {
    let rt = Runtime::new();
    let count = Arc::new(Mutex::new(0usize));

    let c = count.clone();
    rt.rejections().subscribe(move |_, _| *c.lock() += 1);

    let _ok = rt.resolve(Value::number(1.0)).then(|v| Ok(v));
    rt.run_until_complete().await;
    assert_eq!(*count.lock(), 0);
}

#[tokio::test]
async fn unsubscribed_observer_stops_receiving() {
    let rt = Runtime::new();
    let count = Arc::new(Mutex::new(0usize));

    let c = count.clone();
    let id = rt.rejections().subscribe(move |_, _| *c.lock() += 1);

    let _a = rt.reject(Value::str("seen"));
    rt.run_until_complete().await;
    assert_eq!(*count.lock(), 1);

    assert!(rt.rejections().unsubscribe(id));
    let _b = rt.reject(Value::str("unseen"));
    rt.run_until_complete().await;
    assert_eq!(*count.lock(), 1);
}

#[tokio::test]
async fn handler_attached_in_time_does_not_suppress_the_source_report() {
    // Reporting is stateless: the check looks only at the value's own state,
    // so a rejection recovered downstream still reports at its source.
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    rt.rejections().subscribe(move |reason, _source| {
        s.lock().push(reason.clone());
    });

    let recovered = rt
        .reject(Value::str("boom"))
        .catch(|_| Ok(Value::str("recovered")));

    rt.run_until_complete().await;
    // The source reports; the recovered derived value does not.
    assert_eq!(*seen.lock(), vec![Value::str("boom")]);
    assert!(recovered.is_fulfilled());
}

#[tokio::test]
async fn unhandled_chain_reports_every_link() {
    // Pass-through re-raising means an untouched rejection keeps rejecting
    // each derived value, and each one reports independently.
    let rt = Runtime::new();
    let count = Arc::new(Mutex::new(0usize));

    let c = count.clone();
    rt.rejections().subscribe(move |_, _| *c.lock() += 1);

    let _chain = rt
        .reject(Value::str("boom"))
        .then(|v| Ok(v))
        .then(|v| Ok(v));

    rt.run_until_complete().await;
    assert_eq!(*count.lock(), 3);
}

#[tokio::test]
async fn late_rejection_is_still_caught_by_the_turn_check() {
    let rt = Runtime::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    rt.rejections().subscribe(move |reason, _source| {
        s.lock().push(reason.clone());
    });

    // Rejected by a microtask after construction but before the zero-delay
    // check runs.
    let (_handle, _fulfill, reject) = rt.with_resolvers();
    rt.event_loop()
        .queue_microtask(move || reject(Value::str("late")));

    rt.run_until_complete().await;
    assert_eq!(*seen.lock(), vec![Value::str("late")]);
}

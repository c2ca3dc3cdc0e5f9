//! Immediate-tier queues.
//!
//! Two FIFO queues make up the immediate (microtask) tier: plain Rust
//! closures, and reaction jobs released by settling deferred values. Both
//! share a [`MicrotaskSequencer`], so the event loop can drain them in
//! global enqueue order.
//!
//! ## Ordering Guarantees
//!
//! - FIFO: first queued, first executed
//! - The whole tier is drained before any delayed task runs
//! - Work enqueued during a drain is executed in the same drain

use eddy_core::{ReactionJob, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Microtask callback type.
pub type Microtask = Box<dyn FnOnce() + Send>;

/// Shared sequencer for ordering across the immediate-tier queues.
#[derive(Clone, Default)]
pub struct MicrotaskSequencer {
    counter: Arc<AtomicU64>,
}

impl MicrotaskSequencer {
    /// Create a sequencer starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next sequence number.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// A reaction job queued with the payload it was released with.
pub struct QueuedReaction {
    /// The settled payload the job runs against.
    pub payload: Value,
    /// The reaction job.
    pub job: ReactionJob,
}

/// Queue of plain microtasks (Rust closures).
pub struct MicrotaskQueue {
    queue: Mutex<VecDeque<(u64, Microtask)>>,
    len: AtomicUsize,
    sequencer: MicrotaskSequencer,
}

impl MicrotaskQueue {
    /// Create a new empty queue with its own sequencer.
    pub fn new() -> Self {
        Self::with_sequencer(MicrotaskSequencer::new())
    }

    /// Create a new queue sharing a sequencer with other queues.
    pub fn with_sequencer(sequencer: MicrotaskSequencer) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            sequencer,
        }
    }

    /// Add a microtask to the queue.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.sequencer.next();
        self.queue.lock().push_back((seq, Box::new(task)));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the next microtask.
    pub fn dequeue(&self) -> Option<Microtask> {
        let task = self.queue.lock().pop_front().map(|(_, task)| task);
        if task.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        task
    }

    /// Peek the next sequence number.
    pub fn peek_seq(&self) -> Option<u64> {
        self.queue.lock().front().map(|(seq, _)| *seq)
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Clear all pending microtasks.
    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        let len = queue.len();
        queue.clear();
        self.len.fetch_sub(len, Ordering::Relaxed);
    }
}

impl Default for MicrotaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue of reaction jobs released by settlements.
///
/// Separate from [`MicrotaskQueue`] because jobs need the queue itself as
/// their `enqueue` when they run; the event loop binds that at drain time.
pub struct ReactionQueue {
    queue: Mutex<VecDeque<(u64, QueuedReaction)>>,
    len: AtomicUsize,
    sequencer: MicrotaskSequencer,
}

impl ReactionQueue {
    /// Create a new empty queue with its own sequencer.
    pub fn new() -> Self {
        Self::with_sequencer(MicrotaskSequencer::new())
    }

    /// Create a new queue sharing a sequencer with other queues.
    pub fn with_sequencer(sequencer: MicrotaskSequencer) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            sequencer,
        }
    }

    /// Enqueue a reaction job with its payload.
    pub fn enqueue(&self, job: ReactionJob, payload: Value) {
        let seq = self.sequencer.next();
        self.queue
            .lock()
            .push_back((seq, QueuedReaction { payload, job }));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Dequeue the next reaction job.
    pub fn dequeue(&self) -> Option<QueuedReaction> {
        let job = self.queue.lock().pop_front().map(|(_, job)| job);
        if job.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        job
    }

    /// Peek the next sequence number.
    pub fn peek_seq(&self) -> Option<u64> {
        self.queue.lock().front().map(|(seq, _)| *seq)
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Clear all pending reaction jobs.
    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        let len = queue.len();
        queue.clear();
        self.len.fetch_sub(len, Ordering::Relaxed);
    }
}

impl Default for ReactionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddy_core::{Deferred, ReactionKind};

    #[test]
    fn test_microtasks_fifo() {
        let queue = MicrotaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue.enqueue(move || log.lock().push(i));
        }

        while let Some(task) = queue.dequeue() {
            task();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shared_sequencer_orders_across_queues() {
        let sequencer = MicrotaskSequencer::new();
        let microtasks = MicrotaskQueue::with_sequencer(sequencer.clone());
        let reactions = ReactionQueue::with_sequencer(sequencer);

        microtasks.enqueue(|| {});
        reactions.enqueue(
            ReactionJob {
                kind: ReactionKind::PassthroughFulfill,
                handler: None,
                target: Deferred::new(),
            },
            Value::undefined(),
        );
        microtasks.enqueue(|| {});

        assert_eq!(microtasks.peek_seq(), Some(0));
        assert_eq!(reactions.peek_seq(), Some(1));

        microtasks.dequeue();
        assert_eq!(microtasks.peek_seq(), Some(2));
    }

    #[test]
    fn test_clear() {
        let queue = MicrotaskQueue::new();
        queue.enqueue(|| {});
        queue.enqueue(|| {});
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }
}

//! Event loop implementation.
//!
//! Two-tier cooperative scheduler: the immediate tier (microtasks and
//! reaction jobs, interleaved in enqueue order) is always drained completely
//! before any delayed-tier timer runs, and the immediate tier is drained
//! again after each timer callback. Delay `0` therefore means "next turn",
//! never "now".

use crate::microtask::{MicrotaskQueue, MicrotaskSequencer, ReactionQueue};
use crate::timer::{Timer, TimerId};
use eddy_core::reaction;
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// HTML5 spec: timers nested more than this level get clamped to MIN_TIMEOUT_MS
const MAX_TIMER_NESTING_LEVEL: u32 = 5;
/// HTML5 spec: minimum timeout for deeply nested timers (4ms)
const MIN_TIMEOUT_MS: u64 = 4;

thread_local! {
    /// Tracks timer nesting level for HTML5 spec compliance
    static TIMER_NESTING_LEVEL: std::cell::Cell<u32> = const { std::cell::Cell::new(0) };
}

/// Event loop driving the two queue tiers.
pub struct EventLoop {
    /// Delayed tier: min-heap ordered by deadline, FIFO among equals.
    timers: Mutex<BinaryHeap<Timer>>,
    /// Immediate tier: plain closures.
    microtasks: MicrotaskQueue,
    /// Immediate tier: reaction jobs from settling deferred values.
    reactions: Arc<ReactionQueue>,
    /// Next timer ID.
    next_timer_id: AtomicU64,
    /// Is running.
    running: AtomicBool,
}

impl EventLoop {
    /// Create a new event loop.
    pub fn new() -> Arc<Self> {
        let sequencer = MicrotaskSequencer::new();
        Arc::new(Self {
            timers: Mutex::new(BinaryHeap::new()),
            microtasks: MicrotaskQueue::with_sequencer(sequencer.clone()),
            reactions: Arc::new(ReactionQueue::with_sequencer(sequencer)),
            next_timer_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
        })
    }

    /// Schedule a one-shot delayed task. Runs no earlier than `delay` from
    /// now; deeply nested zero-delay timers are clamped per the HTML5 rule.
    pub fn set_timeout<F>(&self, callback: F, delay: Duration) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let inherited_nesting = TIMER_NESTING_LEVEL.with(|level| level.get());
        let nesting_level = inherited_nesting.saturating_add(1);

        let clamped_delay = if nesting_level > MAX_TIMER_NESTING_LEVEL {
            delay.max(Duration::from_millis(MIN_TIMEOUT_MS))
        } else {
            delay
        };

        let id = TimerId(self.next_timer_id.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + clamped_delay;
        tracing::trace!(id = id.0, ?clamped_delay, "timer scheduled");

        self.timers.lock().push(Timer {
            id,
            deadline,
            nesting_level,
            callback: Box::new(callback),
        });
        id
    }

    /// Queue an immediate task.
    pub fn queue_microtask<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.microtasks.enqueue(task);
    }

    /// The microtask queue (immediate tier, closures).
    pub fn microtask_queue(&self) -> &MicrotaskQueue {
        &self.microtasks
    }

    /// The reaction queue (immediate tier, settlement jobs).
    ///
    /// Settle capabilities and chain registrations point their `enqueue`
    /// here.
    pub fn reaction_queue(&self) -> &Arc<ReactionQueue> {
        &self.reactions
    }

    /// Check if anything is still queued or scheduled.
    pub fn has_pending_tasks(&self) -> bool {
        !self.microtasks.is_empty() || !self.reactions.is_empty() || !self.timers.lock().is_empty()
    }

    /// Drain the whole immediate tier, interleaving the two queues in
    /// global enqueue order. Work enqueued during the drain runs in the
    /// same drain.
    fn drain_microtasks(&self) {
        loop {
            let next_task = self.microtasks.peek_seq();
            let next_reaction = self.reactions.peek_seq();
            match (next_task, next_reaction) {
                (None, None) => break,
                (Some(_), None) => self.run_next_microtask(),
                (None, Some(_)) => self.run_next_reaction(),
                (Some(task_seq), Some(reaction_seq)) => {
                    if task_seq < reaction_seq {
                        self.run_next_microtask();
                    } else {
                        self.run_next_reaction();
                    }
                }
            }
        }
    }

    fn run_next_microtask(&self) {
        if let Some(task) = self.microtasks.dequeue() {
            task();
        }
    }

    fn run_next_reaction(&self) {
        if let Some(queued) = self.reactions.dequeue() {
            let enqueue = |job, payload| self.reactions.enqueue(job, payload);
            reaction::run(queued.job, queued.payload, &enqueue);
        }
    }

    /// Run all timers whose deadline has passed, draining the immediate
    /// tier after each callback. Timers scheduled by a callback wait for
    /// the next turn even at zero delay.
    fn run_timers(&self) {
        let now = Instant::now();

        let mut due = Vec::new();
        {
            let mut timers = self.timers.lock();
            while timers.peek().is_some_and(|timer| timer.deadline <= now) {
                due.extend(timers.pop());
            }
        }

        for timer in due {
            TIMER_NESTING_LEVEL.with(|level| level.set(timer.nesting_level));
            (timer.callback)();
            TIMER_NESTING_LEVEL.with(|level| level.set(0));

            self.drain_microtasks();
        }
    }

    /// Time until the next timer deadline, if any timer is scheduled.
    fn time_until_next_timer(&self) -> Option<Duration> {
        let now = Instant::now();
        self.timers
            .lock()
            .peek()
            .map(|timer| timer.deadline.saturating_duration_since(now))
    }

    /// Stop the event loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Run until no queued or scheduled work remains.
    pub async fn run_until_complete_async(&self) {
        self.running.store(true, Ordering::Release);

        loop {
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            // 1. Immediate tier first (highest priority)
            self.drain_microtasks();

            // 2. Ready timers
            self.run_timers();

            // 3. Check if we should exit
            if !self.has_pending_tasks() {
                tracing::trace!("event loop idle; exiting");
                break;
            }

            // 4. Yield, and sleep until the next deadline when nothing is
            // immediately ready, to avoid a busy loop
            tokio::task::yield_now().await;

            if self.microtasks.is_empty()
                && self.reactions.is_empty()
                && let Some(wait) = self.time_until_next_timer()
                && !wait.is_zero()
            {
                tokio::time::sleep(wait.min(Duration::from_millis(10))).await;
            }
        }

        self.running.store(false, Ordering::Release);
    }
}

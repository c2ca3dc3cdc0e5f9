//! Delayed-tier timers.
//!
//! One-shot timers in a min-heap ordered by `(deadline, id)`: a timer runs
//! no earlier than its deadline, and equally-delayed timers run in
//! submission order. There is no cancellation; the heap entries own their
//! callbacks and are consumed when they fire.

use std::cmp::Ordering;
use std::time::Instant;

/// Timer identifier, monotonically increasing per event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// A scheduled one-shot timer.
pub struct Timer {
    /// Identifier; doubles as the FIFO tie-breaker for equal deadlines.
    pub id: TimerId,
    /// Earliest instant the callback may run.
    pub deadline: Instant,
    /// Nesting level inherited from the task that scheduled this timer.
    pub nesting_level: u32,
    /// The callback.
    pub callback: Box<dyn FnOnce() + Send>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("nesting_level", &self.nesting_level)
            .finish()
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so BinaryHeap pops the earliest deadline first; ties go to
    // the lower id (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

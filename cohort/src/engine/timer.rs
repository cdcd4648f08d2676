use crate::activity::Callback;

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use std::time::Instant;

/// An entry in the engine timer queue.
///
/// Stored in a `BinaryHeap` that behaves as a min-heap on
/// `(deadline, sequence)`, so timers with the same deadline fire in the
/// order they were set.
pub(crate) struct TimerEntry {
    pub(crate) deadline: Instant,

    /// Insertion counter breaking deadline ties.
    pub(crate) sequence: u64,

    pub(crate) callback: Callback,

    /// Shared with the [`TimerHandle`](super::TimerHandle).
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Ord for TimerEntry {
    /// Reversed so that the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

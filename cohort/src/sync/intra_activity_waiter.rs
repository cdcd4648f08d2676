use crate::activity::{WakeupMask, with_current};
use crate::promise::Poll;

use std::sync::atomic::{AtomicU16, Ordering};

/// The cheapest way to suspend: wait for something another participant
/// of the *same* activity will do.
///
/// [`pending`](Self::pending) records which participant is waiting and
/// [`wake`](Self::wake) asks the current activity to repoll it before
/// the poll round ends. Both sides must run inside the same activity;
/// waking from anywhere else does not reach the waiter.
#[derive(Debug, Default)]
pub struct IntraActivityWaiter {
    wakeups: AtomicU16,
}

impl IntraActivityWaiter {
    pub const fn new() -> Self {
        Self {
            wakeups: AtomicU16::new(0),
        }
    }

    /// Registers the participant being polled and returns `Pending`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of an activity.
    pub fn pending<T>(&self) -> Poll<T> {
        let participant: WakeupMask = with_current(|activity| activity.current_participant());
        self.wakeups.fetch_or(participant, Ordering::Relaxed);
        Poll::Pending
    }

    /// Repolls every registered participant.
    pub fn wake(&self) {
        let wakeups = self.wakeups.swap(0, Ordering::Relaxed);
        if wakeups == 0 {
            return;
        }

        with_current(|activity| activity.force_immediate_repoll_mask(wakeups));
    }

    /// Returns `true` if a participant is waiting.
    pub fn is_pending(&self) -> bool {
        self.wakeups.load(Ordering::Relaxed) != 0
    }
}

use crate::activity::{Waker, with_current};
use crate::promise::Poll;

use std::collections::HashSet;
use std::ops::DerefMut;

/// A set of activities waiting for the same condition.
///
/// The set is meant to live next to the state it describes, behind the
/// same mutex: check the condition, call [`pending`](Self::pending) if
/// it does not hold, and use [`wake_all_and_unlock`] after changing the
/// state. Registering under the mutex is what makes the wakeup
/// impossible to miss.
///
/// ```rust,ignore
/// let mut queue = self.queue.lock();
/// if let Some(item) = queue.items.pop_front() {
///     return Poll::Ready(item);
/// }
/// queue.waiters.pending()
/// ```
#[derive(Debug, Default)]
pub struct WaitSet {
    pending: HashSet<Waker>,
}

impl WaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the participant being polled and returns `Pending`.
    ///
    /// Registering the same participant twice keeps a single entry.
    pub fn pending<T>(&mut self) -> Poll<T> {
        let waker = with_current(|activity| activity.make_non_owning_waker());
        self.add_pending(waker);
        Poll::Pending
    }

    /// Registers an arbitrary waker. Returns `false` if an equal one was
    /// already registered.
    pub fn add_pending(&mut self, waker: Waker) -> bool {
        self.pending.insert(waker)
    }

    /// Removes every registration, leaving the set empty.
    #[must_use = "dropping the wakeup set discards the wakeups"]
    pub fn take_wakeup_set(&mut self) -> WakeupSet {
        WakeupSet {
            wakers: std::mem::take(&mut self.pending),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Registrations taken out of a [`WaitSet`], to be woken once the
/// guarding mutex is released.
#[derive(Debug)]
pub struct WakeupSet {
    wakers: HashSet<Waker>,
}

impl WakeupSet {
    pub fn wakeup(self) {
        for mut waker in self.wakers {
            waker.wakeup();
        }
    }

    pub fn wakeup_async(self) {
        for mut waker in self.wakers {
            waker.wakeup_async();
        }
    }
}

/// Empties the wait set behind `guard`, releases the guard, then wakes
/// everything that was registered.
///
/// Works with any guard dereferencing to a [`WaitSet`], for example a
/// `parking_lot::MutexGuard::map` of the state holding it.
pub fn wake_all_and_unlock<G>(mut guard: G)
where
    G: DerefMut<Target = WaitSet>,
{
    let wakeups = guard.take_wakeup_set();
    drop(guard);
    wakeups.wakeup();
}

/// A wait set for at most one waiter.
///
/// The caller guarantees that only one participant waits at a time;
/// a second registration replaces the first.
#[derive(Debug, Default)]
pub struct SingleWaiter {
    waker: Option<Waker>,
}

impl SingleWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the participant being polled and returns `Pending`.
    pub fn pending<T>(&mut self) -> Poll<T> {
        self.waker = Some(with_current(|activity| activity.make_non_owning_waker()));
        Poll::Pending
    }

    pub fn is_waiting(&self) -> bool {
        self.waker.is_some()
    }
}

/// Takes the waiter out of the guarded [`SingleWaiter`], releases the
/// guard, then wakes it.
pub fn wake_and_unlock<G>(mut guard: G)
where
    G: DerefMut<Target = SingleWaiter>,
{
    let waker = guard.waker.take();
    drop(guard);

    if let Some(mut waker) = waker {
        waker.wakeup();
    }
}

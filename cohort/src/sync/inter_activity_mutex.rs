//! A mutex whose waiters live in different activities.
//!
//! The whole lock state is one `usize`:
//!
//! ```text
//!  usize::BITS-1                              2   1   0
//! +--------------------------------------------+---+---+
//! |        head of the incoming waiter stack   | P | L |
//! +--------------------------------------------+---+---+
//! ```
//!
//! - `L`: the lock is held,
//! - `P`: waiters whose predicate did not hold at the last drain are
//!   parked in the holder-owned `known` list,
//! - the remaining bits point at the most recently queued [`Waiter`]
//!   (nodes are linked newest first and reversed when drained).
//!
//! Unlocking hands the lock directly to the first known waiter whose
//! predicate accepts the current value; the lock is never released in
//! between, so a waiter that was awarded the lock cannot lose it.

use crate::activity::{Waker, with_current};
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::cell::{Cell, UnsafeCell};
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};
use tracing::trace;

const UNLOCKED: usize = 0;
const LOCKED: usize = 0b01;
const PARKED: usize = 0b10;
const FLAGS: usize = LOCKED | PARKED;

const WAITING: u8 = 0;
const ACQUIRED: u8 = 1;
const CANCELLED: u8 = 2;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A mutex usable across activities, with conditional acquisition.
///
/// [`acquire`](Self::acquire) waits for the lock;
/// [`acquire_when`](Self::acquire_when) additionally waits until a
/// predicate accepts the protected value. Waiters are not served in any
/// particular order. Clones refer to the same mutex.
///
/// # Examples
///
/// ```rust,ignore
/// let credits = InterActivityMutex::new(0u32);
///
/// // Resolves once another activity has deposited at least 10 credits.
/// let spend = map(credits.acquire_when(|c| *c >= 10), |mut lock| *lock -= 10);
/// ```
pub struct InterActivityMutex<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: AtomicUsize,

    /// Waiters already drained from the incoming stack, oldest first.
    /// Only the lock holder touches it.
    known: Mutex<VecDeque<Arc<Waiter<T>>>>,

    value: UnsafeCell<T>,
}

// SAFETY: `value` is only accessed by the holder of the `LOCKED` bit.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

struct Waiter<T> {
    /// `None` accepts any value.
    predicate: Option<Predicate<T>>,
    waker: Mutex<Waker>,
    state: AtomicU8,

    /// Next (older) node of the incoming stack.
    next: AtomicPtr<Waiter<T>>,
}

impl<T> Waiter<T> {
    fn accepts(&self, value: &T) -> bool {
        self.predicate.as_ref().is_none_or(|predicate| predicate(value))
    }

    fn wake(&self) {
        let mut waker = std::mem::take(&mut *self.waker.lock());
        waker.wakeup();
    }
}

impl<T> InterActivityMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicUsize::new(UNLOCKED),
                known: Mutex::new(VecDeque::new()),
                value: UnsafeCell::new(value),
            }),
        }
    }

    /// Returns a promise resolving to a lock on the value.
    pub fn acquire(&self) -> Acquire<T> {
        Acquire::new(self.inner.clone(), None)
    }

    /// Returns a promise resolving to a lock once `predicate` accepts the
    /// value.
    ///
    /// The predicate runs with the lock held, on whichever thread is
    /// releasing the lock; it must be cheap and must not touch the mutex.
    /// A predicate that never holds leaves the promise pending forever.
    pub fn acquire_when<F>(&self, predicate: F) -> Acquire<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Acquire::new(self.inner.clone(), Some(Box::new(predicate)))
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) & LOCKED != 0
    }
}

impl<T> Clone for InterActivityMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for InterActivityMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.load(Ordering::Relaxed);
        f.debug_struct("InterActivityMutex")
            .field("locked", &(state & LOCKED != 0))
            .field("parked", &(state & PARKED != 0))
            .field("queued", &(state & !FLAGS != 0))
            .finish_non_exhaustive()
    }
}

impl<T> Inner<T> {
    /// Sets `LOCKED` if it is clear. Other bits are preserved.
    fn try_lock(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);

        while current & LOCKED == 0 {
            match self.state.compare_exchange_weak(
                current,
                current | LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }

        false
    }

    /// Pushes `node` on the incoming stack, provided the lock is held.
    ///
    /// Returns `false`, leaving `node` untouched, if the lock is free.
    fn push_if_locked(&self, node: *const Waiter<T>) -> bool {
        debug_assert_eq!(node as usize & FLAGS, 0);

        let mut current = self.state.load(Ordering::Relaxed);

        loop {
            if current & LOCKED == 0 {
                return false;
            }

            // SAFETY: `node` is a live `Arc` allocation not yet shared
            // through the stack.
            unsafe { &*node }
                .next
                .store((current & !FLAGS) as *mut Waiter<T>, Ordering::Relaxed);

            match self.state.compare_exchange_weak(
                current,
                node as usize | (current & FLAGS),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases the lock, handing it to a qualifying waiter if any.
    fn unlock(&self) {
        if self
            .state
            .compare_exchange(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }

        self.unlock_slow();
    }

    fn unlock_slow(&self) {
        let mut known = self.known.lock();
        let mut checked = 0;

        loop {
            if let Some(winner) = self.award(&mut known, checked) {
                self.set_parked(!known.is_empty());
                drop(known);

                trace!("lock handed over");
                winner.wake();
                return;
            }
            checked = known.len();

            let current = self.state.load(Ordering::Acquire);
            let head = current & !FLAGS;

            if head == 0 {
                let released = if known.is_empty() { UNLOCKED } else { PARKED };
                if self
                    .state
                    .compare_exchange(current, released, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                continue;
            }

            if self
                .state
                .compare_exchange(current, LOCKED, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            // SAFETY: the stack was detached above; every node in it is an
            // `Arc::into_raw` owned by the stack.
            unsafe { self.adopt(head as *const Waiter<T>, &mut known) };
        }
    }

    /// Moves a detached incoming stack to the end of `known`, restoring
    /// arrival order.
    unsafe fn adopt(&self, head: *const Waiter<T>, known: &mut VecDeque<Arc<Waiter<T>>>) {
        let mut batch = Vec::new();
        let mut node = head;

        while !node.is_null() {
            // SAFETY: guaranteed by the caller.
            let waiter = unsafe { Arc::from_raw(node) };
            node = waiter.next.load(Ordering::Relaxed);
            batch.push(waiter);
        }

        known.extend(batch.into_iter().rev());
    }

    /// Finds the first waiter at or after `from` whose predicate accepts
    /// the value and marks it as the new holder. Cancelled waiters met on
    /// the way are dropped.
    fn award(&self, known: &mut VecDeque<Arc<Waiter<T>>>, from: usize) -> Option<Arc<Waiter<T>>> {
        // SAFETY: the caller holds the lock.
        let value = unsafe { &*self.value.get() };
        let mut index = from.min(known.len());

        while index < known.len() {
            let waiter = &known[index];

            if waiter.state.load(Ordering::Acquire) == CANCELLED {
                known.remove(index);
                continue;
            }

            if !waiter.accepts(value) {
                index += 1;
                continue;
            }

            let awarded = waiter
                .state
                .compare_exchange(WAITING, ACQUIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();

            let waiter = known.remove(index);
            if awarded {
                return waiter;
            }
        }

        None
    }

    /// Updates the `PARKED` bit while keeping the lock.
    fn set_parked(&self, parked: bool) {
        let mut current = self.state.load(Ordering::Relaxed);

        loop {
            let desired = if parked { current | PARKED } else { current & !PARKED };
            if desired == current {
                return;
            }

            match self.state.compare_exchange_weak(
                current,
                desired,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let mut node = (*self.state.get_mut() & !FLAGS) as *const Waiter<T>;

        while !node.is_null() {
            // SAFETY: exclusive access; nodes left on the stack are still
            // owned by it.
            let waiter = unsafe { Arc::from_raw(node) };
            node = waiter.next.load(Ordering::Relaxed);
        }
    }
}

/// Promise returned by [`InterActivityMutex::acquire`] and
/// [`InterActivityMutex::acquire_when`].
///
/// Dropping it before it resolves withdraws the request.
pub struct Acquire<T> {
    mutex: Arc<Inner<T>>,
    predicate: Option<Predicate<T>>,
    waiter: Option<Arc<Waiter<T>>>,
    done: bool,
}

impl<T> Acquire<T> {
    fn new(mutex: Arc<Inner<T>>, predicate: Option<Predicate<T>>) -> Self {
        Self {
            mutex,
            predicate,
            waiter: None,
            done: false,
        }
    }

    fn lock(&mut self) -> Lock<T> {
        self.done = true;
        self.waiter = None;

        Lock {
            mutex: self.mutex.clone(),
            _not_sync: PhantomData,
        }
    }

    fn accepts_current(&self) -> bool {
        // SAFETY: only called while holding the lock.
        let value = unsafe { &*self.mutex.value.get() };
        self.predicate.as_ref().is_none_or(|predicate| predicate(value))
    }

    fn make_waiter(&mut self) -> Arc<Waiter<T>> {
        Arc::new(Waiter {
            predicate: self.predicate.take(),
            waker: Mutex::new(with_current(|activity| activity.make_owning_waker())),
            state: AtomicU8::new(WAITING),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Queues this request while holding the lock, then releases it so
    /// the unlock drain considers the request right away.
    fn park_holding_lock(&mut self, waiter: Arc<Waiter<T>>) -> Poll<Lock<T>> {
        let pushed = self.mutex.push_if_locked(Arc::into_raw(waiter.clone()));
        debug_assert!(pushed, "lock is held by this request");

        self.waiter = Some(waiter);
        self.mutex.unlock();
        self.poll_queued()
    }

    fn poll_queued(&mut self) -> Poll<Lock<T>> {
        let acquired = self
            .waiter
            .as_ref()
            .is_some_and(|waiter| waiter.state.load(Ordering::Acquire) == ACQUIRED);

        if acquired {
            return Poll::Ready(self.lock());
        }

        Poll::Pending
    }
}

impl<T> Promise for Acquire<T> {
    type Output = Lock<T>;

    fn poll(&mut self) -> Poll<Lock<T>> {
        assert!(!self.done, "mutex acquisition polled after completion");

        if self.waiter.is_some() {
            return self.poll_queued();
        }

        if self.mutex.try_lock() {
            if self.accepts_current() {
                return Poll::Ready(self.lock());
            }

            let waiter = self.make_waiter();
            return self.park_holding_lock(waiter);
        }

        let waiter = self.make_waiter();
        let node = Arc::into_raw(waiter.clone());

        loop {
            if self.mutex.push_if_locked(node) {
                self.waiter = Some(waiter);
                return self.poll_queued();
            }

            if self.mutex.try_lock() {
                // SAFETY: the node was never published.
                drop(unsafe { Arc::from_raw(node) });

                // SAFETY: the lock is held.
                if waiter.accepts(unsafe { &*self.mutex.value.get() }) {
                    return Poll::Ready(self.lock());
                }

                return self.park_holding_lock(waiter);
            }
        }
    }
}

impl<T> Drop for Acquire<T> {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter.take() else {
            return;
        };

        match waiter
            .state
            .compare_exchange(WAITING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                trace!("acquisition cancelled");
                drop(std::mem::take(&mut *waiter.waker.lock()));
            }
            // The lock was handed over concurrently; pass it on.
            Err(_) => self.mutex.unlock(),
        }
    }
}

/// Exclusive access to the value of an [`InterActivityMutex`].
///
/// Dropping the lock releases the mutex.
pub struct Lock<T> {
    mutex: Arc<Inner<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Drop for Lock<T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<T> Deref for Lock<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held for as long as `self` lives.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for Lock<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the lock is held for as long as `self` lives.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lock").field(&**self).finish()
    }
}

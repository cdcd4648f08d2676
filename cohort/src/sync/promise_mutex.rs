use super::IntraActivityWaiter;
use crate::promise::{Poll, Promise};

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A mutex for participants of a single activity.
///
/// Waiting participants are parked on an [`IntraActivityWaiter`], so
/// releasing the lock repolls them within the same poll round. Sharing a
/// `PromiseMutex` between different activities is memory safe but loses
/// wakeups; use [`InterActivityMutex`](super::InterActivityMutex) there.
///
/// Clones refer to the same mutex.
pub struct PromiseMutex<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    locked: AtomicBool,
    waiter: IntraActivityWaiter,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `locked`.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> PromiseMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                locked: AtomicBool::new(false),
                waiter: IntraActivityWaiter::new(),
                data: UnsafeCell::new(value),
            }),
        }
    }

    /// Returns a promise resolving to a lock once the mutex is free.
    pub fn acquire(&self) -> PromiseMutexAcquire<T> {
        PromiseMutexAcquire {
            inner: Some(self.inner.clone()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }
}

impl<T> Clone for PromiseMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for PromiseMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseMutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Promise returned by [`PromiseMutex::acquire`].
pub struct PromiseMutexAcquire<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Promise for PromiseMutexAcquire<T> {
    type Output = PromiseMutexLock<T>;

    fn poll(&mut self) -> Poll<PromiseMutexLock<T>> {
        let inner = self
            .inner
            .as_ref()
            .expect("mutex acquisition polled after completion");

        if inner.locked.swap(true, Ordering::Acquire) {
            return inner.waiter.pending();
        }

        Poll::Ready(PromiseMutexLock {
            inner: self.inner.take().expect("checked above"),
        })
    }
}

/// Exclusive access to the value of a [`PromiseMutex`].
///
/// Dropping the lock releases the mutex and repolls waiting
/// participants.
pub struct PromiseMutexLock<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Drop for PromiseMutexLock<T> {
    fn drop(&mut self) {
        self.inner.locked.store(false, Ordering::Release);
        self.inner.waiter.wake();
    }
}

impl<T> Deref for PromiseMutexLock<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held for as long as `self` lives.
        unsafe { &*self.inner.data.get() }
    }
}

impl<T> DerefMut for PromiseMutexLock<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the lock is held for as long as `self` lives.
        unsafe { &mut *self.inner.data.get() }
    }
}

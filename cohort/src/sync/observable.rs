use crate::activity::{Waker, with_current};
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A value that promises can watch for changes.
///
/// [`set`](Self::set) replaces the value and wakes every observer that
/// is currently waiting; [`next`](Self::next) and
/// [`next_when`](Self::next_when) return promises resolving once the
/// value is acceptable. Clones refer to the same value.
///
/// # Examples
///
/// ```rust,ignore
/// let state = Observable::new(ConnectivityState::Idle);
///
/// party.spawn("watch", {
///     let state = state.clone();
///     move || state.next_when(|s| *s == ConnectivityState::Ready)
/// }, |ready| debug!(?ready));
///
/// state.set(ConnectivityState::Ready);
/// ```
pub struct Observable<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    next_observer: AtomicU64,
}

struct State<T> {
    value: T,
    observers: HashMap<u64, Waker>,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    value,
                    observers: HashMap::new(),
                }),
                next_observer: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.shared.state.lock().value.clone()
    }

    /// Replaces the value and wakes every waiting observer.
    ///
    /// Wakeups are delivered after the internal lock is released, so an
    /// observer running inline may call back into the observable.
    pub fn set(&self, value: T) {
        let woken: Vec<Waker> = {
            let mut state = self.shared.state.lock();
            state.value = value;
            state.observers.drain().map(|(_, waker)| waker).collect()
        };

        for mut waker in woken {
            waker.wakeup();
        }
    }

    /// Returns a promise resolving to the first value different from
    /// `current`.
    pub fn next(&self, current: T) -> Observer<T>
    where
        T: PartialEq + Send + 'static,
    {
        self.next_when(move |value| *value != current)
    }

    /// Returns a promise resolving to the first value accepted by
    /// `predicate`, which may be the current one.
    pub fn next_when<F>(&self, predicate: F) -> Observer<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        Observer {
            shared: self.shared.clone(),
            id: self.shared.next_observer.fetch_add(1, Ordering::Relaxed),
            predicate: Box::new(predicate),
            saw_pending: false,
        }
    }

    /// Number of observers currently waiting.
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().observers.len()
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Observable")
            .field("value", &state.value)
            .field("waiting", &state.observers.len())
            .finish()
    }
}

/// Promise returned by [`Observable::next`] and
/// [`Observable::next_when`].
///
/// Registers with the observable only once it has returned `Pending`,
/// and unregisters when it resolves or is dropped.
pub struct Observer<T> {
    shared: Arc<Shared<T>>,
    id: u64,
    predicate: Box<dyn FnMut(&T) -> bool + Send>,
    saw_pending: bool,
}

impl<T: Clone> Promise for Observer<T> {
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        let mut state = self.shared.state.lock();

        if (self.predicate)(&state.value) {
            if self.saw_pending {
                state.observers.remove(&self.id);
                self.saw_pending = false;
            }
            return Poll::Ready(state.value.clone());
        }

        let waker = with_current(|activity| activity.make_non_owning_waker());
        state.observers.insert(self.id, waker);
        self.saw_pending = true;

        Poll::Pending
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        if self.saw_pending {
            let waker = self.shared.state.lock().observers.remove(&self.id);
            drop(waker);
        }
    }
}

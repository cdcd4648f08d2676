use crate::activity::{Waker, with_current};
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::sync::Arc;

/// Bridges a single-shot callback API into a promise.
///
/// ```rust,ignore
/// let bridge = WaitForCallback::new();
/// legacy_resolver.start(bridge.make_callback());
/// let resolved = bridge.make_wait_promise();
/// ```
#[derive(Debug, Default, Clone)]
pub struct WaitForCallback {
    state: Arc<Mutex<CallbackState>>,
}

#[derive(Debug, Default)]
struct CallbackState {
    done: bool,
    waker: Waker,
}

impl WaitForCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the callback to hand to the legacy API.
    ///
    /// Invoking it marks the wait as done and wakes the waiting promise.
    pub fn make_callback(&self) -> impl FnOnce() + Send + 'static {
        let state = self.state.clone();

        move || {
            let mut waker = {
                let mut state = state.lock();
                state.done = true;
                std::mem::take(&mut state.waker)
            };
            waker.wakeup();
        }
    }

    /// Returns a promise resolving once the callback has been invoked.
    pub fn make_wait_promise(&self) -> impl Promise<Output = ()> + Send + 'static + use<> {
        let state = self.state.clone();

        move || {
            let mut state = state.lock();
            if state.done {
                return Poll::Ready(());
            }

            state.waker = with_current(|activity| activity.make_owning_waker());
            Poll::Pending
        }
    }
}

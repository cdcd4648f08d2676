use crate::activity::{self, Waker};
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, RawWaker, RawWakerVTable};

/// Adapts a [`Future`] so it can run as a promise inside an activity.
///
/// Each poll lends the future a `std::task::Waker` that forwards to an
/// owning waker of the current activity, so `wake()` calls from the
/// future's side reach the executor that polls it.
pub struct FuturePromise<F> {
    future: Pin<Box<F>>,
}

/// Wraps `future` into a promise.
///
/// # Panics
///
/// Polling the returned promise outside of an activity panics.
pub fn from_future<F: Future>(future: F) -> FuturePromise<F> {
    FuturePromise {
        future: Box::pin(future),
    }
}

impl<F: Future> Promise for FuturePromise<F> {
    type Output = F::Output;

    fn poll(&mut self) -> Poll<F::Output> {
        let waker = activity::with_current(|current| current.make_owning_waker());
        let std_waker = bridge_waker(Arc::new(WakerBridge {
            waker: Mutex::new(waker),
        }));

        let mut cx = Context::from_waker(&std_waker);
        self.future.as_mut().poll(&mut cx)
    }
}

/// Shared state behind a bridged `std::task::Waker`.
///
/// A std waker may be woken any number of times, while a [`Waker`]
/// delivers exactly one wakeup; every wake therefore fires a clone.
struct WakerBridge {
    waker: Mutex<Waker>,
}

impl WakerBridge {
    fn wake(&self) {
        let mut waker = self.waker.lock().clone();
        waker.wakeup();
    }
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Builds a `std::task::Waker` backed by an `Arc<WakerBridge>`.
///
/// The pointer stored inside the `RawWaker` originates from
/// `Arc::into_raw` and every vtable entry keeps the reference count
/// balanced.
fn bridge_waker(bridge: Arc<WakerBridge>) -> std::task::Waker {
    unsafe {
        std::task::Waker::from_raw(RawWaker::new(
            Arc::into_raw(bridge) as *const (),
            &VTABLE,
        ))
    }
}

fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::<WakerBridge>::from_raw(ptr as *const WakerBridge) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<WakerBridge>::from_raw(ptr as *const WakerBridge) };
    arc.wake();
}

fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<WakerBridge>::from_raw(ptr as *const WakerBridge) };
    arc.wake();
    mem::forget(arc);
}

fn drop_raw(ptr: *const ()) {
    drop(unsafe { Arc::<WakerBridge>::from_raw(ptr as *const WakerBridge) });
}

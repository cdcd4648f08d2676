//! Synchronization primitives built on wakers.
//!
//! None of these block a thread: a promise that cannot proceed registers
//! a waker and returns `Pending`. Each primitive guards its own
//! bookkeeping with a short critical section and relies on activities
//! only for wakeup delivery.
//!
//! | primitive                  | scope                                   |
//! |----------------------------|-----------------------------------------|
//! | [`IntraActivityWaiter`]    | participants of one activity            |
//! | [`PromiseMutex`]           | participants of one activity            |
//! | [`InterActivityMutex`]     | any activities, with predicates         |
//! | [`Observable`]             | any activities, value change broadcast  |
//! | [`WaitSet`]/[`SingleWaiter`] | building block for custom primitives  |
//! | [`WaitForCallback`]        | adapting callback-based APIs            |

mod inter_activity_mutex;
mod intra_activity_waiter;
mod observable;
mod promise_mutex;
mod wait_for_callback;
mod wait_set;

pub use inter_activity_mutex::{Acquire, InterActivityMutex, Lock};
pub use intra_activity_waiter::IntraActivityWaiter;
pub use observable::{Observable, Observer};
pub use promise_mutex::{PromiseMutex, PromiseMutexAcquire, PromiseMutexLock};
pub use wait_for_callback::WaitForCallback;
pub use wait_set::{SingleWaiter, WaitSet, WakeupSet, wake_all_and_unlock, wake_and_unlock};

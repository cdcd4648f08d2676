//! Activities: executors that drive promises to completion.
//!
//! An activity owns a promise and polls it under its own lock until the
//! promise resolves or the activity is cancelled. Promises that cannot
//! make progress obtain a [`Waker`] from the current activity (see
//! [`with_current`]) before returning `Poll::Pending`; waking it later
//! schedules another poll round.
//!
//! Two kinds of wakers exist:
//! - **owning** wakers keep the activity alive until they are consumed,
//! - **non-owning** wakers reach the activity through a shared
//!   [`Handle`] and turn into no-ops once it has finished.
//!
//! The same [`Activity`] interface is implemented by
//! [`Party`](crate::party::Party), which multiplexes several
//! participants over one activity.

mod context;
mod handle;
mod promise_activity;
mod scheduler;
mod waker;

pub use context::{
    ScopedActivity, has_current, is_current, is_running_here, try_with_current, with_current,
};
pub use handle::Handle;
pub use promise_activity::{ActivityBuilder, ActivityPtr, make_activity};
pub use scheduler::{Callback, CallbackScheduler, InlineScheduler};
pub use waker::{Wakeable, Waker, WakeupMask};

/// The interface promises use to talk to the executor polling them.
pub trait Activity: Send + Sync {
    /// Requests another poll of the participants in `mask` before the
    /// current poll round ends.
    ///
    /// Only meaningful while this activity is being polled.
    fn force_immediate_repoll_mask(&self, mask: WakeupMask);

    /// Requests another poll of the participant currently being polled.
    fn force_immediate_repoll(&self) {
        self.force_immediate_repoll_mask(self.current_participant());
    }

    /// The wakeup mask of the participant currently being polled.
    ///
    /// Single-promise activities report a constant non-zero mask.
    fn current_participant(&self) -> WakeupMask {
        1
    }

    /// A waker that keeps this activity alive until it is used.
    fn make_owning_waker(&self) -> Waker;

    /// A waker that does not keep this activity alive.
    fn make_non_owning_waker(&self) -> Waker;

    fn debug_tag(&self) -> String;
}

use super::Activity;

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

thread_local! {
    /// Activities being polled on this thread, innermost last.
    ///
    /// Each entry is pushed by a [`ScopedActivity`] for the duration of a
    /// poll, so promises can reach their executor without explicit
    /// parameter passing. Entries below the top belong to activities
    /// whose poll synchronously woke, and ran, another executor.
    static ACTIVITY_STACK: RefCell<Vec<NonNull<dyn Activity>>> = const { RefCell::new(Vec::new()) };
}

/// Installs an activity as the current one for this thread.
///
/// The previous activity (if any) becomes current again when the guard
/// is dropped, so activities started from inside another activity's poll
/// nest correctly.
pub struct ScopedActivity<'a> {
    _activity: PhantomData<&'a (dyn Activity + 'static)>,
}

impl<'a> ScopedActivity<'a> {
    pub fn new(activity: &'a (dyn Activity + 'static)) -> Self {
        ACTIVITY_STACK.with(|stack| stack.borrow_mut().push(NonNull::from(activity)));

        Self {
            _activity: PhantomData,
        }
    }
}

impl Drop for ScopedActivity<'_> {
    fn drop(&mut self) {
        ACTIVITY_STACK.with(|stack| stack.borrow_mut().pop());
    }
}

/// Runs `f` with the activity currently being polled on this thread.
///
/// # Panics
///
/// Panics if no activity is current, which means a promise that needs
/// to suspend was polled outside of any executor.
pub fn with_current<R>(f: impl FnOnce(&dyn Activity) -> R) -> R {
    try_with_current(f).expect("promise polled outside of an activity")
}

/// Runs `f` with the current activity, or returns `None` if there is none.
pub fn try_with_current<R>(f: impl FnOnce(&dyn Activity) -> R) -> Option<R> {
    let current = ACTIVITY_STACK.with(|stack| stack.borrow().last().copied())?;

    // The pointer was pushed by a `ScopedActivity` that is still alive
    // further up this thread's stack, which borrows the activity for at
    // least as long.
    let activity = unsafe { current.as_ref() };

    Some(f(activity))
}

/// Returns `true` if an activity is being polled on this thread.
pub fn has_current() -> bool {
    ACTIVITY_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Returns `true` if `activity` is the one being polled on this thread.
pub fn is_current(activity: &(dyn Activity + 'static)) -> bool {
    let target = activity as *const (dyn Activity + 'static);

    ACTIVITY_STACK.with(|stack| {
        stack
            .borrow()
            .last()
            .is_some_and(|current| std::ptr::addr_eq(current.as_ptr(), target))
    })
}

/// Returns `true` if `activity` is being polled anywhere on this thread,
/// either as the current activity or further down the stack.
///
/// An executor found here is mid-poll on this very thread: re-entering
/// it would deadlock, so wakeups and cancellations must be recorded for
/// it to act on once its poll returns.
pub fn is_running_here(activity: &(dyn Activity + 'static)) -> bool {
    let target = activity as *const (dyn Activity + 'static);

    ACTIVITY_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .any(|running| std::ptr::addr_eq(running.as_ptr(), target))
    })
}

use super::context::{self, ScopedActivity};
use super::handle::Handle;
use super::scheduler::{CallbackScheduler, InlineScheduler};
use super::waker::{Wakeable, Waker, WakeupMask};
use super::Activity;
use crate::error::Cancelled;
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

static NEXT_ACTIVITY_ID: AtomicU64 = AtomicU64::new(1);

/// Builder for configuring and creating an activity.
///
/// # Examples
///
/// ```rust,ignore
/// let activity = ActivityBuilder::new()
///     .name("resolver")
///     .scheduler(engine.scheduler())
///     .spawn(|| make_promise(), |result| println!("{result:?}"));
/// ```
pub struct ActivityBuilder {
    /// Name used in logs; generated when not set.
    name: Option<String>,

    /// Where wakeups coming from outside the activity are run.
    scheduler: Arc<dyn CallbackScheduler>,
}

impl ActivityBuilder {
    /// Creates a builder with an inline scheduler and a generated name.
    pub fn new() -> Self {
        Self {
            name: None,
            scheduler: Arc::new(InlineScheduler),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the scheduler used to run wakeups.
    pub fn scheduler(mut self, scheduler: Arc<dyn CallbackScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Creates the activity without polling it.
    ///
    /// `factory` is stored and only invoked by [`ActivityPtr::start`],
    /// from inside the activity's context, so wakers created while the
    /// promise is being built are already valid. `on_done` is invoked
    /// exactly once: with the promise's result, or with [`Cancelled`].
    pub fn build<F, P, D>(self, factory: F, on_done: D) -> ActivityPtr
    where
        F: FnOnce() -> P + Send + 'static,
        P: Promise + Send + 'static,
        P::Output: 'static,
        D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
    {
        let name = self
            .name
            .unwrap_or_else(|| format!("activity-{}", NEXT_ACTIVITY_ID.fetch_add(1, Ordering::Relaxed)));

        let inner = Arc::new_cyclic(|self_ref| PromiseActivity {
            self_ref: self_ref.clone(),
            name,
            scheduler: self.scheduler,
            state: Mutex::new(ActivityState {
                stage: Stage::Unstarted(factory),
                on_done: Some(on_done),
            }),
            got_wakeup_during_run: AtomicBool::new(false),
            cancel_during_run: AtomicBool::new(false),
            wakeup_scheduled: AtomicBool::new(false),
            handle: Mutex::new(None),
        });

        ActivityPtr { inner }
    }

    /// Creates the activity and performs its first poll.
    pub fn spawn<F, P, D>(self, factory: F, on_done: D) -> ActivityPtr
    where
        F: FnOnce() -> P + Send + 'static,
        P: Promise + Send + 'static,
        P::Output: 'static,
        D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
    {
        let activity = self.build(factory, on_done);
        activity.start();
        activity
    }
}

impl Default for ActivityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates and starts an activity running the promise built by `factory`.
///
/// Wakeups from outside the activity are routed through `scheduler`.
pub fn make_activity<F, P, D>(
    factory: F,
    scheduler: Arc<dyn CallbackScheduler>,
    on_done: D,
) -> ActivityPtr
where
    F: FnOnce() -> P + Send + 'static,
    P: Promise + Send + 'static,
    P::Output: 'static,
    D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
{
    ActivityBuilder::new().scheduler(scheduler).spawn(factory, on_done)
}

/// Owner of an activity.
///
/// Dropping the owner cancels the activity if it has not completed yet.
/// Wakers may keep the activity's memory alive longer, but a cancelled
/// activity never polls again.
pub struct ActivityPtr {
    inner: Arc<dyn ActivityControl>,
}

impl ActivityPtr {
    /// Performs the first poll.
    ///
    /// # Panics
    ///
    /// Panics if the activity was already started.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Cancels the activity.
    ///
    /// If the activity has not completed, its promise is dropped and the
    /// completion callback receives [`Cancelled`] before this returns.
    /// Calling it again does nothing.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Delivers a wakeup as if an owning waker had fired.
    pub fn force_wakeup(&self) {
        self.inner.make_owning_waker().wakeup();
    }

    pub fn debug_tag(&self) -> String {
        self.inner.debug_tag()
    }
}

impl Drop for ActivityPtr {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

/// Lifecycle operations reserved for the owner.
trait ActivityControl: Activity {
    fn start(&self);
    fn cancel(&self);
}

enum Stage<F, P> {
    /// Built but not started: the promise factory has not run yet.
    Unstarted(F),

    Running(P),

    /// Completed or cancelled; the promise has been dropped.
    Done,
}

struct ActivityState<F, P, D> {
    stage: Stage<F, P>,
    on_done: Option<D>,
}

/// The concrete activity: one promise, one lock.
struct PromiseActivity<F, P, D> {
    self_ref: Weak<Self>,
    name: String,
    scheduler: Arc<dyn CallbackScheduler>,

    /// Promise state, held for the whole duration of a poll round.
    state: Mutex<ActivityState<F, P, D>>,

    /// Set when the promise wakes its own activity while being polled.
    got_wakeup_during_run: AtomicBool,

    /// Set when the activity is cancelled from inside its own poll.
    cancel_during_run: AtomicBool,

    /// Coalesces wakeups already handed to the scheduler.
    wakeup_scheduled: AtomicBool,

    /// Created on the first request for a non-owning waker.
    handle: Mutex<Option<Arc<Handle>>>,
}

impl<F, P, D> PromiseActivity<F, P, D>
where
    F: FnOnce() -> P + Send + 'static,
    P: Promise + Send + 'static,
    P::Output: 'static,
    D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
{
    /// Re-polls the promise after a wakeup.
    fn step(&self) {
        let completion = {
            let mut state = self.state.lock();
            if !matches!(state.stage, Stage::Running(_)) {
                return;
            }

            self.step_loop(&mut state)
                .map(|result| (self.mark_done(&mut state), result))
        };

        if let Some((on_done, result)) = completion {
            self.notify(on_done, result);
        }
    }

    /// Polls until the promise resolves, is cancelled, or stops asking
    /// to be repolled.
    fn step_loop(
        &self,
        state: &mut ActivityState<F, P, D>,
    ) -> Option<Result<P::Output, Cancelled>> {
        let _scope = ScopedActivity::new(self);

        loop {
            let Stage::Running(promise) = &mut state.stage else {
                return None;
            };

            self.got_wakeup_during_run.store(false, Ordering::Relaxed);

            if let Poll::Ready(value) = promise.poll() {
                state.stage = Stage::Done;
                self.cancel_during_run.store(false, Ordering::Relaxed);
                return Some(Ok(value));
            }

            if self.cancel_during_run.swap(false, Ordering::AcqRel) {
                state.stage = Stage::Done;
                return Some(Err(Cancelled));
            }

            if !self.got_wakeup_during_run.swap(false, Ordering::AcqRel) {
                return None;
            }
        }
    }

    /// Severs the handle and claims the completion callback.
    ///
    /// Must be called with the state lock held, after the stage moved to
    /// `Done`.
    fn mark_done(&self, state: &mut ActivityState<F, P, D>) -> Option<D> {
        if let Some(handle) = self.handle.lock().take() {
            handle.drop_activity();
        }

        state.on_done.take()
    }

    fn notify(&self, on_done: Option<D>, result: Result<P::Output, Cancelled>) {
        match &result {
            Ok(_) => debug!(activity = %self.name, "completed"),
            Err(_) => debug!(activity = %self.name, "cancelled"),
        }

        if let Some(on_done) = on_done {
            on_done(result);
        }
    }

    fn schedule_step(self: Arc<Self>) {
        // Mid-poll somewhere up this thread's stack: the poll loop picks
        // the wakeup up once control returns to it.
        if context::is_running_here(&*self) {
            self.got_wakeup_during_run.store(true, Ordering::Release);
            return;
        }

        if self.wakeup_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let scheduler = self.scheduler.clone();
        scheduler.schedule(Box::new(move || {
            self.wakeup_scheduled.store(false, Ordering::Release);
            self.step();
        }));
    }
}

impl<F, P, D> ActivityControl for PromiseActivity<F, P, D>
where
    F: FnOnce() -> P + Send + 'static,
    P: Promise + Send + 'static,
    P::Output: 'static,
    D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
{
    fn start(&self) {
        let completion = {
            let mut state = self.state.lock();

            match state.stage {
                Stage::Unstarted(_) => {}
                Stage::Running(_) => panic!("activity `{}` started twice", self.name),
                // Cancelled before it ever ran.
                Stage::Done => return,
            }

            let Stage::Unstarted(factory) = mem::replace(&mut state.stage, Stage::Done) else {
                unreachable!()
            };

            debug!(activity = %self.name, "starting");

            {
                let _scope = ScopedActivity::new(self);
                state.stage = Stage::Running(factory());
            }

            self.step_loop(&mut state)
                .map(|result| (self.mark_done(&mut state), result))
        };

        if let Some((on_done, result)) = completion {
            self.notify(on_done, result);
        }
    }

    fn cancel(&self) {
        if context::is_running_here(self) {
            self.cancel_during_run.store(true, Ordering::Release);
            return;
        }

        let on_done = {
            let mut state = self.state.lock();
            if matches!(state.stage, Stage::Done) {
                return;
            }

            {
                let _scope = ScopedActivity::new(self);
                state.stage = Stage::Done;
            }

            self.mark_done(&mut state)
        };

        self.notify(on_done, Err(Cancelled));
    }
}

impl<F, P, D> Activity for PromiseActivity<F, P, D>
where
    F: FnOnce() -> P + Send + 'static,
    P: Promise + Send + 'static,
    P::Output: 'static,
    D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
{
    fn force_immediate_repoll_mask(&self, _mask: WakeupMask) {
        debug_assert!(context::is_current(self));
        self.got_wakeup_during_run.store(true, Ordering::Release);
    }

    fn make_owning_waker(&self) -> Waker {
        match self.self_ref.upgrade() {
            Some(this) => Waker::new(this, 0),
            None => Waker::unwakeable(),
        }
    }

    fn make_non_owning_waker(&self) -> Waker {
        let handle = self
            .handle
            .lock()
            .get_or_insert_with(|| Handle::new(self.self_ref.clone()))
            .clone();

        Waker::new(handle, 0)
    }

    fn debug_tag(&self) -> String {
        self.name.clone()
    }
}

impl<F, P, D> Wakeable for PromiseActivity<F, P, D>
where
    F: FnOnce() -> P + Send + 'static,
    P: Promise + Send + 'static,
    P::Output: 'static,
    D: FnOnce(Result<P::Output, Cancelled>) + Send + 'static,
{
    fn wakeup(self: Arc<Self>, _mask: WakeupMask) {
        self.schedule_step();
    }

    fn wakeup_async(self: Arc<Self>, _mask: WakeupMask) {
        self.schedule_step();
    }

    fn drop_wakeable(self: Arc<Self>, _mask: WakeupMask) {}

    fn debug_tag(&self) -> String {
        self.name.clone()
    }
}

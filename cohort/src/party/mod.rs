//! Parties: one executor, many participants.
//!
//! A [`Party`] multiplexes up to [`MAX_PARTICIPANTS`] promises over a
//! single activity. All scheduling state lives in one atomic word (see
//! [`state`]); whichever thread sets the `locked` bit becomes the runner
//! and keeps sweeping the woken slots until it can release the lock with
//! no pending wakeups. A wakeup that lands while a sweep is in progress
//! makes the final release CAS fail, so it is never lost.
//!
//! # Examples
//!
//! ```rust,ignore
//! let party = PartyBuilder::new("connection").build();
//!
//! party.spawn("reader", || read_frames(), |frames| trace!(?frames));
//! party.spawn("writer", || flush_queue(), |_| {});
//! ```

mod participant;
mod state;

pub use participant::ParticipantResult;
pub use state::MAX_PARTICIPANTS;

use participant::{Participant, PromiseParticipant};
use state::{
    ALLOCATED_MASK, ALLOCATED_SHIFT, DESTROYING, Describe, LOCKED, ONE_REF, PartyState,
    WAKEUP_MASK, allocated_bit, refs, slot_mask,
};

use crate::activity::{
    Activity, CallbackScheduler, Handle, InlineScheduler, ScopedActivity, Wakeable, Waker,
    WakeupMask,
};
use crate::error::{Error, Result};
use crate::promise::Promise;

use parking_lot::Mutex;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

static NEXT_PARTY_ID: AtomicU64 = AtomicU64::new(1);

const NOT_POLLING: u8 = u8::MAX;

/// A participant slot holds a thin pointer to a boxed trait object.
type Slot = Box<dyn Participant>;

/// Builder for configuring and creating a party.
pub struct PartyBuilder {
    name: String,
    scheduler: Arc<dyn CallbackScheduler>,
}

impl PartyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scheduler: Arc::new(InlineScheduler),
        }
    }

    /// Sets the scheduler used by [`Waker::wakeup_async`].
    pub fn scheduler(mut self, scheduler: Arc<dyn CallbackScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> Party {
        let name = format!("{}#{}", self.name, NEXT_PARTY_ID.fetch_add(1, Ordering::Relaxed));
        debug!(party = %name, "created");

        let inner = Arc::new_cyclic(|self_ref| PartyInner {
            self_ref: self_ref.clone(),
            name,
            state: PartyState::new(1),
            slots: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            currently_polling: AtomicU8::new(NOT_POLLING),
            scheduler: self.scheduler,
            handle: Mutex::new(None),
        });

        Party { inner }
    }
}

/// A counted reference to a party.
///
/// Cloning takes a reference, dropping releases one. When the last
/// reference (including those held by owning wakers) goes away, every
/// remaining participant is destroyed without its completion callback
/// being invoked.
pub struct Party {
    inner: Arc<PartyInner>,
}

impl Party {
    /// Shorthand for `PartyBuilder::new(name).build()`.
    pub fn new(name: impl Into<String>) -> Self {
        PartyBuilder::new(name).build()
    }

    /// Adds a participant and polls it if the party is idle.
    ///
    /// `factory` is invoked on the participant's first poll, from inside
    /// the party. `on_complete` receives the promise's result; it is not
    /// called if the party is destroyed first.
    ///
    /// # Panics
    ///
    /// Panics if all [`MAX_PARTICIPANTS`] slots are in use. Use
    /// [`try_spawn`](Self::try_spawn) to handle that case.
    pub fn spawn<F, P, C>(&self, name: impl Into<String>, factory: F, on_complete: C)
    where
        F: FnOnce() -> P + Send + 'static,
        P: Promise + Send + 'static,
        C: FnOnce(P::Output) + Send + 'static,
    {
        if let Err(err) = self.try_spawn(name, factory, on_complete) {
            panic!("{err}");
        }
    }

    /// Like [`spawn`](Self::spawn), but refuses instead of panicking when
    /// the party is full.
    ///
    /// The factory and callback are dropped unused on refusal.
    pub fn try_spawn<F, P, C>(
        &self,
        name: impl Into<String>,
        factory: F,
        on_complete: C,
    ) -> Result<()>
    where
        F: FnOnce() -> P + Send + 'static,
        P: Promise + Send + 'static,
        C: FnOnce(P::Output) + Send + 'static,
    {
        let participant = PromiseParticipant::new(name.into(), factory, on_complete);
        self.inner.add_participant(Box::new(participant))
    }

    /// Spawns a participant and returns a promise for its result.
    ///
    /// The returned promise may be polled from any activity, including a
    /// participant of the same party.
    ///
    /// # Panics
    ///
    /// Panics if the party is full.
    pub fn spawn_waitable<F, P>(
        &self,
        name: impl Into<String>,
        factory: F,
    ) -> ParticipantResult<P::Output>
    where
        F: FnOnce() -> P + Send + 'static,
        P: Promise + Send + 'static,
        P::Output: Send + 'static,
    {
        let (sender, result) = participant::completion();
        self.spawn(name, factory, move |value| sender.send(value));
        result
    }

    /// Number of occupied participant slots.
    pub fn participants(&self) -> usize {
        ((self.inner.state.load() & ALLOCATED_MASK) >> ALLOCATED_SHIFT).count_ones() as usize
    }

    pub fn debug_tag(&self) -> String {
        self.inner.name.clone()
    }

    /// A waker for the whole party, usable from outside it.
    ///
    /// Waking it repolls every participant.
    pub fn make_waker(&self) -> Waker {
        self.inner.state.fetch_add_ref();
        Waker::new(self.inner.clone(), WAKEUP_MASK as WakeupMask)
    }
}

impl Clone for Party {
    fn clone(&self) -> Self {
        self.inner.state.fetch_add_ref();
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for Party {
    fn drop(&mut self) {
        self.inner.unref();
    }
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Party")
            .field("name", &self.inner.name)
            .field("state", &format_args!("{}", Describe(self.inner.state.load())))
            .finish()
    }
}

struct PartyInner {
    self_ref: Weak<PartyInner>,
    name: String,
    state: PartyState,

    /// Participant storage. A slot is written once by the spawner that
    /// allocated it; the participant behind it is only ever touched by
    /// the lock holder.
    slots: [AtomicPtr<Slot>; MAX_PARTICIPANTS],

    /// Index of the slot being polled, or `NOT_POLLING`.
    currently_polling: AtomicU8,

    scheduler: Arc<dyn CallbackScheduler>,

    /// Created on the first request for a non-owning waker.
    handle: Mutex<Option<Arc<Handle>>>,
}

impl PartyInner {
    fn add_participant(&self, participant: Slot) -> Result<()> {
        let mut current = self.state.load();

        let index = loop {
            let allocated = (current & ALLOCATED_MASK) >> ALLOCATED_SHIFT;
            let free = !allocated & WAKEUP_MASK;

            if free == 0 {
                warn!(party = %self.name, participant = participant.name(), "party is full");
                return Err(Error::PartyFull {
                    party: self.name.clone(),
                    capacity: MAX_PARTICIPANTS,
                });
            }

            let index = free.trailing_zeros() as usize;
            match self
                .state
                .compare_exchange(current, (current | allocated_bit(index)) + ONE_REF)
            {
                Ok(_) => break index,
                Err(actual) => current = actual,
            }
        };

        debug!(party = %self.name, participant = participant.name(), slot = index, "spawned");

        let raw = Box::into_raw(Box::new(participant));
        self.slots[index].store(raw, Ordering::Release);

        // Consumes the reference taken together with the slot.
        self.wake(slot_mask(index));
        Ok(())
    }

    /// Wakes the participants in `mask` and releases one reference.
    fn wake(&self, mask: WakeupMask) {
        let prev = self.state.fetch_or(mask as u64 | LOCKED);
        trace!(party = %self.name, mask = format_args!("{mask:#06x}"), state = %Describe(prev), "wakeup");

        if prev & LOCKED == 0 {
            self.run_locked();
        }

        self.unref();
    }

    fn unref(&self) {
        let prev = self.state.fetch_sub_ref();
        trace!(party = %self.name, state = %Describe(prev), "unref");

        if refs(prev) != 1 {
            return;
        }

        // Every runner holds a reference for its whole sweep, so the lock
        // is free once the count reaches zero.
        let prev = self.state.fetch_or(DESTROYING | LOCKED);
        debug_assert_eq!(prev & LOCKED, 0, "party destroyed while running");
        self.party_over();
    }

    /// Sweeps woken participants until the lock can be released.
    ///
    /// The caller set the `locked` bit and holds a reference until this
    /// returns, so the party cannot be destroyed underneath the sweep.
    fn run_locked(&self) {
        let _scope = ScopedActivity::new(self);

        loop {
            let wakeups = self.state.fetch_and(!WAKEUP_MASK) & WAKEUP_MASK;
            trace!(party = %self.name, wakeups = format_args!("{wakeups:#06x}"), "poll round");

            for index in 0..MAX_PARTICIPANTS {
                if wakeups & slot_mask(index) as u64 != 0 {
                    self.poll_slot(index);
                }
            }

            let mut current = self.state.load();
            while current & WAKEUP_MASK == 0 {
                match self.state.compare_exchange(current, current & !LOCKED) {
                    Ok(_) => {
                        trace!(party = %self.name, "unlocked");
                        return;
                    }
                    Err(actual) => current = actual,
                }
            }
        }
    }

    fn poll_slot(&self, index: usize) {
        let raw = self.slots[index].load(Ordering::Acquire);
        if raw.is_null() {
            // Completed earlier in this sweep or never stored yet.
            return;
        }

        self.currently_polling.store(index as u8, Ordering::Relaxed);

        // SAFETY: non-null slots hold a pointer from `Box::into_raw` and
        // only the lock holder dereferences or frees it.
        let done = unsafe { (*raw).poll_participant() };

        self.currently_polling.store(NOT_POLLING, Ordering::Relaxed);

        if done {
            self.slots[index].store(ptr::null_mut(), Ordering::Release);
            // SAFETY: the slot no longer refers to the participant.
            drop(unsafe { Box::from_raw(raw) });
            self.state.fetch_and(!allocated_bit(index));
        }
    }

    /// Destroys every remaining participant. The lock is never released.
    fn party_over(&self) {
        debug!(party = %self.name, "destroying remaining participants");

        if let Some(handle) = self.handle.lock().take() {
            handle.drop_activity();
        }

        let _scope = ScopedActivity::new(self);

        for slot in &self.slots {
            let raw = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !raw.is_null() {
                // SAFETY: see `poll_slot`.
                let participant = unsafe { Box::from_raw(raw) };
                trace!(party = %self.name, participant = participant.name(), "destroyed");
                drop(participant);
            }
        }
    }

    fn polling_mask(&self) -> WakeupMask {
        match self.currently_polling.load(Ordering::Relaxed) {
            NOT_POLLING => WAKEUP_MASK as WakeupMask,
            index => slot_mask(index as usize),
        }
    }
}

impl Drop for PartyInner {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            let raw = *slot.get_mut();
            if !raw.is_null() {
                // SAFETY: exclusive access during drop.
                drop(unsafe { Box::from_raw(raw) });
            }
        }
    }
}

impl Activity for PartyInner {
    fn force_immediate_repoll_mask(&self, mask: WakeupMask) {
        self.state.fetch_or(mask as u64);
    }

    fn current_participant(&self) -> WakeupMask {
        self.polling_mask()
    }

    fn make_owning_waker(&self) -> Waker {
        match self.self_ref.upgrade() {
            Some(this) => {
                self.state.fetch_add_ref();
                Waker::new(this, self.polling_mask())
            }
            None => Waker::unwakeable(),
        }
    }

    fn make_non_owning_waker(&self) -> Waker {
        let handle = self
            .handle
            .lock()
            .get_or_insert_with(|| Handle::new(self.self_ref.clone()))
            .clone();

        Waker::new(handle, self.polling_mask())
    }

    fn debug_tag(&self) -> String {
        self.name.clone()
    }
}

impl Wakeable for PartyInner {
    fn wakeup(self: Arc<Self>, mask: WakeupMask) {
        self.wake(mask);
    }

    fn wakeup_async(self: Arc<Self>, mask: WakeupMask) {
        let scheduler = self.scheduler.clone();
        scheduler.schedule(Box::new(move || self.wake(mask)));
    }

    fn drop_wakeable(self: Arc<Self>, _mask: WakeupMask) {
        self.unref();
    }

    fn acquire(&self) {
        self.state.fetch_add_ref();
    }

    fn try_acquire(&self) -> bool {
        self.state.ref_if_nonzero()
    }

    fn debug_tag(&self) -> String {
        self.name.clone()
    }
}

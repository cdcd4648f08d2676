use crate::activity::{Waker, with_current};
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// One unit of work living in a party slot.
///
/// Dropping a participant destroys it; the party only does that with its
/// lock held and the party installed as the current activity.
pub(crate) trait Participant: Send {
    fn name(&self) -> &str;

    /// Polls the participant once.
    ///
    /// Returns `true` once it has completed and must not be polled again.
    fn poll_participant(&mut self) -> bool;
}

enum Stage<F, P> {
    Unstarted(F),
    Running(P),
    Finished,
}

/// A participant built from a promise factory and a completion callback.
///
/// The factory runs on the first poll, inside the party.
pub(crate) struct PromiseParticipant<F, P, C> {
    name: String,
    stage: Stage<F, P>,
    on_complete: Option<C>,
}

impl<F, P, C> PromiseParticipant<F, P, C>
where
    F: FnOnce() -> P,
    P: Promise,
    C: FnOnce(P::Output),
{
    pub(crate) fn new(name: String, factory: F, on_complete: C) -> Self {
        Self {
            name,
            stage: Stage::Unstarted(factory),
            on_complete: Some(on_complete),
        }
    }
}

impl<F, P, C> Participant for PromiseParticipant<F, P, C>
where
    F: FnOnce() -> P + Send,
    P: Promise + Send,
    C: FnOnce(P::Output) + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_participant(&mut self) -> bool {
        if let Stage::Unstarted(_) = self.stage {
            let Stage::Unstarted(factory) = std::mem::replace(&mut self.stage, Stage::Finished)
            else {
                unreachable!()
            };
            self.stage = Stage::Running(factory());
        }

        let Stage::Running(promise) = &mut self.stage else {
            panic!("participant `{}` polled after completion", self.name);
        };

        match promise.poll() {
            Poll::Pending => false,
            Poll::Ready(value) => {
                self.stage = Stage::Finished;
                debug!(participant = %self.name, "completed");

                if let Some(on_complete) = self.on_complete.take() {
                    on_complete(value);
                }
                true
            }
        }
    }
}

/// Result slot shared between a waitable participant and its waiter.
struct Completion<T> {
    value: Option<T>,
    waker: Waker,
}

/// Completion side of [`Party::spawn_waitable`](super::Party::spawn_waitable).
pub(crate) struct CompletionSender<T> {
    shared: Arc<Mutex<Completion<T>>>,
}

impl<T> CompletionSender<T> {
    pub(crate) fn send(self, value: T) {
        let mut waker = {
            let mut shared = self.shared.lock();
            shared.value = Some(value);
            std::mem::take(&mut shared.waker)
        };

        waker.wakeup();
    }
}

/// A promise resolving to the result of a participant spawned with
/// [`Party::spawn_waitable`](super::Party::spawn_waitable).
///
/// Stays pending forever if the party is destroyed before the
/// participant completes.
pub struct ParticipantResult<T> {
    shared: Arc<Mutex<Completion<T>>>,
}

pub(crate) fn completion<T>() -> (CompletionSender<T>, ParticipantResult<T>) {
    let shared = Arc::new(Mutex::new(Completion {
        value: None,
        waker: Waker::unwakeable(),
    }));

    (
        CompletionSender {
            shared: shared.clone(),
        },
        ParticipantResult { shared },
    )
}

impl<T> Promise for ParticipantResult<T> {
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        let mut shared = self.shared.lock();

        match shared.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                shared.waker = with_current(|activity| activity.make_owning_waker());
                Poll::Pending
            }
        }
    }
}

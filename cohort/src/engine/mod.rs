//! A minimal in-process event engine.
//!
//! The engine owns one thread fed by a command channel. It runs
//! callbacks handed to it and fires timers from a deadline-ordered heap.
//! Activities and parties use it as their [`CallbackScheduler`], and
//! promises use it for [`Sleep`].
//!
//! ```rust,ignore
//! let engine = EngineBuilder::new().thread_name("timers").build()?;
//! let handle = engine.handle();
//!
//! let party = PartyBuilder::new("conn").scheduler(engine.scheduler()).build();
//! party.spawn("tick", move || handle.sleep(Duration::from_millis(5)), |()| {});
//! ```

mod command;
mod sleep;
mod timer;

pub use sleep::Sleep;

use command::Command;
use timer::TimerEntry;

use crate::activity::{Callback, CallbackScheduler};
use crate::error::{Error, Result};

use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Builder for configuring and starting an [`EventEngine`].
pub struct EngineBuilder {
    thread_name: String,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            thread_name: "cohort-engine".to_string(),
        }
    }

    /// Sets the name of the engine thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Starts the engine thread.
    pub fn build(self) -> io::Result<EventEngine> {
        let (sender, receiver) = channel();

        let thread = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || EngineLoop::new(receiver).run())?;

        debug!(thread = %self.thread_name, "event engine started");

        Ok(EventEngine {
            handle: EngineHandle { sender },
            thread: Some(thread),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The engine thread and its owner.
///
/// Dropping the engine shuts the thread down; pending timers are dropped
/// without firing.
pub struct EventEngine {
    handle: EngineHandle,
    thread: Option<JoinHandle<()>>,
}

impl EventEngine {
    /// Starts an engine with default settings.
    pub fn new() -> io::Result<Self> {
        EngineBuilder::new().build()
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// The engine as a scheduler for activities and parties.
    pub fn scheduler(&self) -> Arc<dyn CallbackScheduler> {
        Arc::new(self.handle.clone())
    }

    /// Stops the engine and waits for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let _ = self.handle.sender.send(Command::Shutdown);

        // A callback running on the engine thread may drop the last owner.
        if thread.thread().id() != thread::current().id() {
            let _ = thread.join();
        }

        debug!("event engine stopped");
    }
}

impl Drop for EventEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A cloneable handle submitting work to the engine.
#[derive(Clone)]
pub struct EngineHandle {
    sender: Sender<Command>,
}

impl EngineHandle {
    /// Runs `f` on the engine thread.
    pub fn run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Command::Run(Box::new(f)))
            .map_err(|_| Error::EngineShutdown)
    }

    /// Runs `f` on the engine thread once `delay` has elapsed.
    pub fn run_after<F>(&self, delay: Duration, f: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_at(Instant::now() + delay, f)
    }

    /// Runs `f` on the engine thread once `deadline` has passed.
    pub fn run_at<F>(&self, deadline: Instant, f: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));

        self.sender
            .send(Command::SetTimer {
                deadline,
                callback: Box::new(f),
                cancelled: cancelled.clone(),
            })
            .map_err(|_| Error::EngineShutdown)?;

        Ok(TimerHandle { cancelled })
    }

    /// Returns a promise resolving after `duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), duration)
    }
}

impl CallbackScheduler for EngineHandle {
    fn schedule(&self, callback: Callback) {
        if let Err(err) = self.sender.send(Command::Run(callback)) {
            // The callback may hold references that only running it
            // releases.
            warn!("event engine has shut down, running callback inline");

            if let Command::Run(callback) = err.0 {
                callback();
            }
        }
    }
}

/// Cancels a timer set with [`EngineHandle::run_after`].
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Prevents the callback from running if it has not fired yet.
    ///
    /// The callback is dropped on the engine thread when its deadline
    /// passes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct EngineLoop {
    receiver: Receiver<Command>,
    timers: BinaryHeap<TimerEntry>,
    next_sequence: u64,
}

impl EngineLoop {
    fn new(receiver: Receiver<Command>) -> Self {
        Self {
            receiver,
            timers: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Waits for the next command or timer deadline, whichever comes
    /// first, until shut down or every handle is gone.
    fn run(mut self) {
        loop {
            let command = match self.timers.peek() {
                Some(timer) => {
                    let timeout = timer.deadline.saturating_duration_since(Instant::now());
                    self.receiver.recv_timeout(timeout)
                }
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match command {
                Ok(Command::Run(callback)) => callback(),
                Ok(Command::SetTimer {
                    deadline,
                    callback,
                    cancelled,
                }) => {
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;

                    self.timers.push(TimerEntry {
                        deadline,
                        sequence,
                        callback,
                        cancelled,
                    });
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.fire_expired();
        }
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();

        while self.timers.peek().is_some_and(|timer| timer.deadline <= now) {
            let Some(timer) = self.timers.pop() else {
                break;
            };

            if timer.is_cancelled() {
                continue;
            }

            trace!(sequence = timer.sequence, "timer fired");
            (timer.callback)();
        }
    }
}

use super::{EngineHandle, TimerHandle};
use crate::activity::{Waker, with_current};
use crate::promise::{Poll, Promise};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A promise that resolves once a deadline has passed.
///
/// The timer is registered with the engine on first poll, holding an
/// owning waker of the polling activity. Dropping the promise cancels
/// the timer and releases that waker right away.
pub struct Sleep {
    engine: EngineHandle,
    deadline: Instant,
    timer: Option<TimerHandle>,

    /// Shared with the timer callback.
    waker: Arc<Mutex<Waker>>,
}

impl Sleep {
    pub(crate) fn new(engine: EngineHandle, duration: Duration) -> Self {
        Self {
            engine,
            deadline: Instant::now() + duration,
            timer: None,
            waker: Arc::new(Mutex::new(Waker::unwakeable())),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Promise for Sleep {
    type Output = ();

    fn poll(&mut self) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        if self.timer.is_none() {
            *self.waker.lock() = with_current(|activity| activity.make_owning_waker());

            let waker = self.waker.clone();
            let timer = self.engine.run_at(self.deadline, move || {
                let mut waker = std::mem::take(&mut *waker.lock());
                waker.wakeup();
            });

            match timer {
                Ok(timer) => self.timer = Some(timer),
                // The promise can never fire now; keep it pending like a
                // sleep whose deadline is never reached, without pinning
                // the activity through its waker.
                Err(err) => {
                    warn!(error = %err, "sleep registered after engine shutdown");
                    drop(std::mem::take(&mut *self.waker.lock()));
                }
            }
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }

        drop(std::mem::take(&mut *self.waker.lock()));
    }
}

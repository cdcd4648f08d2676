use super::waker::{Wakeable, WakeupMask};

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// A weak, independently reference-counted bridge to an executor.
///
/// Non-owning wakers point at a `Handle` rather than at the executor
/// itself, so holding one does not keep the executor's promise state
/// alive. The executor creates its handle lazily, reuses it for every
/// non-owning waker it hands out, and severs it with
/// [`drop_activity`](Self::drop_activity) once it has finished.
///
/// Lock ordering: the handle's mutex is always acquired *after* the
/// executor's own lock and is never held while calling into the executor.
pub struct Handle {
    target: Mutex<Option<Weak<dyn Wakeable>>>,
}

impl Handle {
    pub(crate) fn new(target: Weak<dyn Wakeable>) -> Arc<Self> {
        Arc::new(Self {
            target: Mutex::new(Some(target)),
        })
    }

    /// Severs the back-reference to the executor.
    ///
    /// Idempotent; wakeups arriving afterwards are dropped.
    pub(crate) fn drop_activity(&self) {
        self.target.lock().take();
    }

    /// Upgrades to a registration on the executor, if it still accepts
    /// wakeups.
    fn ref_activity(&self) -> Option<Arc<dyn Wakeable>> {
        let target = self.target.lock().as_ref()?.upgrade()?;
        target.try_acquire().then_some(target)
    }
}

impl Wakeable for Handle {
    fn wakeup(self: Arc<Self>, mask: WakeupMask) {
        if let Some(target) = self.ref_activity() {
            target.wakeup(mask);
        }
    }

    fn wakeup_async(self: Arc<Self>, mask: WakeupMask) {
        if let Some(target) = self.ref_activity() {
            target.wakeup_async(mask);
        }
    }

    fn drop_wakeable(self: Arc<Self>, _mask: WakeupMask) {}

    fn debug_tag(&self) -> String {
        match self.target.lock().as_ref().and_then(Weak::upgrade) {
            Some(target) => format!("handle:{}", target.debug_tag()),
            None => "handle:<dropped>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Waker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Target {
        wakeups: AtomicUsize,
    }

    impl Wakeable for Target {
        fn wakeup(self: Arc<Self>, _mask: WakeupMask) {
            self.wakeups.fetch_add(1, Ordering::SeqCst);
        }

        fn wakeup_async(self: Arc<Self>, mask: WakeupMask) {
            self.wakeup(mask);
        }

        fn drop_wakeable(self: Arc<Self>, _mask: WakeupMask) {}

        fn debug_tag(&self) -> String {
            "target".to_string()
        }
    }

    #[test]
    fn forwards_until_severed() {
        let target = Arc::new(Target {
            wakeups: AtomicUsize::new(0),
        });
        let handle = Handle::new(Arc::<Target>::downgrade(&target));

        Waker::new(handle.clone(), 0).wakeup();
        assert_eq!(target.wakeups.load(Ordering::SeqCst), 1);

        handle.drop_activity();
        handle.drop_activity();

        Waker::new(handle.clone(), 0).wakeup();
        assert_eq!(target.wakeups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn outlives_its_target() {
        let target = Arc::new(Target {
            wakeups: AtomicUsize::new(0),
        });
        let mut waker = Waker::new(Handle::new(Arc::<Target>::downgrade(&target)), 0);

        drop(target);
        waker.wakeup();

        assert!(waker.is_unwakeable());
    }
}

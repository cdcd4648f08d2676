use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One bit per party participant slot.
///
/// Single-promise activities ignore the mask.
pub type WakeupMask = u16;

/// The capability a [`Waker`] points at.
///
/// Implemented by executors (owning wakers) and by [`Handle`]
/// (non-owning wakers). Each method that takes `self: Arc<Self>`
/// consumes exactly one registration: implementations that keep their
/// own reference count release it there.
///
/// [`Handle`]: super::Handle
pub trait Wakeable: Send + Sync {
    /// Wakes the target, running it on the calling thread if possible.
    fn wakeup(self: Arc<Self>, mask: WakeupMask);

    /// Wakes the target without running it on the calling thread.
    fn wakeup_async(self: Arc<Self>, mask: WakeupMask);

    /// Releases the registration without waking.
    fn drop_wakeable(self: Arc<Self>, mask: WakeupMask);

    /// Adds one registration, used when a waker is cloned.
    fn acquire(&self) {}

    /// Adds one registration unless the target is already finished.
    ///
    /// Used by non-owning wakers to turn a weak reference into a strong
    /// one for the duration of a wakeup.
    fn try_acquire(&self) -> bool {
        true
    }

    /// Human readable identification for logs.
    fn debug_tag(&self) -> String;
}

/// A handle used to signal that a suspended promise may make progress.
///
/// A waker either owns its target (keeping it alive) or reaches it
/// weakly through a [`Handle`](super::Handle). Exactly one wakeup is
/// delivered per registration: [`wakeup`](Self::wakeup) consumes it and
/// leaves the waker unwakeable. Dropping a waker that was never woken
/// releases its registration.
#[derive(Default)]
pub struct Waker {
    wakeable: Option<Arc<dyn Wakeable>>,
    mask: WakeupMask,
}

impl Waker {
    /// Creates a waker owning one registration on `wakeable`.
    pub fn new(wakeable: Arc<dyn Wakeable>, mask: WakeupMask) -> Self {
        Self {
            wakeable: Some(wakeable),
            mask,
        }
    }

    /// Creates a waker that does nothing when woken.
    pub fn unwakeable() -> Self {
        Self::default()
    }

    /// Wakes the target and consumes the registration.
    ///
    /// Calling it again, or on an unwakeable waker, does nothing.
    pub fn wakeup(&mut self) {
        if let Some(wakeable) = self.wakeable.take() {
            wakeable.wakeup(self.mask);
        }
    }

    /// Like [`wakeup`](Self::wakeup), but never runs the target inline.
    pub fn wakeup_async(&mut self) {
        if let Some(wakeable) = self.wakeable.take() {
            wakeable.wakeup_async(self.mask);
        }
    }

    /// Returns `true` if waking this waker would do nothing.
    pub fn is_unwakeable(&self) -> bool {
        self.wakeable.is_none()
    }

    /// The participant mask this waker will wake.
    pub fn mask(&self) -> WakeupMask {
        self.mask
    }

    pub fn debug_tag(&self) -> String {
        match &self.wakeable {
            Some(wakeable) => wakeable.debug_tag(),
            None => "<unwakeable>".to_string(),
        }
    }

    fn identity(&self) -> (*const (), WakeupMask) {
        let ptr = self
            .wakeable
            .as_ref()
            .map_or(std::ptr::null(), |w| Arc::as_ptr(w) as *const ());
        (ptr, self.mask)
    }
}

impl Clone for Waker {
    fn clone(&self) -> Self {
        match &self.wakeable {
            Some(wakeable) => {
                wakeable.acquire();
                Self {
                    wakeable: Some(wakeable.clone()),
                    mask: self.mask,
                }
            }
            None => Self::default(),
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        if let Some(wakeable) = self.wakeable.take() {
            wakeable.drop_wakeable(self.mask);
        }
    }
}

impl PartialEq for Waker {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Waker {}

impl Hash for Waker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Waker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waker")
            .field("target", &self.debug_tag())
            .field("mask", &format_args!("{:#06x}", self.mask))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        wakeups: AtomicUsize,
        drops: AtomicUsize,
        acquires: AtomicUsize,
    }

    impl Wakeable for Counting {
        fn wakeup(self: Arc<Self>, _mask: WakeupMask) {
            self.wakeups.fetch_add(1, Ordering::SeqCst);
        }

        fn wakeup_async(self: Arc<Self>, mask: WakeupMask) {
            self.wakeup(mask);
        }

        fn drop_wakeable(self: Arc<Self>, _mask: WakeupMask) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }

        fn acquire(&self) {
            self.acquires.fetch_add(1, Ordering::SeqCst);
        }

        fn debug_tag(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn wakeup_is_delivered_once() {
        let target = Arc::new(Counting::default());
        let mut waker = Waker::new(target.clone(), 1);

        waker.wakeup();
        waker.wakeup();
        drop(waker);

        assert_eq!(target.wakeups.load(Ordering::SeqCst), 1);
        assert_eq!(target.drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_releases_registration() {
        let target = Arc::new(Counting::default());
        let waker = Waker::new(target.clone(), 1);
        let clone = waker.clone();

        drop(waker);
        drop(clone);

        assert_eq!(target.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(target.drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wakers_deduplicate_by_target_and_mask() {
        let target = Arc::new(Counting::default());
        let mut set = HashSet::new();

        set.insert(Waker::new(target.clone(), 1));
        set.insert(Waker::new(target.clone(), 1));
        set.insert(Waker::new(target.clone(), 2));

        assert_eq!(set.len(), 2);
        assert!(Waker::unwakeable().is_unwakeable());
    }
}

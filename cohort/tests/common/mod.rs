#![allow(dead_code)]

use cohort::activity::{Activity, ScopedActivity, Wakeable, Waker, WakeupMask};
use cohort::promise::{Poll, Promise};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An activity that never polls on its own.
///
/// Tests drive promises through [`MockActivity::poll`] and inspect how
/// many wakeups were delivered in between.
pub struct MockActivity {
    self_ref: Weak<Self>,
    name: String,
    wakeups: AtomicUsize,
    repolls: AtomicUsize,
}

impl MockActivity {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            name: name.to_string(),
            wakeups: AtomicUsize::new(0),
            repolls: AtomicUsize::new(0),
        })
    }

    /// Polls `promise` once with this activity installed as current.
    pub fn poll<P: Promise>(&self, promise: &mut P) -> Poll<P::Output> {
        let _scope = ScopedActivity::new(self);
        promise.poll()
    }

    pub fn wakeups(&self) -> usize {
        self.wakeups.load(Ordering::SeqCst)
    }

    /// Returns the number of wakeups since the last call and resets it.
    pub fn take_wakeups(&self) -> usize {
        self.wakeups.swap(0, Ordering::SeqCst)
    }

    pub fn repolls(&self) -> usize {
        self.repolls.load(Ordering::SeqCst)
    }
}

impl Activity for MockActivity {
    fn force_immediate_repoll_mask(&self, _mask: WakeupMask) {
        self.repolls.fetch_add(1, Ordering::SeqCst);
    }

    fn make_owning_waker(&self) -> Waker {
        match self.self_ref.upgrade() {
            Some(this) => Waker::new(this, 1),
            None => Waker::unwakeable(),
        }
    }

    fn make_non_owning_waker(&self) -> Waker {
        self.make_owning_waker()
    }

    fn debug_tag(&self) -> String {
        self.name.clone()
    }
}

impl Wakeable for MockActivity {
    fn wakeup(self: Arc<Self>, _mask: WakeupMask) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
    }

    fn wakeup_async(self: Arc<Self>, _mask: WakeupMask) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
    }

    fn drop_wakeable(self: Arc<Self>, _mask: WakeupMask) {}

    fn debug_tag(&self) -> String {
        self.name.clone()
    }
}

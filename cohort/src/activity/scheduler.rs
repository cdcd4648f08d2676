/// A deferred callback handed to a [`CallbackScheduler`].
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Strategy used by executors to run wakeups.
///
/// An implementation must eventually invoke every callback it accepts.
/// It may invoke it right away on the calling thread: an executor woken
/// while it is mid-poll further up the same thread records the wakeup
/// and repolls once that poll returns, instead of re-entering itself.
pub trait CallbackScheduler: Send + Sync {
    fn schedule(&self, callback: Callback);
}

/// Runs every callback immediately on the calling thread.
///
/// This is the default for activities and parties: a wakeup delivered
/// from another thread polls the woken executor right there, and a
/// wakeup of an executor already polling on this thread is folded into
/// its running poll loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl CallbackScheduler for InlineScheduler {
    fn schedule(&self, callback: Callback) {
        callback();
    }
}

use crate::activity::Callback;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

pub(crate) enum Command {
    /// Run a callback on the engine thread as soon as possible.
    Run(Callback),

    SetTimer {
        deadline: Instant,
        callback: Callback,
        cancelled: Arc<AtomicBool>,
    },

    Shutdown,
}

use thiserror::Error;

/// Status delivered to an activity's completion callback when the
/// activity is cancelled (explicitly or by dropping its owner) before
/// its promise resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("activity cancelled")]
pub struct Cancelled;

/// Recoverable failures surfaced by the crate.
///
/// Contract violations (polling a completed promise, releasing a lock
/// that is not held, starting an activity twice) are not represented
/// here: they indicate a bug in the calling code and panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation was cancelled before it could complete.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Every participant slot of the party is occupied.
    #[error("party `{party}` has no free participant slot (capacity {capacity})")]
    PartyFull { party: String, capacity: usize },

    /// The event engine thread has stopped accepting commands.
    #[error("event engine has shut down")]
    EngineShutdown,
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

//! Layout of the party state word.
//!
//! All coordination state of a party lives in one `u64`:
//!
//! ```text
//!  63            40 39  36  35  34  33  32  31        16 15         0
//! +----------------+------+---+-------+---+------------+------------+
//! |    refcount    |      | L |       | D | allocated  |  wakeups   |
//! +----------------+------+---+-------+---+------------+------------+
//! ```
//!
//! - `wakeups`: one bit per participant slot that must be repolled,
//! - `allocated`: one bit per occupied participant slot,
//! - `D`: the party is being destroyed,
//! - `L`: some thread is running the party,
//! - `refcount`: number of [`Party`](super::Party) handles and owning
//!   wakers.

use crate::activity::WakeupMask;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of participants a party can hold at once.
pub const MAX_PARTICIPANTS: usize = 16;

pub(crate) const WAKEUP_MASK: u64 = 0x0000_0000_0000_ffff;
pub(crate) const ALLOCATED_SHIFT: u32 = 16;
pub(crate) const ALLOCATED_MASK: u64 = WAKEUP_MASK << ALLOCATED_SHIFT;
pub(crate) const DESTROYING: u64 = 0x0000_0001_0000_0000;
pub(crate) const LOCKED: u64 = 0x0000_0008_0000_0000;
pub(crate) const REF_SHIFT: u32 = 40;
pub(crate) const ONE_REF: u64 = 1 << REF_SHIFT;
pub(crate) const REF_MASK: u64 = 0xffff_ff00_0000_0000;

/// The atomic state word of a party.
pub(crate) struct PartyState {
    word: AtomicU64,
}

impl PartyState {
    /// A fresh state holding `refs` references and nothing else.
    pub(crate) fn new(refs: u64) -> Self {
        Self {
            word: AtomicU64::new(refs * ONE_REF),
        }
    }

    pub(crate) fn load(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    pub(crate) fn fetch_or(&self, bits: u64) -> u64 {
        self.word.fetch_or(bits, Ordering::AcqRel)
    }

    pub(crate) fn fetch_and(&self, bits: u64) -> u64 {
        self.word.fetch_and(bits, Ordering::AcqRel)
    }

    pub(crate) fn fetch_add_ref(&self) -> u64 {
        self.word.fetch_add(ONE_REF, Ordering::Relaxed)
    }

    pub(crate) fn fetch_sub_ref(&self) -> u64 {
        self.word.fetch_sub(ONE_REF, Ordering::AcqRel)
    }

    pub(crate) fn compare_exchange(&self, current: u64, new: u64) -> Result<u64, u64> {
        self.word
            .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Takes a reference unless the party has already lost its last one.
    pub(crate) fn ref_if_nonzero(&self) -> bool {
        let mut current = self.load();

        loop {
            if current & REF_MASK == 0 || current & DESTROYING != 0 {
                return false;
            }

            match self.compare_exchange(current, current + ONE_REF) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Wakeup bit of participant slot `index`.
pub(crate) fn slot_mask(index: usize) -> WakeupMask {
    debug_assert!(index < MAX_PARTICIPANTS);
    1 << index
}

/// Allocated bit of participant slot `index`.
pub(crate) fn allocated_bit(index: usize) -> u64 {
    (slot_mask(index) as u64) << ALLOCATED_SHIFT
}

pub(crate) fn refs(state: u64) -> u64 {
    (state & REF_MASK) >> REF_SHIFT
}

/// Formats a state word for logs.
pub(crate) struct Describe(pub(crate) u64);

impl fmt::Display for Describe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0;
        write!(
            f,
            "refs={} wakeups={:#06x} allocated={:#06x}{}{}",
            refs(state),
            state & WAKEUP_MASK,
            (state & ALLOCATED_MASK) >> ALLOCATED_SHIFT,
            if state & LOCKED != 0 { " locked" } else { "" },
            if state & DESTROYING != 0 { " destroying" } else { "" },
        )
    }
}

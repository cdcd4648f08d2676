//! # Cohort
//!
//! **Cohort** is the cooperative task-execution core of an RPC transport
//! stack. It does not own a thread pool; instead it drives hand-written
//! promises on whichever thread happens to deliver a wakeup.
//!
//! The crate is organised in layers:
//!
//! - A **promise contract**: anything implementing [`Promise`] (including
//!   every `FnMut() -> Poll<T>` closure) can be polled until it is ready.
//! - **Executors**: an [`activity`] drives one promise to completion; a
//!   [`party`] multiplexes up to sixteen participants over a single atomic
//!   scheduling word.
//! - **Combinators** like [`seq!`], [`join!`], [`race!`] and
//!   [`combinator::loop_promise`] compose promises into state machines.
//! - **Synchronization** primitives in [`sync`] coordinate promises living
//!   in the same or in different activities.
//! - A small [`engine`] supplies timers and deferred callbacks at the
//!   boundary where a real event engine would sit.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cohort::activity::ActivityBuilder;
//! use cohort::promise::Poll;
//!
//! let activity = ActivityBuilder::new()
//!     .name("hello")
//!     .spawn(|| || Poll::Ready(42), |result| {
//!         assert_eq!(result, Ok(42));
//!     });
//! ```
//!
//! ## Modules
//!
//! - [`promise`]: the poll contract and promise adapters
//! - [`activity`]: wakers, handles and the single-promise executor
//! - [`party`]: the multi-participant executor
//! - [`combinator`]: sequencing, joining, racing and looping
//! - [`sync`]: mutexes, observables, wait sets and callback bridges
//! - [`engine`]: timers and callback scheduling

extern crate self as cohort;

pub mod activity;
pub mod combinator;
pub mod engine;
pub mod party;
pub mod promise;
pub mod sync;

mod error;

pub use error::{Cancelled, Error, Result};
pub use promise::{Poll, Promise};

pub use cohort_macros::*;

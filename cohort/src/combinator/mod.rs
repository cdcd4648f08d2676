//! Promise combinators.
//!
//! Each combinator is a small state machine holding only the stage that
//! is currently running. They never suspend on their own: a combinator
//! is pending exactly when one of its inner promises is.
//!
//! | combinator                   | resolves to                              |
//! |------------------------------|------------------------------------------|
//! | [`seq`] / [`seq!`]           | output of the last stage                 |
//! | [`try_seq`] / [`try_seq!`]   | last `Ok`, or the first `Err`            |
//! | [`seq_iter`]                 | argument threaded through every element  |
//! | [`join`] / [`join!`]         | tuple of all outputs, in argument order  |
//! | [`join_iter`]                | vector of all outputs, in iteration order|
//! | [`loop_promise`]             | value of the first `LoopCtl::Break`      |
//! | [`race`] / [`race!`]         | output of the first ready promise        |
//! | [`select!`]                  | handler applied to the first ready output|
//! | [`map`]                      | function applied to the output           |
//! | [`if_then`]                  | output of the chosen branch              |
//!
//! [`seq!`]: crate::seq
//! [`try_seq!`]: crate::try_seq
//! [`join!`]: crate::join
//! [`race!`]: crate::race
//! [`select!`]: crate::select

mod join;
mod loop_promise;
mod race;
mod seq;

pub use join::{Join, JoinIter, MaybeDone, join, join_iter};
pub use loop_promise::{Loop, LoopCtl, loop_promise};
pub use race::{Race, race};
pub use seq::{Seq, SeqIter, TrySeq, seq, seq_iter, try_seq};

use crate::promise::{Poll, Promise};

/// Applies a function to a promise's output. Created by [`map`].
pub struct Map<P, F> {
    promise: P,
    f: Option<F>,
}

pub fn map<P, F, U>(promise: P, f: F) -> Map<P, F>
where
    P: Promise,
    F: FnOnce(P::Output) -> U,
{
    Map {
        promise,
        f: Some(f),
    }
}

impl<P, F, U> Promise for Map<P, F>
where
    P: Promise,
    F: FnOnce(P::Output) -> U,
{
    type Output = U;

    fn poll(&mut self) -> Poll<U> {
        let Poll::Ready(value) = self.promise.poll() else {
            return Poll::Pending;
        };

        let f = self.f.take().expect("map polled after completion");
        Poll::Ready(f(value))
    }
}

/// One of two promises, picked when the combinator is created.
pub enum Either<A, B> {
    Left(A),
    Right(B),
}

impl<A, B> Promise for Either<A, B>
where
    A: Promise,
    B: Promise<Output = A::Output>,
{
    type Output = A::Output;

    fn poll(&mut self) -> Poll<A::Output> {
        match self {
            Either::Left(a) => a.poll(),
            Either::Right(b) => b.poll(),
        }
    }
}

/// Builds the promise of one branch depending on `condition`.
///
/// Only the chosen factory is called.
pub fn if_then<T, E, P, Q>(condition: bool, then: T, otherwise: E) -> Either<P, Q>
where
    T: FnOnce() -> P,
    E: FnOnce() -> Q,
    P: Promise,
    Q: Promise<Output = P::Output>,
{
    if condition {
        Either::Left(then())
    } else {
        Either::Right(otherwise())
    }
}

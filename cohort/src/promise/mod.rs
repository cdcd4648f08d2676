//! The poll contract.
//!
//! A promise is a repeatedly invocable operation returning [`Poll`]. It
//! owns whatever state it needs between invocations and must not be
//! polled again once it has returned [`Poll::Ready`] (dropping it is
//! still allowed).
//!
//! Promises never block: a promise that cannot make progress registers a
//! [`Waker`](crate::activity::Waker) with the current activity and returns
//! [`Poll::Pending`].

mod future;

pub use future::{FuturePromise, from_future};
pub use std::task::Poll;

/// A repeatedly pollable, non-blocking operation.
///
/// Every `FnMut() -> Poll<T>` closure is a promise, which keeps ad-hoc
/// promises cheap to write:
///
/// ```rust,ignore
/// let mut remaining = 3;
/// let countdown = move || {
///     remaining -= 1;
///     if remaining == 0 { Poll::Ready("done") } else { Poll::Pending }
/// };
/// ```
pub trait Promise {
    /// The value produced on completion.
    type Output;

    /// Advances the promise.
    ///
    /// Returns `Poll::Ready` exactly once; the caller must not poll again
    /// afterwards.
    fn poll(&mut self) -> Poll<Self::Output>;
}

impl<F, T> Promise for F
where
    F: FnMut() -> Poll<T>,
{
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        self()
    }
}

/// A promise that is ready on its first poll.
pub struct Immediate<T> {
    value: Option<T>,
}

/// Creates a promise that resolves to `value` immediately.
pub fn immediate<T>(value: T) -> Immediate<T> {
    Immediate { value: Some(value) }
}

impl<T> Promise for Immediate<T> {
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        Poll::Ready(self.value.take().expect("immediate promise polled after completion"))
    }
}

/// A promise that never resolves.
pub struct Never<T> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

/// Creates a promise that stays pending forever.
///
/// Useful as the losing side of a race or as a placeholder participant.
pub fn never<T>() -> Never<T> {
    Never {
        _marker: std::marker::PhantomData,
    }
}

impl<T> Promise for Never<T> {
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        Poll::Pending
    }
}

/// A type-erased, heap allocated promise.
pub struct BoxPromise<T> {
    inner: Box<dyn Promise<Output = T> + Send>,
}

impl<T> BoxPromise<T> {
    /// Boxes `promise`, erasing its concrete type.
    pub fn new<P>(promise: P) -> Self
    where
        P: Promise<Output = T> + Send + 'static,
    {
        Self {
            inner: Box::new(promise),
        }
    }
}

impl<T> Promise for BoxPromise<T> {
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        self.inner.poll()
    }
}

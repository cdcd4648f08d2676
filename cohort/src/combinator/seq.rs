use crate::promise::{Poll, Promise};

/// Runs `first`, then the promise `next` builds from its result.
///
/// Created by [`seq`]. Only one stage is alive at a time: the first
/// promise is dropped before the second one is built.
pub struct Seq<P, F, Q> {
    state: SeqState<P, F, Q>,
}

enum SeqState<P, F, Q> {
    First(P, Option<F>),
    Second(Q),
    /// Between dropping one stage and building the next.
    Switching,
}

/// Sequences two stages: `next` is called with the output of `first`
/// and the promise it returns provides the final output.
///
/// Chain more stages with [`seq!`](crate::seq).
pub fn seq<P, F, Q>(first: P, next: F) -> Seq<P, F, Q>
where
    P: Promise,
    F: FnOnce(P::Output) -> Q,
    Q: Promise,
{
    Seq {
        state: SeqState::First(first, Some(next)),
    }
}

impl<P, F, Q> Promise for Seq<P, F, Q>
where
    P: Promise,
    F: FnOnce(P::Output) -> Q,
    Q: Promise,
{
    type Output = Q::Output;

    fn poll(&mut self) -> Poll<Q::Output> {
        loop {
            match &mut self.state {
                SeqState::First(first, next) => {
                    let Poll::Ready(value) = first.poll() else {
                        return Poll::Pending;
                    };

                    let next = next.take().expect("seq polled after completion");
                    self.state = SeqState::Switching;
                    self.state = SeqState::Second(next(value));
                }
                SeqState::Second(second) => return second.poll(),
                SeqState::Switching => unreachable!("seq stage factory panicked"),
            }
        }
    }
}

/// Like [`Seq`], for stages producing `Result`: an `Err` skips the
/// remaining stages.
pub struct TrySeq<P, F, Q> {
    state: TrySeqState<P, F, Q>,
}

enum TrySeqState<P, F, Q> {
    First(P, Option<F>),
    Second(Q),
    Switching,
}

/// Sequences two fallible stages.
///
/// `next` runs only when `first` resolves to `Ok`; an `Err` becomes the
/// final output directly. Chain more stages with
/// [`try_seq!`](crate::try_seq).
pub fn try_seq<P, F, Q, T, U, E>(first: P, next: F) -> TrySeq<P, F, Q>
where
    P: Promise<Output = Result<T, E>>,
    F: FnOnce(T) -> Q,
    Q: Promise<Output = Result<U, E>>,
{
    TrySeq {
        state: TrySeqState::First(first, Some(next)),
    }
}

impl<P, F, Q, T, U, E> Promise for TrySeq<P, F, Q>
where
    P: Promise<Output = Result<T, E>>,
    F: FnOnce(T) -> Q,
    Q: Promise<Output = Result<U, E>>,
{
    type Output = Result<U, E>;

    fn poll(&mut self) -> Poll<Result<U, E>> {
        loop {
            match &mut self.state {
                TrySeqState::First(first, next) => {
                    let Poll::Ready(result) = first.poll() else {
                        return Poll::Pending;
                    };

                    let next = next.take().expect("try_seq polled after completion");
                    self.state = TrySeqState::Switching;

                    match result {
                        Ok(value) => self.state = TrySeqState::Second(next(value)),
                        Err(err) => return Poll::Ready(Err(err)),
                    }
                }
                TrySeqState::Second(second) => return second.poll(),
                TrySeqState::Switching => panic!("try_seq polled after completion"),
            }
        }
    }
}

/// Chains promise stages left to right.
///
/// The first argument is a promise, every following one a factory
/// taking the previous stage's output and returning the next promise.
///
/// ```rust,ignore
/// let greeting = seq!(
///     read_name(),
///     |name| lookup(name),
///     |user| immediate(format!("hello {}", user.display_name)),
/// );
/// ```
#[macro_export]
macro_rules! seq {
    ($first:expr $(,)?) => {
        $first
    };
    ($first:expr, $next:expr $(, $rest:expr)* $(,)?) => {
        $crate::seq!($crate::combinator::seq($first, $next) $(, $rest)*)
    };
}

/// Chains fallible promise stages left to right; the first `Err` ends
/// the chain.
#[macro_export]
macro_rules! try_seq {
    ($first:expr $(,)?) => {
        $first
    };
    ($first:expr, $next:expr $(, $rest:expr)* $(,)?) => {
        $crate::try_seq!($crate::combinator::try_seq($first, $next) $(, $rest)*)
    };
}

/// Threads an argument through one promise per element of an iterator.
///
/// Created by [`seq_iter`].
pub struct SeqIter<I, A, F, P> {
    iter: I,
    factory: F,
    argument: Option<A>,
    current: Option<P>,
}

/// Runs `factory(element, argument)` for every element of `iter` in
/// order, feeding each promise's output in as the next argument.
///
/// Resolves to the last argument, which is `argument` itself if the
/// iterator is empty.
pub fn seq_iter<I, A, F, P>(iter: I, argument: A, factory: F) -> SeqIter<I::IntoIter, A, F, P>
where
    I: IntoIterator,
    F: FnMut(I::Item, A) -> P,
    P: Promise<Output = A>,
{
    SeqIter {
        iter: iter.into_iter(),
        factory,
        argument: Some(argument),
        current: None,
    }
}

impl<I, A, F, P> Promise for SeqIter<I, A, F, P>
where
    I: Iterator,
    F: FnMut(I::Item, A) -> P,
    P: Promise<Output = A>,
{
    type Output = A;

    fn poll(&mut self) -> Poll<A> {
        loop {
            if let Some(current) = &mut self.current {
                let Poll::Ready(argument) = current.poll() else {
                    return Poll::Pending;
                };

                self.current = None;
                self.argument = Some(argument);
            }

            let argument = self
                .argument
                .take()
                .expect("seq_iter polled after completion");

            match self.iter.next() {
                Some(element) => self.current = Some((self.factory)(element, argument)),
                None => return Poll::Ready(argument),
            }
        }
    }
}

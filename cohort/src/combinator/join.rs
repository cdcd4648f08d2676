use crate::promise::{Poll, Promise};

/// A promise that keeps its result once it is ready.
///
/// The building block of [`join`], [`join_iter`] and the
/// [`join!`](crate::join) macro: each branch is either still running or
/// holds its output inline until every branch is done.
pub enum MaybeDone<P: Promise> {
    Running(P),
    Done(P::Output),
    Taken,
}

impl<P: Promise> MaybeDone<P> {
    pub fn new(promise: P) -> Self {
        Self::Running(promise)
    }

    /// Polls the promise if it is still running.
    ///
    /// Returns `true` once the output is available.
    pub fn poll_done(&mut self) -> bool {
        match self {
            Self::Running(promise) => match promise.poll() {
                Poll::Ready(value) => {
                    *self = Self::Done(value);
                    true
                }
                Poll::Pending => false,
            },
            Self::Done(_) => true,
            Self::Taken => panic!("joined promise polled after completion"),
        }
    }

    /// Moves the output out.
    ///
    /// # Panics
    ///
    /// Panics unless [`poll_done`](Self::poll_done) returned `true` and
    /// the output was not taken yet.
    pub fn take_output(&mut self) -> P::Output {
        match std::mem::replace(self, Self::Taken) {
            Self::Done(value) => value,
            _ => panic!("joined promise output taken before completion"),
        }
    }
}

/// Two promises polled together. Created by [`join`].
pub struct Join<A: Promise, B: Promise> {
    a: MaybeDone<A>,
    b: MaybeDone<B>,
}

/// Polls both promises until both are ready; resolves to `(a, b)`.
///
/// The tuple follows argument order whatever order the promises finish
/// in. For more than two promises use [`join!`](crate::join).
pub fn join<A: Promise, B: Promise>(a: A, b: B) -> Join<A, B> {
    Join {
        a: MaybeDone::new(a),
        b: MaybeDone::new(b),
    }
}

impl<A: Promise, B: Promise> Promise for Join<A, B> {
    type Output = (A::Output, B::Output);

    fn poll(&mut self) -> Poll<Self::Output> {
        let a_done = self.a.poll_done();
        let b_done = self.b.poll_done();

        if a_done && b_done {
            Poll::Ready((self.a.take_output(), self.b.take_output()))
        } else {
            Poll::Pending
        }
    }
}

/// A dynamic number of promises polled together. Created by
/// [`join_iter`].
pub struct JoinIter<P: Promise> {
    branches: Vec<MaybeDone<P>>,
}

/// Polls every promise yielded by `iter` until all are ready; resolves
/// to their outputs in iteration order.
///
/// An empty iterator resolves to an empty vector immediately.
pub fn join_iter<I>(iter: I) -> JoinIter<I::Item>
where
    I: IntoIterator,
    I::Item: Promise,
{
    JoinIter {
        branches: iter.into_iter().map(MaybeDone::new).collect(),
    }
}

impl<P: Promise> Promise for JoinIter<P> {
    type Output = Vec<P::Output>;

    fn poll(&mut self) -> Poll<Vec<P::Output>> {
        let mut all_done = true;

        for branch in &mut self.branches {
            all_done &= branch.poll_done();
        }

        if !all_done {
            return Poll::Pending;
        }

        Poll::Ready(self.branches.iter_mut().map(MaybeDone::take_output).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::immediate;

    fn ready_after<T: Clone>(polls: usize, value: T) -> impl Promise<Output = T> {
        let mut remaining = polls;
        move || {
            if remaining == 0 {
                Poll::Ready(value.clone())
            } else {
                remaining -= 1;
                Poll::Pending
            }
        }
    }

    #[test]
    fn output_follows_argument_order() {
        let mut promise = join(ready_after(2, "slow"), ready_after(0, "fast"));

        assert_eq!(promise.poll(), Poll::Pending);
        assert_eq!(promise.poll(), Poll::Pending);
        assert_eq!(promise.poll(), Poll::Ready(("slow", "fast")));
    }

    #[test]
    fn finished_branches_are_not_repolled() {
        let mut polls = 0;
        let counted = move || {
            polls += 1;
            assert_eq!(polls, 1, "branch polled after it was ready");
            Poll::Ready(())
        };

        let mut promise = join(counted, ready_after(3, ()));
        while promise.poll().is_pending() {}
    }

    #[test]
    fn join_iter_collects_in_order() {
        let mut promise = join_iter((0..4).map(|i| ready_after(3 - i, i)));

        for _ in 0..3 {
            assert_eq!(promise.poll(), Poll::Pending);
        }
        assert_eq!(promise.poll(), Poll::Ready(vec![0, 1, 2, 3]));

        let mut empty = join_iter(Vec::<crate::promise::Immediate<u8>>::new());
        assert_eq!(empty.poll(), Poll::Ready(vec![]));
    }

    #[test]
    fn join_macro_wraps_single_promise() {
        let mut single = crate::join!(immediate(1));
        assert_eq!(single.poll(), Poll::Ready((1,)));

        let mut triple = crate::join!(immediate('a'), ready_after(1, "b"), immediate(3u8));
        assert_eq!(triple.poll(), Poll::Pending);
        assert_eq!(triple.poll(), Poll::Ready(('a', "b", 3u8)));
    }
}

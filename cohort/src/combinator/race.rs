use crate::promise::{Poll, Promise};

/// Two promises racing. Created by [`race`].
pub struct Race<A, B> {
    a: A,
    b: B,
}

/// Resolves to the output of whichever promise is ready first.
///
/// `a` is polled before `b` on every round, so it wins ties. The loser
/// is dropped together with the race. For more than two promises use
/// [`race!`](crate::race); for differently typed promises use
/// [`select!`](crate::select).
pub fn race<A, B>(a: A, b: B) -> Race<A, B>
where
    A: Promise,
    B: Promise<Output = A::Output>,
{
    Race { a, b }
}

impl<A, B> Promise for Race<A, B>
where
    A: Promise,
    B: Promise<Output = A::Output>,
{
    type Output = A::Output;

    fn poll(&mut self) -> Poll<A::Output> {
        if let Poll::Ready(value) = self.a.poll() {
            return Poll::Ready(value);
        }

        self.b.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::{immediate, never};

    #[test]
    fn first_argument_wins_ties() {
        let mut promise = race(immediate("left"), immediate("right"));
        assert_eq!(promise.poll(), Poll::Ready("left"));
    }

    #[test]
    fn pending_side_loses() {
        let mut promise = race(never(), immediate(3));
        assert_eq!(promise.poll(), Poll::Ready(3));

        let mut promise = crate::race!(never::<u8>(), never(), immediate(9));
        assert_eq!(promise.poll(), Poll::Ready(9));
    }

    #[test]
    fn select_maps_the_winner() {
        let mut promise = crate::select! {
            never::<u32>() => |n: u32| n.to_string(),
            immediate('x') => |c: char| c.to_string(),
        };

        assert_eq!(promise.poll(), Poll::Ready("x".to_string()));
    }
}

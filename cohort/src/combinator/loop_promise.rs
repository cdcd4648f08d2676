use crate::promise::{Poll, Promise};

/// What one loop iteration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCtl<T> {
    /// Build a fresh body and run it again.
    Continue,

    /// Stop and resolve the loop to this value.
    Break(T),
}

/// Repeats a promise body until it breaks. Created by [`loop_promise`].
pub struct Loop<F, P> {
    factory: F,
    body: Option<P>,
}

/// Runs `factory()` to completion over and over until an iteration
/// resolves to [`LoopCtl::Break`].
///
/// Each iteration gets a freshly built body; the previous one is dropped
/// first. An iteration that is ready immediately does not return to the
/// executor, so a body that continues without ever suspending spins.
///
/// ```rust,ignore
/// let pinger = loop_promise(|| {
///     seq(engine.sleep(interval), |()| send_ping().map(|_| LoopCtl::Continue))
/// });
/// ```
pub fn loop_promise<F, P, T>(factory: F) -> Loop<F, P>
where
    F: FnMut() -> P,
    P: Promise<Output = LoopCtl<T>>,
{
    Loop {
        factory,
        body: None,
    }
}

impl<F, P, T> Promise for Loop<F, P>
where
    F: FnMut() -> P,
    P: Promise<Output = LoopCtl<T>>,
{
    type Output = T;

    fn poll(&mut self) -> Poll<T> {
        loop {
            let body = self.body.get_or_insert_with(&mut self.factory);

            match body.poll() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(LoopCtl::Continue) => self.body = None,
                Poll::Ready(LoopCtl::Break(value)) => {
                    self.body = None;
                    return Poll::Ready(value);
                }
            }
        }
    }
}

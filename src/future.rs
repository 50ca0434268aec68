//! Core suspension-point futures.
//!
//! These are the primitives task bodies suspend on: [`next_tick`] and
//! [`delay_ticks`] park the body for an exact number of ticks, and
//! [`poll_until`] adapts any non-blocking readiness check into a future
//! polled once per tick — the bridge for external primitives the scheduler
//! knows nothing about.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// A future that suspends for a fixed number of scheduler ticks before
/// completing.
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or polled"]
pub struct DelayTicks {
    remaining: usize,
}

impl DelayTicks {
    /// Returns a future that suspends `ticks` times before completing.
    /// `DelayTicks::new(0)` is immediately ready.
    #[inline]
    #[must_use]
    pub const fn new(ticks: usize) -> Self {
        Self { remaining: ticks }
    }
}

impl Future for DelayTicks {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.remaining == 0 {
            return Poll::Ready(());
        }
        self.remaining -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Suspend until the next tick.
#[inline]
pub fn next_tick() -> DelayTicks {
    DelayTicks::new(1)
}

/// Suspend for exactly `ticks` ticks. The await completes on the `ticks`-th
/// tick after the one it started suspending on.
#[inline]
pub fn delay_ticks(ticks: usize) -> DelayTicks {
    DelayTicks::new(ticks)
}

/// A future that runs a readiness check once per poll. See [`poll_until`].
#[must_use = "futures do nothing unless `.await`ed or polled"]
pub struct PollUntil<F> {
    check: F,
}

impl<T, F> Future for PollUntil<F>
where
    F: FnMut() -> Poll<T> + Unpin,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match (self.get_mut().check)() {
            Poll::Ready(value) => Poll::Ready(value),
            Poll::Pending => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

/// Adapts a non-blocking readiness check into a future.
///
/// Driven from inside a task, `check` runs exactly once per tick until it
/// returns [`Poll::Ready`]. It must never block: the whole point is that the
/// scheduling thread only ever peeks.
pub fn poll_until<T, F>(check: F) -> PollUntil<F>
where
    F: FnMut() -> Poll<T> + Unpin,
{
    PollUntil { check }
}

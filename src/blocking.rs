//! Poll-based bridge to background-thread work.
//!
//! The scheduler is strictly single-threaded; the one concession to real
//! concurrency is [`spawn`], which runs a closure on a host background
//! thread and hands back a [`Background`] future. Awaiting it from a task
//! performs one non-blocking readiness check per tick and retrieves the
//! result once it is available — the scheduling thread never blocks on it.
//!
//! Cancellation is the exception: dropping a `Background` joins the thread
//! first, so the background unit of work always fully finishes before the
//! wrapper is released. That wait happens outside the tick loop's
//! accounting.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;

use tracing::trace;

/// A unit of work running on a background thread. See [`spawn`].
#[must_use = "futures do nothing unless `.await`ed or polled"]
pub struct Background<T> {
    handle: Option<thread::JoinHandle<()>>,
    result: mpsc::Receiver<thread::Result<T>>,
}

/// Runs `work` on a background thread, returning a future that resolves to
/// its result.
///
/// Awaited from inside a task, the future checks for the result once per
/// tick without blocking. A panic on the background thread is re-raised into
/// the awaiting task when the result is retrieved, following the usual
/// capture-and-rethrow path.
pub fn spawn<T, F>(work: F) -> Background<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, result) = mpsc::channel();
    let handle = thread::spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(work));
        // the receiver may already be gone if the wrapper was dropped
        let _ = sender.send(outcome);
    });
    Background {
        handle: Some(handle),
        result,
    }
}

impl<T> Background<T> {
    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            // the result (or panic payload) travels through the channel;
            // the join itself cannot fail meaningfully
            let _ = handle.join();
        }
    }
}

impl<T> Future for Background<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        match this.result.try_recv() {
            Ok(Ok(value)) => {
                this.join();
                Poll::Ready(value)
            }
            Ok(Err(payload)) => {
                trace!("background work panicked; re-raising");
                this.join();
                panic::resume_unwind(payload)
            }
            Err(TryRecvError::Empty) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(TryRecvError::Disconnected) => {
                panic!("background thread exited without sending a result; this is a bug")
            }
        }
    }
}

impl<T> Drop for Background<T> {
    /// Dropping before completion waits for the background work to fully
    /// finish; the work itself is never abandoned mid-flight.
    fn drop(&mut self) {
        self.join();
    }
}

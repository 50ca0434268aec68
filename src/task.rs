//! Suspendable units of work.
//!
//! A [`Task`] owns one suspended computation — a boxed future plus the slot
//! its output lands in — and is advanced exactly one suspension point per
//! [`resume`](Task::resume). Construction is lazy: no part of the body runs
//! until the first resume, which is what makes argument evaluation order
//! deterministic when several tasks are handed to a combinator together.
//!
//! Tasks compose two ways:
//!
//! - **awaiting**: a task body may `.await` another [`Task`]; each resume of
//!   the parent then resumes the child first, and the parent's own body only
//!   advances once the child has finished.
//! - **companions**: [`with`](Task::with) attaches another task to run
//!   alongside the receiver every tick, either before or after the primary
//!   body, for as long as the receiver keeps being resumed. Companions carry
//!   per-tick side work (input sampling, timers, draw bookkeeping) without
//!   nesting it into the primary body's control flow.
//!
//! A panic anywhere inside a task's resume is captured into the output slot
//! rather than unwinding into the driver; it is re-raised when the output is
//! consumed, or from [`Scheduler::tick`](crate::scheduler::Scheduler::tick)
//! after the tick's bookkeeping completes.

use core::fmt;
use core::future::Future;
use core::mem;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use futures_util::task::noop_waker_ref;
use thiserror::Error;

mod id;
pub use self::id::TaskId;


pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Errors returned by [`Task::try_output`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputError {
    /// The task has not finished yet; there is no output to take.
    #[error("task has not finished")]
    NotFinished,
    /// The output was already consumed. A task's output can be taken exactly
    /// once.
    #[error("task output was already taken")]
    AlreadyTaken,
}

/// When a companion task runs relative to the primary body each tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompanionTiming {
    /// Resume the companion before the primary body.
    Before,
    /// Resume the companion after the primary body.
    After,
}

enum Output<T> {
    /// Not finished yet.
    Pending,
    /// Finished; the output is waiting to be taken.
    Ready(T),
    /// The body panicked; the payload is re-raised on first consumption.
    Panicked(PanicPayload),
    /// The output has been consumed.
    Taken,
}

/// An owned, suspendable unit of work advanced one step per tick.
///
/// See the [module documentation](self) for how tasks compose. `Task` is
/// move-only; transferring one transfers the suspended computation and its
/// companion lists.
pub struct Task<T> {
    /// The suspended computation, `None` once it has run to completion (or
    /// for tasks born finished via [`Task::ready`]).
    body: Option<Pin<Box<dyn Future<Output = T>>>>,
    output: Output<T>,
    before: Vec<Task<()>>,
    after: Vec<Task<()>>,
}

impl<T> Task<T> {
    /// Wraps a future into a task.
    ///
    /// The future does not run at all until the task's first
    /// [`resume`](Self::resume).
    #[must_use]
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        Self {
            body: Some(Box::pin(body)),
            output: Output::Pending,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Returns a task that is already finished with `value`.
    #[must_use]
    pub fn ready(value: T) -> Self {
        Self {
            body: None,
            output: Output::Ready(value),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// `true` once the body has produced an output, panicked, or the task
    /// was born finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self.output, Output::Pending)
    }

    /// Advances the task by one suspension point's worth of work.
    ///
    /// A no-op if the task is already finished. Otherwise the Before
    /// companions are resumed in registration order, then the primary body is
    /// polled once (an awaited child task is polled first and blocks the body
    /// while unfinished), then the After companions are resumed — including
    /// on the tick where the body finishes.
    ///
    /// A panic anywhere in that chain is captured here; the task becomes
    /// finished and the payload is re-raised when the output is consumed.
    pub fn resume(&mut self) {
        if self.is_finished() {
            return;
        }
        let mut cx = Context::from_waker(noop_waker_ref());
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.step(&mut cx))) {
            test_trace!("task body panicked; capturing payload");
            self.body = None;
            self.output = Output::Panicked(payload);
        }
    }

    /// One resume step, without panic capture. Panics unwind to the caller —
    /// for a child driven inside another task, that is the enclosing task's
    /// own capture point.
    pub(crate) fn step(&mut self, cx: &mut Context<'_>) {
        if self.is_finished() {
            return;
        }
        for companion in &mut self.before {
            companion.step(cx);
        }
        if let Some(body) = self.body.as_mut() {
            if let Poll::Ready(value) = body.as_mut().poll(cx) {
                self.body = None;
                self.output = Output::Ready(value);
            }
        }
        for companion in &mut self.after {
            companion.step(cx);
        }
    }

    /// Consumes the task's output.
    ///
    /// # Panics
    ///
    /// Panics if the task has not finished or the output was already taken;
    /// re-raises the captured panic if the body panicked. Use
    /// [`try_output`](Self::try_output) for a non-panicking variant.
    #[must_use]
    pub fn output(&mut self) -> T {
        match self.try_output() {
            Ok(value) => value,
            Err(error) => panic!("Task::output: {error}"),
        }
    }

    /// Consumes the task's output, or reports why it cannot be consumed.
    ///
    /// A captured panic still re-raises from here: a panicked body has no
    /// output to hand back, and swallowing the payload would lose it.
    pub fn try_output(&mut self) -> Result<T, OutputError> {
        match mem::replace(&mut self.output, Output::Taken) {
            Output::Ready(value) => Ok(value),
            Output::Panicked(payload) => panic::resume_unwind(payload),
            Output::Taken => Err(OutputError::AlreadyTaken),
            Output::Pending => {
                self.output = Output::Pending;
                Err(OutputError::NotFinished)
            }
        }
    }

    /// Takes the captured panic payload, if the body panicked. Leaves the
    /// output consumed.
    pub(crate) fn take_panic(&mut self) -> Option<PanicPayload> {
        if matches!(self.output, Output::Panicked(_)) {
            match mem::replace(&mut self.output, Output::Taken) {
                Output::Panicked(payload) => Some(payload),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    /// Attaches `companion` to run after the primary body every tick, for
    /// the remaining lifetime of the receiver. The companion's output is
    /// discarded.
    #[must_use]
    pub fn with<U: 'static>(self, companion: Task<U>) -> Self {
        self.with_timing(companion, CompanionTiming::After)
    }

    /// Attaches `companion` with an explicit [`CompanionTiming`].
    #[must_use]
    pub fn with_timing<U: 'static>(mut self, companion: Task<U>, timing: CompanionTiming) -> Self {
        let companion = companion.discard();
        match timing {
            CompanionTiming::Before => self.before.push(companion),
            CompanionTiming::After => self.after.push(companion),
        }
        self
    }
}

impl<T: 'static> Task<T> {
    /// Drops the output, yielding a `Task<()>`.
    ///
    /// Useful for mixing differently-typed tasks into a homogeneous
    /// collection (e.g. for [`combine::any`](crate::combine::any), which
    /// discards the outputs of children that lose the race).
    #[must_use]
    pub fn discard(mut self) -> Task<()> {
        match mem::replace(&mut self.output, Output::Taken) {
            Output::Ready(_) => Task::ready(()),
            Output::Panicked(payload) => Task {
                body: None,
                output: Output::Panicked(payload),
                before: Vec::new(),
                after: Vec::new(),
            },
            Output::Taken => Task {
                body: None,
                output: Output::Taken,
                before: Vec::new(),
                after: Vec::new(),
            },
            Output::Pending => {
                self.output = Output::Pending;
                Task::new(async move {
                    let _ = self.await;
                })
            }
        }
    }
}

impl Default for Task<()> {
    /// The empty task: already finished, with a unit output.
    fn default() -> Self {
        Self::ready(())
    }
}

/// A task never relies on being pinned: its body is boxed and pinned on its
/// own, and the output slot is plain storage. This holds even when `T` is
/// `!Unpin`.
impl<T> Unpin for Task<T> {}

impl<T> Future for Task<T> {
    type Output = T;

    /// Polling a task from inside another task's body resumes it: companions
    /// and body advance one step, and the output is yielded once finished.
    /// A captured panic resumes unwinding into the awaiting body.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        this.step(cx);
        if this.is_finished() {
            match mem::replace(&mut this.output, Output::Taken) {
                Output::Ready(value) => Poll::Ready(value),
                Output::Panicked(payload) => panic::resume_unwind(payload),
                Output::Taken => panic!("polled a task whose output was already taken"),
                Output::Pending => unreachable!("is_finished() excludes Pending"),
            }
        } else {
            Poll::Pending
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.output {
            Output::Pending => "Pending",
            Output::Ready(_) => "Ready(..)",
            Output::Panicked(_) => "Panicked(..)",
            Output::Taken => "Taken",
        };
        f.debug_struct("Task")
            .field("output", &state)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

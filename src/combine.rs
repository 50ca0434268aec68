//! Concurrent combinators driving several child tasks in lockstep.
//!
//! [`all`] and [`any`] take fully-constructed child [`Task`]s and produce one
//! derived task that resumes every child once per tick, **always in the order
//! the children were passed**. That ordering is a hard contract, observable
//! whenever children have side effects: even on the round where an earlier
//! child satisfies [`any`]'s completion predicate, the later children are
//! still resumed before the combinator completes. Do not "optimize" this
//! away.
//!
//! Children may be a homogeneous `Vec<Task<T>>` or a tuple of
//! differently-typed tasks (arities 2 through 6); both forms implement
//! [`TaskSet`]. For heterogeneous children in the `Vec` form, pre-wrap them
//! with [`Task::discard`].

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::task::Task;

/// A fixed set of child tasks a combinator can drive in lockstep.
///
/// Implemented for `Vec<Task<T>>` and for tuples of `Task`s up to arity 6.
pub trait TaskSet {
    /// Aggregate output of [`all`]: every child's output, in declared order.
    type AllOutput;
    /// Aggregate output of [`any`]: every child's output if it finished,
    /// `None` otherwise, in declared order.
    type AnyOutput;

    /// Resumes every child once, in declared order. Finished children are
    /// skipped by the per-task no-op rule, never reordered.
    fn resume_all(&mut self, cx: &mut Context<'_>);

    /// `true` if every child has finished.
    fn all_finished(&self) -> bool;

    /// `true` if at least one child has finished.
    fn any_finished(&self) -> bool;

    /// Number of children in the set.
    fn len(&self) -> usize;

    /// Consumes every child's output. Only valid once
    /// [`all_finished`](Self::all_finished) holds.
    fn take_all(&mut self) -> Self::AllOutput;

    /// Consumes the outputs of finished children, mapping the rest to
    /// `None`.
    fn take_any(&mut self) -> Self::AnyOutput;
}

impl<T: 'static> TaskSet for Vec<Task<T>> {
    type AllOutput = Vec<T>;
    type AnyOutput = Vec<Option<T>>;

    fn resume_all(&mut self, cx: &mut Context<'_>) {
        for child in self.iter_mut() {
            child.step(cx);
        }
    }

    fn all_finished(&self) -> bool {
        self.iter().all(Task::is_finished)
    }

    fn any_finished(&self) -> bool {
        self.iter().any(Task::is_finished)
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn take_all(&mut self) -> Vec<T> {
        self.iter_mut().map(Task::output).collect()
    }

    fn take_any(&mut self) -> Vec<Option<T>> {
        self.iter_mut()
            .map(|child| child.is_finished().then(|| child.output()))
            .collect()
    }
}

macro_rules! impl_task_set_for_tuple {
    ($($T:ident => $idx:tt),+) => {
        impl<$($T: 'static),+> TaskSet for ($(Task<$T>,)+) {
            type AllOutput = ($($T,)+);
            type AnyOutput = ($(Option<$T>,)+);

            fn resume_all(&mut self, cx: &mut Context<'_>) {
                $(self.$idx.step(cx);)+
            }

            fn all_finished(&self) -> bool {
                $(self.$idx.is_finished())&&+
            }

            fn any_finished(&self) -> bool {
                $(self.$idx.is_finished())||+
            }

            fn len(&self) -> usize {
                [$(stringify!($T)),+].len()
            }

            fn take_all(&mut self) -> Self::AllOutput {
                ($(self.$idx.output(),)+)
            }

            fn take_any(&mut self) -> Self::AnyOutput {
                ($(
                    if self.$idx.is_finished() {
                        Some(self.$idx.output())
                    } else {
                        None
                    },
                )+)
            }
        }
    };
}

impl_task_set_for_tuple!(A => 0, B => 1);
impl_task_set_for_tuple!(A => 0, B => 1, C => 2);
impl_task_set_for_tuple!(A => 0, B => 1, C => 2, D => 3);
impl_task_set_for_tuple!(A => 0, B => 1, C => 2, D => 3, E => 4);
impl_task_set_for_tuple!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

struct All<S> {
    children: S,
}

impl<S: TaskSet + Unpin> Future for All<S> {
    type Output = S::AllOutput;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // children that are all finished up front are never resumed at all
        if !this.children.all_finished() {
            this.children.resume_all(cx);
        }
        if this.children.all_finished() {
            Poll::Ready(this.children.take_all())
        } else {
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

struct Any<S> {
    children: S,
}

impl<S: TaskSet + Unpin> Future for Any<S> {
    type Output = S::AnyOutput;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.children.any_finished() {
            this.children.resume_all(cx);
        }
        if this.children.len() == 0 || this.children.any_finished() {
            Poll::Ready(this.children.take_any())
        } else {
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Returns a task that drives every child once per tick, in declared order,
/// and completes with all their outputs on the tick the last child finishes.
///
/// If every child is already finished when the combinator is first resumed,
/// the aggregate output is produced immediately without resuming anyone.
/// The aggregate is never partially visible: it exists only once complete.
#[must_use]
pub fn all<S>(children: S) -> Task<S::AllOutput>
where
    S: TaskSet + Unpin + 'static,
    S::AllOutput: 'static,
{
    Task::new(All { children })
}

/// Returns a task that drives every child once per tick, in declared order,
/// and completes on the first tick where at least one child has finished.
///
/// The output maps each child, in declared order, to `Some(output)` if it
/// finished and `None` otherwise — more than one slot may be `Some` when
/// children finish on the same tick. Unfinished children are dropped with
/// the combinator. An empty set completes immediately.
#[must_use]
pub fn any<S>(children: S) -> Task<S::AnyOutput>
where
    S: TaskSet + Unpin + 'static,
    S::AnyOutput: 'static,
{
    Task::new(Any { children })
}

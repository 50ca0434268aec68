//! Scoped ownership of running tasks.
//!
//! Spawning hands back a [`ScopedRunner`]: the exclusive owner of the
//! registered task's identity. Dropping the runner requests removal of the
//! task (a no-op if it already finished), so a task's lifetime is bounded by
//! the scope that spawned it unless explicitly [`forget`](ScopedRunner::forget)ten.
//! [`MultiRunner`] groups runners for bulk cancellation and aggregate
//! completion queries.

use core::fmt;
use core::task::Poll;
use std::cell::RefCell;
use std::rc::Weak;

use crate::future::poll_until;
use crate::scheduler::{Core, Scheduler};
use crate::task::{Task, TaskId};

/// Exclusive owner of at most one running task's identity.
///
/// Returned by [`Scheduler::spawn`] and
/// [`Builder::spawn`](crate::scheduler::Builder::spawn). Move-only;
/// reassigning over a runner drops (and thereby cancels) the task it held
/// before taking ownership of the new one. A runner whose scheduler has been
/// dropped treats its task as done and all its operations as no-ops.
pub struct ScopedRunner {
    id: Option<TaskId>,
    core: Weak<RefCell<Core>>,
}

impl ScopedRunner {
    pub(crate) fn new(id: TaskId, core: Weak<RefCell<Core>>) -> Self {
        Self { id: Some(id), core }
    }

    /// A runner for a task that finished during its initial drive and was
    /// never registered.
    pub(crate) fn finished() -> Self {
        Self {
            id: None,
            core: Weak::new(),
        }
    }

    /// The held task identity, if the task registered and has not been
    /// cancelled or forgotten through this runner.
    #[must_use]
    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    /// `true` once the task has finished or been cancelled (or never
    /// registered at all).
    #[must_use]
    pub fn done(&self) -> bool {
        match (self.id, self.core.upgrade()) {
            (Some(id), Some(core)) => Scheduler::from_core(core).is_done(id),
            _ => true,
        }
    }

    /// Requests removal of the held task, firing its cancel callback.
    /// Returns whether cancellation actually took effect — `false` if the
    /// task had already finished (its finish callback fired) or was already
    /// released.
    pub fn request_cancel(&mut self) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        match self.core.upgrade() {
            Some(core) => Scheduler::from_core(core).remove(id),
            None => false,
        }
    }

    /// Releases ownership without requesting removal: the task keeps running
    /// detached until it finishes on its own or the scheduler shuts down.
    pub fn forget(mut self) {
        self.id = None;
    }

    pub(crate) fn watch(&self) -> Watch {
        Watch {
            id: self.id,
            core: self.core.clone(),
        }
    }
}

impl Drop for ScopedRunner {
    fn drop(&mut self) {
        let _ = self.request_cancel();
    }
}

impl fmt::Debug for ScopedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRunner")
            .field("id", &self.id)
            .field("done", &self.done())
            .finish()
    }
}

/// A snapshot of one runner's identity, usable from inside a wait task after
/// the runner itself has moved on.
pub(crate) struct Watch {
    id: Option<TaskId>,
    core: Weak<RefCell<Core>>,
}

impl Watch {
    fn done(&self) -> bool {
        match (self.id, self.core.upgrade()) {
            (Some(id), Some(core)) => Scheduler::from_core(core).is_done(id),
            _ => true,
        }
    }
}

/// An owned, ordered collection of [`ScopedRunner`]s.
///
/// Grouping implies nothing beyond the collection itself: members remain
/// independently owned tasks, they just share bulk cancellation and
/// aggregate completion queries.
#[derive(Default, Debug)]
pub struct MultiRunner {
    runners: Vec<ScopedRunner>,
}

impl MultiRunner {
    /// Returns a new empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a runner, preserving insertion order.
    pub fn push(&mut self, runner: ScopedRunner) {
        self.runners.push(runner);
    }

    /// Number of held runners, finished or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    /// `true` if no runners are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Requests cancellation of every still-running member. Returns whether
    /// any cancellation took effect.
    pub fn request_cancel_all(&mut self) -> bool {
        let mut any = false;
        for runner in &mut self.runners {
            any |= runner.request_cancel();
        }
        any
    }

    /// Drops every member whose task has finished, keeping the rest in
    /// order.
    pub fn remove_done(&mut self) {
        self.runners.retain(|runner| !runner.done());
    }

    /// `true` if every member is done. Vacuously true when empty.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.runners.iter().all(ScopedRunner::done)
    }

    /// `true` if at least one member is done. `false` when empty.
    #[must_use]
    pub fn any_done(&self) -> bool {
        self.runners.iter().any(ScopedRunner::done)
    }

    /// Returns a task polling once per tick until every member present at
    /// the time of the call is done. Members added later are not watched.
    #[must_use]
    pub fn wait_all_done(&self) -> Task<()> {
        let watches: Vec<Watch> = self.runners.iter().map(ScopedRunner::watch).collect();
        Task::new(poll_until(move || {
            if watches.iter().all(Watch::done) {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        }))
    }

    /// Returns a task polling once per tick until at least one member
    /// present at the time of the call is done.
    ///
    /// Over an empty collection the returned task never completes, matching
    /// [`any_done`](Self::any_done) being `false` for an empty collection.
    #[must_use]
    pub fn wait_any_done(&self) -> Task<()> {
        let watches: Vec<Watch> = self.runners.iter().map(ScopedRunner::watch).collect();
        Task::new(poll_until(move || {
            if watches.iter().any(Watch::done) {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        }))
    }
}

impl Extend<ScopedRunner> for MultiRunner {
    fn extend<I: IntoIterator<Item = ScopedRunner>>(&mut self, iter: I) {
        self.runners.extend(iter);
    }
}

impl FromIterator<ScopedRunner> for MultiRunner {
    fn from_iter<I: IntoIterator<Item = ScopedRunner>>(iter: I) -> Self {
        Self {
            runners: Vec::from_iter(iter),
        }
    }
}

//! The scheduler backend: task registry, pending staging, and the per-frame
//! entry points.
//!
//! A [`Scheduler`] is a cheaply cloneable handle to a single-threaded core.
//! The host driver calls, once per frame and in this order:
//! [`tick`](Scheduler::tick) (resume every live task once),
//! [`draw`](Scheduler::draw) (main render sub-pass), and
//! [`late_draw`](Scheduler::late_draw) (late render sub-pass). Tasks never
//! resume during a render sub-pass; only their registered draw callbacks run
//! then.
//!
//! Registration is staged: spawning — from anywhere, including from inside a
//! running task or a completion callback — appends to a pending queue that
//! is merged into the live registry only at tick boundaries, so a newly
//! spawned task is never resumed zero or two times within one tick and the
//! scheduler's own traversal is never invalidated mid-flight.
//!
//! There is no implicit global instance: construct a `Scheduler` explicitly
//! at the application root and tear it down with
//! [`shutdown`](Scheduler::shutdown).

use core::fmt;
use core::mem;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, trace};

use crate::draw::{self, DrawerGuard, Layer, RenderPass};
use crate::map::SortedMap;
use crate::runner::ScopedRunner;
use crate::task::{PanicPayload, Task, TaskId};


/// Statistics recorded by a single call to [`Scheduler::tick`].
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct Tick {
    /// Number of live tasks resumed on this tick.
    pub polled: usize,
    /// Number of resumed tasks that finished normally on this tick.
    pub completed: usize,
    /// Number of tasks cancelled on this tick, including tasks removed by a
    /// deferred self-removal and tasks torn down because their body
    /// panicked.
    pub cancelled: usize,
    /// Number of staged tasks merged into the live registry on this tick.
    pub spawned: usize,
}

/// A registered task, type-erased.
///
/// Exactly one of [`finish`](Self::finish) or [`cancel`](Self::cancel) is
/// ever invoked, and at most once.
trait Entry {
    fn resume(&mut self);
    fn is_finished(&self) -> bool;
    fn take_panic(&mut self) -> Option<PanicPayload>;
    /// Consumes the entry, invoking the finish callback with the task's
    /// output.
    fn finish(self: Box<Self>);
    /// Consumes the entry, invoking the cancel callback.
    fn cancel(self: Box<Self>);
}

struct TaskEntry<T> {
    task: Task<T>,
    on_finish: Option<Box<dyn FnOnce(T)>>,
    on_cancel: Option<Box<dyn FnOnce()>>,
}

impl<T: 'static> Entry for TaskEntry<T> {
    fn resume(&mut self) {
        self.task.resume();
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn take_panic(&mut self) -> Option<PanicPayload> {
        self.task.take_panic()
    }

    fn finish(mut self: Box<Self>) {
        if let Some(on_finish) = self.on_finish.take() {
            let output = self
                .task
                .try_output()
                .expect("a finishing task must have an output; this is a bug");
            on_finish(output);
        }
    }

    fn cancel(mut self: Box<Self>) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

pub(crate) struct Core {
    /// Live entries in id (= registration) order. Task ids are allocated
    /// strictly increasingly, so the registry runs the monotonic O(1)-append
    /// mode.
    registry: SortedMap<TaskId, Box<dyn Entry>>,
    /// Entries staged by `add` and merged at tick boundaries.
    pending: Vec<(TaskId, Box<dyn Entry>)>,
    /// The id currently being resumed, if any.
    resuming: Option<TaskId>,
    /// Set when removal of the currently-resuming id is requested; honored
    /// right after its resume step returns.
    remove_resuming: bool,
    tick_count: u64,
    drawers: draw::Registry,
    shut_down: bool,
}

impl Core {
    pub(crate) fn drawers_mut(&mut self) -> &mut draw::Registry {
        &mut self.drawers
    }
}

enum Removal {
    Cancel(Box<dyn Entry>),
    Deferred(bool),
    NotFound,
}

/// A cloneable handle to the scheduler core. All clones refer to the same
/// core; the core lives until the last handle (and the last spawned task
/// holding one) is dropped.
#[derive(Clone)]
pub struct Scheduler {
    core: Rc<RefCell<Core>>,
}

impl Scheduler {
    /// Returns a new scheduler with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                registry: SortedMap::new_monotonic(),
                pending: Vec::new(),
                resuming: None,
                remove_resuming: false,
                tick_count: 0,
                drawers: draw::Registry::new(),
                shut_down: false,
            })),
        }
    }

    pub(crate) fn from_core(core: Rc<RefCell<Core>>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Core>> {
        Rc::downgrade(&self.core)
    }

    /// Number of [`tick`](Self::tick) calls begun so far. Tasks resumed
    /// during tick *n* observe a count of *n* (1-based); feed this to
    /// [`DeltaTimer::update`](crate::time::DeltaTimer::update).
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.core.borrow().tick_count
    }

    /// Spawns `task` with no completion callbacks. See
    /// [`Builder::spawn`] for the full contract.
    pub fn spawn<T: 'static>(&self, task: Task<T>) -> ScopedRunner {
        self.build_task().spawn(task)
    }

    /// Returns a [`Builder`] for configuring a task's finish and cancel
    /// callbacks before spawning it.
    #[must_use]
    pub fn build_task<T: 'static>(&self) -> Builder<T> {
        Builder {
            scheduler: self.clone(),
            on_finish: None,
            on_cancel: None,
        }
    }

    /// Resumes every live task once, in registration order.
    ///
    /// Pending entries are merged before and after the traversal; tasks (and
    /// callbacks) spawned during the tick therefore resume for the first
    /// time on the *next* tick. A task that finishes, panics, or had its
    /// removal requested while resuming is erased and exactly one of its
    /// finish/cancel callbacks fires before the next entry is considered.
    ///
    /// # Panics
    ///
    /// If a task body or callback panicked during the tick, the first
    /// captured payload is re-raised here after all bookkeeping completes —
    /// one failing task cannot corrupt scheduler state for the others
    /// sharing the tick. Callers driving the scheduler directly must be
    /// prepared for that. Also panics if called re-entrantly from inside a
    /// task, or after [`shutdown`](Self::shutdown).
    pub fn tick(&self) -> Tick {
        let mut stats = Tick::default();
        let mut first_panic: Option<PanicPayload> = None;

        let tick_n = {
            let mut core = self.core.borrow_mut();
            assert!(!core.shut_down, "tick on a scheduler that has been shut down");
            assert!(
                core.resuming.is_none(),
                "Scheduler::tick re-entered from inside a task"
            );
            core.tick_count += 1;
            core.tick_count
        };
        let span = debug_span!("tick", n = tick_n);
        let _enter = span.enter();

        self.flush_pending(&mut stats);

        let mut slot = 0;
        loop {
            // take the entry out of its slot so no core borrow is held while
            // the task runs; user code inside it may re-enter the scheduler
            let taken = {
                let mut core = self.core.borrow_mut();
                if slot >= core.registry.slot_count() {
                    None
                } else {
                    match core.registry.take_at(slot) {
                        Some(entry) => {
                            let id = core
                                .registry
                                .key_at(slot)
                                .expect("occupied slot must have a key");
                            core.resuming = Some(id);
                            core.remove_resuming = false;
                            Some(Some((id, entry)))
                        }
                        // tombstone
                        None => Some(None),
                    }
                }
            };
            let (id, mut entry) = match taken {
                None => break,
                Some(None) => {
                    slot += 1;
                    continue;
                }
                Some(Some(pair)) => pair,
            };

            {
                let _poll = debug_span!("poll", task.id = %id).entered();
                entry.resume();
            }
            stats.polled += 1;

            let deferred = {
                let mut core = self.core.borrow_mut();
                let deferred = core.remove_resuming;
                core.resuming = None;
                core.remove_resuming = false;
                deferred
            };

            if let Some(payload) = entry.take_panic() {
                debug!(task.id = %id, "task panicked; cancelling");
                stats.cancelled += 1;
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
                invoke_callback(&mut first_panic, || entry.cancel());
            } else if deferred {
                trace!(task.id = %id, "deferred removal honored");
                stats.cancelled += 1;
                invoke_callback(&mut first_panic, || entry.cancel());
            } else if entry.is_finished() {
                trace!(task.id = %id, "task finished");
                stats.completed += 1;
                invoke_callback(&mut first_panic, || entry.finish());
            } else {
                self.core.borrow_mut().registry.put_at(slot, entry);
            }
            slot += 1;
        }

        self.flush_pending(&mut stats);

        {
            let mut core = self.core.borrow_mut();
            let core = &mut *core;
            if core.registry.maybe_compact() {
                trace!("task registry compacted");
            }
            if core.drawers.maybe_compact() {
                trace!("draw registry compacted");
            }
        }

        debug!(
            stats.polled,
            stats.completed, stats.cancelled, stats.spawned
        );

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        stats
    }

    fn flush_pending(&self, stats: &mut Tick) {
        let mut core = self.core.borrow_mut();
        if core.pending.is_empty() {
            return;
        }
        let pending = mem::take(&mut core.pending);
        stats.spawned += pending.len();
        for (id, entry) in pending {
            core.registry
                .insert(id, entry)
                .expect("task ids are allocated in strictly increasing order");
        }
    }

    /// Stages a fully-erased entry for registration. Never touches the live
    /// registry.
    fn add(&self, id: TaskId, entry: Box<dyn Entry>) {
        self.core.borrow_mut().pending.push((id, entry));
    }

    /// Requests removal of `id`, firing its cancel callback. Returns whether
    /// a removal actually occurred.
    ///
    /// Removing the currently-resuming task is deferred: the flag is set and
    /// honored immediately after its resume step returns, with the callback
    /// still firing before the next tick begins. In that case the return
    /// value reports whether this call caused the state change. Removing an
    /// id that already finished is a no-op returning `false`.
    pub(crate) fn remove(&self, id: TaskId) -> bool {
        let removal = {
            let mut core = self.core.borrow_mut();
            if let Some(pos) = core.pending.iter().position(|(pid, _)| *pid == id) {
                let (_, entry) = core.pending.remove(pos);
                Removal::Cancel(entry)
            } else if core.resuming == Some(id) {
                let changed = !core.remove_resuming;
                core.remove_resuming = true;
                Removal::Deferred(changed)
            } else if let Some(entry) = core.registry.remove(&id) {
                Removal::Cancel(entry)
            } else {
                Removal::NotFound
            }
        };
        match removal {
            Removal::Cancel(entry) => {
                trace!(task.id = %id, "task cancelled");
                entry.cancel();
                true
            }
            Removal::Deferred(changed) => {
                trace!(task.id = %id, changed, "removal deferred until the resume step returns");
                changed
            }
            Removal::NotFound => false,
        }
    }

    /// `true` if the task identified by `id` has run to completion or been
    /// cancelled. Valid even after the registry entry is long gone: ids are
    /// never reused, so an allocated id that is tracked nowhere has
    /// necessarily been resolved.
    #[must_use]
    pub fn is_done(&self, id: TaskId) -> bool {
        let core = self.core.borrow();
        if core.resuming == Some(id) {
            return false;
        }
        if core.pending.iter().any(|(pid, _)| *pid == id) {
            return false;
        }
        if core.registry.contains_key(&id) {
            return false;
        }
        id.is_allocated()
    }

    /// Cancels every pending and live task in id order, firing each cancel
    /// callback, and marks the scheduler terminal. Subsequent
    /// [`tick`](Self::tick) and spawn calls panic; queries remain valid.
    ///
    /// # Panics
    ///
    /// Re-raises the first panic any cancel callback raised, after every
    /// callback has run. Panics if called from inside a task.
    pub fn shutdown(&self) {
        let entries = {
            let mut core = self.core.borrow_mut();
            if core.shut_down {
                return;
            }
            assert!(
                core.resuming.is_none(),
                "Scheduler::shutdown called from inside a task"
            );
            core.shut_down = true;
            let mut entries = mem::take(&mut core.pending);
            let live: Vec<TaskId> = core.registry.keys().collect();
            for id in live {
                if let Some(entry) = core.registry.remove(&id) {
                    entries.push((id, entry));
                }
            }
            entries.sort_by_key(|(id, _)| *id);
            core.registry.compact();
            entries
        };
        debug!(count = entries.len(), "shutdown: cancelling remaining tasks");
        let mut first_panic = None;
        for (id, entry) in entries {
            trace!(task.id = %id, "task cancelled");
            invoke_callback(&mut first_panic, || entry.cancel());
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    // === draw pass plumbing ===

    /// Registers a draw callback under `(layer, index)` and returns the
    /// guard that owns the registration. The callback runs on every
    /// [`draw`](Self::draw) / [`late_draw`](Self::late_draw) matching its
    /// layer's render pass, in ascending `(layer, index, id)` order, until
    /// the guard is dropped.
    pub fn add_drawer(
        &self,
        layer: Layer,
        index: i32,
        callback: impl Fn() + 'static,
    ) -> DrawerGuard {
        let id = self
            .core
            .borrow_mut()
            .drawers
            .add(layer, index, Rc::new(callback));
        DrawerGuard::new(id, self.downgrade())
    }

    /// Runs the main render sub-pass: every layer except the debug overlay.
    pub fn draw(&self) {
        self.run_pass(RenderPass::Main);
    }

    /// Runs the late render sub-pass: the debug overlay, on top of
    /// everything drawn by the main pass.
    pub fn late_draw(&self) {
        self.run_pass(RenderPass::Late);
    }

    fn run_pass(&self, pass: RenderPass) {
        let callbacks = self.core.borrow().drawers.collect_pass(pass);
        for callback in callbacks {
            callback();
        }
        self.core.borrow_mut().drawers.maybe_compact();
    }

    /// `true` if any live drawer is registered under `layer`. O(1).
    #[must_use]
    pub fn layer_has_drawer(&self, layer: Layer) -> bool {
        self.core.borrow().drawers.layer_has_drawer(layer)
    }

    /// `true` if any modal-layer drawer is active. O(1).
    #[must_use]
    pub fn modal_active(&self) -> bool {
        self.layer_has_drawer(Layer::Modal)
    }

    /// `true` if any fade-in transition drawer is active. O(1).
    #[must_use]
    pub fn fade_in_active(&self) -> bool {
        self.layer_has_drawer(Layer::TransitionFadeIn)
    }

    /// `true` if any general transition drawer is active. O(1).
    #[must_use]
    pub fn transition_active(&self) -> bool {
        self.layer_has_drawer(Layer::TransitionGeneral)
    }

    /// `true` if any fade-out transition drawer is active. O(1).
    #[must_use]
    pub fn fade_out_active(&self) -> bool {
        self.layer_has_drawer(Layer::TransitionFadeOut)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Scheduler")
                .field("live", &core.registry.len())
                .field("pending", &core.pending.len())
                .field("resuming", &core.resuming)
                .field("tick_count", &core.tick_count)
                .finish(),
            Err(_) => f.pad("Scheduler { .. }"),
        }
    }
}

fn invoke_callback(first_panic: &mut Option<PanicPayload>, callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        if first_panic.is_none() {
            *first_panic = Some(payload);
        }
    }
}

/// Configures a task's completion callbacks before spawning it.
///
/// Returned by [`Scheduler::build_task`]. The two callbacks are mutually
/// exclusive outcomes: `on_finish` receives the output when the task
/// completes normally, `on_cancel` fires (with nothing) when the task is
/// removed before completing — including when its body panics. Each fires at
/// most once.
pub struct Builder<T> {
    scheduler: Scheduler,
    on_finish: Option<Box<dyn FnOnce(T)>>,
    on_cancel: Option<Box<dyn FnOnce()>>,
}

impl<T: 'static> Builder<T> {
    /// Invoked exactly once, with the task's output, if the task completes
    /// normally.
    #[must_use]
    pub fn on_finish(mut self, callback: impl FnOnce(T) + 'static) -> Self {
        self.on_finish = Some(Box::new(callback));
        self
    }

    /// Invoked exactly once, with no output, if the task is removed before
    /// completing.
    #[must_use]
    pub fn on_cancel(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_cancel = Some(Box::new(callback));
        self
    }

    /// Drives `task` once (the *initial drive*) and, if it survives,
    /// registers it.
    ///
    /// A task that finishes during the initial drive fires its finish
    /// callback synchronously and never touches the registry; the returned
    /// runner is already done. Otherwise the task is staged and resumed once
    /// per tick from the next tick on, and the returned [`ScopedRunner`]
    /// owns its registration.
    ///
    /// # Panics
    ///
    /// A task that panics during the initial drive fires its cancel callback
    /// and re-raises the panic here, synchronously. Panics if the scheduler
    /// has been shut down.
    pub fn spawn(self, mut task: Task<T>) -> ScopedRunner {
        let Self {
            scheduler,
            on_finish,
            on_cancel,
        } = self;
        assert!(
            !scheduler.core.borrow().shut_down,
            "spawn on a scheduler that has been shut down"
        );

        task.resume();
        if test_dbg!(task.is_finished()) {
            if let Some(payload) = task.take_panic() {
                if let Some(on_cancel) = on_cancel {
                    on_cancel();
                }
                panic::resume_unwind(payload);
            }
            trace!("task finished during its initial drive; not registered");
            if let Some(on_finish) = on_finish {
                let output = task
                    .try_output()
                    .expect("a finishing task must have an output; this is a bug");
                on_finish(output);
            }
            return ScopedRunner::finished();
        }

        let id = TaskId::next();
        trace!(task.id = %id, "task staged");
        scheduler.add(
            id,
            Box::new(TaskEntry {
                task,
                on_finish,
                on_cancel,
            }),
        );
        ScopedRunner::new(id, scheduler.downgrade())
    }
}

impl<T> fmt::Debug for Builder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("on_finish", &self.on_finish.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

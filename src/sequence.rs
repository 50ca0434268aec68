//! The fade-in / run / fade-out lifecycle state machine, and scene chaining
//! on top of it.
//!
//! A [`Sequence`] runs through a fixed set of [`Phase`]s:
//!
//! ```text
//! PreStart ─→ (FadeIn ∥ Start) ─→ FadeOut ─→ PostFadeOut ─→ Done
//! ```
//!
//! FadeIn and Start run concurrently: the fade-in task is attached as a
//! Before-companion of the primary body, so it is resumed every tick just
//! ahead of it. FadeOut begins on the same tick Start finishes; Start's
//! output is captured and handed back once the whole lifecycle completes.
//!
//! While a sequence [`play`]s, one draw callback is registered for its
//! configured layer and index; it dispatches to
//! [`draw_pre_start`](Sequence::draw_pre_start),
//! [`draw_post_fade_out`](Sequence::draw_post_fade_out) or
//! [`draw`](Sequence::draw) depending on the current phase, and is revoked
//! the moment the play task ends — by completion or by cancellation.
//!
//! Phase factories receive the sequence as a [`Shared`] handle
//! (`Rc<RefCell<Self>>`); clone it into the async bodies that animate the
//! sequence over time. [`play`] consumes the sequence by value, so playing
//! the same instance twice is not representable.

use core::task::Poll;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::draw::{Layer, DEFAULT_DRAW_INDEX};
use crate::future::poll_until;
use crate::scheduler::Scheduler;
use crate::task::{CompanionTiming, Task};

/// A shared handle to a playing sequence.
pub type Shared<S> = Rc<RefCell<S>>;

/// The lifecycle phases of a playing [`Sequence`], in order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Before anything runs.
    PreStart,
    /// FadeIn and Start running concurrently (FadeIn may finish first).
    Running,
    /// Start has finished; FadeOut is running.
    FadeOut,
    /// FadeOut has finished; PostFadeOut is running.
    PostFadeOut,
    /// The whole lifecycle has completed.
    Done,
}

struct Signals {
    phase: Cell<Phase>,
    fade_in_finished: Cell<bool>,
}

/// Live view of a playing sequence's phase, handed to every phase factory.
///
/// Cheap to clone; clones observe the same play.
#[derive(Clone)]
pub struct SequenceContext {
    signals: Rc<Signals>,
}

impl SequenceContext {
    fn new() -> Self {
        Self {
            signals: Rc::new(Signals {
                phase: Cell::new(Phase::PreStart),
                fade_in_finished: Cell::new(false),
            }),
        }
    }

    /// The current phase of the play.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.signals.phase.get()
    }

    /// `true` once the fade-in task has finished.
    #[must_use]
    pub fn fade_in_finished(&self) -> bool {
        self.signals.fade_in_finished.get()
    }

    /// Returns a task that completes once the fade-in has finished, polling
    /// once per tick. Typically awaited from `start` to hold gameplay until
    /// the screen is fully visible.
    ///
    /// # Panics
    ///
    /// Panics when called during `PreStart`, `PostFadeOut` or `Done`: there
    /// is no fade-in to wait for outside the running window, and asking for
    /// one is a programming defect.
    #[must_use]
    pub fn wait_for_fade_in(&self) -> Task<()> {
        let phase = self.phase();
        assert!(
            matches!(phase, Phase::Running | Phase::FadeOut),
            "wait_for_fade_in called during {phase:?}; it is only valid while the sequence is running"
        );
        let signals = Rc::clone(&self.signals);
        Task::new(poll_until(move || {
            if signals.fade_in_finished.get() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        }))
    }
}

/// A multi-phase lifecycle run by [`play`].
///
/// Only [`start`](Sequence::start) is required; every other phase defaults
/// to finishing immediately, and the draw hooks default to drawing nothing
/// (the phase-specific hooks fall back to [`draw`](Sequence::draw)).
pub trait Sequence: Sized + 'static {
    /// What the whole play produces: [`start`](Sequence::start)'s output,
    /// held through FadeOut and PostFadeOut.
    type Output: 'static;

    /// The draw-order band this sequence's drawer registers under.
    fn layer(&self) -> Layer {
        Layer::Default
    }

    /// The fine-ordering index this sequence's drawer registers under.
    fn draw_index(&self) -> i32 {
        DEFAULT_DRAW_INDEX
    }

    /// Runs to completion before anything else.
    fn pre_start(this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        let _ = (this, ctx);
        Task::ready(())
    }

    /// Runs concurrently with `start`, resumed just before it every tick.
    fn fade_in(this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        let _ = (this, ctx);
        Task::ready(())
    }

    /// The primary body.
    fn start(this: &Shared<Self>, ctx: &SequenceContext) -> Task<Self::Output>;

    /// Begins on the tick `start` finishes.
    fn fade_out(this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        let _ = (this, ctx);
        Task::ready(())
    }

    /// Runs after the fade-out completes.
    fn post_fade_out(this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        let _ = (this, ctx);
        Task::ready(())
    }

    /// Draw hook for the running window (FadeIn/Start/FadeOut).
    fn draw(&self) {}

    /// Draw hook while still in PreStart. Defaults to [`draw`](Self::draw).
    fn draw_pre_start(&self) {
        self.draw();
    }

    /// Draw hook during PostFadeOut. Defaults to [`draw`](Self::draw).
    fn draw_post_fade_out(&self) {
        self.draw();
    }
}

/// Plays `sequence` through its full lifecycle, yielding `start`'s output
/// once PostFadeOut completes.
///
/// Consumes the sequence; the returned task owns it for the duration of the
/// play. Spawn the task (or await it from another task) to actually run it.
pub fn play<S: Sequence>(scheduler: &Scheduler, sequence: S) -> Task<S::Output> {
    let scheduler = scheduler.clone();
    let layer = sequence.layer();
    let draw_index = sequence.draw_index();
    let this: Shared<S> = Rc::new(RefCell::new(sequence));
    let ctx = SequenceContext::new();

    Task::new(async move {
        // registered for exactly as long as this body is alive; dropping the
        // body (completion or cancellation) revokes it
        let _drawer = {
            let this = Rc::clone(&this);
            let ctx = ctx.clone();
            scheduler.add_drawer(layer, draw_index, move || {
                let sequence = this.borrow();
                match ctx.phase() {
                    Phase::PreStart => sequence.draw_pre_start(),
                    Phase::PostFadeOut | Phase::Done => sequence.draw_post_fade_out(),
                    Phase::Running | Phase::FadeOut => sequence.draw(),
                }
            })
        };

        trace!(phase = ?Phase::PreStart, "sequence phase");
        S::pre_start(&this, &ctx).await;
        ctx.signals.phase.set(Phase::Running);
        trace!(phase = ?Phase::Running, "sequence phase");

        let fade_in = {
            let inner = S::fade_in(&this, &ctx);
            let ctx = ctx.clone();
            Task::new(async move {
                inner.await;
                ctx.signals.fade_in_finished.set(true);
                trace!("fade-in finished");
            })
        };
        let start_and_fade_out = {
            let this = Rc::clone(&this);
            let ctx = ctx.clone();
            Task::new(async move {
                let output = S::start(&this, &ctx).await;
                ctx.signals.phase.set(Phase::FadeOut);
                trace!(phase = ?Phase::FadeOut, "sequence phase");
                S::fade_out(&this, &ctx).await;
                output
            })
            .with_timing(fade_in, CompanionTiming::Before)
        };

        let output = start_and_fade_out.await;
        ctx.signals.phase.set(Phase::PostFadeOut);
        trace!(phase = ?Phase::PostFadeOut, "sequence phase");
        S::post_fade_out(&this, &ctx).await;
        ctx.signals.phase.set(Phase::Done);
        trace!(phase = ?Phase::Done, "sequence phase");
        output
    })
}

/// What a finished scene hands back to the scene driver.
pub enum NextScene {
    /// Tear the current scene down, then build and play the next one.
    Goto(SceneFactory),
    /// End the scene chain.
    Finish,
}

impl core::fmt::Debug for NextScene {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Goto(_) => f.pad("Goto(..)"),
            Self::Finish => f.pad("Finish"),
        }
    }
}

/// Builds the next scene's play task. State the outgoing scene wants the
/// incoming one to observe travels inside this closure: the driver invokes
/// it before releasing the previous play task.
pub type SceneFactory = Box<dyn FnOnce(&Scheduler) -> Task<NextScene>>;

/// Wraps a [`Sequence`] whose output is a [`NextScene`] into a
/// [`SceneFactory`].
pub fn scene<S>(sequence: S) -> SceneFactory
where
    S: Sequence<Output = NextScene>,
{
    Box::new(move |scheduler| play(scheduler, sequence))
}

/// Drives a chain of scenes: plays the first scene to full completion
/// (FadeOut and PostFadeOut included), then builds whatever it handed back,
/// and so on until a scene returns [`NextScene::Finish`].
pub fn run_scenes(scheduler: &Scheduler, first: SceneFactory) -> Task<()> {
    let scheduler = scheduler.clone();
    Task::new(async move {
        let mut current = first(&scheduler);
        loop {
            match current.await {
                NextScene::Finish => break,
                NextScene::Goto(factory) => {
                    trace!("scene transition");
                    current = factory(&scheduler);
                }
            }
        }
    })
}

mod util;

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use enoki::future::next_tick;
use enoki::sequence::{self, NextScene, Phase, Sequence, SequenceContext, Shared};
use enoki::{Layer, Scheduler, Task};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

/// A sequence whose every phase takes exactly one tick, instrumented to
/// expose its log and live [`SequenceContext`] to the test.
struct Phased {
    log: Log,
    ctx: Rc<RefCell<Option<SequenceContext>>>,
}

impl Phased {
    fn phase_task(log: &Log, name: &'static str) -> Task<()> {
        let log = log.clone();
        Task::new(async move {
            push(&log, format!("{name} begin"));
            next_tick().await;
            push(&log, format!("{name} end"));
        })
    }
}

impl Sequence for Phased {
    type Output = u32;

    fn layer(&self) -> Layer {
        Layer::Modal
    }

    fn pre_start(this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        let seq = this.borrow();
        *seq.ctx.borrow_mut() = Some(ctx.clone());
        Self::phase_task(&seq.log, "pre-start")
    }

    fn fade_in(this: &Shared<Self>, _ctx: &SequenceContext) -> Task<()> {
        Self::phase_task(&this.borrow().log, "fade-in")
    }

    fn start(this: &Shared<Self>, _ctx: &SequenceContext) -> Task<u32> {
        let log = this.borrow().log.clone();
        Task::new(async move {
            push(&log, "start begin");
            next_tick().await;
            push(&log, "start end");
            42
        })
    }

    fn fade_out(this: &Shared<Self>, _ctx: &SequenceContext) -> Task<()> {
        Self::phase_task(&this.borrow().log, "fade-out")
    }

    fn post_fade_out(this: &Shared<Self>, _ctx: &SequenceContext) -> Task<()> {
        Self::phase_task(&this.borrow().log, "post-fade-out")
    }

    fn draw(&self) {
        push(&self.log, "draw");
    }

    fn draw_pre_start(&self) {
        push(&self.log, "draw:pre-start");
    }

    fn draw_post_fade_out(&self) {
        push(&self.log, "draw:post-fade-out");
    }
}

#[test]
fn one_tick_phases_complete_in_exactly_four_ticks() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let log = log();
    let ctx = Rc::new(RefCell::new(None));
    let result = Rc::new(RefCell::new(None));

    let runner = scheduler
        .build_task()
        .on_finish({
            let result = result.clone();
            move |value: u32| *result.borrow_mut() = Some(value)
        })
        .spawn(sequence::play(
            &scheduler,
            Phased {
                log: log.clone(),
                ctx: ctx.clone(),
            },
        ));

    let phase = {
        let ctx = ctx.clone();
        move || ctx.borrow().as_ref().expect("ctx captured in pre_start").phase()
    };

    // initial drive: pre-start began and suspended
    assert_eq!(phase(), Phase::PreStart);
    assert_eq!(*log.borrow(), ["pre-start begin"]);

    scheduler.tick(); // tick 1: pre-start ends, fade-in and start begin
    assert_eq!(phase(), Phase::Running);
    assert_eq!(
        *log.borrow(),
        ["pre-start begin", "pre-start end", "fade-in begin", "start begin"]
    );

    log.borrow_mut().clear();
    scheduler.tick(); // tick 2: fade-in and start both end; fade-out begins
    assert_eq!(phase(), Phase::FadeOut);
    assert_eq!(
        *log.borrow(),
        ["fade-in end", "start end", "fade-out begin"]
    );

    log.borrow_mut().clear();
    scheduler.tick(); // tick 3: fade-out ends, post-fade-out begins
    assert_eq!(phase(), Phase::PostFadeOut);
    assert_eq!(*log.borrow(), ["fade-out end", "post-fade-out begin"]);
    assert!(!runner.done());

    log.borrow_mut().clear();
    scheduler.tick(); // tick 4: post-fade-out ends; the play completes
    assert_eq!(phase(), Phase::Done);
    assert_eq!(*log.borrow(), ["post-fade-out end"]);
    assert!(runner.done());
    assert_eq!(*result.borrow(), Some(42), "start's output is handed through");
}

#[test]
fn fade_in_and_start_overlap_on_tick_two_only() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let log = log();
    let ctx = Rc::new(RefCell::new(None));

    let _runner = scheduler.spawn(sequence::play(
        &scheduler,
        Phased {
            log: log.clone(),
            ctx: ctx.clone(),
        },
    ));

    let in_progress = |name: &str| {
        let log = log.borrow();
        log.iter().any(|e| e == &format!("{name} begin"))
            && !log.iter().any(|e| e == &format!("{name} end"))
    };

    // after tick 1 both are started and neither finished; tick 2 finishes
    // both — that is the only tick on which they overlap in progress
    scheduler.tick();
    assert!(in_progress("fade-in") && in_progress("start"));
    scheduler.tick();
    assert!(!in_progress("fade-in") && !in_progress("start"));
}

#[test]
fn drawer_tracks_phase_and_lifetime() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let log = log();
    let ctx = Rc::new(RefCell::new(None));

    let _runner = scheduler.spawn(sequence::play(
        &scheduler,
        Phased {
            log: log.clone(),
            ctx: ctx.clone(),
        },
    ));

    // the sequence registered its drawer on the modal layer for the whole play
    assert!(scheduler.modal_active());

    scheduler.draw(); // during PreStart
    scheduler.tick(); // -> Running
    scheduler.draw();
    scheduler.tick(); // -> FadeOut
    scheduler.draw();
    scheduler.tick(); // -> PostFadeOut
    scheduler.draw();
    scheduler.tick(); // play completes; drawer revoked
    scheduler.draw();
    assert!(!scheduler.modal_active());

    let draws: Vec<_> = log
        .borrow()
        .iter()
        .filter(|e| e.starts_with("draw"))
        .cloned()
        .collect();
    assert_eq!(
        draws,
        ["draw:pre-start", "draw", "draw", "draw:post-fade-out"],
        "one dispatch per pass, none after the play ended"
    );
}

#[test]
fn cancelling_a_play_revokes_its_drawer() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let log = log();
    let ctx = Rc::new(RefCell::new(None));

    let mut runner = scheduler.spawn(sequence::play(
        &scheduler,
        Phased {
            log: log.clone(),
            ctx,
        },
    ));
    scheduler.tick();
    assert!(scheduler.modal_active());

    assert!(runner.request_cancel());
    assert!(!scheduler.modal_active(), "cancellation dropped the drawer");
}

struct WaitsForFadeIn {
    log: Log,
}

impl Sequence for WaitsForFadeIn {
    type Output = ();

    fn fade_in(this: &Shared<Self>, _ctx: &SequenceContext) -> Task<()> {
        let log = this.borrow().log.clone();
        Task::new(async move {
            next_tick().await;
            next_tick().await;
            push(&log, "fade-in done");
        })
    }

    fn start(this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        let log = this.borrow().log.clone();
        let ctx = ctx.clone();
        Task::new(async move {
            ctx.wait_for_fade_in().await;
            push(&log, "start saw the fade-in finish");
        })
    }
}

#[test]
fn start_can_hold_for_the_fade_in() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let log = log();

    let runner = scheduler.spawn(sequence::play(&scheduler, WaitsForFadeIn { log: log.clone() }));

    scheduler.tick();
    assert!(log.borrow().is_empty());
    scheduler.tick();
    // the fade-in companion runs before the primary body, so start observes
    // the flag on the same tick the fade-in finishes
    assert_eq!(*log.borrow(), ["fade-in done", "start saw the fade-in finish"]);
    assert!(runner.done());
}

struct AsksTooEarly;

impl Sequence for AsksTooEarly {
    type Output = ();

    fn pre_start(_this: &Shared<Self>, ctx: &SequenceContext) -> Task<()> {
        // usage defect: there is no fade-in to wait for during PreStart
        ctx.wait_for_fade_in()
    }

    fn start(_this: &Shared<Self>, _ctx: &SequenceContext) -> Task<()> {
        Task::ready(())
    }
}

#[test]
fn waiting_for_the_fade_in_during_pre_start_panics() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let result = catch_unwind(AssertUnwindSafe(|| {
        scheduler.spawn(sequence::play(&scheduler, AsksTooEarly))
    }));
    assert!(result.is_err(), "the usage error surfaces at the initial drive");
}

struct Named {
    name: &'static str,
    log: Log,
    next: Option<Box<dyn FnOnce() -> NextScene>>,
}

impl Sequence for Named {
    type Output = NextScene;

    fn start(this: &Shared<Self>, _ctx: &SequenceContext) -> Task<NextScene> {
        let log = this.borrow().log.clone();
        let name = this.borrow().name;
        let next = this.borrow_mut().next.take().expect("scene started once");
        Task::new(async move {
            push(&log, format!("{name} running"));
            next_tick().await;
            push(&log, format!("{name} leaving"));
            next()
        })
    }
}

#[test]
fn scenes_chain_until_finish() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let log = log();

    let second = {
        let log = log.clone();
        Named {
            name: "second",
            log: log.clone(),
            next: Some(Box::new(move || {
                push(&log, "second chose to finish");
                NextScene::Finish
            })),
        }
    };
    let first = Named {
        name: "first",
        log: log.clone(),
        next: Some(Box::new(move || NextScene::Goto(sequence::scene(second)))),
    };

    let runner = scheduler.spawn(sequence::run_scenes(&scheduler, sequence::scene(first)));

    scheduler.tick();
    assert_eq!(*log.borrow(), ["first running", "first leaving", "second running"]);
    assert!(!runner.done());

    scheduler.tick();
    assert_eq!(
        *log.borrow(),
        [
            "first running",
            "first leaving",
            "second running",
            "second leaving",
            "second chose to finish"
        ]
    );
    assert!(runner.done());
}

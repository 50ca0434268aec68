mod util;

use std::cell::RefCell;
use std::rc::Rc;

use enoki::future::{delay_ticks, next_tick};
use enoki::{combine, Scheduler, Task};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

/// A task that suspends `delay` times, then yields `value`.
fn delayed(value: u32, delay: usize) -> Task<u32> {
    Task::new(async move {
        delay_ticks(delay).await;
        value
    })
}

#[test]
fn all_completes_on_the_tick_the_last_child_finishes() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let result = Rc::new(RefCell::new(None));

    let _runner = scheduler
        .build_task()
        .on_finish({
            let result = result.clone();
            move |outputs: Vec<u32>| *result.borrow_mut() = Some(outputs)
        })
        .spawn(combine::all(vec![
            delayed(10, 1),
            delayed(20, 2),
            delayed(30, 3),
        ]));

    scheduler.tick();
    assert!(result.borrow().is_none(), "unfinished after tick 1");
    scheduler.tick();
    assert!(result.borrow().is_none(), "unfinished after tick 2");
    scheduler.tick();
    // the aggregate appears only on the tick the slowest child finishes,
    // complete and in declared order
    assert_eq!(result.borrow().as_deref(), Some(&[10, 20, 30][..]));
}

#[test]
fn any_completes_on_the_first_finish_with_the_rest_empty() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let result = Rc::new(RefCell::new(None));

    let _runner = scheduler
        .build_task()
        .on_finish({
            let result = result.clone();
            move |outputs: Vec<Option<u32>>| *result.borrow_mut() = Some(outputs)
        })
        .spawn(combine::any(vec![
            delayed(10, 1),
            delayed(20, 2),
            delayed(30, 3),
        ]));

    scheduler.tick();
    assert_eq!(
        result.borrow().as_deref(),
        Some(&[Some(10), None, None][..])
    );
}

#[test]
fn children_resume_in_declared_order_every_tick() {
    util::trace_init();
    let log = log();
    let noisy = |name: &'static str| {
        let log = log.clone();
        Task::new(async move {
            push(&log, format!("{name}-a"));
            next_tick().await;
            push(&log, format!("{name}-b"));
        })
    };

    let mut all = combine::all(vec![noisy("x"), noisy("y"), noisy("z")]);
    all.resume();
    assert_eq!(*log.borrow(), ["x-a", "y-a", "z-a"]);
    all.resume();
    assert_eq!(*log.borrow(), ["x-a", "y-a", "z-a", "x-b", "y-b", "z-b"]);
    assert!(all.is_finished());
}

#[test]
fn any_still_resumes_later_children_on_the_completing_round() {
    util::trace_init();
    let log = log();

    // the first child finishes on this round's resume; the later child's
    // per-tick side effect must still happen on that same round
    let fast = Task::new(async {
        next_tick().await;
    });
    let slow = Task::new({
        let log = log.clone();
        async move {
            push(&log, "slow tick 1");
            next_tick().await;
            push(&log, "slow tick 2");
            delay_ticks(10).await;
        }
    });

    let mut any = combine::any((fast, slow));
    any.resume();
    assert_eq!(*log.borrow(), ["slow tick 1"]);
    any.resume();
    assert!(any.is_finished());
    assert_eq!(*log.borrow(), ["slow tick 1", "slow tick 2"]);
    let (first, second) = any.output();
    assert_eq!(first, Some(()));
    assert_eq!(second, None);
}

#[test]
fn all_over_already_finished_children_is_immediate() {
    util::trace_init();
    let mut all = combine::all(vec![Task::ready(1), Task::ready(2)]);
    all.resume();
    assert!(all.is_finished());
    assert_eq!(all.output(), vec![1, 2]);
}

#[test]
fn all_over_an_empty_set_is_immediate() {
    let mut all = combine::all(Vec::<Task<u32>>::new());
    all.resume();
    assert!(all.is_finished());
    assert_eq!(all.output(), Vec::<u32>::new());
}

#[test]
fn any_over_an_empty_set_is_immediate() {
    let mut any = combine::any(Vec::<Task<u32>>::new());
    any.resume();
    assert!(any.is_finished());
    assert_eq!(any.output(), Vec::<Option<u32>>::new());
}

#[test]
fn tuple_children_keep_their_types() {
    util::trace_init();
    let number = Task::new(async {
        next_tick().await;
        7u32
    });
    let text = Task::new(async {
        delay_ticks(2).await;
        "done"
    });
    let unit = Task::new(async {
        next_tick().await;
    });

    let mut all = combine::all((number, text, unit));
    all.resume();
    all.resume();
    assert!(!all.is_finished(), "the slowest tuple child gates the rest");
    all.resume();
    assert!(all.is_finished());
    // the unit child contributes the void sentinel slot
    assert_eq!(all.output(), (7, "done", ()));
}

#[test]
fn discard_mixes_heterogeneous_children_into_a_vec() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let number = Task::new(async {
        next_tick().await;
        7u32
    });
    let text = Task::new(async {
        next_tick().await;
        "dropped"
    });

    let runner = scheduler.spawn(combine::all(vec![number.discard(), text.discard()]));
    scheduler.tick();
    assert!(runner.done());
}

#[test]
fn nested_combinators_compose() {
    util::trace_init();
    let scheduler = Scheduler::new();
    let result = Rc::new(RefCell::new(None));

    let inner = combine::all(vec![delayed(1, 1), delayed(2, 2)]);
    let outer = combine::any((inner, Task::new(async { delay_ticks(10).await })));

    let _runner = scheduler
        .build_task()
        .on_finish({
            let result = result.clone();
            move |outputs: (Option<Vec<u32>>, Option<()>)| *result.borrow_mut() = Some(outputs)
        })
        .spawn(outer);

    scheduler.tick();
    assert!(result.borrow().is_none());
    scheduler.tick();
    assert_eq!(
        *result.borrow(),
        Some((Some(vec![1, 2]), None)),
        "the inner all wins the outer any on tick 2"
    );
}

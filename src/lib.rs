//! A single-threaded cooperative task scheduler, driven one *tick* at a
//! time.
//!
//! The host calls [`Scheduler::tick`] once per frame; every live [`Task`]
//! then advances by exactly one suspension point, in registration order.
//! Suspension is just returning to the driver until the next tick — there is
//! no preemption, no parallelism, and no hidden I/O. On top of that core sit
//! deterministic concurrent [combinators](combine), a pause-aware
//! [timer](time), a [layered draw pass](draw), and a
//! fade-in/run/fade-out [sequence lifecycle](sequence).
//!
//! ```rust
//! use enoki::{future, Scheduler, Task};
//!
//! let scheduler = Scheduler::new();
//! let runner = scheduler.spawn(Task::new(async {
//!     future::next_tick().await;
//!     future::next_tick().await;
//! }));
//!
//! assert!(!runner.done());
//! scheduler.tick();
//! assert!(!runner.done());
//! scheduler.tick();
//! assert!(runner.done());
//! ```

#[macro_use]
mod util;

pub mod blocking;
pub mod combine;
pub mod draw;
pub mod future;
pub mod map;
pub mod runner;
pub mod scheduler;
pub mod sequence;
pub mod sync;
pub mod task;
pub mod time;

pub use self::draw::Layer;
pub use self::runner::{MultiRunner, ScopedRunner};
pub use self::scheduler::{Scheduler, Tick};
pub use self::task::{CompanionTiming, Task, TaskId};

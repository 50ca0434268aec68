//! Pause-aware elapsed-time tracking, decoupled from the tick driver.

use core::time::Duration;

use thiserror::Error;

mod clock;
pub use self::clock::{Clock, Ticks};

/// Errors returned when constructing a timer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    /// The requested duration exceeds what the clock can represent.
    #[error("requested duration {requested:?} exceeds the clock's maximum {max:?}")]
    DurationTooLong {
        /// The duration that was requested.
        requested: Duration,
        /// The clock's maximum duration.
        max: Duration,
    },
}

#[derive(Debug)]
enum Source {
    /// Readings are the scheduler's logical tick counter itself; one unit
    /// per tick.
    Logical,
    /// Readings come from an external steady [`Clock`].
    Steady(Clock),
}

/// An elapsed-time accumulator that charges time only across consecutive
/// ticks.
///
/// The consumer calls [`update`](Self::update) once per tick it is actually
/// resumed on, passing the scheduler's current tick count. The delta since
/// the previous reading is added to the accumulated elapsed time **only** if
/// exactly one tick has passed since the previous update. If the consumer
/// was paused (skipped one or more ticks) the delta is dropped — the paused
/// interval is not charged, and progress resumes advancing from the next
/// tick onward. A second update within the same tick is likewise dropped,
/// preventing double-counting.
#[derive(Debug)]
pub struct DeltaTimer {
    duration: Ticks,
    elapsed: Ticks,
    source: Source,
    prev_tick: Option<u64>,
    prev_reading: Option<Ticks>,
}

impl DeltaTimer {
    /// Returns a timer measuring logical ticks: `duration_ticks` consecutive
    /// ticks of being resumed complete it.
    #[must_use]
    pub fn logical(duration_ticks: Ticks) -> Self {
        Self {
            duration: duration_ticks,
            elapsed: 0,
            source: Source::Logical,
            prev_tick: None,
            prev_reading: None,
        }
    }

    /// Returns a timer measuring `duration` against an external steady
    /// `clock`.
    ///
    /// # Panics
    ///
    /// Panics if `duration` exceeds the clock's representable range; use
    /// [`try_with_clock`](Self::try_with_clock) to handle that case.
    #[must_use]
    pub fn with_clock(duration: Duration, clock: Clock) -> Self {
        Self::try_with_clock(duration, clock).expect("timer duration exceeds the clock's range")
    }

    /// Returns a timer measuring `duration` against an external steady
    /// `clock`, without panicking.
    pub fn try_with_clock(duration: Duration, clock: Clock) -> Result<Self, TimerError> {
        let duration = clock::dur_to_ticks(clock.tick_duration(), duration)?;
        Ok(Self {
            duration,
            elapsed: 0,
            source: Source::Steady(clock),
            prev_tick: None,
            prev_reading: None,
        })
    }

    /// Feeds the timer the current tick count, charging the time since the
    /// previous update iff that update happened exactly one tick ago.
    ///
    /// The first call only establishes a baseline.
    pub fn update(&mut self, tick_count: u64) {
        let reading = match &self.source {
            Source::Logical => tick_count,
            Source::Steady(clock) => clock.now_ticks(),
        };
        if let (Some(prev_tick), Some(prev_reading)) = (self.prev_tick, self.prev_reading) {
            // anything other than exactly one tick since the last update
            // (a pause, or a repeat within the same tick) drops the delta
            if tick_count == prev_tick + 1 {
                self.elapsed = self.elapsed.saturating_add(reading.saturating_sub(prev_reading));
            }
        }
        self.prev_tick = Some(tick_count);
        self.prev_reading = Some(reading);
    }

    /// Progress toward the target duration in `0.0..=1.0`. A zero-duration
    /// timer reports `1.0` immediately.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.duration == 0 {
            return 1.0;
        }
        (self.elapsed as f64 / self.duration as f64).min(1.0)
    }

    /// `true` once the accumulated time has reached the target duration.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Accumulated elapsed time, in the source's tick unit.
    #[must_use]
    pub fn elapsed(&self) -> Ticks {
        self.elapsed
    }

    /// Target duration, in the source's tick unit.
    #[must_use]
    pub fn duration(&self) -> Ticks {
        self.duration
    }

    /// Clears the accumulated time and the update baseline.
    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.prev_tick = None;
        self.prev_reading = None;
    }
}

//! [`Clock`]s provide steady time sources for timers.

use core::time::Duration;

use super::TimerError;

/// [`Clock`] ticks are always counted by a 64-bit unsigned integer.
pub type Ticks = u64;

/// A steady clock definition.
///
/// A `Clock` pairs a `now()` function returning the clock's current reading
/// in [`Ticks`] with the [`Duration`] one tick of it represents. The `now()`
/// implementation MUST be monotonically non-decreasing: a reading may never
/// be less than any earlier reading. Readings are expected not to overflow
/// within any realistic process lifetime; if the underlying counter is
/// narrower than 64 bits, the implementation is responsible for widening it.
///
/// ```rust
/// use std::time::{Duration, Instant};
/// use enoki::time::{Clock, Ticks};
///
/// fn micros_since_start() -> Ticks {
///     use std::sync::OnceLock;
///     static START: OnceLock<Instant> = OnceLock::new();
///     let start = *START.get_or_init(Instant::now);
///     start.elapsed().as_micros() as Ticks
/// }
///
/// let clock = Clock::new(Duration::from_micros(1), micros_since_start).named("monotonic-micros");
/// ```
#[derive(Clone, Debug)]
pub struct Clock {
    now: fn() -> Ticks,
    tick_duration: Duration,
    name: &'static str,
}

impl Clock {
    /// Returns a new [`Clock`] with the provided tick [`Duration`] and
    /// `now()` function.
    #[must_use]
    pub const fn new(tick_duration: Duration, now: fn() -> Ticks) -> Self {
        Self {
            now,
            tick_duration,
            name: "<unnamed clock>",
        }
    }

    /// Add an arbitrary user-defined name to this `Clock`, identifying its
    /// time source in `fmt::Debug` output.
    #[must_use]
    pub const fn named(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Returns the current reading, in [`Ticks`] of this clock's base tick
    /// duration.
    #[must_use]
    pub(crate) fn now_ticks(&self) -> Ticks {
        (self.now)()
    }

    /// Returns the [`Duration`] of one tick of this clock.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Returns the maximum duration representable by this clock.
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        max_duration(self.tick_duration)
    }

    /// Returns this `Clock`'s name, if it was given one using
    /// [`Clock::named`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[inline]
#[must_use]
pub(in crate::time) fn max_duration(tick_duration: Duration) -> Duration {
    tick_duration.saturating_mul(u32::MAX)
}

#[inline]
pub(in crate::time) fn dur_to_ticks(
    tick_duration: Duration,
    dur: Duration,
) -> Result<Ticks, TimerError> {
    (dur.as_nanos() / tick_duration.as_nanos())
        .try_into()
        .map_err(|_| TimerError::DurationTooLong {
            requested: dur,
            max: max_duration(tick_duration),
        })
}

use core::fmt;
use portable_atomic::{AtomicU64, Ordering::Relaxed};

/// Ids are allocated from a single process-wide counter, so a `TaskId` is
/// unique across every scheduler ever created in the process and is never
/// reused. Id 0 is reserved and never handed out.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a registered task.
///
/// A `TaskId` is an opaque, monotonically increasing integer assigned when a
/// task is staged for registration. Ids are never reused, which makes them
/// safe to hold on to after the task itself is gone: a completion query
/// against an id whose registry entry has been erased still answers
/// correctly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        let id = NEXT_ID.fetch_add(1, Relaxed);
        debug_assert!(id > 0, "64-bit task ID counter should not overflow!");
        Self(id)
    }

    /// `true` if this id has been handed out at some point in the process's
    /// lifetime. An allocated id that is no longer tracked anywhere has
    /// necessarily run to completion or been cancelled.
    pub(crate) fn is_allocated(self) -> bool {
        self.0 > 0 && self.0 < NEXT_ID.load(Relaxed)
    }

    /// Returns the id as a plain integer, mostly useful for logging.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

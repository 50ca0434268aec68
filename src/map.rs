//! Sorted associative storage with tombstone-based lazy removal.
//!
//! [`SortedMap`] backs the scheduler's task registry and the draw registry.
//! Both of those containers are routinely mutated *while they are being
//! traversed* — a task that finishes or is cancelled must leave the registry
//! without breaking the scheduler's own walk over it. Rather than physically
//! removing slots (which would shift every later index), removal only marks a
//! slot's value absent and counts it as a tombstone; a separate [`compact`]
//! pass physically drops tombstoned slots once enough of them accumulate, and
//! is only ever run between traversals.
//!
//! [`compact`]: SortedMap::compact

use thiserror::Error;

/// Error returned by [`SortedMap::insert`] on a [monotonic] map when the new
/// key is not strictly greater than every previously inserted key.
///
/// [monotonic]: SortedMap::new_monotonic
#[derive(Debug, Error, PartialEq, Eq)]
#[error("monotonic map keys must be strictly increasing")]
pub struct OrderError;

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: Option<V>,
}

/// A sorted associative container with lazy (tombstone) removal.
///
/// Keys are kept in ascending order at all times. Removal does not disturb
/// the physical layout: the slot keeps its key, its value becomes a
/// tombstone, and live iteration skips it. [`len`](Self::len) reports live
/// entries only.
///
/// A map constructed with [`new_monotonic`](Self::new_monotonic) additionally
/// requires every inserted key to be strictly greater than all keys inserted
/// before it, which lets insertion append in O(1) instead of binary-searching
/// for a position. Out-of-order inserts on such a map are rejected with
/// [`OrderError`].
#[derive(Debug)]
pub struct SortedMap<K, V> {
    slots: Vec<Slot<K, V>>,
    tombstones: usize,
    monotonic: bool,
    /// High-water mark of every key ever inserted (monotonic mode only).
    /// Tracked separately from the slots because compaction may drop the
    /// physically-last slot.
    last_key: Option<K>,
}

impl<K: Ord + Copy, V> SortedMap<K, V> {
    /// Tombstone count above which [`maybe_compact`](Self::maybe_compact)
    /// triggers a physical compaction pass.
    pub const COMPACT_THRESHOLD: usize = 32;

    /// Returns a new empty map using sorted (binary-search) insertion.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            tombstones: 0,
            monotonic: false,
            last_key: None,
        }
    }

    /// Returns a new empty map that requires strictly increasing keys and
    /// appends in O(1).
    #[must_use]
    pub const fn new_monotonic() -> Self {
        Self {
            slots: Vec::new(),
            tombstones: 0,
            monotonic: true,
            last_key: None,
        }
    }

    /// Inserts `value` under `key`, returning the previously stored value if
    /// the key was already present and live.
    ///
    /// Inserting over a tombstoned key revives that slot. On a
    /// [monotonic](Self::new_monotonic) map, a key that is not strictly
    /// greater than every key inserted so far is rejected with [`OrderError`];
    /// on a regular map this never fails.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, OrderError> {
        if self.monotonic {
            if let Some(last) = self.last_key {
                if key <= last {
                    return Err(OrderError);
                }
            }
            self.last_key = Some(key);
            self.slots.push(Slot {
                key,
                value: Some(value),
            });
            return Ok(None);
        }

        match self.slots.binary_search_by(|slot| slot.key.cmp(&key)) {
            Ok(i) => {
                let old = self.slots[i].value.replace(value);
                if old.is_none() {
                    self.tombstones -= 1;
                }
                Ok(old)
            }
            Err(i) => {
                self.slots.insert(
                    i,
                    Slot {
                        key,
                        value: Some(value),
                    },
                );
                Ok(None)
            }
        }
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.slots.binary_search_by(|slot| slot.key.cmp(key)).ok()
    }

    /// Returns a reference to the live value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.position(key)
            .and_then(|i| self.slots[i].value.as_ref())
    }

    /// Returns a mutable reference to the live value stored under `key`.
    #[must_use]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let i = self.position(key)?;
        self.slots[i].value.as_mut()
    }

    /// Returns `true` if a live entry is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes the live entry stored under `key`, leaving a tombstone.
    ///
    /// The physical slot stays in place, so index-based traversal that is
    /// already in flight remains valid. Removing an absent or already
    /// tombstoned key is a no-op returning `None`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let i = self.position(key)?;
        let value = self.slots[i].value.take()?;
        self.tombstones += 1;
        Some(value)
    }

    /// Number of live entries (physical slots minus tombstones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.tombstones
    }

    /// Returns `true` if the map holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned slots awaiting compaction.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Number of physical slots, live and tombstoned alike. This is the
    /// bound for [`take_at`](Self::take_at)-style index traversal.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the key stored at physical slot `index`, live or not.
    pub(crate) fn key_at(&self, index: usize) -> Option<K> {
        self.slots.get(index).map(|slot| slot.key)
    }

    /// Takes the live value out of physical slot `index`, leaving a
    /// tombstone. Returns `None` for tombstoned or out-of-range slots.
    pub(crate) fn take_at(&mut self, index: usize) -> Option<V> {
        let value = self.slots.get_mut(index)?.value.take()?;
        self.tombstones += 1;
        Some(value)
    }

    /// Puts `value` back into the tombstoned slot at `index`, reviving it.
    ///
    /// # Panics
    ///
    /// Panics if the slot is occupied; `put_at` only pairs with
    /// [`take_at`](Self::take_at).
    pub(crate) fn put_at(&mut self, index: usize, value: V) {
        let slot = &mut self.slots[index];
        assert!(
            slot.value.is_none(),
            "put_at must target the vacant slot left by take_at"
        );
        slot.value = Some(value);
        self.tombstones -= 1;
    }

    /// Iterates live entries in ascending key order, skipping tombstones.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.slots
            .iter()
            .filter_map(|slot| slot.value.as_ref().map(|value| (&slot.key, value)))
    }

    /// Iterates live entries mutably in ascending key order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.value.as_mut().map(|value| (&slot.key, value)))
    }

    /// Iterates the keys of live entries in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.slots
            .iter()
            .filter_map(|slot| slot.value.is_some().then_some(slot.key))
    }

    /// Physically removes every tombstoned slot.
    ///
    /// Must not be called while an index-based traversal is in flight; the
    /// scheduler only triggers it at tick boundaries.
    pub fn compact(&mut self) {
        self.slots.retain(|slot| slot.value.is_some());
        self.tombstones = 0;
    }

    /// Runs [`compact`](Self::compact) if the tombstone count has crossed
    /// [`COMPACT_THRESHOLD`](Self::COMPACT_THRESHOLD). Returns whether a
    /// compaction happened.
    pub fn maybe_compact(&mut self) -> bool {
        if self.tombstones > Self::COMPACT_THRESHOLD {
            self.compact();
            true
        } else {
            false
        }
    }
}

impl<K: Ord + Copy, V> Default for SortedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

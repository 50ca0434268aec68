//! Layered dispatch of draw callbacks.
//!
//! Draw order is a small number of semantically meaningful bands
//! ([`Layer`]s) that are cheap to query ("is any modal showing?") while
//! individual registrations churn every tick as tasks start and stop.
//! Callbacks are dispatched in ascending `(layer, index, id)` order; the
//! composite key exists only for ordering — identity is the registration id,
//! resolved through a secondary index.
//!
//! Registration goes through [`Scheduler::add_drawer`], which returns a
//! [`DrawerGuard`]: an opaque handle that revokes the registration when
//! dropped. The registry owns the callbacks; nothing here borrows
//! caller-held storage.
//!
//! [`Scheduler::add_drawer`]: crate::scheduler::Scheduler::add_drawer

use core::fmt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::map::SortedMap;
use crate::scheduler::Core;

/// Default fine-ordering index for drawers that don't care.
pub const DEFAULT_DRAW_INDEX: i32 = 0;

/// The draw-order bands, in ascending draw order.
///
/// Everything except [`Debug`](Layer::Debug) is drawn by the main render
/// sub-pass; the debug overlay draws in the late sub-pass, on top of the
/// whole frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    /// Behind all content.
    Background,
    /// Ordinary content.
    Default,
    /// Modal overlays above ordinary content.
    Modal,
    /// Screen-transition band: fade-in phase.
    TransitionFadeIn,
    /// Screen-transition band: general transitions.
    TransitionGeneral,
    /// Screen-transition band: fade-out phase.
    TransitionFadeOut,
    /// Debug overlay, drawn by the late render sub-pass.
    Debug,
}

impl Layer {
    pub(crate) const COUNT: usize = 7;

    fn as_index(self) -> usize {
        self as usize
    }

    /// The render sub-pass this layer is drawn by.
    #[must_use]
    pub fn render_pass(self) -> RenderPass {
        match self {
            Self::Debug => RenderPass::Late,
            _ => RenderPass::Main,
        }
    }
}

/// The two render sub-passes of a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderPass {
    /// The ordinary content pass.
    Main,
    /// The late pass, after the frame's content.
    Late,
}

/// Opaque identity of a drawer registration. Never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DrawerId(u64);

impl fmt::Display for DrawerId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Composite **sort** key. Identity lives in the id alone; layer and index
/// are resolved through the secondary location index on lookup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DrawerKey {
    layer: Layer,
    index: i32,
    id: DrawerId,
}

type DrawFn = Rc<dyn Fn()>;

pub(crate) struct Registry {
    map: SortedMap<DrawerKey, DrawFn>,
    /// id → current (layer, index), so re-keying and removal find the slot
    /// without scanning.
    locations: HashMap<DrawerId, (Layer, i32)>,
    /// Incrementally maintained per-layer live-drawer counts.
    layer_counts: [usize; Layer::COUNT],
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            map: SortedMap::new(),
            locations: HashMap::new(),
            layer_counts: [0; Layer::COUNT],
            next_id: 1,
        }
    }

    pub(crate) fn add(&mut self, layer: Layer, index: i32, callback: DrawFn) -> DrawerId {
        let id = DrawerId(self.next_id);
        self.next_id += 1;
        self.map
            .insert(DrawerKey { layer, index, id }, callback)
            .expect("the draw registry uses sorted-mode insertion");
        self.locations.insert(id, (layer, index));
        self.layer_counts[layer.as_index()] += 1;
        trace!(drawer.id = %id, ?layer, index, "drawer added");
        id
    }

    pub(crate) fn remove(&mut self, id: DrawerId) -> bool {
        let Some((layer, index)) = self.locations.remove(&id) else {
            return false;
        };
        self.map
            .remove(&DrawerKey { layer, index, id })
            .expect("drawer key out of sync with the location index; this is a bug");
        self.decrement(layer);
        trace!(drawer.id = %id, "drawer removed");
        true
    }

    /// Re-keys `id` to a new layer: removal plus reinsertion under the new
    /// key, id preserved. Returns `false` for unknown ids.
    pub(crate) fn set_layer(&mut self, id: DrawerId, layer: Layer) -> bool {
        let Some(location) = self.locations.get_mut(&id) else {
            return false;
        };
        let (old_layer, index) = *location;
        if old_layer == layer {
            return true;
        }
        *location = (layer, index);
        self.rekey(
            DrawerKey {
                layer: old_layer,
                index,
                id,
            },
            DrawerKey { layer, index, id },
        );
        self.decrement(old_layer);
        self.layer_counts[layer.as_index()] += 1;
        trace!(drawer.id = %id, ?old_layer, ?layer, "drawer re-keyed");
        true
    }

    /// Re-keys `id` to a new fine-ordering index within its layer.
    pub(crate) fn set_index(&mut self, id: DrawerId, index: i32) -> bool {
        let Some(location) = self.locations.get_mut(&id) else {
            return false;
        };
        let (layer, old_index) = *location;
        if old_index == index {
            return true;
        }
        *location = (layer, index);
        self.rekey(
            DrawerKey {
                layer,
                index: old_index,
                id,
            },
            DrawerKey { layer, index, id },
        );
        trace!(drawer.id = %id, old_index, index, "drawer re-keyed");
        true
    }

    fn rekey(&mut self, from: DrawerKey, to: DrawerKey) {
        let callback = self
            .map
            .remove(&from)
            .expect("drawer key out of sync with the location index; this is a bug");
        self.map
            .insert(to, callback)
            .expect("the draw registry uses sorted-mode insertion");
    }

    fn decrement(&mut self, layer: Layer) {
        let count = &mut self.layer_counts[layer.as_index()];
        assert!(
            *count > 0,
            "active-drawer count for {layer:?} underflowed; this is a bug"
        );
        *count -= 1;
    }

    /// Clones out the callbacks of `pass` in ascending `(layer, index, id)`
    /// order, so they can be invoked with no registry borrow held.
    pub(crate) fn collect_pass(&self, pass: RenderPass) -> Vec<DrawFn> {
        self.map
            .iter()
            .filter(|(key, _)| key.layer.render_pass() == pass)
            .map(|(_, callback)| Rc::clone(callback))
            .collect()
    }

    pub(crate) fn layer_has_drawer(&self, layer: Layer) -> bool {
        self.layer_counts[layer.as_index()] > 0
    }

    pub(crate) fn maybe_compact(&mut self) -> bool {
        self.map.maybe_compact()
    }
}

/// Owns one drawer registration; revokes it on drop.
///
/// Returned by [`Scheduler::add_drawer`]. If the scheduler is already gone,
/// every operation is a no-op.
///
/// [`Scheduler::add_drawer`]: crate::scheduler::Scheduler::add_drawer
pub struct DrawerGuard {
    id: DrawerId,
    core: Weak<RefCell<Core>>,
}

impl DrawerGuard {
    pub(crate) fn new(id: DrawerId, core: Weak<RefCell<Core>>) -> Self {
        Self { id, core }
    }

    /// The registration's identity.
    #[must_use]
    pub fn id(&self) -> DrawerId {
        self.id
    }

    /// Moves the registration to a new layer, preserving its id. Returns
    /// whether the registration still existed.
    pub fn set_layer(&self, layer: Layer) -> bool {
        match self.core.upgrade() {
            Some(core) => core.borrow_mut().drawers_mut().set_layer(self.id, layer),
            None => false,
        }
    }

    /// Moves the registration to a new fine-ordering index, preserving its
    /// id. Returns whether the registration still existed.
    pub fn set_index(&self, index: i32) -> bool {
        match self.core.upgrade() {
            Some(core) => core.borrow_mut().drawers_mut().set_index(self.id, index),
            None => false,
        }
    }
}

impl Drop for DrawerGuard {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            core.borrow_mut().drawers_mut().remove(self.id);
        }
    }
}

impl fmt::Debug for DrawerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawerGuard").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn record(log: &Rc<RefCell<Vec<&'static str>>>, entry: &'static str) -> DrawFn {
        let log = Rc::clone(log);
        Rc::new(move || log.borrow_mut().push(entry))
    }

    fn run(registry: &Registry, pass: RenderPass) {
        for callback in registry.collect_pass(pass) {
            callback();
        }
    }

    #[test]
    fn dispatch_order_is_layer_index_id() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        registry.add(Layer::Modal, 0, record(&log, "modal"));
        registry.add(Layer::Background, 5, record(&log, "background"));
        registry.add(Layer::Default, 3, record(&log, "default-3b"));
        registry.add(Layer::Default, 1, record(&log, "default-1"));
        // same (layer, index) as default-3b but registered later: higher id
        registry.add(Layer::Default, 3, record(&log, "default-3c"));

        run(&registry, RenderPass::Main);
        assert_eq!(
            *log.borrow(),
            ["background", "default-1", "default-3b", "default-3c", "modal"]
        );
    }

    #[test]
    fn debug_layer_draws_in_the_late_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        registry.add(Layer::Debug, 0, record(&log, "debug"));
        registry.add(Layer::Default, 0, record(&log, "default"));

        run(&registry, RenderPass::Main);
        assert_eq!(*log.borrow(), ["default"]);
        run(&registry, RenderPass::Late);
        assert_eq!(*log.borrow(), ["default", "debug"]);
    }

    #[test]
    fn layer_counts_track_add_remove_and_rekey() {
        let mut registry = Registry::new();
        let id = registry.add(Layer::Modal, 0, Rc::new(|| ()));
        assert!(registry.layer_has_drawer(Layer::Modal));
        assert!(!registry.layer_has_drawer(Layer::Default));

        assert!(registry.set_layer(id, Layer::Default));
        assert!(!registry.layer_has_drawer(Layer::Modal));
        assert!(registry.layer_has_drawer(Layer::Default));

        assert!(registry.remove(id));
        assert!(!registry.layer_has_drawer(Layer::Default));
        // removal is idempotent
        assert!(!registry.remove(id));
    }

    #[test]
    fn rekey_preserves_id_ordering_within_new_key() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = Registry::new();
        let first = registry.add(Layer::Default, 0, record(&log, "first"));
        registry.add(Layer::Default, 0, record(&log, "second"));

        // move `first` into the same (layer, index) it already occupied via
        // a different index and back; its lower id still sorts it first
        assert!(registry.set_index(first, 7));
        assert!(registry.set_index(first, 0));

        run(&registry, RenderPass::Main);
        assert_eq!(*log.borrow(), ["first", "second"]);
    }
}

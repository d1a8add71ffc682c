#![forbid(unsafe_code)]

//! The UI context chain.
//!
//! Every mounted component owns one layer of a prototype-style chain of
//! scopes. Reads walk toward the root and return the nearest binding;
//! writes always land in the owning component's local layer, so a child
//! shadows without mutating its ancestors. The engine threads its own
//! state (focus, frame, render depth, key prefix, slot bindings) through
//! reserved keys; user context values live under [`ScopeKey::Name`].
//!
//! # Invariants
//!
//! 1. A component never writes to an ancestor layer.
//! 2. Reserved engine keys and user names cannot collide; they are
//!    distinct [`ScopeKey`] variants.
//! 3. Resources held in a layer are released exactly once, when the
//!    owning component unmounts.

use std::fmt;
use std::rc::Rc;

use inspire_core::{Focus, Key, ScopeChain};
use tracing::trace;

use crate::lens::{Lens, Valoscope};
use crate::slots::Slot;

// ---------------------------------------------------------------------------
// Keys and values
// ---------------------------------------------------------------------------

/// What a context entry is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// The focus the owning component is bound to.
    Focus,
    /// The resource frame kueries evaluate against.
    Frame,
    /// Nesting depth of the owning component.
    RenderDepth,
    /// Prefix applied to child keys, injected by shared spread keys.
    KeyPrefix,
    /// Identity marker of the owning component, read by the cycle scan.
    OwnerComponent,
    /// A slot binding inherited by descendants.
    Slot(Slot),
    /// A user-defined context variable.
    Name(Rc<str>),
}

/// A value held by a context entry.
#[derive(Debug, Clone)]
pub enum ScopeValue {
    /// A focus value.
    Focus(Focus),
    /// A lens, for inherited slot bindings.
    Lens(Lens),
    /// A depth counter.
    Depth(u32),
    /// A key or key prefix.
    Key(Key),
    /// A component identity marker.
    Marker(ScopeMarker),
    /// An owned resource released on unmount.
    Resource(Rc<dyn ScopeResource>),
}

/// Identity of a mounted component as seen by the recursion cycle scan:
/// which spec it instantiates, under which key, bound to which focus.
#[derive(Clone)]
pub struct ScopeMarker {
    pub(crate) spec: Rc<Valoscope>,
    pub(crate) key: Key,
    pub(crate) focus: Focus,
    pub(crate) component: u64,
}

impl ScopeMarker {
    pub(crate) fn new(spec: Rc<Valoscope>, key: Key, focus: Focus, component: u64) -> Self {
        Self {
            spec,
            key,
            focus,
            component,
        }
    }

    /// Whether another marker denotes a render-equivalent component:
    /// same spec identity, same key, identical focus.
    #[must_use]
    pub fn same_instance(&self, other: &ScopeMarker) -> bool {
        Rc::ptr_eq(&self.spec, &other.spec)
            && self.key == other.key
            && self.focus.identity_eq(&other.focus)
    }
}

impl fmt::Debug for ScopeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeMarker")
            .field("component", &self.component)
            .field("key", &self.key)
            .field("focus", &self.focus)
            .finish_non_exhaustive()
    }
}

/// Something a component holds in its context layer and must tear down
/// when the component unmounts: an event registration, a held lease, a
/// watch on an external system.
pub trait ScopeResource {
    /// Release the resource. Called exactly once.
    fn release(&self);

    /// Diagnostic label used in traces.
    fn label(&self) -> &str {
        "resource"
    }
}

impl fmt::Debug for dyn ScopeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeResource({})", self.label())
    }
}

// ---------------------------------------------------------------------------
// UiContext
// ---------------------------------------------------------------------------

/// One component's view of the context chain.
#[derive(Debug, Clone, Default)]
pub struct UiContext {
    chain: ScopeChain<ScopeKey, ScopeValue>,
}

impl UiContext {
    /// A fresh root context with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A child context whose local layer shadows this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            chain: self.chain.child(),
        }
    }

    /// Whether two contexts share the same local layer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.chain.ptr_eq(&other.chain)
    }

    // -- engine-reserved entries --------------------------------------------

    /// Nearest bound focus.
    #[must_use]
    pub fn focus(&self) -> Option<Focus> {
        match self.chain.get(&ScopeKey::Focus) {
            Some(ScopeValue::Focus(focus)) => Some(focus),
            _ => None,
        }
    }

    pub(crate) fn set_focus(&self, focus: Focus) {
        self.chain.set(ScopeKey::Focus, ScopeValue::Focus(focus));
    }

    /// Nearest resource frame, the evaluation root for kueries.
    #[must_use]
    pub fn frame(&self) -> Option<Focus> {
        match self.chain.get(&ScopeKey::Frame) {
            Some(ScopeValue::Focus(frame)) => Some(frame),
            _ => None,
        }
    }

    pub(crate) fn set_frame(&self, frame: Focus) {
        self.chain.set(ScopeKey::Frame, ScopeValue::Focus(frame));
    }

    /// Render depth of the owning component; zero at the root.
    #[must_use]
    pub fn render_depth(&self) -> u32 {
        match self.chain.get(&ScopeKey::RenderDepth) {
            Some(ScopeValue::Depth(depth)) => depth,
            _ => 0,
        }
    }

    pub(crate) fn set_render_depth(&self, depth: u32) {
        self.chain
            .set(ScopeKey::RenderDepth, ScopeValue::Depth(depth));
    }

    /// Nearest key prefix for child key derivation.
    #[must_use]
    pub fn key_prefix(&self) -> Option<Key> {
        match self.chain.get(&ScopeKey::KeyPrefix) {
            Some(ScopeValue::Key(key)) => Some(key),
            _ => None,
        }
    }

    pub(crate) fn set_key_prefix(&self, prefix: Key) {
        self.chain.set(ScopeKey::KeyPrefix, ScopeValue::Key(prefix));
    }

    pub(crate) fn set_owner(&self, marker: ScopeMarker) {
        self.chain
            .set(ScopeKey::OwnerComponent, ScopeValue::Marker(marker));
    }

    /// Ancestor component markers, nearest first, excluding this layer's
    /// own owner when `skip_local` is set.
    pub(crate) fn owner_markers(&self, skip_local: bool) -> Vec<ScopeMarker> {
        let mut markers: Vec<ScopeMarker> = self
            .chain
            .collect(&ScopeKey::OwnerComponent)
            .into_iter()
            .filter_map(|value| match value {
                ScopeValue::Marker(marker) => Some(marker),
                _ => None,
            })
            .collect();
        if skip_local
            && !markers.is_empty()
            && self.chain.get_local(&ScopeKey::OwnerComponent).is_some()
        {
            markers.remove(0);
        }
        markers
    }

    // -- slot bindings ------------------------------------------------------

    /// Nearest inherited binding for a slot.
    #[must_use]
    pub fn slot_lens(&self, slot: Slot) -> Option<Lens> {
        match self.chain.get(&ScopeKey::Slot(slot)) {
            Some(ScopeValue::Lens(lens)) => Some(lens),
            _ => None,
        }
    }

    /// Bind a slot in the local layer for descendants.
    pub fn set_slot_lens(&self, slot: Slot, lens: Lens) {
        self.chain.set(ScopeKey::Slot(slot), ScopeValue::Lens(lens));
    }

    // -- user values --------------------------------------------------------

    /// Nearest user context value under `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Focus> {
        match self.chain.get(&ScopeKey::Name(name.into())) {
            Some(ScopeValue::Focus(focus)) => Some(focus),
            _ => None,
        }
    }

    /// Write a user context value into the local layer.
    pub fn set_value(&self, name: impl Into<Rc<str>>, focus: Focus) {
        self.chain
            .set(ScopeKey::Name(name.into()), ScopeValue::Focus(focus));
    }

    /// Local-layer value under `name`, ignoring ancestors.
    #[must_use]
    pub fn local_value(&self, name: &str) -> Option<Focus> {
        match self.chain.get_local(&ScopeKey::Name(name.into())) {
            Some(ScopeValue::Focus(focus)) => Some(focus),
            _ => None,
        }
    }

    /// Hold a resource in the local layer until the owning component
    /// unmounts.
    pub fn hold_resource(&self, name: impl Into<Rc<str>>, resource: Rc<dyn ScopeResource>) {
        self.chain
            .set(ScopeKey::Name(name.into()), ScopeValue::Resource(resource));
    }

    /// Release every resource held in the local layer.
    ///
    /// The unmount path calls this once; entries are removed as they are
    /// released so a second call finds nothing.
    pub(crate) fn release_local_resources(&self) {
        let mut held = Vec::new();
        self.chain.for_each_local(|key, value| {
            if let ScopeValue::Resource(resource) = value {
                held.push((key.clone(), Rc::clone(resource)));
            }
        });
        for (key, resource) in held {
            self.chain.remove_local(&key);
            trace!(label = resource.label(), "releasing scope resource");
            resource.release();
        }
    }
}

#![forbid(unsafe_code)]

//! Live attribute binding.
//!
//! A component's declared attributes each name a source: a fixed value, a
//! one-shot kuery, a live kuery subscription, or a derived combination of
//! live inputs. This module turns those declarations into bound state:
//! current values, store subscriptions, and the change dispatch that
//! decides whether an update is worth a re-render.
//!
//! # Invariants
//!
//! 1. At most one store subscription exists per attribute name at a time.
//!    Rebinding detaches every old subscription before attaching new
//!    ones.
//! 2. A delivered value identical to the cached one (identity first,
//!    structural second) updates nothing and schedules nothing.
//! 3. Completions carrying a bind epoch other than the current one are
//!    discarded without touching state.
//! 4. During the priming pass no change notifications fire; the initial
//!    values land silently and the caller renders once afterwards.
//!
//! # Failure Modes
//!
//! | Failure | Handling |
//! |---------|----------|
//! | One-shot kuery rejects | fault queued, re-render scheduled, failure role renders |
//! | Subscription refused by store | bind aborts with the store error |
//! | Stale async completion | discarded, trace logged |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use inspire_core::{Fault, Focus};
use inspire_store::{Evaluation, Kuery, LiveBinding, ResourceStore};
use tracing::{debug, trace};

use crate::error::LensError;
use crate::slots::{Slot, SlotRegistry};

// ---------------------------------------------------------------------------
// Attribute names the engine interprets itself
// ---------------------------------------------------------------------------

/// Attribute bound as the component focus.
pub const ATTR_FOCUS: &str = "focus";
/// Attribute carrying the spread source sequence.
pub const ATTR_ARRAY: &str = "array";
/// Spread offset into the source sequence.
pub const ATTR_OFFSET: &str = "offset";
/// Spread entry budget.
pub const ATTR_LIMIT: &str = "limit";
/// Truthy to reverse the projected spread.
pub const ATTR_REVERSE: &str = "reverse";
/// Truthy to render; falsy renders nothing.
pub const ATTR_IF: &str = "if";
/// Truthy to render the disabled role instead of content.
pub const ATTR_DISABLED: &str = "disabled";

/// Prefix routing an attribute into the component's context layer.
pub const CONTEXT_PREFIX: &str = "context.";

// ---------------------------------------------------------------------------
// Attribute sources
// ---------------------------------------------------------------------------

/// Where an attribute's value comes from.
#[derive(Debug, Clone)]
pub enum AttrSource {
    /// A fixed value, never re-delivered.
    Value(Focus),
    /// A kuery evaluated once at bind time.
    Once(Kuery),
    /// A kuery subscribed for live updates.
    Live(Kuery),
    /// A combination of live inputs, recomputed when an input changes.
    Derived(DerivedSource),
}

impl AttrSource {
    /// Fixed-value source.
    pub fn value(focus: impl Into<Focus>) -> Self {
        Self::Value(focus.into())
    }

    /// One-shot evaluation source.
    #[must_use]
    pub fn once(kuery: Kuery) -> Self {
        Self::Once(kuery)
    }

    /// Live subscription source.
    #[must_use]
    pub fn live(kuery: Kuery) -> Self {
        Self::Live(kuery)
    }

    /// Derived source over live inputs.
    pub fn derived(
        inputs: impl IntoIterator<Item = Kuery>,
        combine: CombineFn,
    ) -> Self {
        Self::Derived(DerivedSource {
            inputs: inputs.into_iter().collect(),
            combine,
        })
    }

    /// Whether evaluating this source requires a frame.
    #[must_use]
    pub fn needs_frame(&self) -> bool {
        match self {
            Self::Value(_) => false,
            Self::Once(k) | Self::Live(k) => !k.is_constant(),
            Self::Derived(d) => d.inputs.iter().any(|k| !k.is_constant()),
        }
    }
}

impl From<Focus> for AttrSource {
    fn from(focus: Focus) -> Self {
        Self::Value(focus)
    }
}

impl From<Kuery> for AttrSource {
    fn from(kuery: Kuery) -> Self {
        Self::Live(kuery)
    }
}

impl From<&str> for AttrSource {
    fn from(text: &str) -> Self {
        Self::Value(Focus::text(text))
    }
}

impl From<i64> for AttrSource {
    fn from(value: i64) -> Self {
        Self::Value(Focus::Int(value))
    }
}

impl From<bool> for AttrSource {
    fn from(value: bool) -> Self {
        Self::Value(Focus::Bool(value))
    }
}

/// Live inputs plus the pure function combining them.
#[derive(Debug, Clone)]
pub struct DerivedSource {
    inputs: Rc<[Kuery]>,
    combine: CombineFn,
}

/// Named pure combiner for derived attributes.
#[derive(Clone)]
pub struct CombineFn {
    name: &'static str,
    f: Rc<dyn Fn(&[Focus]) -> Focus>,
}

impl CombineFn {
    /// Wrap a combiner under a diagnostic name.
    pub fn new(name: &'static str, f: impl Fn(&[Focus]) -> Focus + 'static) -> Self {
        Self { name, f: Rc::new(f) }
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for CombineFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombineFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One declared attribute: a name and where its value comes from.
#[derive(Debug, Clone)]
pub struct AttrSpec {
    name: Rc<str>,
    source: AttrSource,
}

impl AttrSpec {
    /// Spec from a name and source.
    pub fn new(name: impl Into<Rc<str>>, source: impl Into<AttrSource>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Attribute name as declared.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value source.
    #[must_use]
    pub fn source(&self) -> &AttrSource {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Recorder table
// ---------------------------------------------------------------------------

/// Where a recorded attribute value lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recording {
    /// Engine-interpreted value kept in the value map.
    Engine(Rc<str>),
    /// Written into the component's context layer under the given name.
    Context(Rc<str>),
    /// Overrides the given slot with the value as a lens.
    Slot(Slot),
    /// Forwarded onto the rendered element as a prop.
    ElementProp(Rc<str>),
}

/// Dispatch table from attribute names to recordings.
///
/// Built once per engine from the slot registry. Engine names win over
/// slot names of the same spelling, so `if` stays a gate value even
/// though an `if` slot exists.
#[derive(Debug)]
pub(crate) struct RecorderTable {
    by_name: AHashMap<Rc<str>, Recording>,
}

impl RecorderTable {
    pub(crate) fn new(registry: &SlotRegistry) -> Self {
        let mut by_name: AHashMap<Rc<str>, Recording> = AHashMap::new();
        for i in 0..registry.len() {
            let slot = Slot(i as u32);
            by_name.insert(registry.name(slot).into(), Recording::Slot(slot));
        }
        for name in [
            ATTR_FOCUS,
            ATTR_ARRAY,
            ATTR_OFFSET,
            ATTR_LIMIT,
            ATTR_REVERSE,
            ATTR_IF,
            ATTR_DISABLED,
        ] {
            by_name.insert(name.into(), Recording::Engine(name.into()));
        }
        Self { by_name }
    }

    pub(crate) fn recording_for(&self, name: &str) -> Recording {
        if let Some(recording) = self.by_name.get(name) {
            return recording.clone();
        }
        if let Some(rest) = name.strip_prefix(CONTEXT_PREFIX) {
            return Recording::Context(rest.into());
        }
        Recording::ElementProp(name.into())
    }
}

// ---------------------------------------------------------------------------
// Bound attribute state
// ---------------------------------------------------------------------------

/// A change the component should react to. Fired only after priming.
#[derive(Debug, Clone)]
pub(crate) enum AttrChange {
    /// The focus attribute produced a new focus; rebind the component.
    Focus(Focus),
    /// A context attribute changed; rewrite the context entry.
    Context(Rc<str>, Focus),
    /// An engine value, slot override, or element prop changed;
    /// re-render.
    Rerender(Rc<str>),
    /// An attribute source failed; record the fault and re-render.
    Failed(Rc<str>, Fault),
}

struct AttrInner {
    values: AHashMap<Rc<str>, Focus>,
    context_values: AHashMap<Rc<str>, Focus>,
    slot_values: AHashMap<Slot, Focus>,
    element_props: Vec<(Rc<str>, Focus)>,
    bindings: Vec<LiveBinding>,
    epoch: u64,
    priming: bool,
    notify: Rc<dyn Fn(AttrChange)>,
}

impl AttrInner {
    /// Store `value` for `recording`; `true` when the stored value
    /// actually changed.
    fn store(&mut self, recording: &Recording, value: Focus) -> bool {
        let slot_for = |map: &AHashMap<Slot, Focus>, slot: &Slot| map.get(slot).cloned();
        let unchanged = |old: Option<Focus>| {
            old.is_some_and(|old| old.identity_eq(&value) || old == value)
        };
        match recording {
            Recording::Engine(name) => {
                if unchanged(self.values.get(name.as_ref()).cloned()) {
                    return false;
                }
                self.values.insert(Rc::clone(name), value);
            }
            Recording::Context(name) => {
                if unchanged(self.context_values.get(name.as_ref()).cloned()) {
                    return false;
                }
                self.context_values.insert(Rc::clone(name), value);
            }
            Recording::Slot(slot) => {
                if unchanged(slot_for(&self.slot_values, slot)) {
                    return false;
                }
                self.slot_values.insert(*slot, value);
            }
            Recording::ElementProp(name) => {
                if let Some(entry) = self
                    .element_props
                    .iter_mut()
                    .find(|(existing, _)| existing == name)
                {
                    if entry.1.identity_eq(&value) || entry.1 == value {
                        return false;
                    }
                    entry.1 = value;
                } else {
                    self.element_props.push((Rc::clone(name), value));
                }
            }
        }
        true
    }

    fn change_for(&self, recording: &Recording, name: &Rc<str>) -> AttrChange {
        match recording {
            Recording::Engine(engine_name) if engine_name.as_ref() == ATTR_FOCUS => {
                let focus = self
                    .values
                    .get(ATTR_FOCUS)
                    .cloned()
                    .unwrap_or(Focus::None);
                AttrChange::Focus(focus)
            }
            Recording::Context(context_name) => {
                let value = self
                    .context_values
                    .get(context_name.as_ref())
                    .cloned()
                    .unwrap_or(Focus::None);
                AttrChange::Context(Rc::clone(context_name), value)
            }
            _ => AttrChange::Rerender(Rc::clone(name)),
        }
    }
}

/// Bound attribute state for one component.
///
/// Interior-mutable and clonable; the clones share state so async
/// continuations can reach it through a weak handle.
#[derive(Clone)]
pub(crate) struct AttrState {
    inner: Rc<RefCell<AttrInner>>,
}

impl AttrState {
    pub(crate) fn new(notify: Rc<dyn Fn(AttrChange)>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AttrInner {
                values: AHashMap::new(),
                context_values: AHashMap::new(),
                slot_values: AHashMap::new(),
                element_props: Vec::new(),
                bindings: Vec::new(),
                epoch: 0,
                priming: false,
                notify,
            })),
        }
    }

    /// Detach every subscription and advance the bind epoch, orphaning
    /// any in-flight completions.
    pub(crate) fn unbind(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.epoch += 1;
        inner.bindings.clear();
        inner.values.clear();
        inner.context_values.clear();
        inner.slot_values.clear();
        inner.element_props.clear();
    }

    /// Bind the given attribute specs against the store.
    ///
    /// Detaches previous bindings first; the priming pass records every
    /// initial value without firing change notifications. Returns the
    /// epoch of this binding generation.
    ///
    /// Store calls happen outside the state borrow, so a store that
    /// delivers synchronously during `subscribe` cannot deadlock the
    /// binder.
    pub(crate) fn bind(
        &self,
        specs: &[AttrSpec],
        table: &RecorderTable,
        store: &Rc<dyn ResourceStore>,
        frame: &Focus,
    ) -> Result<u64, LensError> {
        self.unbind();
        let epoch = {
            let mut inner = self.inner.borrow_mut();
            inner.priming = true;
            inner.epoch
        };
        let outcome = self.bind_specs(specs, table, store, frame, epoch);
        self.inner.borrow_mut().priming = false;
        outcome?;
        Ok(epoch)
    }

    fn bind_specs(
        &self,
        specs: &[AttrSpec],
        table: &RecorderTable,
        store: &Rc<dyn ResourceStore>,
        frame: &Focus,
        epoch: u64,
    ) -> Result<(), LensError> {
        for spec in specs {
            let name: Rc<str> = spec.name().into();
            let recording = table.recording_for(&name);
            match spec.source() {
                AttrSource::Value(value) => {
                    self.inner.borrow_mut().store(&recording, value.clone());
                }
                AttrSource::Once(kuery) => match store.evaluate(frame, kuery)? {
                    Evaluation::Ready(value) => {
                        self.inner.borrow_mut().store(&recording, value);
                    }
                    Evaluation::Loading(deferred) => {
                        self.inner.borrow_mut().store(&recording, Focus::None);
                        self.watch_settlement(deferred, recording, name, epoch);
                    }
                },
                AttrSource::Live(kuery) => {
                    let weak = Rc::downgrade(&self.inner);
                    let callback_recording = recording.clone();
                    let callback_name = Rc::clone(&name);
                    let on_change: Rc<dyn Fn(&Focus)> = Rc::new(move |value: &Focus| {
                        deliver(
                            &weak,
                            epoch,
                            &callback_recording,
                            &callback_name,
                            value.clone(),
                        );
                    });
                    let binding = store.subscribe(frame, kuery, on_change)?;
                    let initial = binding.value();
                    let mut inner = self.inner.borrow_mut();
                    inner.store(&recording, initial);
                    inner.bindings.push(binding);
                }
                AttrSource::Derived(derived) => {
                    self.bind_derived(store, frame, derived, recording, name, epoch)?;
                }
            }
        }
        Ok(())
    }

    fn bind_derived(
        &self,
        store: &Rc<dyn ResourceStore>,
        frame: &Focus,
        derived: &DerivedSource,
        recording: Recording,
        name: Rc<str>,
        epoch: u64,
    ) -> Result<(), LensError> {
        let cache = Rc::new(RefCell::new(vec![Focus::None; derived.inputs.len()]));
        let combine = derived.combine.clone();
        for (index, kuery) in derived.inputs.iter().enumerate() {
            let weak = Rc::downgrade(&self.inner);
            let combine = combine.clone();
            let recording = recording.clone();
            let name = Rc::clone(&name);
            let on_change: Rc<dyn Fn(&Focus)> = {
                let cache = Rc::clone(&cache);
                Rc::new(move |value: &Focus| {
                    {
                        let mut cached = cache.borrow_mut();
                        let old = &cached[index];
                        if old.identity_eq(value) || *old == *value {
                            trace!(attr = name.as_ref(), index, "derived input unchanged");
                            return;
                        }
                        cached[index] = value.clone();
                    }
                    let combined = (combine.f)(&cache.borrow());
                    deliver(&weak, epoch, &recording, &name, combined);
                })
            };
            let binding = store.subscribe(frame, kuery, on_change)?;
            cache.borrow_mut()[index] = binding.value();
            self.inner.borrow_mut().bindings.push(binding);
        }
        let initial = (combine.f)(&cache.borrow());
        self.inner.borrow_mut().store(&recording, initial);
        Ok(())
    }

    fn watch_settlement(
        &self,
        deferred: inspire_core::Deferred<Focus>,
        recording: Recording,
        name: Rc<str>,
        epoch: u64,
    ) {
        let weak = Rc::downgrade(&self.inner);
        deferred.on_settle(move |result| match result {
            Ok(value) => deliver(&weak, epoch, &recording, &name, value),
            Err(fault) => {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let notify;
                {
                    let inner = inner.borrow();
                    if inner.epoch != epoch {
                        trace!(attr = name.as_ref(), "stale attr failure discarded");
                        return;
                    }
                    notify = Rc::clone(&inner.notify);
                }
                debug!(attr = name.as_ref(), fault = %fault, "attr evaluation failed");
                notify(AttrChange::Failed(Rc::clone(&name), fault));
            }
        });
    }

    // -- reads --------------------------------------------------------------

    /// Current engine value under an interpreted attribute name.
    pub(crate) fn value(&self, name: &str) -> Option<Focus> {
        self.inner.borrow().values.get(name).cloned()
    }

    /// Current live override value for a slot.
    pub(crate) fn slot_value(&self, slot: Slot) -> Option<Focus> {
        self.inner.borrow().slot_values.get(&slot).cloned()
    }

    /// Snapshot of element props in declaration order.
    pub(crate) fn element_props(&self) -> Vec<(Rc<str>, Focus)> {
        self.inner.borrow().element_props.clone()
    }

    /// Snapshot of context attribute values.
    pub(crate) fn context_entries(&self) -> Vec<(Rc<str>, Focus)> {
        let inner = self.inner.borrow();
        inner
            .context_values
            .iter()
            .map(|(k, v)| (Rc::clone(k), v.clone()))
            .collect()
    }

    /// Number of live subscriptions currently attached.
    pub(crate) fn binding_count(&self) -> usize {
        self.inner.borrow().bindings.len()
    }

    /// Current bind epoch.
    pub(crate) fn epoch(&self) -> u64 {
        self.inner.borrow().epoch
    }
}

/// Deliver a new value into shared attr state, suppressing unchanged
/// values and stale epochs. Fires the change notification outside the
/// state borrow.
fn deliver(
    weak: &Weak<RefCell<AttrInner>>,
    epoch: u64,
    recording: &Recording,
    name: &Rc<str>,
    value: Focus,
) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let change;
    let notify;
    {
        let mut state = inner.borrow_mut();
        if state.epoch != epoch {
            trace!(attr = name.as_ref(), "stale attr completion discarded");
            return;
        }
        if !state.store(recording, value) {
            trace!(attr = name.as_ref(), "attr value unchanged, suppressed");
            return;
        }
        if state.priming {
            return;
        }
        change = state.change_for(recording, name);
        notify = Rc::clone(&state.notify);
    }
    notify(change);
}

#![forbid(unsafe_code)]

//! Mounted component instances and their render lifecycle.
//!
//! A [`ComponentCore`] is one mounted [`Valoscope`] occurrence: it owns
//! the attribute bindings, a context layer, the reconciled children and
//! the cached output for one position in the tree. Rendering is
//! contained: a failing ladder degrades to the failure vocabulary and,
//! past that, to a static fallback element, never a panic and never a
//! torn tree.
//!
//! # Invariants
//!
//! 1. Output is cached. A clean component returns its previous tree
//!    without re-running the ladder, and a parent render reuses clean
//!    children wholesale.
//! 2. Faults are sticky. Once recorded they keep the failure route
//!    rendering until cleared or until the component receives a new
//!    spec or focus identity.
//! 3. Children are keyed. A child that keeps its key across renders
//!    keeps its bindings; one absent for a full render is unmounted.
//! 4. Every asynchronous completion is epoch-checked against the
//!    bindings that were live when it was captured. Stale completions
//!    are discarded, never applied.
//! 5. Binding is all-or-nothing per spec: rebinding detaches every old
//!    subscription before the first new one attaches.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::{debug, error, trace, warn};

use inspire_core::{validate, ElementNode, Fault, Focus, Key, Node, ResourceId};

use crate::context::{ScopeMarker, UiContext};
use crate::engine::EngineInner;
use crate::error::LensError;
use crate::lens::{Lens, Valoscope};
use crate::resolve::{
    resolve_main, resolve_role, PendingRender, Resolution, ResolveCx, Services,
};
use crate::slots::Slot;
use crate::spread::project;
use crate::valens::{
    AttrChange, AttrSpec, AttrState, ATTR_ARRAY, ATTR_FOCUS, ATTR_LIMIT, ATTR_OFFSET,
    ATTR_REVERSE, CONTEXT_PREFIX,
};

/// Element tag of the last-resort fallback when even the failure
/// vocabulary cannot render.
const FATAL_TAG: &str = "inspire:fatal";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecyclePhase {
    /// Between allocation and the end of the first binding pass.
    Constructing,
    /// Bound and renderable. Stays here even while faulted.
    Bound,
    /// Torn down. Renders empty, ignores notifications, terminal.
    Unmounted,
}

/// Child bookkeeping: the mounted core plus the render generation that
/// last touched it. A stale generation after a parent render means the
/// child was not produced this time and gets unmounted.
struct ChildEntry {
    core: Rc<ComponentCore>,
    generation: u64,
}

/// Extra scope wiring for children mounted from an array projection.
struct EntryScope {
    array_index: usize,
    element_index: usize,
    shared_prefix: bool,
}

fn index_focus(index: usize) -> Focus {
    Focus::Int(i64::try_from(index).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// The component core
// ---------------------------------------------------------------------------

/// One mounted scope instance.
pub(crate) struct ComponentCore {
    id: u64,
    engine: Weak<EngineInner>,
    services: Rc<Services>,
    parent: RefCell<Weak<ComponentCore>>,
    key: RefCell<Key>,
    spec: RefCell<Rc<Valoscope>>,
    /// Focus handed down by the parent, before any focus attribute
    /// adoption. Reconciliation compares against this, not against the
    /// adopted focus, so an adopting child is not rebound on every
    /// parent render.
    base_focus: RefCell<Focus>,
    focus: RefCell<Focus>,
    context: UiContext,
    attrs: AttrState,
    overrides: RefCell<AHashMap<Slot, Option<Lens>>>,
    template: RefCell<Option<Rc<Valoscope>>>,
    phase: Cell<LifecyclePhase>,
    dirty: Cell<bool>,
    output: RefCell<Node>,
    fault: RefCell<Option<Fault>>,
    error_hidden: Cell<bool>,
    children: RefCell<AHashMap<Key, ChildEntry>>,
    render_generation: Cell<u64>,
}

impl fmt::Debug for ComponentCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCore")
            .field("id", &self.id)
            .field("key", &*self.key.borrow())
            .field("phase", &self.phase.get())
            .field("dirty", &self.dirty.get())
            .field("children", &self.children.borrow().len())
            .finish_non_exhaustive()
    }
}

impl ComponentCore {
    /// Mount a spec into a prepared context and bind it. The context is
    /// already the child layer: depth set, values seeded, parent chain
    /// attached.
    pub(crate) fn mount(
        engine: &Rc<EngineInner>,
        spec: Rc<Valoscope>,
        focus: Focus,
        key: Key,
        context: UiContext,
        parent: Weak<ComponentCore>,
    ) -> Rc<Self> {
        let id = engine.next_component_id();
        let services = engine.services();
        let core = Rc::new_cyclic(|weak: &Weak<ComponentCore>| {
            let notify = {
                let weak = weak.clone();
                Rc::new(move |change: AttrChange| {
                    if let Some(core) = weak.upgrade() {
                        core.on_attr_change(change);
                    }
                }) as Rc<dyn Fn(AttrChange)>
            };
            ComponentCore {
                id,
                engine: Rc::downgrade(engine),
                services,
                parent: RefCell::new(parent),
                key: RefCell::new(key),
                spec: RefCell::new(spec),
                base_focus: RefCell::new(focus.clone()),
                focus: RefCell::new(Focus::None),
                context,
                attrs: AttrState::new(notify),
                overrides: RefCell::new(AHashMap::new()),
                template: RefCell::new(None),
                phase: Cell::new(LifecyclePhase::Constructing),
                dirty: Cell::new(true),
                output: RefCell::new(Node::Empty),
                fault: RefCell::new(None),
                error_hidden: Cell::new(true),
                children: RefCell::new(AHashMap::new()),
                render_generation: Cell::new(0),
            }
        });
        trace!(component = id, key = %core.key.borrow(), "mounting component");
        core.adopt_focus(focus);
        core.initialize();
        core
    }

    fn initialize(self: &Rc<Self>) {
        if let Err(err) = self.bind_all() {
            self.record_binding_fault(err);
        }
        self.phase.set(LifecyclePhase::Bound);
    }

    /// Tear the subtree down: detach subscriptions, unmount children,
    /// release held scope resources. Idempotent.
    pub(crate) fn unmount(self: &Rc<Self>) {
        if self.phase.replace(LifecyclePhase::Unmounted) == LifecyclePhase::Unmounted {
            return;
        }
        debug!(component = self.id, "unmounting");
        self.attrs.unbind();
        let children: Vec<Rc<ComponentCore>> = self
            .children
            .borrow_mut()
            .drain()
            .map(|(_, child)| child.core)
            .collect();
        for child in children {
            child.unmount();
        }
        self.context.release_local_resources();
        *self.output.borrow_mut() = Node::Empty;
    }

    // -- rendering -----------------------------------------------------------

    /// Render, reusing the cached output when nothing marked this
    /// component dirty since the last pass.
    pub(crate) fn render(self: &Rc<Self>) -> Node {
        if self.phase.get() == LifecyclePhase::Unmounted {
            return Node::Empty;
        }
        if !self.dirty.get() {
            return self.output.borrow().clone();
        }
        let generation = self.render_generation.get().wrapping_add(1);
        self.render_generation.set(generation);
        self.dirty.set(false);
        let output = self.render_guarded();
        self.sweep_children(generation);
        *self.output.borrow_mut() = output.clone();
        output
    }

    /// The containment ladder: sticky fault short-circuits to the
    /// failure route; a fresh failure records the fault and takes the
    /// same route; a failure inside the route itself falls back to a
    /// static element.
    fn render_guarded(self: &Rc<Self>) -> Node {
        if self.fault.borrow().is_some() {
            return self.render_fault_route();
        }
        match self.render_tree() {
            Ok(node) => node,
            Err(err) => {
                let fault = Fault::wrap("render failed", err.into());
                warn!(
                    component = self.id,
                    error = %fault,
                    "render failed; switching to the failure route"
                );
                *self.fault.borrow_mut() = Some(fault);
                self.render_fault_route()
            }
        }
    }

    fn render_tree(self: &Rc<Self>) -> Result<Node, LensError> {
        let cx = self.resolve_cx();
        let focus = self.focus.borrow().clone();
        if cx.policy().depth_exceeded(cx.depth()) {
            warn!(component = self.id, depth = cx.depth(), "render depth exceeded");
            let resolution = resolve_role(cx.slots().depth_exceeded, &focus, &cx)?;
            return self.finish(resolution);
        }
        if cx.policy().scan_for_cycles(cx.depth()) {
            if let Some(previous) = self.detect_cycle() {
                let fault = Fault::new("infinite render recursion detected")
                    .with_role("cycle_detected")
                    .with_note("depth", cx.depth())
                    .with_note("repeats", format!("{previous:?}"));
                return Err(LensError::Fault(fault));
            }
        }
        let resolution = match self.resolve_content(&cx) {
            Ok(resolution) => resolution,
            Err(err) => match err.missing_connections() {
                Some(ids) => self.retry_missing_connections(ids.to_vec(), &err, &cx)?,
                None => return Err(err),
            },
        };
        self.finish(resolution)
    }

    fn resolve_content(self: &Rc<Self>, cx: &ResolveCx) -> Result<Resolution, LensError> {
        let spec = self.spec.borrow().clone();
        let focus = self.focus.borrow().clone();
        if spec.spread.is_some() {
            self.resolve_spread(&spec, cx)
        } else {
            resolve_main(&focus, cx)
        }
    }

    /// One reconnection attempt per render, then the pending-connections
    /// role takes over with the missing resources as its focus.
    fn retry_missing_connections(
        self: &Rc<Self>,
        resources: Vec<ResourceId>,
        original: &LensError,
        cx: &ResolveCx,
    ) -> Result<Resolution, LensError> {
        debug!(
            component = self.id,
            missing = resources.len(),
            error = %original,
            "resolution hit unconnected resources; attempting reconnection"
        );
        if self.services.store.acquire_connections(&resources) {
            match self.resolve_content(cx) {
                Ok(resolution) => return Ok(resolution),
                Err(retry) if retry.missing_connections().is_none() => return Err(retry),
                Err(_) => {}
            }
        }
        let focus = Focus::list(
            resources
                .iter()
                .map(|id| Focus::Resource(id.clone()))
                .collect::<Vec<_>>(),
        );
        resolve_role(cx.slots().pending_connections, &focus, cx)
    }

    fn finish(self: &Rc<Self>, resolution: Resolution) -> Result<Node, LensError> {
        match resolution {
            Resolution::Node(node) => {
                let node = self.merge_element_props(node);
                self.validated(node)
            }
            Resolution::Pending(pending) => {
                self.attach_continuation(&pending);
                let placeholder = self.merge_element_props(pending.placeholder.clone());
                self.validated(placeholder)
            }
            Resolution::Unhandled => Ok(Node::Empty),
        }
    }

    /// Non-interpreted attributes land as props on an element output.
    /// Anything else passes through unchanged.
    fn merge_element_props(&self, node: Node) -> Node {
        let props = self.attrs.element_props();
        if props.is_empty() {
            return node;
        }
        match node.as_element() {
            Some(element) => {
                let mut element = element.clone();
                for (name, value) in props {
                    element.set_prop(name, value);
                }
                element.into_node()
            }
            None => {
                debug!(
                    component = self.id,
                    "element props with non-element output; passing through"
                );
                node
            }
        }
    }

    fn validated(&self, node: Node) -> Result<Node, LensError> {
        let Err(faults) = validate(&node) else {
            return Ok(node);
        };
        let mut fault =
            Fault::new("rendered output failed validation").with_role("invalid_element");
        for (index, issue) in faults.iter().enumerate() {
            fault = fault.with_note(format!("issue {index}"), issue);
        }
        Err(LensError::Fault(fault))
    }

    /// Wire a pending resolution's settlement back into the scheduler.
    /// The closure captures the binding epoch; a settlement arriving
    /// after a rebind or focus change is stale and dropped.
    fn attach_continuation(self: &Rc<Self>, pending: &PendingRender) {
        let weak = Rc::downgrade(self);
        let epoch = self.attrs.epoch();
        let rejected = pending.rejected;
        trace!(component = self.id, "render pending; waiting for settlement");
        pending.wake.on_settle(move |outcome| {
            let Some(core) = weak.upgrade() else { return };
            if core.phase.get() == LifecyclePhase::Unmounted {
                return;
            }
            if core.attrs.epoch() != epoch {
                trace!(component = core.id, "discarding stale settlement");
                return;
            }
            match outcome {
                Ok(_) => core.schedule_render("pending lens settled"),
                Err(fault) => {
                    let fault = if fault.role().is_none() {
                        let role = core.services.registry.name(rejected).to_owned();
                        fault.with_role(role)
                    } else {
                        fault
                    };
                    warn!(component = core.id, error = %fault, "pending lens rejected");
                    *core.fault.borrow_mut() = Some(fault);
                    core.schedule_render("pending lens rejected");
                }
            }
        });
    }

    // -- the failure route ---------------------------------------------------

    /// Render the sticky fault through its failure role, falling back
    /// to the internal-error role and finally to a static element. This
    /// path must produce *something* no matter what fails inside it.
    fn render_fault_route(self: &Rc<Self>) -> Node {
        let fault = {
            let mut sticky = self.fault.borrow_mut();
            sticky
                .get_or_insert_with(|| Fault::new("failure route entered without a cause"))
                .clone()
        };
        let cx = self.resolve_cx();
        let slot = fault
            .role()
            .and_then(|role| self.services.registry.find(role))
            .unwrap_or(cx.slots().internal_error);
        let focus = Focus::text(fault.message());
        match self.render_failure_slot(slot, &focus, &cx) {
            Ok(node) => node,
            Err(err) => {
                error!(
                    component = self.id,
                    error = %Fault::from(err),
                    "failure route failed; emitting static fallback"
                );
                self.static_fallback(&fault)
            }
        }
    }

    fn render_failure_slot(
        self: &Rc<Self>,
        slot: Slot,
        focus: &Focus,
        cx: &ResolveCx,
    ) -> Result<Node, LensError> {
        match resolve_role(slot, focus, cx)? {
            Resolution::Node(node) => self.validated(node),
            Resolution::Pending(pending) => {
                self.attach_continuation(&pending);
                self.validated(pending.placeholder.clone())
            }
            Resolution::Unhandled if slot != cx.slots().internal_error => {
                self.render_failure_slot(cx.slots().internal_error, focus, cx)
            }
            Resolution::Unhandled => {
                error!(component = self.id, "no slot handled the fault; rendering empty");
                Ok(Node::Empty)
            }
        }
    }

    fn static_fallback(&self, fault: &Fault) -> Node {
        ElementNode::new(FATAL_TAG)
            .with_prop("message", Focus::text(fault.message()))
            .into_node()
    }

    // -- array projection ----------------------------------------------------

    /// Render a spread spec: project the bound array controls, then
    /// mount one child per surviving entry from the shared template.
    fn resolve_spread(
        self: &Rc<Self>,
        spec: &Rc<Valoscope>,
        cx: &ResolveCx,
    ) -> Result<Resolution, LensError> {
        let Some(spread) = spec.spread.as_ref() else {
            return Ok(Resolution::Unhandled);
        };
        let template = match self.template.borrow().clone() {
            Some(template) => template,
            None => {
                let built = Rc::new(entry_template(spec));
                *self.template.borrow_mut() = Some(Rc::clone(&built));
                built
            }
        };
        let source = match self.attrs.value(ATTR_ARRAY) {
            Some(Focus::List(items)) => items.to_vec(),
            Some(Focus::None) | None => Vec::new(),
            Some(single) => vec![single],
        };
        let offset = self.attrs.value(ATTR_OFFSET);
        let limit = self.attrs.value(ATTR_LIMIT);
        let reverse = self.attrs.value(ATTR_REVERSE);
        let projection = project(
            spread,
            &source,
            offset.as_ref(),
            limit.as_ref(),
            reverse.as_ref(),
        );
        self.context
            .set_value("end_offset", index_focus(projection.end_offset));
        let shared_prefix = spread.frame_key.is_shared();
        let mut nodes = Vec::with_capacity(projection.entries.len());
        for (element_index, entry) in projection.entries.into_iter().enumerate() {
            let scope = EntryScope {
                array_index: entry.array_index,
                element_index,
                shared_prefix,
            };
            let node =
                self.mount_entry(&template, entry.focus, entry.key.clone(), cx, Some(&scope));
            nodes.push(keyed_entry(node, &entry.key));
        }
        Ok(Resolution::Node(Node::fragment(nodes)))
    }

    // -- children ------------------------------------------------------------

    /// Mount or reuse the child for a nested scope encountered during
    /// resolution. Infallible: a child that cannot mount renders empty.
    pub(crate) fn mount_child(
        self: &Rc<Self>,
        spec: &Rc<Valoscope>,
        focus: &Focus,
        index: usize,
        cx: &ResolveCx,
    ) -> Node {
        let key = match &spec.key {
            Some(key) => key.clone(),
            None => match focus.as_resource() {
                Some(id) => Key::for_resource(id),
                None => Key::positional(index),
            },
        };
        self.mount_entry(spec, focus.clone(), key, cx, None)
    }

    fn mount_entry(
        self: &Rc<Self>,
        spec: &Rc<Valoscope>,
        focus: Focus,
        key: Key,
        cx: &ResolveCx,
        entry: Option<&EntryScope>,
    ) -> Node {
        let scoped = match cx.context().key_prefix() {
            Some(prefix) => key.scoped(prefix.as_str()),
            None => key,
        };
        let generation = self.render_generation.get();
        let existing = {
            let mut children = self.children.borrow_mut();
            children.get_mut(&scoped).map(|child| {
                child.generation = generation;
                Rc::clone(&child.core)
            })
        };
        if let Some(child) = existing {
            child.receive_props(spec, &focus);
            return child.render();
        }
        let Some(engine) = self.engine.upgrade() else {
            warn!(component = self.id, "engine dropped; cannot mount child");
            return Node::Empty;
        };
        let child_context = cx.context().child();
        child_context.set_render_depth(cx.context().render_depth() + 1);
        if let Some(entry) = entry {
            child_context.set_value("array_index", index_focus(entry.array_index));
            child_context.set_value("element_index", index_focus(entry.element_index));
            if entry.shared_prefix {
                child_context.set_key_prefix(scoped.clone());
            }
        }
        let child = ComponentCore::mount(
            &engine,
            Rc::clone(spec),
            focus,
            scoped.clone(),
            child_context,
            Rc::downgrade(self),
        );
        let node = child.render();
        self.children.borrow_mut().insert(
            scoped,
            ChildEntry {
                core: child,
                generation,
            },
        );
        node
    }

    /// Reconcile an existing child against this render's spec and
    /// focus. Identical identity is a no-op and keeps every binding;
    /// anything else rebinds from scratch and drops the sticky fault
    /// along with the old identity.
    fn receive_props(self: &Rc<Self>, spec: &Rc<Valoscope>, focus: &Focus) {
        if self.phase.get() == LifecyclePhase::Unmounted {
            return;
        }
        let same_spec = Rc::ptr_eq(&self.spec.borrow(), spec);
        let same_focus = self.base_focus.borrow().identity_eq(focus);
        if same_spec && same_focus {
            return;
        }
        trace!(component = self.id, "props changed; rebinding");
        *self.spec.borrow_mut() = Rc::clone(spec);
        *self.base_focus.borrow_mut() = focus.clone();
        *self.fault.borrow_mut() = None;
        self.adopt_focus(focus.clone());
        if let Err(err) = self.bind_all() {
            self.record_binding_fault(err);
        }
        self.dirty.set(true);
    }

    /// Unmount children the current render did not produce.
    fn sweep_children(&self, generation: u64) {
        let stale: Vec<Rc<ComponentCore>> = {
            let mut children = self.children.borrow_mut();
            let stale_keys: Vec<Key> = children
                .iter()
                .filter(|(_, child)| child.generation != generation)
                .map(|(key, _)| key.clone())
                .collect();
            stale_keys
                .iter()
                .filter_map(|key| children.remove(key))
                .map(|child| child.core)
                .collect()
        };
        for child in stale {
            trace!(component = self.id, "sweeping stale child");
            child.unmount();
        }
    }

    // -- binding -------------------------------------------------------------

    /// (Re)bind everything the spec declares: slot overrides, context
    /// slot bindings, attribute sources, seeded context values. A spec
    /// that needs a frame but has none stays unbound so the unframed
    /// role can render instead of a binding error.
    fn bind_all(&self) -> Result<(), LensError> {
        let spec = self.spec.borrow().clone();
        let mut overrides = AHashMap::new();
        for (name, lens) in &spec.slot_overrides {
            let slot = self.services.registry.lookup(name)?;
            overrides.insert(slot, lens.clone());
        }
        *self.overrides.borrow_mut() = overrides;
        for (name, lens) in &spec.context_slots {
            let slot = self.services.registry.lookup(name)?;
            self.context.set_slot_lens(slot, lens.clone());
        }
        *self.template.borrow_mut() = if spec.spread.is_some() {
            Some(Rc::new(entry_template(&spec)))
        } else {
            None
        };
        let frame = self.context.frame().unwrap_or_default();
        if spec.needs_frame() && frame.is_none() {
            self.attrs.unbind();
            debug!(
                component = self.id,
                "no frame for live attributes; leaving them unbound"
            );
            return Ok(());
        }
        let specs = attr_specs(&spec);
        self.attrs
            .bind(&specs, &self.services.recorders, &self.services.store, &frame)?;
        if let Some(focus) = self.attrs.value(ATTR_FOCUS) {
            self.adopt_focus(focus);
        }
        for (name, value) in self.attrs.context_entries() {
            self.context.set_value(name, value);
        }
        Ok(())
    }

    /// Make `focus` current: the component field, the context, the
    /// ownership marker, and the frame when the focus is a resource.
    fn adopt_focus(&self, focus: Focus) {
        if focus.as_resource().is_some() {
            self.context.set_frame(focus.clone());
        }
        self.context.set_focus(focus.clone());
        let marker = ScopeMarker::new(
            self.spec.borrow().clone(),
            self.key.borrow().clone(),
            focus.clone(),
            self.id,
        );
        self.context.set_owner(marker);
        *self.focus.borrow_mut() = focus;
    }

    fn record_binding_fault(&self, err: LensError) {
        let fault = Fault::wrap("attribute binding failed", err.into());
        warn!(component = self.id, error = %fault, "binding failed");
        *self.fault.borrow_mut() = Some(fault);
    }

    /// Own marker against every enclosing owner: a render-equivalent
    /// ancestor means the tree is reproducing itself.
    fn detect_cycle(&self) -> Option<ScopeMarker> {
        let marker = ScopeMarker::new(
            self.spec.borrow().clone(),
            self.key.borrow().clone(),
            self.focus.borrow().clone(),
            self.id,
        );
        self.context
            .owner_markers(true)
            .into_iter()
            .find(|candidate| candidate.same_instance(&marker))
    }

    // -- change notifications ------------------------------------------------

    fn on_attr_change(self: &Rc<Self>, change: AttrChange) {
        if self.phase.get() == LifecyclePhase::Unmounted {
            return;
        }
        match change {
            AttrChange::Focus(focus) => {
                trace!(component = self.id, "focus attribute changed");
                *self.fault.borrow_mut() = None;
                self.adopt_focus(focus);
                if let Err(err) = self.bind_all() {
                    self.record_binding_fault(err);
                }
                self.schedule_render("focus changed");
            }
            AttrChange::Context(name, value) => {
                self.context.set_value(name, value);
                self.schedule_render("context value changed");
            }
            AttrChange::Rerender(name) => {
                trace!(component = self.id, attr = %name, "attribute changed");
                self.schedule_render("attribute changed");
            }
            AttrChange::Failed(name, fault) => {
                let fault = if fault.role().is_none() {
                    let role = self
                        .services
                        .registry
                        .name(self.services.slots.rejected)
                        .to_owned();
                    fault.with_role(role)
                } else {
                    fault
                };
                let fault =
                    Fault::wrap("live attribute failed", fault).with_note("attribute", &name);
                warn!(component = self.id, error = %fault, "live attribute failed");
                *self.fault.borrow_mut() = Some(fault);
                self.schedule_render("attribute failed");
            }
        }
    }

    // -- scheduling ----------------------------------------------------------

    fn schedule_render(self: &Rc<Self>, reason: &'static str) {
        if self.phase.get() == LifecyclePhase::Unmounted {
            return;
        }
        trace!(component = self.id, reason, "scheduling render");
        self.mark_dirty_upward();
        if let Some(engine) = self.engine.upgrade() {
            engine.schedule(Rc::downgrade(self));
        }
    }

    /// Dirty this component and its ancestors. Stops at the first
    /// already-dirty ancestor, which implies the rest of the path is
    /// dirty too.
    fn mark_dirty_upward(&self) {
        if self.dirty.replace(true) {
            return;
        }
        let parent = self.parent.borrow().upgrade();
        if let Some(parent) = parent {
            parent.mark_dirty_upward();
        }
    }

    // -- error surface -------------------------------------------------------

    pub(crate) fn toggle_error_detail(self: &Rc<Self>) {
        self.error_hidden.set(!self.error_hidden.get());
        if self.fault.borrow().is_some() {
            self.schedule_render("error detail toggled");
        }
    }

    pub(crate) fn clear_error(self: &Rc<Self>) {
        if self.fault.borrow_mut().take().is_some() {
            self.schedule_render("error cleared");
        }
    }

    // -- accessors -----------------------------------------------------------

    fn resolve_cx(self: &Rc<Self>) -> ResolveCx {
        ResolveCx::new(
            Rc::clone(&self.services),
            Rc::downgrade(self),
            self.context.clone(),
        )
    }

    pub(crate) fn attr_value(&self, name: &str) -> Option<Focus> {
        self.attrs.value(name)
    }

    pub(crate) fn spec(&self) -> Rc<Valoscope> {
        self.spec.borrow().clone()
    }

    pub(crate) fn sticky_fault(&self) -> Option<Fault> {
        self.fault.borrow().clone()
    }

    pub(crate) fn error_detail_visible(&self) -> bool {
        !self.error_hidden.get()
    }

    pub(crate) fn live_slot_value(&self, slot: Slot) -> Option<Focus> {
        self.attrs.slot_value(slot)
    }

    pub(crate) fn static_slot_override(&self, slot: Slot) -> Option<Option<Lens>> {
        self.overrides.borrow().get(&slot).cloned()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub(crate) fn root(self: &Rc<Self>) -> Rc<ComponentCore> {
        let mut current = Rc::clone(self);
        loop {
            let parent = current.parent.borrow().upgrade();
            match parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The per-entry spec for a spread: everything the source spec carries
/// except the spread itself, its key, and any focus attribute, all of
/// which the projection supplies per entry. Built once per bound spec
/// so entry children keep their spec identity across renders.
fn entry_template(spec: &Valoscope) -> Valoscope {
    Valoscope {
        attrs: spec
            .attrs
            .iter()
            .filter(|attr| attr.name() != ATTR_FOCUS)
            .cloned()
            .collect(),
        slot_overrides: spec.slot_overrides.clone(),
        context_values: spec.context_values.clone(),
        context_slots: spec.context_slots.clone(),
        children: spec.children.clone(),
        spread: None,
        key: None,
    }
}

/// Attribute specs the binder sees: declared attributes, then the
/// engine-interpreted spread controls, then seeded context values under
/// their reserved prefix.
fn attr_specs(spec: &Valoscope) -> Vec<AttrSpec> {
    let mut specs = spec.attrs.clone();
    if let Some(spread) = &spec.spread {
        specs.push(AttrSpec::new(ATTR_ARRAY, spread.array.clone()));
        if let Some(source) = &spread.offset {
            specs.push(AttrSpec::new(ATTR_OFFSET, source.clone()));
        }
        if let Some(source) = &spread.limit {
            specs.push(AttrSpec::new(ATTR_LIMIT, source.clone()));
        }
        if let Some(source) = &spread.reverse {
            specs.push(AttrSpec::new(ATTR_REVERSE, source.clone()));
        }
    }
    for (name, source) in &spec.context_values {
        specs.push(AttrSpec::new(format!("{CONTEXT_PREFIX}{name}"), source.clone()));
    }
    specs
}

/// Entry outputs that are elements must carry the entry key so sibling
/// reconciliation stays stable; already-keyed elements keep their own.
fn keyed_entry(node: Node, key: &Key) -> Node {
    match node.as_element() {
        Some(element) if element.key.is_none() => {
            let mut element = element.clone();
            element.key = Some(key.clone());
            element.into_node()
        }
        _ => node,
    }
}

#![forbid(unsafe_code)]

//! Lens and slot resolution.
//!
//! Resolution turns a lens plus a focus into a [`Resolution`]: concrete
//! output, a pending placeholder with a wake-up, or a declaration that
//! the lens does not handle this focus. The walk rules are uniform
//! everywhere they appear:
//!
//! * Delegate lists and the main slot sequence take the first entry that
//!   resolves to something other than unhandled-or-empty. Rendering
//!   nothing on purpose is expressed as empty text, which does
//!   terminate.
//! * Slot resolution applies assignment priority: the component's own
//!   assignments, then inherited context bindings, then the registry
//!   default. A disabled slot is skipped outright, assigned or not.
//! * Anything asynchronous resolves to [`Resolution::Pending`] carrying
//!   what to show now and a deferred to wake on. Nothing in this module
//!   blocks.
//!
//! # Invariants
//!
//! 1. Resolution is read-only with respect to the store; evaluating and
//!    subscribing are the binder's job, one-shot evaluation here aside.
//! 2. Lens recursion within a single render is bounded by the policy
//!    depth; exceeding it is an error with the depth-exceeded role, not
//!    a stack overflow.
//! 3. A settled deferred lens resolves synchronously; only genuinely
//!    unsettled ones produce a pending resolution.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use inspire_core::{Deferred, Fault, Focus, Key, Node, ResourceId};
use inspire_store::{Activation, Evaluation, ResourcePhase, ResourceStore};
use tracing::trace;

use crate::component::ComponentCore;
use crate::context::UiContext;
use crate::error::LensError;
use crate::lens::{Lens, Valoscope};
use crate::policy::RenderPolicy;
use crate::slots::{Slot, SlotRegistry};
use crate::valens::RecorderTable;
use crate::vocabulary::{CoreSlots, LENS_PROPERTY_NAMES};

// ---------------------------------------------------------------------------
// Resolution outcome
// ---------------------------------------------------------------------------

/// What resolving a lens produced.
#[derive(Debug)]
pub enum Resolution {
    /// Concrete output.
    Node(Node),
    /// Output is in flight; show the placeholder and wake on settlement.
    Pending(PendingRender),
    /// The lens declined this focus; the caller tries the next candidate
    /// or substitutes nothing.
    Unhandled,
}

impl Resolution {
    /// Whether this resolution continues a delegate walk: unhandled, or
    /// handled with nothing at all.
    #[must_use]
    pub fn passes_over(&self) -> bool {
        match self {
            Self::Unhandled => true,
            Self::Node(node) => node.is_empty(),
            Self::Pending(_) => false,
        }
    }
}

/// A resolution waiting on an asynchronous settlement.
#[derive(Debug)]
pub struct PendingRender {
    pub(crate) placeholder: Node,
    pub(crate) wake: Deferred<Lens>,
    pub(crate) rejected: Slot,
}

impl PendingRender {
    /// What to show while waiting.
    #[must_use]
    pub fn placeholder(&self) -> &Node {
        &self.placeholder
    }

    /// Slot that renders the failure if the wait ends in a fault.
    #[must_use]
    pub fn rejected_slot(&self) -> Slot {
        self.rejected
    }
}

// ---------------------------------------------------------------------------
// Engine services and the resolution context
// ---------------------------------------------------------------------------

/// Shared per-engine services resolution needs: the store, the slot
/// vocabulary, the recorder table, and the guard policy. Built once at
/// engine construction.
pub(crate) struct Services {
    pub(crate) store: Rc<dyn ResourceStore>,
    pub(crate) policy: RenderPolicy,
    pub(crate) registry: SlotRegistry,
    pub(crate) slots: CoreSlots,
    pub(crate) recorders: RecorderTable,
}

impl Services {
    pub(crate) fn new(
        store: Rc<dyn ResourceStore>,
        policy: RenderPolicy,
        registry: SlotRegistry,
    ) -> Result<Rc<Self>, LensError> {
        let slots = CoreSlots::from_registry(&registry)?;
        let recorders = RecorderTable::new(&registry);
        Ok(Rc::new(Self {
            store,
            policy,
            registry,
            slots,
            recorders,
        }))
    }
}

/// Everything a resolution step can reach: engine services, the owning
/// component, the UI context, and the slot currently being filled.
///
/// Cheap to clone; clones within one render share the child counter.
#[derive(Clone)]
pub struct ResolveCx {
    pub(crate) services: Rc<Services>,
    pub(crate) component: Weak<ComponentCore>,
    pub(crate) context: UiContext,
    pub(crate) slot: Slot,
    pub(crate) next_child: Rc<Cell<usize>>,
}

impl ResolveCx {
    pub(crate) fn new(
        services: Rc<Services>,
        component: Weak<ComponentCore>,
        context: UiContext,
    ) -> Self {
        let slot = services.slots.lens;
        Self {
            services,
            component,
            context,
            slot,
            next_child: Rc::new(Cell::new(0)),
        }
    }

    /// Context detached from any component, for resolving free-standing
    /// lenses.
    pub(crate) fn detached(services: Rc<Services>, context: UiContext) -> Self {
        Self::new(services, Weak::new(), context)
    }

    pub(crate) fn for_slot(&self, slot: Slot) -> Self {
        let mut cx = self.clone();
        cx.slot = slot;
        cx
    }

    pub(crate) fn slots(&self) -> &CoreSlots {
        &self.services.slots
    }

    pub(crate) fn store(&self) -> &Rc<dyn ResourceStore> {
        &self.services.store
    }

    fn take_child_index(&self) -> usize {
        let index = self.next_child.get();
        self.next_child.set(index + 1);
        index
    }

    // -- public surface for lens functions ----------------------------------

    /// The UI context of the resolving component.
    #[must_use]
    pub fn context(&self) -> &UiContext {
        &self.context
    }

    /// Slot currently being filled.
    #[must_use]
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Name of the slot currently being filled.
    #[must_use]
    pub fn slot_name(&self) -> &str {
        self.services.registry.name(self.slot)
    }

    /// Guard policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RenderPolicy {
        &self.services.policy
    }

    /// Render depth of the owning component.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.context.render_depth()
    }

    /// Evaluation frame from the context.
    #[must_use]
    pub fn frame(&self) -> Option<Focus> {
        self.context.frame()
    }

    /// Current value of an engine-interpreted attribute on the owning
    /// component.
    #[must_use]
    pub fn attr_value(&self, name: &str) -> Option<Focus> {
        self.component
            .upgrade()
            .and_then(|core| core.attr_value(name))
    }

    /// Whether the owning component's spec declares children.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.component
            .upgrade()
            .is_some_and(|core| core.spec().has_children())
    }

    /// Children declared by the owning component's spec, as a sequence.
    #[must_use]
    pub fn children_lens(&self) -> Lens {
        match self.component.upgrade() {
            Some(core) => Lens::sequence(core.spec().children.iter().cloned()),
            None => Lens::Empty,
        }
    }

    /// Whether the owning component's spec needs a frame to bind.
    #[must_use]
    pub fn spec_needs_frame(&self) -> bool {
        self.component
            .upgrade()
            .is_some_and(|core| core.spec().needs_frame())
    }

    /// The owning component's sticky fault, if a render has failed.
    #[must_use]
    pub fn sticky_fault(&self) -> Option<Fault> {
        self.component.upgrade().and_then(|core| core.sticky_fault())
    }

    /// Whether the error panel should include failure detail.
    #[must_use]
    pub fn error_detail_visible(&self) -> bool {
        self.component
            .upgrade()
            .is_some_and(|core| core.error_detail_visible())
    }

    // -- component bridge ----------------------------------------------------

    fn mount_scope(&self, spec: &Rc<Valoscope>, focus: &Focus) -> Result<Resolution, LensError> {
        let core = self.component.upgrade().ok_or_else(|| {
            LensError::Fault(Fault::new("scoped lens resolved outside a component tree"))
        })?;
        let index = self.take_child_index();
        Ok(Resolution::Node(core.mount_child(spec, focus, index, self)))
    }

    fn live_slot_value(&self, slot: Slot) -> Option<Focus> {
        self.component
            .upgrade()
            .and_then(|core| core.live_slot_value(slot))
    }

    fn static_slot_override(&self, slot: Slot) -> Option<Option<Lens>> {
        self.component
            .upgrade()
            .and_then(|core| core.static_slot_override(slot))
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Resolve `lens` against `focus`.
pub(crate) fn resolve_lens(
    lens: &Lens,
    focus: &Focus,
    cx: &ResolveCx,
) -> Result<Resolution, LensError> {
    resolve_at(lens, focus, cx, 0)
}

/// Resolve the slot `slot` with full assignment priority.
pub(crate) fn resolve_role(
    slot: Slot,
    focus: &Focus,
    cx: &ResolveCx,
) -> Result<Resolution, LensError> {
    resolve_role_at(slot, focus, cx, 0)
}

/// Walk the registry's main slot sequence for a scoped component.
pub(crate) fn resolve_main(focus: &Focus, cx: &ResolveCx) -> Result<Resolution, LensError> {
    let sequence: Vec<Slot> = cx.services.registry.main_sequence().to_vec();
    for slot in sequence {
        let resolution = resolve_role_at(slot, focus, cx, 0)?;
        if resolution.passes_over() {
            continue;
        }
        trace!(
            slot = cx.services.registry.name(slot),
            "main sequence handled"
        );
        return Ok(resolution);
    }
    Ok(Resolution::Unhandled)
}

// ---------------------------------------------------------------------------
// The resolver
// ---------------------------------------------------------------------------

fn check_depth(cx: &ResolveCx, depth: u32) -> Result<(), LensError> {
    let maximum = cx.services.policy.maximum_render_depth;
    if depth > maximum {
        return Err(LensError::DepthExceeded { depth, maximum });
    }
    Ok(())
}

fn resolve_at(
    lens: &Lens,
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    check_depth(cx, depth)?;
    match lens {
        Lens::Empty => Ok(Resolution::Node(Node::Empty)),
        Lens::Node(node) => Ok(Resolution::Node(node.clone())),
        Lens::Text(text) => Ok(Resolution::Node(Node::Text(Rc::clone(text)))),
        Lens::Int(value) => Ok(Resolution::Node(Node::text(value.to_string()))),
        Lens::Focus(value) => Ok(Resolution::Node(display_focus(value))),
        Lens::Call(lens_fn) => {
            let next = lens_fn.call(focus, cx)?;
            resolve_at(&next, focus, cx, depth + 1)
        }
        Lens::Kuery(kuery) => {
            let frame = eval_frame(cx, focus)?;
            match cx.store().evaluate(&frame, kuery)? {
                Evaluation::Ready(value) => {
                    resolve_at(&Lens::from_focus(value), focus, cx, depth + 1)
                }
                Evaluation::Loading(deferred) => {
                    let wake = deferred.map(|result| result.map(Lens::from_focus));
                    pending_resolution(cx, focus.clone(), wake, cx.slots().pending, depth)
                }
            }
        }
        Lens::Resource(id) => resolve_resource(id, cx, depth),
        Lens::Media(id) => resolve_media(id, focus, cx, depth),
        Lens::Sequence(items) => resolve_sequence(items, focus, cx, depth),
        Lens::Delegate(entries) => resolve_delegates(entries, focus, cx, depth),
        Lens::SlotRef(slot) => resolve_role_at(*slot, focus, cx, depth + 1),
        Lens::Instrument(steps) => resolve_instrument(steps, focus, cx, depth),
        Lens::Pending(deferred) => match deferred.peek() {
            Some(Ok(inner)) => resolve_at(&inner, focus, cx, depth + 1),
            Some(Err(fault)) => Err(LensError::Fault(fault)),
            None => pending_resolution(
                cx,
                focus.clone(),
                deferred.clone(),
                cx.slots().pending,
                depth,
            ),
        },
        Lens::Scope(spec) => cx.mount_scope(spec, focus),
    }
}

fn resolve_role_at(
    slot: Slot,
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    check_depth(cx, depth)?;
    let cx = cx.for_slot(slot);
    let def = cx.services.registry.def(slot);
    if !def.enablement().enabled(focus, &cx) {
        return Ok(Resolution::Unhandled);
    }
    // Component assignments first: live attribute values, then static
    // overrides from the spec.
    if let Some(value) = cx.live_slot_value(slot) {
        return resolve_at(&Lens::from_focus(value), focus, &cx, depth + 1);
    }
    match cx.static_slot_override(slot) {
        Some(Some(lens)) => return resolve_at(&lens, focus, &cx, depth + 1),
        Some(None) => {
            return Err(LensError::UndefinedSlotAssignee {
                slot: cx.services.registry.name(slot).to_owned(),
            });
        }
        None => {}
    }
    // Context tier.
    if let Some(lens) = cx.context.slot_lens(slot) {
        return resolve_at(&lens, focus, &cx, depth + 1);
    }
    // Registry default.
    if let Some(lens) = def.default() {
        let lens = lens.clone();
        return resolve_at(&lens, focus, &cx, depth + 1);
    }
    Ok(Resolution::Unhandled)
}

fn resolve_sequence(
    items: &[Lens],
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    let mut nodes = Vec::with_capacity(items.len());
    let mut first_wake: Option<Deferred<Lens>> = None;
    for (index, item) in items.iter().enumerate() {
        match resolve_at(item, focus, cx, depth + 1)? {
            Resolution::Node(node) => {
                if !node.is_empty() {
                    nodes.push(node);
                }
            }
            Resolution::Pending(pending) => {
                let placeholder = keyed_placeholder(pending.placeholder, index);
                if !placeholder.is_empty() {
                    nodes.push(placeholder);
                }
                if first_wake.is_none() {
                    first_wake = Some(pending.wake);
                }
            }
            Resolution::Unhandled => {}
        }
    }
    let node = if nodes.len() == 1 {
        nodes.pop().unwrap_or(Node::Empty)
    } else {
        Node::fragment(nodes)
    };
    match first_wake {
        Some(wake) => Ok(Resolution::Pending(PendingRender {
            placeholder: node,
            wake,
            rejected: cx.slots().rejected,
        })),
        None => Ok(Resolution::Node(node)),
    }
}

/// Engine-generated placeholders land inside the sequence fragment, so
/// the engine supplies the sibling key the output validator requires.
fn keyed_placeholder(node: Node, index: usize) -> Node {
    match node {
        Node::Element(el) if el.key.is_none() => {
            let mut el = (*el).clone();
            el.key = Some(Key::positional(index));
            Node::Element(Rc::new(el))
        }
        other => other,
    }
}

fn resolve_delegates(
    entries: &[Lens],
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    for entry in entries {
        let resolution = resolve_at(entry, focus, cx, depth + 1)?;
        if resolution.passes_over() {
            continue;
        }
        return Ok(resolution);
    }
    Ok(Resolution::Unhandled)
}

// ---------------------------------------------------------------------------
// Resources and media
// ---------------------------------------------------------------------------

enum ResourceStage {
    Activate,
    Dispatch(ResourcePhase),
    LensProperty,
}

fn resolve_resource(
    id: &ResourceId,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    let resource_focus = Focus::Resource(id.clone());
    let mut stage = ResourceStage::Activate;
    loop {
        stage = match stage {
            ResourceStage::Activate => match cx.store().activate(id)? {
                Activation::Ready(phase) => ResourceStage::Dispatch(phase),
                Activation::Pending(deferred) => {
                    let id = id.clone();
                    let wake = deferred.map(move |result| result.map(|_| Lens::Resource(id)));
                    return pending_resolution(
                        cx,
                        resource_focus,
                        wake,
                        cx.slots().activating,
                        depth,
                    );
                }
            },
            ResourceStage::Dispatch(phase) => match phase {
                ResourcePhase::Active => ResourceStage::LensProperty,
                ResourcePhase::Activating => {
                    return resolve_role_at(cx.slots().activating, &resource_focus, cx, depth + 1);
                }
                ResourcePhase::Inactive | ResourcePhase::Immaterial => {
                    return resolve_role_at(cx.slots().inactive, &resource_focus, cx, depth + 1);
                }
                ResourcePhase::Unavailable => {
                    return resolve_role_at(cx.slots().unavailable, &resource_focus, cx, depth + 1);
                }
                ResourcePhase::Destroyed => {
                    return resolve_role_at(cx.slots().destroyed, &resource_focus, cx, depth + 1);
                }
            },
            ResourceStage::LensProperty => {
                match cx.store().get_property(id, LENS_PROPERTY_NAMES)? {
                    Some(value) => {
                        return resolve_at(&Lens::from_focus(value), &resource_focus, cx, depth + 1);
                    }
                    None => return Ok(Resolution::Unhandled),
                }
            }
        };
    }
}

fn resolve_media(
    id: &ResourceId,
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    match cx.store().interpret(id)? {
        Evaluation::Ready(content) => resolve_at(&Lens::from_focus(content), focus, cx, depth + 1),
        Evaluation::Loading(deferred) => {
            let wake = deferred.map(|result| result.map(Lens::from_focus));
            pending_resolution(
                cx,
                Focus::Resource(id.clone()),
                wake,
                cx.slots().media_pending,
                depth,
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

enum FocusOutcome {
    Ready(Focus),
    Pending(Deferred<Focus>),
}

fn resolve_instrument(
    steps: &[Lens],
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<Resolution, LensError> {
    let Some((last, init)) = steps.split_last() else {
        return Ok(Resolution::Unhandled);
    };
    let mut current = focus.clone();
    for step in init {
        match resolve_to_focus(step, &current, cx, depth + 1)? {
            FocusOutcome::Ready(value) => current = value,
            FocusOutcome::Pending(deferred) => {
                let wake = deferred.map(|result| result.map(Lens::from_focus));
                return pending_resolution(cx, current, wake, cx.slots().pending, depth);
            }
        }
    }
    resolve_at(last, &current, cx, depth + 1)
}

fn resolve_to_focus(
    lens: &Lens,
    focus: &Focus,
    cx: &ResolveCx,
    depth: u32,
) -> Result<FocusOutcome, LensError> {
    check_depth(cx, depth)?;
    match lens {
        Lens::Empty => Ok(FocusOutcome::Ready(Focus::None)),
        Lens::Focus(value) => Ok(FocusOutcome::Ready(value.clone())),
        Lens::Int(value) => Ok(FocusOutcome::Ready(Focus::Int(*value))),
        Lens::Text(text) => Ok(FocusOutcome::Ready(Focus::Text(Rc::clone(text)))),
        Lens::Resource(id) => Ok(FocusOutcome::Ready(Focus::Resource(id.clone()))),
        Lens::Call(lens_fn) => {
            let next = lens_fn.call(focus, cx)?;
            resolve_to_focus(&next, focus, cx, depth + 1)
        }
        Lens::Kuery(kuery) => {
            let frame = eval_frame(cx, focus)?;
            match cx.store().evaluate(&frame, kuery)? {
                Evaluation::Ready(value) => Ok(FocusOutcome::Ready(value)),
                Evaluation::Loading(deferred) => Ok(FocusOutcome::Pending(deferred)),
            }
        }
        Lens::Pending(deferred) => match deferred.peek() {
            Some(Ok(inner)) => resolve_to_focus(&inner, focus, cx, depth + 1),
            Some(Err(fault)) => Err(LensError::Fault(fault)),
            None => {
                let mapped = deferred.map(|result| {
                    result.and_then(|lens| {
                        focus_literal(&lens).ok_or_else(|| {
                            Fault::new("deferred instrument step settled with a non-value lens")
                        })
                    })
                });
                Ok(FocusOutcome::Pending(mapped))
            }
        },
        other => Err(LensError::NotFocusConvertible {
            slot: cx.slot_name().to_owned(),
            detail: lens_kind(other).to_owned(),
        }),
    }
}

/// The focus a settled lens literal denotes, if it is one.
fn focus_literal(lens: &Lens) -> Option<Focus> {
    match lens {
        Lens::Empty => Some(Focus::None),
        Lens::Focus(value) => Some(value.clone()),
        Lens::Int(value) => Some(Focus::Int(*value)),
        Lens::Text(text) => Some(Focus::Text(Rc::clone(text))),
        Lens::Resource(id) => Some(Focus::Resource(id.clone())),
        _ => None,
    }
}

fn lens_kind(lens: &Lens) -> &'static str {
    match lens {
        Lens::Empty => "empty",
        Lens::Node(_) => "node",
        Lens::Text(_) => "text",
        Lens::Int(_) => "int",
        Lens::Focus(_) => "focus",
        Lens::Call(_) => "call",
        Lens::Kuery(_) => "kuery",
        Lens::Resource(_) => "resource",
        Lens::Media(_) => "media",
        Lens::Sequence(_) => "sequence",
        Lens::Delegate(_) => "delegate",
        Lens::SlotRef(_) => "slot ref",
        Lens::Instrument(_) => "instrument",
        Lens::Pending(_) => "pending",
        Lens::Scope(_) => "scope",
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// The frame kueries evaluate against: the context frame when bound,
/// else the focus itself when it is a resource.
fn eval_frame(cx: &ResolveCx, focus: &Focus) -> Result<Focus, LensError> {
    if let Some(frame) = cx.frame() {
        return Ok(frame);
    }
    if focus.as_resource().is_some() {
        return Ok(focus.clone());
    }
    Err(LensError::Fault(
        Fault::new("kuery lens resolved with no frame in scope").with_role("unframed"),
    ))
}

/// Build a pending resolution: render the waiting slot as the
/// placeholder now, wake on `wake`.
fn pending_resolution(
    cx: &ResolveCx,
    pending_focus: Focus,
    wake: Deferred<Lens>,
    pending_slot: Slot,
    depth: u32,
) -> Result<Resolution, LensError> {
    let placeholder = match resolve_role_at(pending_slot, &pending_focus, cx, depth + 1)? {
        Resolution::Node(node) => node,
        Resolution::Pending(nested) => nested.placeholder,
        Resolution::Unhandled => Node::Empty,
    };
    Ok(Resolution::Pending(PendingRender {
        placeholder,
        wake,
        rejected: cx.slots().rejected,
    }))
}

/// Final display conversion of a focus to output.
pub(crate) fn display_focus(focus: &Focus) -> Node {
    match focus {
        Focus::None => Node::Empty,
        Focus::Bool(value) => Node::text(if *value { "true" } else { "false" }),
        Focus::Int(value) => Node::text(value.to_string()),
        Focus::Num(value) => Node::text(value.to_string()),
        Focus::Text(text) => Node::Text(Rc::clone(text)),
        Focus::Resource(id) => Node::text(id.to_string()),
        Focus::List(items) => {
            Node::fragment(items.iter().map(display_focus).collect::<Vec<_>>())
        }
    }
}

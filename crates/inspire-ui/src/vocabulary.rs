#![forbid(unsafe_code)]

//! The standard slot vocabulary.
//!
//! Every engine starts from this registry: the scope behavior gates
//! (`if`, `disabled`), the guard slots (`unframed`, `depth_exceeded`),
//! the content ladder (`instance`, `undefined`, `lens`, `children`,
//! `null`, `resource`, `loaded`), and the waiting and failure panels the
//! pipeline substitutes when resolution suspends or faults. All of them
//! are ordinary slots: any can be reassigned per component or through
//! context, and the panels below are only defaults.
//!
//! # Invariants
//!
//! 1. The main sequence ends in `loaded`, whose default is the display
//!    conversion; a scoped component with any focus always resolves to
//!    *something*.
//! 2. Waiting panels render under the `inspire:pending` element tag,
//!    failure panels under `inspire:failure`, and the generic error
//!    panel under `inspire:error`; each carries a `kind` prop naming the
//!    slot that produced it.
//! 3. The deprecated names `loading` and `failed` stay resolvable as
//!    aliases of `pending` and `rejected`.

use inspire_core::{ElementNode, Focus};

use crate::error::LensError;
use crate::lens::{Lens, LensFn};
use crate::resolve::display_focus;
use crate::slots::{EnableFn, Slot, SlotDef, SlotRegistry, SlotTags};
use crate::valens::{ATTR_DISABLED, ATTR_IF};

/// Property names consulted, in order, when a resource renders itself.
pub const LENS_PROPERTY_NAMES: &[&str] = &["lens", "default_lens"];

/// Element tag of the waiting panels.
pub const PENDING_TAG: &str = "inspire:pending";
/// Element tag of the failure panels.
pub const FAILURE_TAG: &str = "inspire:failure";
/// Element tag of the generic error panel.
pub const ERROR_TAG: &str = "inspire:error";

// ---------------------------------------------------------------------------
// Core slot handles
// ---------------------------------------------------------------------------

/// Resolved ids of the slots the pipeline dispatches to by name.
///
/// Looked up once per engine so the hot paths never touch the name map.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoreSlots {
    pub(crate) delegate: Slot,
    pub(crate) if_: Slot,
    pub(crate) disabled: Slot,
    pub(crate) unframed: Slot,
    pub(crate) depth_exceeded: Slot,
    pub(crate) instance: Slot,
    pub(crate) undefined: Slot,
    pub(crate) lens: Slot,
    pub(crate) children: Slot,
    pub(crate) null: Slot,
    pub(crate) resource: Slot,
    pub(crate) loaded: Slot,
    pub(crate) pending: Slot,
    pub(crate) rejected: Slot,
    pub(crate) activating: Slot,
    pub(crate) inactive: Slot,
    pub(crate) unavailable: Slot,
    pub(crate) destroyed: Slot,
    pub(crate) pending_connections: Slot,
    pub(crate) media_pending: Slot,
    pub(crate) cycle_detected: Slot,
    pub(crate) invalid_element: Slot,
    pub(crate) internal_error: Slot,
}

impl CoreSlots {
    /// Resolve every dispatch slot in `registry`.
    ///
    /// Custom registries must keep all of these registered; a missing
    /// name is reported rather than deferred to first dispatch.
    pub(crate) fn from_registry(registry: &SlotRegistry) -> Result<Self, LensError> {
        let find = |name: &str| {
            registry
                .find(name)
                .ok_or_else(|| LensError::UnknownSlot(name.to_owned()))
        };
        Ok(Self {
            delegate: find("delegate")?,
            if_: find("if")?,
            disabled: find("disabled")?,
            unframed: find("unframed")?,
            depth_exceeded: find("depth_exceeded")?,
            instance: find("instance")?,
            undefined: find("undefined")?,
            lens: find("lens")?,
            children: find("children")?,
            null: find("null")?,
            resource: find("resource")?,
            loaded: find("loaded")?,
            pending: find("pending")?,
            rejected: find("rejected")?,
            activating: find("activating")?,
            inactive: find("inactive")?,
            unavailable: find("unavailable")?,
            destroyed: find("destroyed")?,
            pending_connections: find("pending_connections")?,
            media_pending: find("media_pending")?,
            cycle_detected: find("cycle_detected")?,
            invalid_element: find("invalid_element")?,
            internal_error: find("internal_error")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Default panels
// ---------------------------------------------------------------------------

/// Waiting panel: `<inspire:pending kind=.. focus=..>`.
fn waiting_panel(kind: &'static str) -> Lens {
    Lens::Call(LensFn::new(kind, move |focus, _cx| {
        let mut el = ElementNode::new(PENDING_TAG);
        el.set_prop("kind", Focus::text(kind));
        if !focus.is_none() {
            el.set_prop("focus", Focus::text(focus.to_string()));
        }
        Ok(Lens::Node(el.into_node()))
    }))
}

/// Failure panel. Shows the component's sticky fault when one is set,
/// with full diagnostics only while error detail is toggled visible.
fn fault_panel(tag: &'static str, kind: &'static str) -> Lens {
    Lens::Call(LensFn::new(kind, move |focus, cx| {
        let mut el = ElementNode::new(tag);
        el.set_prop("kind", Focus::text(kind));
        match cx.sticky_fault() {
            Some(fault) => {
                el.set_prop("message", Focus::text(fault.message()));
                if cx.error_detail_visible() {
                    el.set_prop("detail", Focus::text(fault.describe()));
                }
            }
            None => {
                if !focus.is_none() {
                    el.set_prop("focus", Focus::text(focus.to_string()));
                }
            }
        }
        Ok(Lens::Node(el.into_node()))
    }))
}

// ---------------------------------------------------------------------------
// The standard registry
// ---------------------------------------------------------------------------

/// Build the standard vocabulary.
///
/// # Panics
///
/// Panics if the built-in definitions collide, which would be a
/// programming error in this module; the names below are distinct
/// literals.
#[must_use]
pub fn standard_registry() -> SlotRegistry {
    match build_standard() {
        Ok(registry) => registry,
        Err(err) => panic!("standard vocabulary failed to build: {err}"),
    }
}

fn build_standard() -> Result<SlotRegistry, LensError> {
    let mut registry = SlotRegistry::new();

    // Scope behaviors and guards, in main-sequence order.
    let delegate = registry.register(SlotDef::new("delegate").tags(SlotTags::LENS))?;
    let if_ = registry.register(
        SlotDef::new("if")
            .tags(SlotTags::INTERNAL)
            .enabled_when(EnableFn::new("if_attr_falsy", |_, cx| {
                cx.attr_value(ATTR_IF).is_some_and(|v| !v.is_truthy())
            }))
            .default_lens(Lens::text("")),
    )?;
    let disabled = registry.register(
        SlotDef::new("disabled")
            .tags(SlotTags::INTERNAL)
            .enabled_when(EnableFn::new("disabled_attr_truthy", |_, cx| {
                cx.attr_value(ATTR_DISABLED).is_some_and(|v| v.is_truthy())
            }))
            .default_lens(Lens::text("")),
    )?;
    let unframed = registry.register(
        SlotDef::new("unframed")
            .tags(SlotTags::INTERNAL | SlotTags::FAILURE)
            .enabled_when(EnableFn::new("spec_unframed", |_, cx| {
                cx.frame().is_none() && cx.spec_needs_frame()
            }))
            .default_lens(fault_panel(FAILURE_TAG, "unframed")),
    )?;
    let depth_exceeded = registry.register(
        SlotDef::new("depth_exceeded")
            .tags(SlotTags::INTERNAL | SlotTags::FAILURE)
            .enabled_when(EnableFn::new("past_depth_limit", |_, cx| {
                cx.policy().depth_exceeded(cx.depth())
            }))
            .default_lens(fault_panel(FAILURE_TAG, "depth_exceeded")),
    )?;

    // The content ladder.
    let instance = registry.register(SlotDef::new("instance").tags(SlotTags::LENS))?;
    let undefined = registry.register(
        SlotDef::new("undefined")
            .tags(SlotTags::INTERNAL)
            .enabled_when(EnableFn::new("focus_undefined", |focus, _| {
                focus.is_none()
            })),
    )?;
    let lens = registry.register(SlotDef::new("lens").tags(SlotTags::LENS | SlotTags::PRIMARY))?;
    let children = registry.register(
        SlotDef::new("children")
            .tags(SlotTags::LENS)
            .enabled_when(EnableFn::new("has_children", |_, cx| cx.has_children()))
            .default_lens(Lens::Call(LensFn::new("children", |_, cx| {
                Ok(cx.children_lens())
            }))),
    )?;
    let null = registry.register(
        SlotDef::new("null")
            .tags(SlotTags::INTERNAL)
            .enabled_when(EnableFn::new("focus_null", |focus, _| focus.is_none()))
            .default_lens(Lens::text("")),
    )?;
    let resource = registry.register(
        SlotDef::new("resource")
            .tags(SlotTags::LENS)
            .enabled_when(EnableFn::new("focus_is_resource", |focus, _| {
                focus.as_resource().is_some()
            }))
            .default_lens(Lens::Call(LensFn::new("focus_resource", |focus, _| {
                Ok(match focus.as_resource() {
                    Some(id) => Lens::Resource(id.clone()),
                    None => Lens::Empty,
                })
            }))),
    )?;
    let loaded = registry.register(
        SlotDef::new("loaded")
            .tags(SlotTags::LENS)
            .default_lens(Lens::Call(LensFn::new("display_focus", |focus, _| {
                Ok(Lens::Node(display_focus(focus)))
            }))),
    )?;

    // Waiting panels.
    let pending = registry.register(
        SlotDef::new("pending")
            .tags(SlotTags::LOADING)
            .default_lens(waiting_panel("pending")),
    )?;
    registry.register(
        SlotDef::new("activating")
            .tags(SlotTags::LOADING)
            .default_lens(waiting_panel("activating")),
    )?;
    registry.register(
        SlotDef::new("media_pending")
            .tags(SlotTags::LOADING)
            .default_lens(waiting_panel("media_pending")),
    )?;
    registry.register(
        SlotDef::new("pending_connections")
            .tags(SlotTags::LOADING)
            .default_lens(waiting_panel("pending_connections")),
    )?;

    // Failure panels.
    let rejected = registry.register(
        SlotDef::new("rejected")
            .tags(SlotTags::FAILURE)
            .default_lens(fault_panel(FAILURE_TAG, "rejected")),
    )?;
    registry.register(
        SlotDef::new("inactive")
            .tags(SlotTags::FAILURE)
            .default_lens(fault_panel(FAILURE_TAG, "inactive")),
    )?;
    registry.register(
        SlotDef::new("unavailable")
            .tags(SlotTags::FAILURE)
            .default_lens(fault_panel(FAILURE_TAG, "unavailable")),
    )?;
    registry.register(
        SlotDef::new("destroyed")
            .tags(SlotTags::FAILURE)
            .default_lens(fault_panel(FAILURE_TAG, "destroyed")),
    )?;
    registry.register(
        SlotDef::new("cycle_detected")
            .tags(SlotTags::FAILURE)
            .default_lens(fault_panel(FAILURE_TAG, "cycle_detected")),
    )?;
    registry.register(
        SlotDef::new("invalid_element")
            .tags(SlotTags::FAILURE)
            .default_lens(fault_panel(FAILURE_TAG, "invalid_element")),
    )?;
    registry.register(
        SlotDef::new("internal_error")
            .tags(SlotTags::FAILURE | SlotTags::ERROR)
            .default_lens(fault_panel(ERROR_TAG, "internal_error")),
    )?;

    registry.alias("loading", pending)?;
    registry.alias("failed", rejected)?;

    registry.set_main_sequence(vec![
        delegate,
        if_,
        disabled,
        unframed,
        depth_exceeded,
        instance,
        undefined,
        lens,
        children,
        null,
        resource,
        loaded,
    ]);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_slots_resolve_in_standard_registry() {
        let registry = standard_registry();
        let core = CoreSlots::from_registry(&registry).unwrap();
        assert_eq!(registry.name(core.lens), "lens");
        assert_eq!(registry.name(core.internal_error), "internal_error");
        assert_eq!(registry.name(core.if_), "if");
    }

    #[test]
    fn core_slots_report_missing_names() {
        let mut registry = SlotRegistry::new();
        registry.register(SlotDef::new("lens")).unwrap();
        let err = CoreSlots::from_registry(&registry).unwrap_err();
        assert!(matches!(err, LensError::UnknownSlot(_)));
    }

    #[test]
    fn main_sequence_runs_from_delegate_to_loaded() {
        let registry = standard_registry();
        let names: Vec<&str> = registry
            .main_sequence()
            .iter()
            .map(|s| registry.name(*s))
            .collect();
        assert_eq!(names.first(), Some(&"delegate"));
        assert_eq!(names.last(), Some(&"loaded"));
        let lens_at = names.iter().position(|n| *n == "lens").unwrap();
        let children_at = names.iter().position(|n| *n == "children").unwrap();
        let null_at = names.iter().position(|n| *n == "null").unwrap();
        assert!(lens_at < children_at && children_at < null_at);
    }

    #[test]
    fn deprecated_names_alias_canonical_slots() {
        let registry = standard_registry();
        assert_eq!(registry.find("loading"), registry.find("pending"));
        assert_eq!(registry.find("failed"), registry.find("rejected"));
    }

    #[test]
    fn lens_is_the_primary_slot() {
        let registry = standard_registry();
        let primary: Vec<Slot> = registry.tagged(SlotTags::PRIMARY).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(registry.name(primary[0]), "lens");
    }

    #[test]
    fn loading_family_is_tagged() {
        let registry = standard_registry();
        assert_eq!(registry.tagged(SlotTags::LOADING).count(), 4);
        assert!(registry.tagged(SlotTags::FAILURE).count() >= 7);
    }

    #[test]
    fn terminal_gates_default_to_empty_text() {
        let registry = standard_registry();
        for name in ["if", "disabled", "null"] {
            let slot = registry.find(name).unwrap();
            match registry.def(slot).default() {
                Some(Lens::Text(text)) => assert!(text.is_empty(), "{name}"),
                other => panic!("{name} should default to empty text, got {other:?}"),
            }
        }
    }
}

#![forbid(unsafe_code)]

//! The lens algebra.
//!
//! A [`Lens`] is a recipe for turning a focus into renderable output.
//! Literal variants carry their output directly; structural variants
//! (sequence, delegate, instrument) compose other lenses; the remaining
//! variants defer to the store, the slot system, or a scoped component.
//! Resolution itself lives in [`crate::resolve`]; this module only
//! defines the data.
//!
//! [`Valoscope`] is the declarative spec behind [`Lens::Scope`]: the
//! attributes, slot overrides, context writes, and children that a
//! mounted component binds against its focus.

use std::fmt;
use std::rc::Rc;

use inspire_core::{Fault, Focus, Key, Node, ResourceId};
use inspire_store::Kuery;

use crate::resolve::ResolveCx;
use crate::slots::Slot;
use crate::spread::SpreadSpec;
use crate::valens::{AttrSource, AttrSpec};

// ---------------------------------------------------------------------------
// Lens
// ---------------------------------------------------------------------------

/// A recipe for rendering a focus.
#[derive(Debug, Clone, Default)]
pub enum Lens {
    /// Render nothing. Continues delegate and sequence walks.
    #[default]
    Empty,
    /// A literal element tree, rendered as-is.
    Node(Node),
    /// Literal text.
    Text(Rc<str>),
    /// Literal integer, rendered as its decimal text.
    Int(i64),
    /// A focus value rendered through the display conversion.
    Focus(Focus),
    /// A named native function producing the next lens.
    Call(LensFn),
    /// A kuery evaluated against the current frame; the result is
    /// re-resolved as a lens.
    Kuery(Kuery),
    /// A resource rendered through the staged activation chain.
    Resource(ResourceId),
    /// A resource's media content, interpreted by the store.
    Media(ResourceId),
    /// Lenses rendered one after another into a fragment.
    Sequence(Rc<[Lens]>),
    /// Alternatives tried in order; first handled, non-empty result wins.
    Delegate(Rc<[Lens]>),
    /// Indirection through a slot, resolved with full assignment priority.
    SlotRef(Slot),
    /// A value pipeline: each step's output is the next step's focus, the
    /// last step renders.
    Instrument(Rc<[Lens]>),
    /// A lens that is still being produced. Settled deferreds resolve
    /// synchronously; pending ones render the pending role and re-render
    /// on settlement.
    Pending(inspire_core::Deferred<Lens>),
    /// A scoped component with its own context layer and lifecycle.
    Scope(Rc<Valoscope>),
}

impl Lens {
    /// Sequence lens from parts.
    pub fn sequence(items: impl IntoIterator<Item = Lens>) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    /// Delegate lens from ordered alternatives.
    pub fn delegate(items: impl IntoIterator<Item = Lens>) -> Self {
        Self::Delegate(items.into_iter().collect())
    }

    /// Instrument pipeline from ordered steps.
    pub fn instrument(steps: impl IntoIterator<Item = Lens>) -> Self {
        Self::Instrument(steps.into_iter().collect())
    }

    /// Text lens.
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::Text(text.into())
    }

    /// Lens for a focus value produced outside the lens algebra, e.g. a
    /// kuery result. Resources go through the resource chain, lists
    /// become sequences, scalars render via the display conversion.
    #[must_use]
    pub fn from_focus(focus: Focus) -> Self {
        match focus {
            Focus::None => Self::Empty,
            Focus::Resource(id) => Self::Resource(id),
            Focus::List(items) => Self::Sequence(
                items
                    .iter()
                    .map(|item| Self::from_focus(item.clone()))
                    .collect(),
            ),
            other => Self::Focus(other),
        }
    }

    /// Whether this lens is the empty lens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Node> for Lens {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<&str> for Lens {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}

impl From<i64> for Lens {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Kuery> for Lens {
    fn from(kuery: Kuery) -> Self {
        Self::Kuery(kuery)
    }
}

impl From<Valoscope> for Lens {
    fn from(scope: Valoscope) -> Self {
        Self::Scope(Rc::new(scope))
    }
}

// ---------------------------------------------------------------------------
// LensFn
// ---------------------------------------------------------------------------

/// A named native lens function.
///
/// The function receives the current focus and resolution context and
/// returns the lens to resolve next. The name identifies the function in
/// traces and fault notes; behavior must not depend on it.
#[derive(Clone)]
pub struct LensFn {
    name: &'static str,
    f: Rc<dyn Fn(&Focus, &ResolveCx) -> Result<Lens, Fault>>,
}

impl LensFn {
    /// Wrap a function under a diagnostic name.
    pub fn new(
        name: &'static str,
        f: impl Fn(&Focus, &ResolveCx) -> Result<Lens, Fault> + 'static,
    ) -> Self {
        Self { name, f: Rc::new(f) }
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(&self, focus: &Focus, cx: &ResolveCx) -> Result<Lens, Fault> {
        (self.f)(focus, cx)
    }
}

impl fmt::Debug for LensFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Valoscope
// ---------------------------------------------------------------------------

/// Declarative spec for a scoped component.
///
/// Everything here is inert data; binding it to a focus happens at mount.
/// The same `Rc<Valoscope>` may back many mounted components (one per
/// spread entry, for instance), which is also what the recursion cycle
/// scan uses as the component's type identity.
#[derive(Debug, Default)]
pub struct Valoscope {
    pub(crate) attrs: Vec<AttrSpec>,
    pub(crate) slot_overrides: Vec<(Rc<str>, Option<Lens>)>,
    pub(crate) context_values: Vec<(Rc<str>, AttrSource)>,
    pub(crate) context_slots: Vec<(Rc<str>, Lens)>,
    pub(crate) children: Vec<Lens>,
    pub(crate) spread: Option<SpreadSpec>,
    pub(crate) key: Option<Key>,
}

impl Valoscope {
    /// Empty spec. Renders nothing until roles or children are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the component's focus to an attribute source.
    #[must_use]
    pub fn focus(self, source: impl Into<AttrSource>) -> Self {
        self.attr("focus", source)
    }

    /// Record a named attribute. The engine's recorder table decides
    /// where it lands: engine attributes stay internal, `context.`
    /// prefixed names write context, slot names override slots, and
    /// everything else forwards as an element prop.
    #[must_use]
    pub fn attr(mut self, name: impl Into<Rc<str>>, source: impl Into<AttrSource>) -> Self {
        self.attrs.push(AttrSpec::new(name, source));
        self
    }

    /// Override a slot with an explicit lens for this component.
    #[must_use]
    pub fn slot(mut self, name: impl Into<Rc<str>>, lens: impl Into<Lens>) -> Self {
        self.slot_overrides.push((name.into(), Some(lens.into())));
        self
    }

    /// Declare a slot assignee with no lens. Resolves as an error; used
    /// to catch misspelled or dropped assignments loudly instead of
    /// silently falling through to defaults.
    #[must_use]
    pub fn slot_undefined(mut self, name: impl Into<Rc<str>>) -> Self {
        self.slot_overrides.push((name.into(), None));
        self
    }

    /// Write a named value into this component's context layer, visible
    /// to descendants.
    #[must_use]
    pub fn context(mut self, name: impl Into<Rc<str>>, source: impl Into<AttrSource>) -> Self {
        self.context_values.push((name.into(), source.into()));
        self
    }

    /// Bind a slot through this component's context layer. Descendants
    /// resolve it after their own overrides but before registry defaults.
    #[must_use]
    pub fn context_slot(mut self, name: impl Into<Rc<str>>, lens: impl Into<Lens>) -> Self {
        self.context_slots.push((name.into(), lens.into()));
        self
    }

    /// Append a child lens, rendered by the children role.
    #[must_use]
    pub fn child(mut self, lens: impl Into<Lens>) -> Self {
        self.children.push(lens.into());
        self
    }

    /// Project this scope over a sequence focus: one child component per
    /// surviving entry.
    #[must_use]
    pub fn spread(mut self, spec: SpreadSpec) -> Self {
        self.spread = Some(spec);
        self
    }

    /// Explicit reconciliation key for this component.
    #[must_use]
    pub fn keyed(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    /// Finish the spec as a mountable lens.
    #[must_use]
    pub fn into_lens(self) -> Lens {
        Lens::Scope(Rc::new(self))
    }

    /// Whether the spec declares any children.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether any attribute binds through a kuery and therefore needs a
    /// frame to evaluate against.
    #[must_use]
    pub fn needs_frame(&self) -> bool {
        self.attrs.iter().any(|attr| attr.source().needs_frame())
            || self
                .context_values
                .iter()
                .any(|(_, source)| source.needs_frame())
            || self.spread.as_ref().is_some_and(SpreadSpec::needs_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspire_core::ElementNode;

    #[test]
    fn from_focus_maps_structure() {
        assert!(Lens::from_focus(Focus::None).is_empty());
        assert!(matches!(
            Lens::from_focus(Focus::resource("r")),
            Lens::Resource(id) if id.as_str() == "r"
        ));
        match Lens::from_focus(Focus::list([Focus::from(1), Focus::from("x")])) {
            Lens::Sequence(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], Lens::Focus(Focus::Int(1))));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
        assert!(matches!(
            Lens::from_focus(Focus::from(true)),
            Lens::Focus(Focus::Bool(true))
        ));
    }

    #[test]
    fn lens_fn_debug_names_the_function() {
        let lens_fn = LensFn::new("show_title", |_, _| Ok(Lens::text("title")));
        let debug = format!("{lens_fn:?}");
        assert!(debug.contains("show_title"));
    }

    #[test]
    fn valoscope_builder_accumulates() {
        let scope = Valoscope::new()
            .focus(Focus::from(1))
            .attr("title", Focus::from("t"))
            .slot("lens", Lens::text("body"))
            .slot_undefined("broken")
            .context("theme", Focus::from("dark"))
            .child(Lens::text("child"));
        assert_eq!(scope.attrs.len(), 2);
        assert_eq!(scope.slot_overrides.len(), 2);
        assert!(scope.slot_overrides[1].1.is_none());
        assert_eq!(scope.context_values.len(), 1);
        assert!(scope.has_children());
    }

    #[test]
    fn node_converts_into_lens() {
        let node = ElementNode::new("div").into_node();
        assert!(matches!(Lens::from(node), Lens::Node(Node::Element(_))));
    }
}

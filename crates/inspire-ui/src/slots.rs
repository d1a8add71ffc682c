#![forbid(unsafe_code)]

//! Slot identity, tags, and the slot registry.
//!
//! A slot is a named role a component can fill: its main content, its
//! pending placeholder, one of the failure panels. Slots are interned in
//! a [`SlotRegistry`] built once per engine; resolution then works with
//! copyable [`Slot`] ids instead of strings. Deprecated names resolve
//! through aliases so old trees keep rendering while warning.
//!
//! # Invariants
//!
//! 1. A slot id is only meaningful against the registry that issued it.
//! 2. Registration rejects duplicate canonical names; aliases may not
//!    shadow a canonical name.
//! 3. Aliases resolve in one step. An alias always points at a canonical
//!    slot, never at another alias.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use bitflags::bitflags;
use inspire_core::Focus;
use tracing::warn;

use crate::error::LensError;
use crate::lens::Lens;
use crate::resolve::ResolveCx;

// ---------------------------------------------------------------------------
// Slot id and tags
// ---------------------------------------------------------------------------

/// Interned slot id. Copyable, cheap to compare, issued by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(pub(crate) u32);

impl Slot {
    /// Raw index into the issuing registry.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Orthogonal slot classification bits.
    ///
    /// Tags describe how a slot participates in resolution; they carry no
    /// behavior of their own. Failure and loading tags let tooling and
    /// tests select whole slot families without naming each member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlotTags: u16 {
        /// Assignable through component attributes.
        const ATTRIBUTE = 1 << 0;
        /// Inheritable through the UI context chain.
        const CONTEXT = 1 << 1;
        /// Carries a lens value when assigned.
        const LENS = 1 << 2;
        /// Engine-internal; user assignment is unusual but permitted.
        const INTERNAL = 1 << 3;
        /// A primary content role rather than a modifier.
        const PRIMARY = 1 << 4;
        /// Placeholder shown while something is in flight.
        const LOADING = 1 << 5;
        /// Shown when an operation failed.
        const FAILURE = 1 << 6;
        /// Specifically renders a captured fault.
        const ERROR = 1 << 7;
    }
}

// ---------------------------------------------------------------------------
// Enablement
// ---------------------------------------------------------------------------

/// Named enablement predicate.
///
/// The name shows up in traces and `Debug` output; the closure decides
/// whether the slot participates for the current focus and context.
#[derive(Clone)]
pub struct EnableFn {
    name: &'static str,
    predicate: Rc<dyn Fn(&Focus, &ResolveCx) -> bool>,
}

impl EnableFn {
    /// Wrap a predicate under a diagnostic name.
    pub fn new(
        name: &'static str,
        predicate: impl Fn(&Focus, &ResolveCx) -> bool + 'static,
    ) -> Self {
        Self {
            name,
            predicate: Rc::new(predicate),
        }
    }

    /// Diagnostic name of the predicate.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn check(&self, focus: &Focus, cx: &ResolveCx) -> bool {
        (self.predicate)(focus, cx)
    }
}

impl fmt::Debug for EnableFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnableFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// When a slot participates in a delegate or sequence walk.
#[derive(Debug, Clone, Default)]
pub enum Enablement {
    /// Always a candidate.
    #[default]
    Always,
    /// Candidate only when the predicate holds for the current focus.
    When(EnableFn),
}

impl Enablement {
    pub(crate) fn enabled(&self, focus: &Focus, cx: &ResolveCx) -> bool {
        match self {
            Self::Always => true,
            Self::When(f) => f.check(focus, cx),
        }
    }
}

// ---------------------------------------------------------------------------
// Slot definition
// ---------------------------------------------------------------------------

/// Everything the registry knows about one slot.
#[derive(Debug, Clone)]
pub struct SlotDef {
    name: Rc<str>,
    tags: SlotTags,
    enablement: Enablement,
    default: Option<Lens>,
}

impl SlotDef {
    /// Definition with the given canonical name and no tags, always
    /// enabled, no default lens.
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            tags: SlotTags::empty(),
            enablement: Enablement::Always,
            default: None,
        }
    }

    /// Add classification tags.
    #[must_use]
    pub fn tags(mut self, tags: SlotTags) -> Self {
        self.tags |= tags;
        self
    }

    /// Gate the slot behind an enablement predicate.
    #[must_use]
    pub fn enabled_when(mut self, predicate: EnableFn) -> Self {
        self.enablement = Enablement::When(predicate);
        self
    }

    /// Lens used when neither attributes nor context assign one.
    #[must_use]
    pub fn default_lens(mut self, lens: Lens) -> Self {
        self.default = Some(lens);
        self
    }

    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Classification tags.
    #[must_use]
    pub fn slot_tags(&self) -> SlotTags {
        self.tags
    }

    /// Enablement rule.
    #[must_use]
    pub fn enablement(&self) -> &Enablement {
        &self.enablement
    }

    /// Default lens, if any.
    #[must_use]
    pub fn default(&self) -> Option<&Lens> {
        self.default.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum NameEntry {
    Canonical(Slot),
    Alias(Slot),
}

/// Interning table for slot definitions, plus the engine's main slot
/// sequence for scoped components.
#[derive(Debug, Clone, Default)]
pub struct SlotRegistry {
    defs: Vec<SlotDef>,
    by_name: AHashMap<Rc<str>, NameEntry>,
    main_sequence: Vec<Slot>,
}

impl SlotRegistry {
    /// Empty registry. Most callers want the standard vocabulary from
    /// [`crate::vocabulary::standard_registry`] instead.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a slot definition under its canonical name.
    pub fn register(&mut self, def: SlotDef) -> Result<Slot, LensError> {
        if self.by_name.contains_key(def.name()) {
            return Err(LensError::DuplicateSlot(def.name().to_owned()));
        }
        let slot = Slot(u32::try_from(self.defs.len()).unwrap_or(u32::MAX));
        self.by_name
            .insert(Rc::clone(&def.name), NameEntry::Canonical(slot));
        self.defs.push(def);
        Ok(slot)
    }

    /// Register a deprecated alias for an existing slot.
    pub fn alias(
        &mut self,
        deprecated: impl Into<Rc<str>>,
        canonical: Slot,
    ) -> Result<(), LensError> {
        let deprecated = deprecated.into();
        if self.by_name.contains_key(&deprecated) {
            return Err(LensError::DuplicateSlot(deprecated.to_string()));
        }
        if canonical.index() >= self.defs.len() {
            return Err(LensError::UnknownSlot(format!(
                "alias '{deprecated}' targets unregistered slot"
            )));
        }
        self.by_name.insert(deprecated, NameEntry::Alias(canonical));
        Ok(())
    }

    /// Resolve a name to a slot id, following aliases.
    ///
    /// Resolving through an alias logs a deprecation warning naming both
    /// the deprecated and the canonical form.
    pub fn lookup(&self, name: &str) -> Result<Slot, LensError> {
        match self.by_name.get(name) {
            Some(NameEntry::Canonical(slot)) => Ok(*slot),
            Some(NameEntry::Alias(slot)) => {
                warn!(
                    deprecated = name,
                    canonical = self.name(*slot),
                    "deprecated slot name"
                );
                Ok(*slot)
            }
            None => Err(LensError::UnknownSlot(name.to_owned())),
        }
    }

    /// Like [`lookup`](Self::lookup) without the deprecation warning.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Slot> {
        match self.by_name.get(name)? {
            NameEntry::Canonical(slot) | NameEntry::Alias(slot) => Some(*slot),
        }
    }

    /// Definition for a slot id.
    ///
    /// # Panics
    ///
    /// Panics when `slot` came from a different registry and is out of
    /// range for this one.
    #[must_use]
    pub fn def(&self, slot: Slot) -> &SlotDef {
        &self.defs[slot.index()]
    }

    /// Canonical name for a slot id.
    #[must_use]
    pub fn name(&self, slot: Slot) -> &str {
        self.def(slot).name()
    }

    /// Number of registered slots, aliases excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether no slots are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Replace the main slot sequence walked for scoped components.
    pub fn set_main_sequence(&mut self, sequence: Vec<Slot>) {
        self.main_sequence = sequence;
    }

    /// Slots walked in order when a scoped component renders.
    #[must_use]
    pub fn main_sequence(&self) -> &[Slot] {
        &self.main_sequence
    }

    /// All slots whose tags contain `tags`.
    pub fn tagged(&self, tags: SlotTags) -> impl Iterator<Item = Slot> + '_ {
        self.defs
            .iter()
            .enumerate()
            .filter(move |(_, def)| def.slot_tags().contains(tags))
            .map(|(i, _)| Slot(i as u32))
    }
}

#![forbid(unsafe_code)]

//! Array projection: one spec, many child frames.
//!
//! A [`SpreadSpec`] turns a collection-valued attribute into repeated
//! child mounts. The projection pipeline runs in a fixed order: offset,
//! predicate filter, limit, stable sort, reverse. Identity comes first:
//! every admitted entry's frame key is derived *before* sorting, from
//! its pre-sort source position, so reordering changes display order
//! and never identity.
//!
//! # Invariants
//!
//! 1. Pipeline order is offset, filter, limit, sort, reverse; the limit
//!    cut records `end_offset`, the first source index the projection
//!    did not consume.
//! 2. Frame keys are stable across renders while the source entry and
//!    its position are unchanged; sort and reverse cannot move a key to
//!    a different entry.
//! 3. Projection is pure: it never touches the store and never mounts;
//!    the component pipeline consumes the result.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use inspire_core::{Focus, Key};

use crate::valens::AttrSource;

// ---------------------------------------------------------------------------
// Named callbacks
// ---------------------------------------------------------------------------

/// Entry predicate with a diagnostic name.
#[derive(Clone)]
pub struct SpreadFilter {
    name: &'static str,
    f: Rc<dyn Fn(&Focus) -> bool>,
}

impl SpreadFilter {
    pub fn new(name: &'static str, f: impl Fn(&Focus) -> bool + 'static) -> Self {
        Self { name, f: Rc::new(f) }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn admit(&self, focus: &Focus) -> bool {
        (self.f)(focus)
    }
}

impl fmt::Debug for SpreadFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpreadFilter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Entry comparator with a diagnostic name. Applied with a stable sort.
#[derive(Clone)]
pub struct SpreadSort {
    name: &'static str,
    f: Rc<dyn Fn(&Focus, &Focus) -> Ordering>,
}

impl SpreadSort {
    pub fn new(name: &'static str, f: impl Fn(&Focus, &Focus) -> Ordering + 'static) -> Self {
        Self { name, f: Rc::new(f) }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn compare(&self, left: &Focus, right: &Focus) -> Ordering {
        (self.f)(left, right)
    }
}

impl fmt::Debug for SpreadSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpreadSort")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Per-entry key derivation with a diagnostic name.
#[derive(Clone)]
pub struct KeyFn {
    name: &'static str,
    f: Rc<dyn Fn(&Focus, usize) -> Key>,
}

impl KeyFn {
    pub fn new(name: &'static str, f: impl Fn(&Focus, usize) -> Key + 'static) -> Self {
        Self { name, f: Rc::new(f) }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(&self, focus: &Focus, array_index: usize) -> Key {
        (self.f)(focus, array_index)
    }
}

impl fmt::Debug for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// How each projected entry gets its frame key.
#[derive(Debug, Clone, Default)]
pub enum FrameKeySpec {
    /// Resource identity, else source position, else the unfocused
    /// placeholder.
    #[default]
    Auto,
    /// One explicit name, disambiguated per source position; the entry
    /// key also becomes the key prefix of that entry's children.
    Shared(Rc<str>),
    /// Caller-derived key per entry; uniqueness across the spread is
    /// the callback's contract.
    PerEntry(KeyFn),
}

impl FrameKeySpec {
    pub(crate) fn key_for(&self, focus: &Focus, array_index: usize) -> Key {
        match self {
            Self::Auto => Key::derive(focus, array_index),
            Self::Shared(name) => Key::shared(name, array_index),
            Self::PerEntry(key_fn) => key_fn.call(focus, array_index),
        }
    }

    pub(crate) fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

// ---------------------------------------------------------------------------
// The spec
// ---------------------------------------------------------------------------

/// Declarative configuration of one array projection.
///
/// The array, offset, limit, and reverse inputs are attribute sources
/// bound like any other attribute, so a live source re-projects when it
/// changes. Even an empty projection binds them; side-effectful sources
/// run exactly once regardless of entry count.
#[derive(Debug, Clone)]
pub struct SpreadSpec {
    pub(crate) array: AttrSource,
    pub(crate) offset: Option<AttrSource>,
    pub(crate) limit: Option<AttrSource>,
    pub(crate) reverse: Option<AttrSource>,
    pub(crate) filter: Option<SpreadFilter>,
    pub(crate) sort: Option<SpreadSort>,
    pub(crate) frame_key: FrameKeySpec,
}

impl SpreadSpec {
    #[must_use]
    pub fn new(array: impl Into<AttrSource>) -> Self {
        Self {
            array: array.into(),
            offset: None,
            limit: None,
            reverse: None,
            filter: None,
            sort: None,
            frame_key: FrameKeySpec::Auto,
        }
    }

    /// Skip this many source entries before admitting any.
    #[must_use]
    pub fn offset(mut self, offset: impl Into<AttrSource>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Admit at most this many entries.
    #[must_use]
    pub fn limit(mut self, limit: impl Into<AttrSource>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Reverse display order after sorting when the source is truthy.
    #[must_use]
    pub fn reverse(mut self, reverse: impl Into<AttrSource>) -> Self {
        self.reverse = Some(reverse.into());
        self
    }

    /// Admit only entries the predicate accepts.
    #[must_use]
    pub fn filter(mut self, filter: SpreadFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Stable display ordering of admitted entries.
    #[must_use]
    pub fn sort(mut self, sort: SpreadSort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Override the default frame-key derivation.
    #[must_use]
    pub fn frame_key(mut self, frame_key: FrameKeySpec) -> Self {
        self.frame_key = frame_key;
        self
    }

    /// Whether any control source evaluates through a kuery.
    pub(crate) fn needs_frame(&self) -> bool {
        self.array.needs_frame()
            || self.offset.as_ref().is_some_and(AttrSource::needs_frame)
            || self.limit.as_ref().is_some_and(AttrSource::needs_frame)
            || self.reverse.as_ref().is_some_and(AttrSource::needs_frame)
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// One admitted entry, keyed and positioned.
#[derive(Debug, Clone)]
pub(crate) struct ProjectedEntry {
    pub(crate) focus: Focus,
    pub(crate) key: Key,
    /// Position in the source array, before sorting or reversing.
    pub(crate) array_index: usize,
}

/// Result of running the projection pipeline.
#[derive(Debug)]
pub(crate) struct Projection {
    pub(crate) entries: Vec<ProjectedEntry>,
    /// First source index the pipeline did not consume; pagination
    /// resumes here.
    pub(crate) end_offset: usize,
}

/// Run the pipeline over resolved attribute values.
pub(crate) fn project(
    spec: &SpreadSpec,
    source: &[Focus],
    offset: Option<&Focus>,
    limit: Option<&Focus>,
    reverse: Option<&Focus>,
) -> Projection {
    let skip = offset.and_then(focus_index).unwrap_or(0);
    let cap = limit.and_then(focus_index);
    let flip = reverse.is_some_and(Focus::is_truthy);

    let mut picked: Vec<(usize, Focus)> = Vec::new();
    let mut end_offset = source.len();
    for (index, focus) in source.iter().enumerate() {
        if index < skip {
            continue;
        }
        if cap.is_some_and(|cap| picked.len() >= cap) {
            end_offset = index;
            break;
        }
        if let Some(filter) = &spec.filter {
            if !filter.admit(focus) {
                continue;
            }
        }
        picked.push((index, focus.clone()));
    }

    // Keys before sort: identity is positional, display order is not.
    let mut entries: Vec<ProjectedEntry> = picked
        .into_iter()
        .map(|(array_index, focus)| ProjectedEntry {
            key: spec.frame_key.key_for(&focus, array_index),
            focus,
            array_index,
        })
        .collect();
    if let Some(sort) = &spec.sort {
        entries.sort_by(|a, b| sort.compare(&a.focus, &b.focus));
    }
    if flip {
        entries.reverse();
    }
    Projection { entries, end_offset }
}

/// A non-negative index from an attribute value; anything else reads as
/// absent.
fn focus_index(focus: &Focus) -> Option<usize> {
    match focus {
        Focus::Int(i) => usize::try_from(*i).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Focus> {
        values.iter().map(|v| Focus::Int(*v)).collect()
    }

    fn spread() -> SpreadSpec {
        SpreadSpec::new(Focus::None)
    }

    fn foci(projection: &Projection) -> Vec<Focus> {
        projection.entries.iter().map(|e| e.focus.clone()).collect()
    }

    #[test]
    fn pipeline_order_offset_filter_limit() {
        let spec = spread().filter(SpreadFilter::new("gt_one", |f| {
            matches!(f, Focus::Int(i) if *i > 1)
        }));
        let out = project(
            &spec,
            &ints(&[5, 3, 8, 1]),
            Some(&Focus::Int(1)),
            Some(&Focus::Int(2)),
            None,
        );
        assert_eq!(foci(&out), ints(&[3, 8]));
        assert_eq!(out.end_offset, 3);
    }

    #[test]
    fn unlimited_projection_consumes_the_whole_source() {
        let out = project(&spread(), &ints(&[1, 2, 3]), None, None, None);
        assert_eq!(foci(&out), ints(&[1, 2, 3]));
        assert_eq!(out.end_offset, 3);
    }

    #[test]
    fn sort_is_stable_and_keys_predate_it() {
        let spec = spread().sort(SpreadSort::new("descending", |a, b| match (a, b) {
            (Focus::Int(a), Focus::Int(b)) => b.cmp(a),
            _ => Ordering::Equal,
        }));
        let out = project(&spec, &ints(&[3, 8, 3]), None, None, None);
        assert_eq!(foci(&out), ints(&[8, 3, 3]));
        // 8 sat at source index 1; its key follows it through the sort.
        let eight = out
            .entries
            .iter()
            .find(|e| e.focus == Focus::Int(8))
            .unwrap();
        assert_eq!(eight.key, Key::positional(1));
        assert_eq!(eight.array_index, 1);
        // The two threes keep their relative order (stability).
        let threes: Vec<usize> = out
            .entries
            .iter()
            .filter(|e| e.focus == Focus::Int(3))
            .map(|e| e.array_index)
            .collect();
        assert_eq!(threes, vec![0, 2]);
    }

    #[test]
    fn changing_the_comparator_does_not_change_keys() {
        let source = ints(&[5, 3, 8, 1]);
        let unsorted = project(&spread(), &source, None, None, None);
        let sorted = project(
            &spread().sort(SpreadSort::new("ascending", |a, b| match (a, b) {
                (Focus::Int(a), Focus::Int(b)) => a.cmp(b),
                _ => Ordering::Equal,
            })),
            &source,
            None,
            None,
            None,
        );
        for entry in &sorted.entries {
            let twin = unsorted
                .entries
                .iter()
                .find(|e| e.array_index == entry.array_index)
                .unwrap();
            assert_eq!(entry.key, twin.key);
        }
    }

    #[test]
    fn reverse_flips_display_order_only() {
        let out = project(
            &spread(),
            &ints(&[1, 2, 3]),
            None,
            None,
            Some(&Focus::Bool(true)),
        );
        assert_eq!(foci(&out), ints(&[3, 2, 1]));
        assert_eq!(out.entries[0].key, Key::positional(2));
    }

    #[test]
    fn auto_keys_prefer_resource_identity() {
        let source = vec![Focus::resource("a"), Focus::Int(7), Focus::None];
        let out = project(&spread(), &source, None, None, None);
        assert_eq!(out.entries[0].key.as_str(), "@a");
        assert_eq!(out.entries[1].key, Key::positional(1));
        assert_eq!(out.entries[2].key, Key::placeholder());
    }

    #[test]
    fn shared_keys_qualify_by_position() {
        let spec = spread().frame_key(FrameKeySpec::Shared("row".into()));
        let out = project(&spec, &ints(&[10, 20]), None, None, None);
        assert_eq!(out.entries[0].key.as_str(), "row#0");
        assert_eq!(out.entries[1].key.as_str(), "row#1");
        assert!(spec.frame_key.is_shared());
    }

    #[test]
    fn per_entry_keys_use_the_callback() {
        let spec = spread().frame_key(FrameKeySpec::PerEntry(KeyFn::new("by_value", |f, _| {
            Key::new(format!("v{f}"))
        })));
        let out = project(&spec, &ints(&[4, 9]), None, None, None);
        assert_eq!(out.entries[0].key.as_str(), "v4");
        assert_eq!(out.entries[1].key.as_str(), "v9");
    }

    #[test]
    fn negative_or_non_integer_controls_read_as_absent() {
        let out = project(
            &spread(),
            &ints(&[1, 2]),
            Some(&Focus::Int(-3)),
            Some(&Focus::text("many")),
            None,
        );
        assert_eq!(foci(&out), ints(&[1, 2]));
    }

    #[test]
    fn zero_limit_admits_nothing() {
        let out = project(&spread(), &ints(&[1, 2, 3]), None, Some(&Focus::Int(0)), None);
        assert!(out.entries.is_empty());
        assert_eq!(out.end_offset, 0);
    }

    #[test]
    fn offset_past_the_end_is_empty() {
        let out = project(&spread(), &ints(&[1, 2]), Some(&Focus::Int(9)), None, None);
        assert!(out.entries.is_empty());
        assert_eq!(out.end_offset, 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn window_matches_the_slice_model(
                values in proptest::collection::vec(-50i64..50, 0..24),
                skip in 0i64..6,
                cap in proptest::option::of(0i64..6),
                flip: bool,
            ) {
                let source = ints(&values);
                let out = project(
                    &spread(),
                    &source,
                    Some(&Focus::Int(skip)),
                    cap.map(Focus::Int).as_ref(),
                    Some(&Focus::Bool(flip)),
                );

                let skip = usize::try_from(skip).unwrap();
                let cap = cap.map(|c| usize::try_from(c).unwrap());
                let mut expected: Vec<Focus> = values
                    .iter()
                    .skip(skip)
                    .take(cap.unwrap_or(usize::MAX))
                    .map(|v| Focus::Int(*v))
                    .collect();
                if flip {
                    expected.reverse();
                }
                prop_assert_eq!(foci(&out), expected);

                let expected_end =
                    cap.map_or(values.len(), |c| (skip + c).min(values.len()));
                prop_assert_eq!(out.end_offset, expected_end);
            }

            #[test]
            fn sorting_permutes_entries_without_rekeying(
                values in proptest::collection::vec(-9i64..9, 0..16),
            ) {
                let source = ints(&values);
                let plain = project(&spread(), &source, None, None, None);
                let sorted = project(
                    &spread().sort(SpreadSort::new("ascending", |a, b| match (a, b) {
                        (Focus::Int(a), Focus::Int(b)) => a.cmp(b),
                        _ => Ordering::Equal,
                    })),
                    &source,
                    None,
                    None,
                    None,
                );
                let identity = |p: &Projection| {
                    let mut pairs: Vec<(usize, String)> = p
                        .entries
                        .iter()
                        .map(|e| (e.array_index, e.key.as_str().to_owned()))
                        .collect();
                    pairs.sort();
                    pairs
                };
                prop_assert_eq!(identity(&plain), identity(&sorted));
            }
        }
    }
}

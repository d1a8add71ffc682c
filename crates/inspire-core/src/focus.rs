#![forbid(unsafe_code)]

//! Focus values: the opaque data a lens displays or operates on.
//!
//! A [`Focus`] is deliberately small: scalars, shared text, a resource
//! reference, or a shared list. Everything richer lives behind the
//! resource store and is reached by id.
//!
//! # Invariants
//!
//! 1. **Cheap clone**: every variant clones in O(1); text and lists are
//!    reference-counted slices.
//!
//! 2. **Two equalities**: [`PartialEq`] is structural (deep). The separate
//!    [`Focus::identity_eq`] is shallow reference/value identity and is what
//!    update suppression compares, so two structurally equal but distinct
//!    lists still count as a change.

use std::fmt;
use std::rc::Rc;

/// Identifier of a resource in the backing store.
///
/// Compares and hashes by its string form; clones share the allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Rc<str>);

impl ResourceId {
    #[must_use]
    pub fn new(id: impl Into<Rc<str>>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The value a component currently displays or operates on.
#[derive(Debug, Clone, Default)]
pub enum Focus {
    /// No focus; an unfocused component renders structure only.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Num(f64),
    Text(Rc<str>),
    /// Reference into the resource store; resolution may need activation.
    Resource(ResourceId),
    List(Rc<[Focus]>),
}

impl Focus {
    #[must_use]
    pub fn text(s: impl Into<Rc<str>>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn resource(id: impl Into<ResourceId>) -> Self {
        Self::Resource(id.into())
    }

    #[must_use]
    pub fn list(items: impl Into<Rc<[Focus]>>) -> Self {
        Self::List(items.into())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Truthiness as used by `if`-style predicates: `None`, `false`, `0`,
    /// `0.0`, `NaN`, and the empty text/list are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(t) => !t.is_empty(),
            Self::Resource(_) => true,
            Self::List(l) => !l.is_empty(),
        }
    }

    #[must_use]
    pub fn as_resource(&self) -> Option<&ResourceId> {
        match self {
            Self::Resource(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Focus]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Shallow identity comparison.
    ///
    /// Shared variants compare by pointer, resources by id, scalars by value
    /// (`Num` bitwise, so a cached NaN does not churn forever). This is the
    /// comparison update suppression uses; see the module invariants.
    #[must_use]
    pub fn identity_eq(&self, other: &Focus) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => Rc::ptr_eq(a, b),
            (Self::Resource(a), Self::Resource(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Focus {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Resource(a), Self::Resource(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(t) => f.write_str(t),
            Self::Resource(id) => write!(f, "{id}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Focus {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Focus {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Focus {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<&str> for Focus {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Focus {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<ResourceId> for Focus {
    fn from(id: ResourceId) -> Self {
        Self::Resource(id)
    }
}

impl From<Vec<Focus>> for Focus {
    fn from(items: Vec<Focus>) -> Self {
        Self::List(items.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_eq_compares_contents() {
        let a = Focus::list(vec![Focus::Int(1), Focus::text("x")]);
        let b = Focus::list(vec![Focus::Int(1), Focus::text("x")]);
        assert_eq!(a, b);
    }

    #[test]
    fn identity_eq_distinguishes_equal_lists() {
        let a = Focus::list(vec![Focus::Int(1)]);
        let b = Focus::list(vec![Focus::Int(1)]);
        assert_eq!(a, b);
        assert!(!a.identity_eq(&b));
        assert!(a.identity_eq(&a.clone()));
    }

    #[test]
    fn identity_eq_nan_is_stable() {
        let a = Focus::Num(f64::NAN);
        assert!(a.identity_eq(&a.clone()));
        assert_ne!(a, a.clone());
    }

    #[test]
    fn resource_compares_by_id() {
        let a = Focus::resource("r1");
        let b = Focus::resource("r1");
        assert_eq!(a, b);
        assert!(a.identity_eq(&b));
        assert_ne!(a, Focus::resource("r2"));
    }

    #[test]
    fn truthiness() {
        assert!(!Focus::None.is_truthy());
        assert!(!Focus::Bool(false).is_truthy());
        assert!(!Focus::Int(0).is_truthy());
        assert!(!Focus::Num(f64::NAN).is_truthy());
        assert!(!Focus::text("").is_truthy());
        assert!(!Focus::list(Vec::new()).is_truthy());
        assert!(Focus::Int(3).is_truthy());
        assert!(Focus::resource("r").is_truthy());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Focus::text("hi").to_string(), "hi");
        assert_eq!(Focus::resource("r1").to_string(), "@r1");
        assert_eq!(
            Focus::list(vec![Focus::Int(1), Focus::Int(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(Focus::None.to_string(), "");
    }
}

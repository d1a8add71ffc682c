#![forbid(unsafe_code)]

//! Stable identity keys for projected children.
//!
//! A [`Key`] names one entry of a projected sequence across renders. Keys are
//! derived *before* any reordering of the sequence, so sorting or reversing a
//! spread changes display order only, never identity.
//!
//! # Invariants
//!
//! 1. **Derivation is positional-or-identity**: [`Key::derive`] prefers the
//!    focus's resource identity, falls back to the source-array index, and
//!    uses a fixed placeholder for an unfocused entry.
//!
//! 2. **Prefix scoping**: two spreads sharing one explicit key stay distinct
//!    because each entry's children get a position-qualified prefix via
//!    [`Key::scoped`].

use std::fmt;
use std::rc::Rc;

use crate::focus::{Focus, ResourceId};

/// Placeholder identity for entries with no focus.
const UNFOCUSED: &str = "~unfocused";

/// Stable identity of one rendered entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    #[must_use]
    pub fn new(key: impl Into<Rc<str>>) -> Self {
        Self(key.into())
    }

    /// Key from a source-array position: `#3`.
    #[must_use]
    pub fn positional(index: usize) -> Self {
        Self(format!("#{index}").into())
    }

    /// Key from resource identity: `@id`.
    #[must_use]
    pub fn for_resource(id: &ResourceId) -> Self {
        Self(id.to_string().into())
    }

    /// Fixed key for an entry with no focus.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(UNFOCUSED.into())
    }

    /// A shared explicit key disambiguated by entry position: `name#3`.
    #[must_use]
    pub fn shared(name: &str, position: usize) -> Self {
        Self(format!("{name}#{position}").into())
    }

    /// Default derivation: resource identity, else position, else placeholder.
    #[must_use]
    pub fn derive(focus: &Focus, index: usize) -> Self {
        match focus {
            Focus::Resource(id) => Self::for_resource(id),
            Focus::None => Self::placeholder(),
            _ => Self::positional(index),
        }
    }

    /// Qualify this key under an enclosing prefix: `prefix/key`.
    #[must_use]
    pub fn scoped(&self, prefix: &str) -> Self {
        if prefix.is_empty() {
            self.clone()
        } else {
            Self(format!("{prefix}/{}", self.0).into())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

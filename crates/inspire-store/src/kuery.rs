#![forbid(unsafe_code)]

//! Declarative value expressions ("kueries").
//!
//! A [`Kuery`] is the small expression language attribute bindings use: take
//! the frame, step through properties, or yield a constant. It is evaluation
//! input for [`ResourceStore::evaluate`](crate::ResourceStore::evaluate) and
//! deliberately not a full query language.

use std::fmt;
use std::rc::Rc;

use inspire_core::Focus;

/// One expression evaluated against a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Kuery {
    /// The frame itself.
    Head,
    /// A property of the frame resource.
    Property(Rc<str>),
    /// Steps evaluated left to right, each against the previous result.
    Chain(Rc<[Kuery]>),
    /// A constant, ignoring the frame.
    Literal(Focus),
}

impl Kuery {
    #[must_use]
    pub fn property(name: impl Into<Rc<str>>) -> Self {
        Self::Property(name.into())
    }

    #[must_use]
    pub fn chain(steps: impl Into<Rc<[Kuery]>>) -> Self {
        Self::Chain(steps.into())
    }

    #[must_use]
    pub fn literal(value: impl Into<Focus>) -> Self {
        Self::Literal(value.into())
    }

    /// Whether evaluation can never touch the store.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Head | Self::Property(_) => false,
            Self::Chain(steps) => steps.iter().all(Kuery::is_constant),
        }
    }
}

impl fmt::Display for Kuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("@"),
            Self::Property(name) => write!(f, ".{name}"),
            Self::Chain(steps) => {
                for step in steps.iter() {
                    write!(f, "{step}")?;
                }
                Ok(())
            }
            Self::Literal(value) => write!(f, "'{value}'"),
        }
    }
}

#![forbid(unsafe_code)]

//! Diagnostic fault chain.
//!
//! A [`Fault`] wraps an error with the context that makes it debuggable:
//! labeled notes (binding key, kuery, focus, component state) and a causal
//! chain of earlier faults. Faults are what the render pipeline stores as a
//! component's sticky error and what failure lenses receive as focus, so
//! they clone cheaply and never borrow.
//!
//! A fault may name the failure role that should render it; the pipeline
//! falls back to its generic internal-error role when none is named.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::node::NodeFault;

/// A diagnostic error with notes and a causal chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    message: Rc<str>,
    notes: Vec<(Rc<str>, Rc<str>)>,
    role: Option<Rc<str>>,
    source: Option<Rc<Fault>>,
}

impl Fault {
    #[must_use]
    pub fn new(message: impl Into<Rc<str>>) -> Self {
        Self {
            message: message.into(),
            notes: Vec::new(),
            role: None,
            source: None,
        }
    }

    /// Wrap an existing fault under a broader message.
    #[must_use]
    pub fn wrap(message: impl Into<Rc<str>>, source: Fault) -> Self {
        let mut fault = Self::new(message);
        fault.source = Some(Rc::new(source));
        fault
    }

    /// Capture a foreign error, preserving its own source chain as nested
    /// faults.
    #[must_use]
    pub fn from_error(err: &dyn Error) -> Self {
        let mut fault = Self::new(err.to_string());
        if let Some(cause) = err.source() {
            fault.source = Some(Rc::new(Self::from_error(cause)));
        }
        fault
    }

    /// Attach a labeled diagnostic note.
    #[must_use]
    pub fn with_note(mut self, label: impl Into<Rc<str>>, value: impl fmt::Display) -> Self {
        self.notes.push((label.into(), value.to_string().into()));
        self
    }

    /// Name the failure role that should render this fault.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<Rc<str>>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn notes(&self) -> &[(Rc<str>, Rc<str>)] {
        &self.notes
    }

    /// The failure role named on this fault or, failing that, anywhere down
    /// its causal chain.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        match (&self.role, &self.source) {
            (Some(role), _) => Some(role),
            (None, Some(source)) => source.role(),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn source_fault(&self) -> Option<&Fault> {
        self.source.as_deref()
    }

    /// Multi-line developer diagnostics: message, notes, then each cause.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let mut current = Some(self);
        let mut first = true;
        while let Some(fault) = current {
            if !first {
                out.push_str("caused by: ");
            }
            out.push_str(&fault.message);
            out.push('\n');
            for (label, value) in &fault.notes {
                out.push_str("  ");
                out.push_str(label);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
            current = fault.source_fault();
            first = false;
        }
        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn Error + 'static))
    }
}

impl From<NodeFault> for Fault {
    fn from(fault: NodeFault) -> Self {
        Self::new(fault.to_string()).with_role("invalid_element")
    }
}

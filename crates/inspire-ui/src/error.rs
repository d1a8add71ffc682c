#![forbid(unsafe_code)]

//! Resolution error type.
//!
//! [`LensError`] is what slot and lens resolution returns on failure. The
//! render pipeline inspects it before converting it into a sticky
//! [`Fault`]: a missing-connection store error triggers the one-shot
//! reconnection retry, and the variants that carry a failure role decide
//! which failure lens renders the error.

use inspire_core::Fault;
use inspire_store::StoreError;

/// Why a lens or slot failed to resolve.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LensError {
    /// A slot assignee is present on the component but carries no lens.
    ///
    /// Distinct from an absent assignee, which silently falls through to
    /// the context and default tiers.
    #[error("slot '{slot}' is assigned but carries no lens")]
    UndefinedSlotAssignee {
        /// Name of the slot whose assignee was empty.
        slot: String,
    },

    /// A slot name did not resolve through the registry, aliases included.
    #[error("unknown slot '{0}'")]
    UnknownSlot(String),

    /// A slot or alias registration collided with an existing name.
    #[error("duplicate slot '{0}'")]
    DuplicateSlot(String),

    /// An instrument step produced output that cannot feed the next step.
    #[error("instrument step in slot '{slot}' is not focus-convertible: {detail}")]
    NotFocusConvertible {
        /// Slot whose instrument chain broke.
        slot: String,
        /// What the offending step produced.
        detail: String,
    },

    /// Lens recursion outran the configured depth budget mid-resolution.
    #[error("lens recursion depth {depth} exceeds maximum {maximum}")]
    DepthExceeded {
        /// Depth reached when the budget ran out.
        depth: u32,
        /// Configured maximum.
        maximum: u32,
    },

    /// The store refused an evaluation, activation, or subscription.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lens function or nested resolution failed with a full fault.
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl LensError {
    /// Missing resources when the error is a connection gap, else `None`.
    ///
    /// The first render pass uses this to drive the single reconnection
    /// attempt before giving up and rendering the pending-connections role.
    #[must_use]
    pub fn missing_connections(&self) -> Option<&[inspire_core::ResourceId]> {
        match self {
            Self::Store(StoreError::MissingConnection { resources }) => Some(resources),
            _ => None,
        }
    }
}

impl From<LensError> for Fault {
    fn from(err: LensError) -> Self {
        match err {
            LensError::Store(store) => store.into(),
            LensError::Fault(fault) => fault,
            LensError::DepthExceeded { depth, maximum } => Fault::new(format!(
                "lens recursion depth {depth} exceeds maximum {maximum}"
            ))
            .with_role("depth_exceeded"),
            LensError::UndefinedSlotAssignee { ref slot } => {
                Fault::new(err.to_string()).with_note("slot", slot.clone())
            }
            other => Fault::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspire_core::ResourceId;

    #[test]
    fn missing_connections_surfaces_resource_list() {
        let err = LensError::Store(StoreError::MissingConnection {
            resources: vec![ResourceId::from("a"), ResourceId::from("b")],
        });
        assert_eq!(err.missing_connections().map(<[_]>::len), Some(2));
        assert!(
            LensError::UnknownSlot("x".into())
                .missing_connections()
                .is_none()
        );
    }

    #[test]
    fn depth_exceeded_converts_to_depth_role_fault() {
        let fault: Fault = LensError::DepthExceeded {
            depth: 201,
            maximum: 200,
        }
        .into();
        assert_eq!(fault.role(), Some("depth_exceeded"));
    }

    #[test]
    fn fault_variant_converts_losslessly() {
        let fault = Fault::new("boom").with_role("rejected");
        let back: Fault = LensError::Fault(fault).into();
        assert_eq!(back.role(), Some("rejected"));
        assert_eq!(back.message(), "boom");
    }
}

#![forbid(unsafe_code)]

//! Resource lifecycle phases.
//!
//! A resource moves through activation phases on its way from a bare
//! reference to live data. The rendering side never inspects store
//! internals; it dispatches on the phase alone, so each phase maps onto a
//! failure or loading slot in the lens vocabulary.

/// Where a resource stands in its activation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePhase {
    /// Activation in flight; content not yet usable.
    Activating,
    /// Fully materialized and queryable.
    Active,
    /// Known but not activated; requires activation before use.
    Inactive,
    /// Activation failed or the backing chronicle cannot be reached.
    Unavailable,
    /// A placeholder identity with no materialized content.
    Immaterial,
    /// Permanently gone.
    Destroyed,
}

impl ResourcePhase {
    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    #[must_use]
    pub fn is_activating(self) -> bool {
        self == Self::Activating
    }

    #[must_use]
    pub fn is_inactive(self) -> bool {
        self == Self::Inactive
    }

    #[must_use]
    pub fn is_unavailable(self) -> bool {
        self == Self::Unavailable
    }

    #[must_use]
    pub fn is_immaterial(self) -> bool {
        self == Self::Immaterial
    }

    #[must_use]
    pub fn is_destroyed(self) -> bool {
        self == Self::Destroyed
    }

    /// Phases that can still become `Active` without outside repair.
    #[must_use]
    pub fn is_pending_activation(self) -> bool {
        matches!(self, Self::Activating | Self::Inactive)
    }
}

impl std::fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unavailable => "unavailable",
            Self::Immaterial => "immaterial",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

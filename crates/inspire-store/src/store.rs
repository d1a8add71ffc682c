#![forbid(unsafe_code)]

//! The abstract resource-store contract.
//!
//! The engine consumes resources through this trait alone; chronicle
//! connections, event logs, and query compilation stay behind it. Every
//! operation that can suspend models that with a [`Deferred`] rather than
//! blocking, keeping the whole engine single-threaded and cooperative.

use std::rc::Rc;

use inspire_core::{Deferred, Fault, Focus, ResourceId};

use crate::kuery::Kuery;
use crate::live::LiveBinding;
use crate::phase::ResourcePhase;

/// Outcome of requesting resource activation.
#[derive(Debug, Clone)]
pub enum Activation {
    /// Phase already known; no wait needed.
    Ready(ResourcePhase),
    /// Activation in flight; settles with the final phase.
    Pending(Deferred<ResourcePhase>),
}

/// Outcome of a one-shot kuery evaluation.
#[derive(Debug, Clone)]
pub enum Evaluation {
    Ready(Focus),
    /// Evaluation suspended on an upstream fetch.
    Loading(Deferred<Focus>),
}

/// Errors surfaced by store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("no such resource: {0}")]
    NoSuchResource(ResourceId),
    #[error("resource {0} is destroyed")]
    Destroyed(ResourceId),
    /// The retryable missing-chronicle condition: the listed resources have
    /// no live connection. Render pass 1 attempts reconnection once before
    /// treating this as a failure.
    #[error("missing connection to {} resource(s)", .resources.len())]
    MissingConnection { resources: Vec<ResourceId> },
    #[error("focus '{0}' is not a resource")]
    NotAResource(Focus),
    #[error("store cannot defer this operation")]
    PendingUnsupported,
    #[error("'{operation}' cannot evaluate against focus '{focus}'")]
    WrongFocus { operation: String, focus: Focus },
}

impl From<StoreError> for Fault {
    fn from(err: StoreError) -> Self {
        let fault = Fault::from_error(&err);
        match err {
            StoreError::Destroyed(_) => fault.with_role("destroyed"),
            StoreError::MissingConnection { .. } => fault.with_role("pending_connections"),
            _ => fault,
        }
    }
}

/// The resource graph as the engine sees it.
///
/// Implementations are single-threaded; the engine holds the store as
/// `Rc<dyn ResourceStore>` and never sends it across threads.
pub trait ResourceStore {
    /// Current lifecycle phase. Unknown resources are `Immaterial`.
    fn phase(&self, id: &ResourceId) -> ResourcePhase;

    /// Request activation, observing readiness.
    fn activate(&self, id: &ResourceId) -> Result<Activation, StoreError>;

    /// One-shot kuery evaluation against `frame`.
    fn evaluate(&self, frame: &Focus, kuery: &Kuery) -> Result<Evaluation, StoreError>;

    /// Subscribe to re-evaluations of `kuery` against `frame`.
    ///
    /// `on_change` fires at most once per upstream change, receiving the
    /// re-evaluated value. The returned handle detaches on drop.
    fn subscribe(
        &self,
        frame: &Focus,
        kuery: &Kuery,
        on_change: Rc<dyn Fn(&Focus)>,
    ) -> Result<LiveBinding, StoreError>;

    /// Ordered fallback property lookup; first present name wins.
    fn get_property(
        &self,
        id: &ResourceId,
        names: &[&str],
    ) -> Result<Option<Focus>, StoreError>;

    /// Interpret a media resource's content; may suspend on a fetch.
    fn interpret(&self, id: &ResourceId) -> Result<Evaluation, StoreError>;

    /// Try to establish connections for `resources`; `true` when all of
    /// them are connected afterwards. Stores with no connection concept
    /// keep the default.
    fn acquire_connections(&self, _resources: &[ResourceId]) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_connection_fault_names_its_role() {
        let err = StoreError::MissingConnection {
            resources: vec![ResourceId::new("r1"), ResourceId::new("r2")],
        };
        assert_eq!(err.to_string(), "missing connection to 2 resource(s)");
        let fault: Fault = err.into();
        assert_eq!(fault.role(), Some("pending_connections"));
    }

    #[test]
    fn destroyed_fault_names_its_role() {
        let fault: Fault = StoreError::Destroyed(ResourceId::new("gone")).into();
        assert_eq!(fault.role(), Some("destroyed"));
        assert!(fault.message().contains("@gone"));
    }

    #[test]
    fn plain_errors_leave_role_unset() {
        let fault: Fault = StoreError::NotAResource(Focus::Int(3)).into();
        assert_eq!(fault.role(), None);
    }
}

#![forbid(unsafe_code)]

//! Inspire public facade.
//!
//! One dependency pulling in the whole engine:
//! - the value model and output tree from `inspire-core`
//! - the resource-store contract and reference store from `inspire-store`
//! - lens resolution, live binding, and the engine from `inspire-ui`
//!
//! Embedders wiring a store and mounting views can start from
//! [`prelude`]; everything else stays reachable at the root.

pub use inspire_core::{
    Deferred, ElementNode, Fault, Focus, Key, Node, NodeFault, ResourceId, ScopeChain, validate,
};
pub use inspire_store::{
    Activation, Evaluation, Kuery, LiveBinding, MemoryStore, ResourcePhase, ResourceStore,
    StoreError,
};
#[cfg(feature = "policy-config")]
pub use inspire_ui::PolicyError;
pub use inspire_ui::{
    AttrSource, AttrSpec, CombineFn, EnableFn, Enablement, Engine, FrameKeySpec, KeyFn, Lens,
    LensError, LensFn, PendingRender, RenderPolicy, Resolution, ResolveCx, ScopeMarker,
    ScopeResource, Slot, SlotDef, SlotRegistry, SlotTags, SpreadFilter, SpreadSort, SpreadSpec,
    UiContext, Valoscope, View, standard_registry,
};

/// The working set for embedding the engine: build a store, construct
/// an [`Engine`], mount lenses, flush renders.
pub mod prelude {
    pub use inspire_core::{ElementNode, Fault, Focus, Key, Node, ResourceId};
    pub use inspire_store::{Kuery, MemoryStore, ResourcePhase, ResourceStore};
    pub use inspire_ui::{
        AttrSource, Engine, Lens, LensFn, RenderPolicy, SpreadSpec, Valoscope, View,
        standard_registry,
    };
}

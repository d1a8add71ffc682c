#![forbid(unsafe_code)]

//! Reactive UI rendering for valospace resources.
//!
//! This crate provides:
//! - [`Engine`] and [`View`] for mounting lens trees over a resource store
//! - [`Lens`] and [`Valoscope`] for describing what to render
//! - [`SlotRegistry`] with the standard vocabulary from [`vocabulary`]
//! - [`AttrSource`] live attribute binding with subscription lifecycles
//! - [`SpreadSpec`] array projection with stable per-entry keys
//! - [`RenderPolicy`] guard limits for depth and recursion scanning

mod component;

pub mod context;
pub mod engine;
pub mod error;
pub mod lens;
pub mod policy;
pub mod resolve;
pub mod slots;
pub mod spread;
pub mod valens;
pub mod vocabulary;

pub use context::{ScopeMarker, ScopeResource, UiContext};
pub use engine::{Engine, View};
pub use error::LensError;
pub use lens::{Lens, LensFn, Valoscope};
#[cfg(feature = "policy-config")]
pub use policy::PolicyError;
pub use policy::RenderPolicy;
pub use resolve::{PendingRender, Resolution, ResolveCx};
pub use slots::{EnableFn, Enablement, Slot, SlotDef, SlotRegistry, SlotTags};
pub use spread::{FrameKeySpec, KeyFn, SpreadFilter, SpreadSort, SpreadSpec};
pub use valens::{AttrSource, AttrSpec, CombineFn};
pub use vocabulary::standard_registry;

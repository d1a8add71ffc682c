#![forbid(unsafe_code)]

//! Resource-store contract for Inspire.
//!
//! This crate provides:
//! - [`ResourceStore`]: the abstract graph interface the engine consumes
//! - [`ResourcePhase`] activation phases with their predicates
//! - [`Kuery`] declarative value expressions
//! - [`LiveBinding`] RAII subscription handles
//! - [`MemoryStore`]: a complete in-memory reference implementation

pub mod kuery;
pub mod live;
pub mod memory;
pub mod phase;
pub mod store;

pub use kuery::Kuery;
pub use live::LiveBinding;
pub use memory::MemoryStore;
pub use phase::ResourcePhase;
pub use store::{Activation, Evaluation, ResourceStore, StoreError};

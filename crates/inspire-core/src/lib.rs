#![forbid(unsafe_code)]

//! Core value model for Inspire.
//!
//! This crate provides:
//! - [`Focus`] and [`ResourceId`] for the values lenses operate on
//! - [`Key`] for stable child identity across renders
//! - [`Node`] / [`ElementNode`] for the backend-agnostic output tree
//! - [`Deferred`] for single-threaded eventual values
//! - [`ScopeChain`] for parent-chained context maps
//! - [`Fault`] for diagnostic error chains

pub mod deferred;
pub mod fault;
pub mod focus;
pub mod key;
pub mod node;
pub mod scope;

pub use deferred::Deferred;
pub use fault::Fault;
pub use focus::{Focus, ResourceId};
pub use key::Key;
pub use node::{ElementNode, Node, NodeFault, validate};
pub use scope::ScopeChain;

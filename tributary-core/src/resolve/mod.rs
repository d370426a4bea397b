//! Resolution
//!
//! This module turns a graph, an override set and a cache into entity values.
//!
//! # Concepts
//!
//! ## Overrides
//!
//! An override replaces an entity's definition with a fixed value. An
//! overridden entity is a leaf: its declared dependencies are not visited,
//! and overrides upstream of it do not affect anything read through it.
//!
//! ## Inputs
//!
//! Derivation functions receive their dependencies' values through
//! [`Inputs`], by name or by position.
//!
//! ## Resolver
//!
//! The [`Resolver`] walks dependencies depth-first, consulting the cache
//! before running any derivation function. It keeps the chain of entities
//! currently being computed and reports re-entry as a cycle.
//!
//! # Side Effects
//!
//! Derivation functions run at most once per cache key until that key is
//! invalidated. Nothing else is promised about when or in which order they
//! run, so they should not depend on each other's side effects.

mod inputs;
mod overrides;
mod resolver;

pub use inputs::Inputs;
pub use overrides::{Override, Overrides};
pub use resolver::Resolver;

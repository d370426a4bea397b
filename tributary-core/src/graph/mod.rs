//! Entity Graph
//!
//! This module implements the static, declarative structure every flow is
//! built on: named entities and the dependencies between them.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are entities: literals or functions of other entities
//! - Edges point from an entity to the entities it depends on
//!
//! It is assembled by [`FlowBuilder`], validated once (unknown dependencies
//! and cycles are rejected), and then shared read-only by every flow in the
//! lineage.
//!
//! # Design Decisions
//!
//! 1. Entities live in an insertion-ordered map, and an entity's id is its
//!    position. Name lookups are O(1), id lookups are a slice index, and
//!    declaration order is available for deterministic tie-breaking.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are stored.
//!    Resolution walks forward edges; invalidation walks reverse ones.

mod builder;
mod entity;
mod topology;

pub use builder::FlowBuilder;
pub use entity::{DeriveFn, Definition, Entity, EntityId, EntityKind, OutputsFn};
pub use topology::{EntityGraph, TopologicalOrder};

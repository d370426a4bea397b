//! Flow Errors
//!
//! Every failure the engine can report, at build time or at resolution time.
//!
//! Build-time errors (`DuplicateEntity`, `UnknownDependency`, `Cycle`) are
//! raised by [`FlowBuilder`](crate::graph::FlowBuilder) and mean no flow was
//! produced. Resolution-time errors are raised by [`Flow::get`](crate::Flow::get)
//! and friends; they are never cached, so a later call retries.

use thiserror::Error;

/// Error type produced by user derivation functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, Error)]
pub enum FlowError {
    /// An entity with this name was already declared in the builder.
    #[error("entity {name:?} is already declared")]
    DuplicateEntity { name: String },

    /// A declared dependency names an entity that was never declared.
    #[error("entity {entity:?} depends on undeclared entity {dependency:?}")]
    UnknownDependency { entity: String, dependency: String },

    /// The dependency graph contains a cycle. The first name is repeated at
    /// the end so the path reads as a loop.
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    /// The requested entity is not declared in this flow.
    #[error("entity {name:?} is not declared in this flow")]
    UnresolvedEntity { name: String },

    /// A derivation function returned an error.
    #[error("failed to derive entity {entity:?}")]
    Derivation {
        entity: String,
        #[source]
        source: BoxError,
    },

    /// The entity was declared without a default and has not been set.
    #[error("entity {name:?} has no value; assign a default or set one")]
    MissingValue { name: String },

    /// A derivation asked for an input it did not declare.
    #[error("entity {entity:?} did not declare {dependency:?} as a dependency")]
    NotADependency { entity: String, dependency: String },

    /// A typed read found a value of a different type.
    #[error("entity {entity:?} holds a {actual}, not a {expected}")]
    TypeMismatch {
        entity: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A multi-output derivation returned the wrong number of values.
    #[error("entity {entity:?} returned {actual} outputs, expected {expected}")]
    OutputArity {
        entity: String,
        expected: usize,
        actual: usize,
    },
}

impl FlowError {
    /// The entity this error is about, if it concerns a single entity.
    pub fn entity(&self) -> Option<&str> {
        match self {
            FlowError::DuplicateEntity { name }
            | FlowError::UnresolvedEntity { name }
            | FlowError::MissingValue { name } => Some(name),
            FlowError::UnknownDependency { entity, .. }
            | FlowError::NotADependency { entity, .. }
            | FlowError::Derivation { entity, .. }
            | FlowError::TypeMismatch { entity, .. }
            | FlowError::OutputArity { entity, .. } => Some(entity),
            FlowError::Cycle { .. } => None,
        }
    }

    /// Returns true for errors that can only happen while building a graph.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            FlowError::DuplicateEntity { .. }
                | FlowError::UnknownDependency { .. }
                | FlowError::Cycle { .. }
        )
    }
}

//! Graph Entities
//!
//! This module defines the entities that live in the dependency graph.

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::BoxError;
use crate::resolve::Inputs;
use crate::value::Value;

/// Identifier of an entity within one graph.
///
/// Ids are assigned in declaration order, so comparing two ids compares
/// their declaration order. That is what makes topological orders stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the entity in declaration order.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Function computing one entity from its dependencies.
pub type DeriveFn = Arc<dyn Fn(&Inputs<'_>) -> Result<Value, BoxError> + Send + Sync>;

/// Function computing several entities at once.
pub type OutputsFn = Arc<dyn Fn(&Inputs<'_>) -> Result<Vec<Value>, BoxError> + Send + Sync>;

/// How an entity obtains its value.
#[derive(Clone)]
pub enum Definition {
    /// A plain value. `None` means the entity must be set on the flow
    /// before it can be read.
    Literal(Option<Value>),

    /// A function of the declared dependencies.
    Function(DeriveFn),

    /// A function producing exactly `arity` values, consumed by
    /// [`Definition::Projection`] entities.
    Outputs { arity: usize, function: OutputsFn },

    /// Element `index` of the value produced by the single `Outputs`
    /// dependency.
    Projection { index: usize },
}

impl Definition {
    /// Introspection kind of this definition.
    pub fn kind(&self) -> EntityKind {
        match self {
            Definition::Literal(_) => EntityKind::Literal,
            Definition::Function(_) => EntityKind::Derived,
            Definition::Outputs { .. } => EntityKind::Outputs,
            Definition::Projection { .. } => EntityKind::Projection,
        }
    }
}

impl Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Definition::Function(_) => f.write_str("Function(..)"),
            Definition::Outputs { arity, .. } => {
                f.debug_struct("Outputs").field("arity", arity).finish_non_exhaustive()
            }
            Definition::Projection { index } => {
                f.debug_struct("Projection").field("index", index).finish()
            }
        }
    }
}

/// The kind of entity, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A literal value, possibly without a default.
    Literal,

    /// Computed by a derivation function.
    Derived,

    /// Internal node holding the values of a multi-output derivation.
    Outputs,

    /// One named value taken out of an `Outputs` node.
    Projection,
}

/// A named node in the dependency graph.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    name: String,
    definition: Definition,

    /// Entities this one reads from, in declared order, without duplicates.
    dependencies: SmallVec<[EntityId; 4]>,

    /// Entities that read from this one, in declaration order.
    dependents: SmallVec<[EntityId; 4]>,

    memoize: bool,
    hidden: bool,
    doc: Option<String>,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        name: String,
        definition: Definition,
        dependencies: SmallVec<[EntityId; 4]>,
    ) -> Self {
        Self {
            id,
            name,
            definition,
            dependencies,
            dependents: SmallVec::new(),
            memoize: true,
            hidden: false,
            doc: None,
        }
    }

    pub(crate) fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub(crate) fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub(crate) fn with_doc(mut self, doc: Option<String>) -> Self {
        self.doc = doc;
        self
    }

    pub(crate) fn add_dependent(&mut self, id: EntityId) {
        if !self.dependents.contains(&id) {
            self.dependents.push(id);
        }
    }

    /// Id of this entity within its graph.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the value is obtained.
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Introspection kind, see [`Definition::kind`].
    pub fn kind(&self) -> EntityKind {
        self.definition.kind()
    }

    /// Entities this one reads from, in declared order.
    pub fn dependencies(&self) -> &[EntityId] {
        &self.dependencies
    }

    /// Entities that read from this one.
    pub fn dependents(&self) -> &[EntityId] {
        &self.dependents
    }

    /// Whether computed values are kept in the flow's cache.
    pub fn memoize(&self) -> bool {
        self.memoize
    }

    /// Internal entities created by multi-output declarations.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Documentation attached with `FlowBuilder::document`.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

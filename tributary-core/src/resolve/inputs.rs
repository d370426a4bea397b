//! Arguments handed to derivation functions.

use std::any::Any;

use crate::error::{FlowError, Result};
use crate::graph::{Entity, EntityGraph};
use crate::value::Value;

/// Resolved dependency values of the entity being derived, in declared
/// order. Values can be read by dependency name or by position.
pub struct Inputs<'a> {
    graph: &'a EntityGraph,
    entity: &'a Entity,
    values: &'a [Value],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(graph: &'a EntityGraph, entity: &'a Entity, values: &'a [Value]) -> Self {
        debug_assert_eq!(entity.dependencies().len(), values.len());
        Self {
            graph,
            entity,
            values,
        }
    }

    /// Name of the entity being derived.
    pub fn entity(&self) -> &str {
        self.entity.name()
    }

    /// Number of declared dependencies.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the entity has no dependencies.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value of dependency `name`.
    pub fn value(&self, name: &str) -> Result<&'a Value> {
        let values = self.values;
        self.entity
            .dependencies()
            .iter()
            .position(|&dep| self.graph.entity(dep).name() == name)
            .map(|position| &values[position])
            .ok_or_else(|| FlowError::NotADependency {
                entity: self.entity.name().to_string(),
                dependency: name.to_string(),
            })
    }

    /// The value of dependency `name` as a `T`.
    pub fn get<T: Any>(&self, name: &str) -> Result<&'a T> {
        self.value(name)?.expect_ref::<T>(name)
    }

    /// The value of the dependency at `index`, in declared order.
    pub fn at(&self, index: usize) -> Option<&'a Value> {
        let values = self.values;
        values.get(index)
    }

    /// Dependency names paired with their values.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + '_ {
        let (graph, entity, values) = (self.graph, self.entity, self.values);
        entity
            .dependencies()
            .iter()
            .map(move |&dep| graph.entity(dep).name())
            .zip(values.iter())
    }
}

//! Flow Implementation
//!
//! A Flow is the user-facing handle: a shared graph, an override set and a
//! cache. It never changes after construction. "Mutating" operations return
//! a new flow and leave the receiver exactly as it was.
//!
//! # Sharing
//!
//! Cloning a flow is cheap and the clone is the same flow: it shares the
//! cache, so values computed through either are visible to both.
//!
//! `setting` shares the graph, copies the override map with one entry
//! changed, and copies the cache with the changed entity and its downstream
//! slots emptied. Unrelated entities keep sharing their cache slots, so
//! values already computed for them are reused by the new flow.
//!
//! # Thread Safety
//!
//! Flows are `Send + Sync`. Concurrent `get`s are safe, and with
//! single-flight enabled (the default) a value wanted by several threads at
//! once is derived by only one of them.

use std::any::{type_name, Any};
use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::debug;

use super::dag::{DagNode, DagSnapshot};
use crate::cache::{Cache, CacheEntry};
use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::graph::{Entity, EntityGraph, EntityId, FlowBuilder};
use crate::resolve::{Overrides, Resolver};
use crate::value::Value;

/// An immutable, lazily evaluated set of named entities.
#[derive(Clone)]
pub struct Flow {
    graph: Arc<EntityGraph>,
    config: Arc<FlowConfig>,
    overrides: Overrides,
    cache: Cache,
}

impl Flow {
    pub(crate) fn new(graph: Arc<EntityGraph>, config: FlowConfig) -> Self {
        let cache = Cache::new(graph.len());
        Self {
            graph,
            config: Arc::new(config),
            overrides: Overrides::default(),
            cache,
        }
    }

    /// Name given to the builder.
    pub fn name(&self) -> &str {
        self.graph.name()
    }

    /// Configuration the flow was built with.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// The graph shared by every flow in this lineage.
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// The cache shared with this flow's lineage.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Compute, or fetch from the cache, the value of `name`.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.resolver().resolve_name(name)
    }

    /// Like [`get`](Self::get), returning a clone of the value as a `T`.
    pub fn get_as<T>(&self, name: &str) -> Result<T>
    where
        T: Any + Clone,
    {
        let value = self.get(name)?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| FlowError::TypeMismatch {
                entity: name.to_string(),
                expected: type_name::<T>(),
                actual: value.type_name(),
            })
    }

    /// A new flow where `name` has the value `value`, whatever its
    /// definition says.
    pub fn setting<T>(&self, name: &str, value: T) -> Result<Flow>
    where
        T: Any + Send + Sync,
    {
        self.setting_value(name, Value::new(value))
    }

    /// Like [`setting`](Self::setting) for an already wrapped value.
    pub fn setting_value(&self, name: &str, value: Value) -> Result<Flow> {
        let id = self.graph.require(name)?;
        debug!(flow = %self.name(), entity = %name, "setting entity");
        Ok(self.derive_flow(id, self.overrides.with(id, value)))
    }

    /// A new flow where `name` is computed from its declaration again.
    pub fn clearing(&self, name: &str) -> Result<Flow> {
        let id = self.graph.require(name)?;
        if !self.overrides.contains(id) {
            return Ok(self.clone());
        }
        debug!(flow = %self.name(), entity = %name, "clearing entity");
        Ok(self.derive_flow(id, self.overrides.without(id)))
    }

    fn derive_flow(&self, changed: EntityId, overrides: Overrides) -> Flow {
        Flow {
            graph: Arc::clone(&self.graph),
            config: Arc::clone(&self.config),
            overrides,
            cache: self.cache.copy_invalidating(&self.graph, changed),
        }
    }

    /// Whether `name` currently has an override.
    pub fn is_overridden(&self, name: &str) -> Result<bool> {
        Ok(self.overrides.contains(self.graph.require(name)?))
    }

    /// Whether a `get(name)` would be answered without running any
    /// derivation function for `name` itself. Computes nothing.
    pub fn is_cached(&self, name: &str) -> Result<bool> {
        let id = self.graph.require(name)?;
        Ok(self.is_cached_id(&mut self.resolver(), id))
    }

    fn is_cached_id(&self, resolver: &mut Resolver<'_>, id: EntityId) -> bool {
        if self.overrides.contains(id) {
            return true;
        }
        let key = resolver.key_for(id);
        self.cache.contains(id, &key)
    }

    /// Names of all entities users declared, in declaration order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.graph
            .entities()
            .filter(|entity| !entity.is_hidden())
            .map(Entity::name)
            .collect()
    }

    /// Declared dependency names of `name`.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<&str>> {
        self.graph.dependencies_of(name)
    }

    /// The entities `get(name)` may evaluate, dependencies first.
    pub fn topological_order(&self, name: &str) -> Result<Vec<&str>> {
        Ok(self.graph.topological_order(name)?.map(Entity::name).collect())
    }

    /// Every memoized value currently reachable from this flow's cache.
    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        self.cache.entries(&self.graph)
    }

    /// The graph annotated with override and cache state. Computes nothing.
    pub fn dag(&self) -> DagSnapshot {
        let mut resolver = self.resolver();
        let nodes = self
            .graph
            .full_order()
            .map(|entity| DagNode {
                name: entity.name().to_string(),
                kind: entity.kind(),
                dependencies: entity
                    .dependencies()
                    .iter()
                    .map(|&dep| self.graph.entity(dep).name().to_string())
                    .collect(),
                overridden: self.overrides.contains(entity.id()),
                cached: self.is_cached_id(&mut resolver, entity.id()),
                memoized: entity.memoize(),
                hidden: entity.is_hidden(),
                doc: entity.doc().map(str::to_string),
            })
            .collect();

        DagSnapshot {
            flow: self.name().to_string(),
            nodes,
        }
    }

    /// A builder holding this flow's declarations, with current overrides
    /// turned into literal values. Flows built from it start a new lineage
    /// with an empty cache.
    pub fn to_builder(&self) -> FlowBuilder {
        FlowBuilder::from_flow_parts(&self.graph, &self.config, &self.overrides)
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.graph, &self.overrides, &self.cache, &self.config)
    }
}

impl Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name())
            .field("entities", &self.graph.len())
            .field("overrides", &self.overrides.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

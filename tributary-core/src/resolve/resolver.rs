//! Resolver
//!
//! Computes entity values for one flow state.
//!
//! # Algorithm
//!
//! To resolve an entity:
//!
//! 1. If it is overridden, return the override. Nothing upstream is visited.
//! 2. Compute its cache key from the overrides reachable from it.
//! 3. On a cache hit, return the cached value. No derivation function runs.
//! 4. On a miss, collect the upstream entities that are neither overridden
//!    nor cached, walk them in topological order and derive each one. By the
//!    time an entity is derived all of its dependencies are available.
//!
//! Both the key computation and the derivation walk are iterative, so the
//! depth of a dependency chain is bounded by memory rather than by the
//! thread's stack.
//!
//! A resolver lives for one top-level request. Keys it computes are kept for
//! the rest of that request, as are values of unmemoized entities, so a
//! diamond never derives the same unmemoized entity twice in one `get`.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::cache::{Cache, OverrideKey};
use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::graph::{Definition, Entity, EntityGraph, EntityId};
use crate::value::Value;

use super::inputs::Inputs;
use super::overrides::Overrides;

pub struct Resolver<'f> {
    graph: &'f EntityGraph,
    overrides: &'f Overrides,
    cache: &'f Cache,
    config: &'f FlowConfig,

    /// Entities currently being computed, outermost first.
    stack: Vec<EntityId>,

    keys: HashMap<EntityId, OverrideKey>,

    /// Values of unmemoized entities computed during this request.
    scratch: HashMap<EntityId, Value>,
}

impl<'f> Resolver<'f> {
    /// A resolver for one request against the given flow state.
    pub fn new(
        graph: &'f EntityGraph,
        overrides: &'f Overrides,
        cache: &'f Cache,
        config: &'f FlowConfig,
    ) -> Self {
        Self {
            graph,
            overrides,
            cache,
            config,
            stack: Vec::new(),
            keys: HashMap::new(),
            scratch: HashMap::new(),
        }
    }

    /// Resolve the entity called `name`.
    pub fn resolve_name(&mut self, name: &str) -> Result<Value> {
        let id = self.graph.require(name)?;
        self.resolve(id)
    }

    /// Resolve an entity by id.
    pub fn resolve(&mut self, id: EntityId) -> Result<Value> {
        if let Some(position) = self.stack.iter().position(|&active| active == id) {
            let mut cycle = self.stack[position..].to_vec();
            cycle.push(id);
            return Err(FlowError::Cycle {
                cycle: self.graph.names(&cycle),
            });
        }

        if let Some(value) = self.available(id) {
            return Ok(value);
        }

        let graph = self.graph;
        let pending = graph.upstream_where(id, |dep| self.available(dep).is_none());
        for entity in graph.order_within(pending) {
            let value = self.settle(entity)?;
            if entity.id() == id {
                return Ok(value);
            }
        }

        // `id` depends on every other pending entity, so it is always
        // yielded last.
        Err(FlowError::UnresolvedEntity {
            name: graph.entity(id).name().to_string(),
        })
    }

    /// The cache key of `id` under this resolver's overrides. Only walks
    /// the graph; nothing is computed.
    pub fn key_for(&mut self, id: EntityId) -> OverrideKey {
        if let Some(key) = self.known_key(id) {
            return key;
        }

        let graph = self.graph;
        let pending = graph.upstream_where(id, |dep| self.known_key(dep).is_none());
        for entity in graph.order_within(pending) {
            let mut key = OverrideKey::empty();
            for &dep in entity.dependencies() {
                if let Some(dep_key) = self.known_key(dep) {
                    key.merge(&dep_key);
                }
            }
            self.keys.insert(entity.id(), key);
        }

        self.keys.get(&id).cloned().unwrap_or_default()
    }

    fn known_key(&self, id: EntityId) -> Option<OverrideKey> {
        match self.overrides.get(id) {
            Some(set) => Some(OverrideKey::single(id, set.stamp)),
            None => self.keys.get(&id).cloned(),
        }
    }

    /// The value of `id` if it can be had without deriving anything: an
    /// override, a value computed earlier in this request, or a cache hit.
    fn available(&mut self, id: EntityId) -> Option<Value> {
        let (graph, overrides, cache) = (self.graph, self.overrides, self.cache);
        if let Some(set) = overrides.get(id) {
            let key = OverrideKey::single(id, set.stamp);
            if !cache.contains(id, &key) {
                cache.put(id, key, set.value.clone());
            }
            return Some(set.value.clone());
        }

        let entity = graph.entity(id);
        if !entity.memoize() {
            return self.scratch.get(&id).cloned();
        }

        let key = self.key_for(id);
        let value = cache.get(id, &key)?;
        trace!(entity = %entity.name(), "cache hit");
        Some(value)
    }

    /// Derive `entity`, whose dependencies must all be available, and
    /// record the result.
    fn settle(&mut self, entity: &'f Entity) -> Result<Value> {
        let id = entity.id();
        if !entity.memoize() {
            let value = self.compute(entity)?;
            self.scratch.insert(id, value.clone());
            return Ok(value);
        }

        let key = self.key_for(id);
        let cache = self.cache;
        let single_flight = self.config.single_flight;
        cache
            .slot(id)
            .get_or_compute(&key, single_flight, || self.compute(entity))
    }

    fn compute(&mut self, entity: &'f Entity) -> Result<Value> {
        self.stack.push(entity.id());
        let result = self.evaluate(entity);
        self.stack.pop();
        result
    }

    fn evaluate(&mut self, entity: &'f Entity) -> Result<Value> {
        let graph = self.graph;
        match entity.definition() {
            Definition::Literal(Some(value)) => Ok(value.clone()),
            Definition::Literal(None) => Err(FlowError::MissingValue {
                name: entity.name().to_string(),
            }),
            Definition::Function(derive) => {
                let values = self.resolve_dependencies(entity)?;
                debug!(flow = %graph.name(), entity = %entity.name(), "deriving entity");
                derive(&Inputs::new(graph, entity, &values)).map_err(|source| {
                    FlowError::Derivation {
                        entity: entity.name().to_string(),
                        source,
                    }
                })
            }
            Definition::Outputs { arity, function } => {
                let values = self.resolve_dependencies(entity)?;
                debug!(flow = %graph.name(), entity = %entity.name(), "deriving outputs");
                let outputs = function(&Inputs::new(graph, entity, &values)).map_err(
                    |source| FlowError::Derivation {
                        entity: entity.name().to_string(),
                        source,
                    },
                )?;
                if outputs.len() != *arity {
                    return Err(FlowError::OutputArity {
                        entity: entity.name().to_string(),
                        expected: *arity,
                        actual: outputs.len(),
                    });
                }
                Ok(Value::new(outputs))
            }
            Definition::Projection { index } => {
                let values = self.resolve_dependencies(entity)?;
                let source = entity
                    .dependencies()
                    .first()
                    .map(|&dep| graph.entity(dep).name())
                    .unwrap_or_default();
                let outputs = match values.first() {
                    Some(combined) => combined.expect_ref::<Vec<Value>>(source)?,
                    None => {
                        return Err(FlowError::MissingValue {
                            name: entity.name().to_string(),
                        })
                    }
                };
                outputs
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| FlowError::OutputArity {
                        entity: source.to_string(),
                        expected: *index + 1,
                        actual: outputs.len(),
                    })
            }
        }
    }

    fn resolve_dependencies(&mut self, entity: &Entity) -> Result<Vec<Value>> {
        entity
            .dependencies()
            .iter()
            .map(|&dep| self.resolve(dep))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowBuilder;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    struct Fixture {
        graph: EntityGraph,
        overrides: Overrides,
        cache: Cache,
        config: FlowConfig,
    }

    impl Fixture {
        fn new(builder: &FlowBuilder) -> Self {
            let graph = builder.build_graph().unwrap();
            let cache = Cache::new(graph.len());
            Self {
                graph,
                overrides: Overrides::default(),
                cache,
                config: FlowConfig::default(),
            }
        }

        fn resolver(&self) -> Resolver<'_> {
            Resolver::new(&self.graph, &self.overrides, &self.cache, &self.config)
        }

        fn set(&mut self, name: &str, value: Value) {
            let id = self.graph.lookup(name).unwrap();
            self.overrides = self.overrides.with(id, value);
        }
    }

    fn sum_builder(calls: Arc<AtomicI32>) -> FlowBuilder {
        let mut builder = FlowBuilder::new("sum");
        builder
            .assign("x", 2)
            .unwrap()
            .assign("y", 3)
            .unwrap()
            .derive("sum", &["x", "y"], move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(args.get::<i32>("x")? + args.get::<i32>("y")?)
            })
            .unwrap();
        builder
    }

    #[test]
    fn resolves_and_memoizes() {
        let calls = Arc::new(AtomicI32::new(0));
        let fixture = Fixture::new(&sum_builder(calls.clone()));

        let value = fixture.resolver().resolve_name("sum").unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&5));

        let again = fixture.resolver().resolve_name("sum").unwrap();
        assert!(Value::ptr_eq(&value, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overrides_short_circuit_derivation() {
        let calls = Arc::new(AtomicI32::new(0));
        let mut fixture = Fixture::new(&sum_builder(calls.clone()));
        fixture.set("sum", Value::new(100));

        let value = fixture.resolver().resolve_name("sum").unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&100));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn keys_project_reachable_overrides() {
        let calls = Arc::new(AtomicI32::new(0));
        let mut fixture = Fixture::new(&sum_builder(calls));
        let x = fixture.graph.lookup("x").unwrap();
        let sum = fixture.graph.lookup("sum").unwrap();
        let y = fixture.graph.lookup("y").unwrap();

        assert!(fixture.resolver().key_for(sum).is_empty());

        fixture.set("x", Value::new(10));
        let key = fixture.resolver().key_for(sum);
        assert_eq!(key.entities().collect::<Vec<_>>(), vec![x]);
        assert!(fixture.resolver().key_for(y).is_empty());

        // Overriding sum hides x from its key.
        fixture.set("sum", Value::new(0));
        let key = fixture.resolver().key_for(sum);
        assert_eq!(key.entities().collect::<Vec<_>>(), vec![sum]);
    }

    #[test]
    fn unknown_entity_is_unresolved() {
        let fixture = Fixture::new(&sum_builder(Arc::new(AtomicI32::new(0))));
        assert!(matches!(
            fixture.resolver().resolve_name("nonexistent"),
            Err(FlowError::UnresolvedEntity { ref name }) if name == "nonexistent"
        ));
    }

    #[test]
    fn missing_value_names_the_entity() {
        let mut builder = FlowBuilder::new("missing");
        builder
            .declare("input")
            .unwrap()
            .derive("output", &["input"], |args| Ok(*args.get::<i32>("input")?))
            .unwrap();
        let fixture = Fixture::new(&builder);

        assert!(matches!(
            fixture.resolver().resolve_name("output"),
            Err(FlowError::MissingValue { ref name }) if name == "input"
        ));
    }

    #[test]
    fn unmemoized_entities_compute_once_per_request() {
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();

        let mut builder = FlowBuilder::new("diamond");
        builder
            .derive("base", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .unwrap()
            .derive("left", &["base"], |args| Ok(*args.get::<i32>("base")?))
            .unwrap()
            .derive("right", &["base"], |args| Ok(*args.get::<i32>("base")?))
            .unwrap()
            .derive("top", &["left", "right"], |_| Ok(()))
            .unwrap()
            .memoize("base", false)
            .unwrap();
        let fixture = Fixture::new(&builder);

        fixture.resolver().resolve_name("top").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Downstream values are memoized, so base is not needed again.
        fixture.resolver().resolve_name("top").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        fixture.resolver().resolve_name("base").unwrap();
        fixture.resolver().resolve_name("base").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn projections_split_outputs() {
        let mut builder = FlowBuilder::new("split");
        builder
            .assign("n", 7)
            .unwrap()
            .derive_outputs(&["half", "rest"], &["n"], |args| {
                let n = *args.get::<i32>("n")?;
                Ok(vec![Value::new(n / 2), Value::new(n % 2)])
            })
            .unwrap();
        let fixture = Fixture::new(&builder);

        let half = fixture.resolver().resolve_name("half").unwrap();
        let rest = fixture.resolver().resolve_name("rest").unwrap();
        assert_eq!(half.downcast_ref::<i32>(), Some(&3));
        assert_eq!(rest.downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn wrong_output_count_is_reported() {
        let mut builder = FlowBuilder::new("split");
        builder
            .derive_outputs(&["a", "b"], &[], |_| Ok(vec![Value::new(1)]))
            .unwrap();
        let fixture = Fixture::new(&builder);

        match fixture.resolver().resolve_name("a").unwrap_err() {
            FlowError::OutputArity { entity, expected, actual } => {
                assert_eq!(entity, "<a, b>");
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn keys_of_deep_chains_are_computed_without_recursion() {
        let mut builder = FlowBuilder::new("chain");
        builder.assign("e0", 0).unwrap();
        for i in 1..20_000 {
            builder
                .derive(&format!("e{i}"), &[format!("e{}", i - 1).as_str()], |_| Ok(()))
                .unwrap();
        }
        let mut fixture = Fixture::new(&builder);
        fixture.set("e0", Value::new(1));
        let e0 = fixture.graph.lookup("e0").unwrap();
        let top = fixture.graph.lookup("e19999").unwrap();

        let key = fixture.resolver().key_for(top);
        assert_eq!(key.entities().collect::<Vec<_>>(), vec![e0]);
    }

    #[test]
    fn pending_entities_derive_in_topological_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = FlowBuilder::new("diamond");
        for (name, deps) in [
            ("base", &[][..]),
            ("right", &["base"][..]),
            ("left", &["base"][..]),
            ("top", &["left", "right"][..]),
        ] {
            let log = log.clone();
            builder
                .derive(name, deps, move |_| {
                    log.lock().push(name);
                    Ok(())
                })
                .unwrap();
        }
        let fixture = Fixture::new(&builder);

        fixture.resolver().resolve_name("left").unwrap();
        fixture.resolver().resolve_name("top").unwrap();

        // The second request starts from the cached base and left.
        assert_eq!(*log.lock(), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn call_stack_guard_reports_cycles() {
        let fixture = Fixture::new(&sum_builder(Arc::new(AtomicI32::new(0))));
        let sum = fixture.graph.lookup("sum").unwrap();
        let x = fixture.graph.lookup("x").unwrap();

        // Simulate re-entering an entity that is already being computed.
        let mut resolver = fixture.resolver();
        resolver.stack.push(sum);
        resolver.stack.push(x);

        match resolver.resolve(sum).unwrap_err() {
            FlowError::Cycle { cycle } => assert_eq!(cycle, vec!["sum", "x", "sum"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

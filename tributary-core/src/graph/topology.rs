//! Entity Graph Topology
//!
//! The validated, immutable graph and the traversals the rest of the engine
//! runs over it.
//!
//! # Algorithm
//!
//! Ordering uses Kahn's algorithm restricted to the upstream closure of the
//! requested entity:
//!
//! 1. Collect every entity the target transitively depends on
//! 2. Count, for each of them, its dependencies inside that set
//! 3. Repeatedly emit the ready entity with the smallest id
//! 4. Release its dependents inside the set
//!
//! Picking the smallest id among ready entities breaks ties by declaration
//! order, so the sequence is identical across calls on the same graph.
//!
//! Invalidation walks the other way: a breadth-first search over dependents
//! finds everything downstream of a changed entity.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use super::entity::{Entity, EntityId};
use crate::error::{FlowError, Result};

/// A validated dependency graph. Built once by
/// [`FlowBuilder`](super::FlowBuilder) and never mutated afterwards.
#[derive(Debug)]
pub struct EntityGraph {
    name: String,

    /// All entities in declaration order. The index of an entry is its id.
    entities: IndexMap<String, Entity>,
}

impl EntityGraph {
    /// Wrap already-validated entities. Each entity's id must equal its
    /// index in `entities`.
    pub(crate) fn new(name: String, entities: IndexMap<String, Entity>) -> Self {
        debug_assert!(entities
            .values()
            .enumerate()
            .all(|(index, entity)| entity.id().index() == index));
        Self { name, entities }
    }

    /// Name of the flow this graph was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entities, hidden ones included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the graph has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Id of the entity called `name`.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.entities.get(name).map(Entity::id)
    }

    /// Like [`lookup`](Self::lookup), failing with `UnresolvedEntity`.
    pub fn require(&self, name: &str) -> Result<EntityId> {
        self.lookup(name).ok_or_else(|| FlowError::UnresolvedEntity {
            name: name.to_string(),
        })
    }

    /// Get an entity by id.
    ///
    /// Ids are only handed out by this graph, so an id from another graph is
    /// a caller bug and panics.
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Declared dependency names of `name`, in declared order.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<&str>> {
        let entity = self.entity(self.require(name)?);
        Ok(entity
            .dependencies()
            .iter()
            .map(|&dep| self.entity(dep).name())
            .collect())
    }

    /// Entities that must be evaluated to compute `name`, dependencies
    /// first, ending with `name` itself.
    pub fn topological_order(&self, name: &str) -> Result<TopologicalOrder<'_>> {
        let target = self.require(name)?;
        Ok(TopologicalOrder::new(self, self.upstream(target)))
    }

    /// Every entity of the graph in dependency-first order.
    pub fn full_order(&self) -> TopologicalOrder<'_> {
        let all = self.entities.values().map(Entity::id).collect();
        TopologicalOrder::new(self, all)
    }

    /// `id` and everything it transitively depends on.
    pub fn upstream(&self, id: EntityId) -> HashSet<EntityId> {
        self.closure(id, Entity::dependencies, |_| true)
    }

    /// `id` and everything that transitively depends on it.
    pub fn downstream(&self, id: EntityId) -> HashSet<EntityId> {
        self.closure(id, Entity::dependents, |_| true)
    }

    /// Like [`upstream`](Self::upstream), but only entities accepted by
    /// `include` are collected. The dependencies of a rejected entity are
    /// not explored unless another accepted entity reaches them.
    pub fn upstream_where(
        &self,
        id: EntityId,
        include: impl FnMut(EntityId) -> bool,
    ) -> HashSet<EntityId> {
        self.closure(id, Entity::dependencies, include)
    }

    /// Dependency-first walk over `members`, which should be closed under
    /// the dependencies that matter to the caller. Dependencies outside the
    /// set are treated as already satisfied.
    pub fn order_within(&self, members: HashSet<EntityId>) -> TopologicalOrder<'_> {
        TopologicalOrder::new(self, members)
    }

    fn closure(
        &self,
        start: EntityId,
        edges: fn(&Entity) -> &[EntityId],
        mut include: impl FnMut(EntityId) -> bool,
    ) -> HashSet<EntityId> {
        let mut seen = HashSet::new();
        let mut collected = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) || !include(id) {
                continue;
            }
            collected.insert(id);
            queue.extend(edges(self.entity(id)).iter().copied());
        }

        collected
    }

    /// Find a dependency cycle, if any. The returned path starts and ends
    /// with the same entity.
    ///
    /// Depth-first with an explicit stack of `(entity, next dependency)`
    /// frames, so arbitrarily long chains are fine.
    pub(crate) fn find_cycle(&self) -> Option<Vec<EntityId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut path: Vec<(EntityId, usize)> = Vec::new();

        for root in self.entities.values().map(Entity::id) {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            marks[root.index()] = Mark::OnPath;
            path.push((root, 0));

            while let Some(frame) = path.last_mut() {
                let (id, next) = *frame;
                let dependencies = self.entity(id).dependencies();
                if next == dependencies.len() {
                    marks[id.index()] = Mark::Done;
                    path.pop();
                    continue;
                }
                frame.1 += 1;

                let dep = dependencies[next];
                match marks[dep.index()] {
                    Mark::Done => {}
                    Mark::OnPath => {
                        let start = path.iter().position(|&(p, _)| p == dep).unwrap_or(0);
                        let mut cycle: Vec<_> = path[start..].iter().map(|&(p, _)| p).collect();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[dep.index()] = Mark::OnPath;
                        path.push((dep, 0));
                    }
                }
            }
        }
        None
    }

    /// Names for a list of ids.
    pub(crate) fn names(&self, ids: &[EntityId]) -> Vec<String> {
        ids.iter().map(|&id| self.entity(id).name().to_string()).collect()
    }
}

/// Lazy dependency-first walk over a set of entities.
///
/// Yielded in an order where every entity comes after all of its
/// dependencies, ties broken by declaration order.
pub struct TopologicalOrder<'g> {
    graph: &'g EntityGraph,

    /// Remaining unmet dependencies, only for entities inside the walk.
    in_degree: HashMap<EntityId, usize>,

    /// Entities with no unmet dependencies, smallest id first.
    ready: BinaryHeap<Reverse<EntityId>>,
}

impl<'g> TopologicalOrder<'g> {
    fn new(graph: &'g EntityGraph, members: HashSet<EntityId>) -> Self {
        let mut in_degree = HashMap::with_capacity(members.len());
        let mut ready = BinaryHeap::new();

        for &id in &members {
            let degree = graph
                .entity(id)
                .dependencies()
                .iter()
                .filter(|dep| members.contains(*dep))
                .count();
            in_degree.insert(id, degree);
            if degree == 0 {
                ready.push(Reverse(id));
            }
        }

        Self {
            graph,
            in_degree,
            ready,
        }
    }
}

impl<'g> Iterator for TopologicalOrder<'g> {
    type Item = &'g Entity;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(id) = self.ready.pop()?;
        let entity = self.graph.entity(id);

        for dependent in entity.dependents() {
            if let Some(degree) = self.in_degree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    self.ready.push(Reverse(*dependent));
                }
            }
        }

        Some(entity)
    }
}

//! The memoization cache of one flow.
//!
//! A cache is a list of reference-counted slots, one per entity. Flows in the
//! same lineage share slots: invalidating an entity swaps fresh slots in for
//! it and its downstream entities and keeps pointing at every other slot.
//! The slots held by older flows are never touched, which is what keeps
//! those flows valid.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::key::OverrideKey;
use super::slot::Slot;
use crate::graph::{EntityGraph, EntityId};
use crate::value::Value;

/// Memoized values of every entity, keyed by relevant overrides.
#[derive(Clone)]
pub struct Cache {
    slots: Arc<[Arc<Slot>]>,
}

/// One memoized value, as reported by [`Flow::cache_entries`](crate::Flow::cache_entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// Entity the value belongs to.
    pub entity: String,

    /// Overridden entities that participated in the key, sorted by
    /// declaration order.
    pub overrides: Vec<String>,
}

impl Cache {
    /// An empty cache for a graph of `len` entities.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| Arc::new(Slot::default())).collect(),
        }
    }

    /// The value memoized for `id` under `key`, if any.
    pub fn get(&self, id: EntityId, key: &OverrideKey) -> Option<Value> {
        self.slot(id).get(key)
    }

    /// Store a value for `id` under `key`.
    pub fn put(&self, id: EntityId, key: OverrideKey, value: Value) {
        self.slot(id).put(key, value);
    }

    /// Whether a value for `id` under `key` is memoized.
    pub fn contains(&self, id: EntityId, key: &OverrideKey) -> bool {
        self.slot(id).contains(key)
    }

    /// A cache equal to this one except that `changed` and everything
    /// downstream of it start empty. This cache is left as it was.
    pub fn copy_invalidating(&self, graph: &EntityGraph, changed: EntityId) -> Cache {
        let affected = graph.downstream(changed);
        let slots: Arc<[Arc<Slot>]> = self
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                if affected.contains(&EntityId::new(index)) {
                    Arc::new(Slot::default())
                } else {
                    Arc::clone(slot)
                }
            })
            .collect();

        debug!(
            entity = %graph.entity(changed).name(),
            invalidated = affected.len(),
            shared = slots.len() - affected.len(),
            "copied cache"
        );
        Cache { slots }
    }

    /// Whether both caches hold the very same slot for `id`.
    pub fn shares_entries(&self, other: &Cache, id: EntityId) -> bool {
        Arc::ptr_eq(&self.slots[id.index()], &other.slots[id.index()])
    }

    /// Total number of memoized values.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.len()).sum()
    }

    /// Whether no value is memoized at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describe every memoized value, in declaration order of entities.
    pub fn entries(&self, graph: &EntityGraph) -> Vec<CacheEntry> {
        let mut entries = Vec::new();
        for entity in graph.entities() {
            let mut keys = self.slot(entity.id()).keys();
            keys.sort_by_key(|key| key.entities().collect::<Vec<_>>());
            for key in keys {
                entries.push(CacheEntry {
                    entity: entity.name().to_string(),
                    overrides: key
                        .entities()
                        .map(|id| graph.entity(id).name().to_string())
                        .collect(),
                });
            }
        }
        entries
    }

    pub(crate) fn slot(&self, id: EntityId) -> &Slot {
        &self.slots[id.index()]
    }
}

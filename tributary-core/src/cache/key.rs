//! Cache keys.
//!
//! A cached value is only valid for the overrides that could have affected
//! it. The key of an entry is therefore the projection of the flow's override
//! set onto the entity's upstream: the overrides reachable from it without
//! crossing another override.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::graph::EntityId;

/// Identity of one override assignment.
///
/// Every `setting` call mints a fresh stamp, so keys never need to hash or
/// compare user values. Two flows share an entry exactly when they inherited
/// the same assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stamp(u64);

impl Stamp {
    /// Generate a new unique stamp.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The counter value behind this stamp. Later stamps are larger.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for Stamp {
    fn default() -> Self {
        Self::new()
    }
}

/// The overrides relevant to one entity, sorted by entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OverrideKey(SmallVec<[(EntityId, Stamp); 4]>);

impl OverrideKey {
    /// Key of an entity no override can reach.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Key of an entity that is itself overridden.
    pub fn single(id: EntityId, stamp: Stamp) -> Self {
        let mut pairs = SmallVec::new();
        pairs.push((id, stamp));
        Self(pairs)
    }

    /// Add all of `other`'s pairs, keeping the key sorted.
    pub fn merge(&mut self, other: &OverrideKey) {
        for &(id, stamp) in &other.0 {
            if let Err(position) = self.0.binary_search_by_key(&id, |&(existing, _)| existing) {
                self.0.insert(position, (id, stamp));
            }
        }
    }

    /// Overridden entities that participate in this key.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0.iter().map(|&(id, _)| id)
    }

    /// Whether `id` participates in this key.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities().any(|entity| entity == id)
    }

    /// Number of participating overrides.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no override participates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

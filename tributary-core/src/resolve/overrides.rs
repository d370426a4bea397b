//! Override sets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::Stamp;
use crate::graph::EntityId;
use crate::value::Value;

/// A caller-supplied value replacing an entity's definition.
#[derive(Debug, Clone)]
pub struct Override {
    pub value: Value,

    /// Identity of this assignment, used in cache keys.
    pub stamp: Stamp,
}

/// Overrides of one flow. Copy-on-write: deriving a new set clones the map
/// only when the old one is still shared.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    entries: Arc<HashMap<EntityId, Override>>,
}

impl Overrides {
    /// Override of `id`, if it is set.
    pub fn get(&self, id: EntityId) -> Option<&Override> {
        self.entries.get(&id)
    }

    /// Whether `id` is overridden.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of overridden entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is overridden.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every override, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Override)> + '_ {
        self.entries.iter().map(|(&id, set)| (id, set))
    }

    /// A copy with `id` set to `value` under a fresh stamp.
    pub fn with(&self, id: EntityId, value: Value) -> Overrides {
        let mut next = self.clone();
        Arc::make_mut(&mut next.entries).insert(
            id,
            Override {
                value,
                stamp: Stamp::new(),
            },
        );
        next
    }

    /// A copy without an override for `id`.
    pub fn without(&self, id: EntityId) -> Overrides {
        if !self.contains(id) {
            return self.clone();
        }
        let mut next = self.clone();
        Arc::make_mut(&mut next.entries).remove(&id);
        next
    }
}

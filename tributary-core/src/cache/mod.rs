//! Memoization Cache
//!
//! Stores computed entity values so repeated queries on the same logical
//! state never re-run derivation functions.
//!
//! # Keys
//!
//! An entry is keyed by the entity and by the part of the override set that
//! could have influenced it (see [`OverrideKey`]). Two flows that differ only
//! in overrides irrelevant to an entity compute the same key for it and hit
//! the same entry.
//!
//! # Immutability
//!
//! Entries are never changed in place once a flow can see them. `setting`
//! produces a new cache with fresh slots for the affected entities and
//! shares the rest, so earlier flows keep their cached values.

mod key;
mod slot;
mod store;

pub use key::{OverrideKey, Stamp};
pub use store::{Cache, CacheEntry};

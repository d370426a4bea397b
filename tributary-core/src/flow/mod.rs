//! Immutable Flows
//!
//! [`Flow`] ties a validated graph, an override set and a cache together and
//! is what applications hold on to. Every operation either reads (`get`,
//! `dag`, `cache_entries`) or returns a new flow (`setting`, `clearing`);
//! none of them changes an existing flow's observable state.

mod dag;
mod handle;

pub use dag::{DagNode, DagSnapshot};
pub use handle::Flow;

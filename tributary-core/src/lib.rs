//! Tributary Core
//!
//! This crate provides the engine behind Tributary flows: immutable,
//! declarative workflows that compute named values ("entities") on demand.
//! It implements:
//!
//! - A validated entity graph (no unknown dependencies, no cycles)
//! - Lazy, memoized resolution of entities
//! - Copy-on-write reconfiguration that only invalidates what changed
//! - Read-only introspection of the dependency graph
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Entity declarations, validation and topology
//! - `cache`: Memoized values keyed by the overrides that affect them
//! - `resolve`: Dependency-first evaluation against a cache
//! - `flow`: The immutable user-facing handle and DAG snapshots
//!
//! # Example
//!
//! ```rust
//! use tributary_core::FlowBuilder;
//!
//! let mut builder = FlowBuilder::new("hello_world");
//! builder
//!     .assign("subject", String::from("world"))?
//!     .derive("message", &["subject"], |args| {
//!         Ok(format!("Hello {}!", args.get::<String>("subject")?))
//!     })?;
//! let flow = builder.build()?;
//!
//! assert_eq!(flow.get_as::<String>("message")?, "Hello world!");
//!
//! // Setting returns a new flow; the original is unchanged.
//! let universe = flow.setting("subject", String::from("universe"))?;
//! assert_eq!(universe.get_as::<String>("message")?, "Hello universe!");
//! assert_eq!(flow.get_as::<String>("message")?, "Hello world!");
//!
//! // Overriding a derived entity bypasses its function entirely.
//! let goodbye = flow.setting("message", String::from("Goodbye world!"))?;
//! assert_eq!(goodbye.get_as::<String>("message")?, "Goodbye world!");
//! # Ok::<(), tributary_core::FlowError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod flow;
pub mod graph;
pub mod resolve;
pub mod value;

pub use cache::{Cache, CacheEntry};
pub use config::FlowConfig;
pub use error::{BoxError, FlowError, Result};
pub use flow::{DagNode, DagSnapshot, Flow};
pub use graph::{Definition, EntityKind, FlowBuilder};
pub use resolve::Inputs;
pub use value::Value;

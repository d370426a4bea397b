//! Flow Builder
//!
//! The declaration layer. Entities are declared by name, in any order, and
//! may refer to dependencies that are declared later. Everything is checked
//! in [`FlowBuilder::build`]: a flow can only exist for a valid graph.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::debug;

use super::entity::{Definition, Entity, EntityId};
use super::topology::EntityGraph;
use crate::config::FlowConfig;
use crate::error::{BoxError, FlowError, Result};
use crate::flow::Flow;
use crate::resolve::{Inputs, Overrides};
use crate::value::Value;

/// An entity as declared, before names are resolved to ids.
#[derive(Debug, Clone)]
struct Declaration {
    dependencies: SmallVec<[String; 4]>,
    definition: Definition,
    memoize: Option<bool>,
    hidden: bool,
    doc: Option<String>,
}

impl Declaration {
    fn new(dependencies: &[&str], definition: Definition) -> Self {
        Self {
            dependencies: dependencies.iter().map(|dep| dep.to_string()).collect(),
            definition,
            memoize: None,
            hidden: false,
            doc: None,
        }
    }
}

/// Collects entity declarations and builds validated [`Flow`]s from them.
///
/// # Example
///
/// ```rust
/// use tributary_core::FlowBuilder;
///
/// let mut builder = FlowBuilder::new("hello_world");
/// builder
///     .assign("subject", String::from("world"))?
///     .derive("message", &["subject"], |args| {
///         let subject: &String = args.get("subject")?;
///         Ok(format!("Hello {subject}!"))
///     })?;
///
/// let flow = builder.build()?;
/// assert_eq!(flow.get_as::<String>("message")?, "Hello world!");
/// # Ok::<(), tributary_core::FlowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FlowBuilder {
    name: String,
    config: FlowConfig,
    declarations: IndexMap<String, Declaration>,
}

impl FlowBuilder {
    /// Create an empty builder for a flow called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: FlowConfig::default(),
            declarations: IndexMap::new(),
        }
    }

    /// Replace the configuration used by built flows.
    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the flow being declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration new flows will be built with.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Whether `name` has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Declare an entity with an explicit definition.
    ///
    /// Dependency names are resolved at build time, so they may refer to
    /// entities declared later. Repeated dependency names are ignored.
    pub fn declare_entity(
        &mut self,
        name: &str,
        dependencies: &[&str],
        definition: Definition,
    ) -> Result<&mut Self> {
        self.insert(name, Declaration::new(dependencies, definition))?;
        Ok(self)
    }

    /// Declare an entity with no default value. It must be set on the flow
    /// before anything that needs it can be computed.
    pub fn declare(&mut self, name: &str) -> Result<&mut Self> {
        self.declare_entity(name, &[], Definition::Literal(None))
    }

    /// Declare an entity with a fixed default value.
    pub fn assign<T>(&mut self, name: &str, value: T) -> Result<&mut Self>
    where
        T: Any + Send + Sync,
    {
        self.assign_value(name, Value::new(value))
    }

    /// Like [`assign`](Self::assign) for an already wrapped value.
    pub fn assign_value(&mut self, name: &str, value: Value) -> Result<&mut Self> {
        self.declare_entity(name, &[], Definition::Literal(Some(value)))
    }

    /// Declare an entity computed from `dependencies` by `derive`.
    ///
    /// The function receives the resolved dependency values and may fail
    /// with any error; failures surface as [`FlowError::Derivation`].
    pub fn derive<T, F>(&mut self, name: &str, dependencies: &[&str], derive: F) -> Result<&mut Self>
    where
        T: Any + Send + Sync,
        F: Fn(&Inputs<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        let function = Arc::new(move |inputs: &Inputs<'_>| derive(inputs).map(Value::new));
        self.declare_entity(name, dependencies, Definition::Function(function))
    }

    /// Declare several entities computed together by one function.
    ///
    /// `derive` must return exactly one value per name, in the same order.
    /// A hidden entity holds the combined result; each name becomes an
    /// entity reading its own element from it.
    pub fn derive_outputs<F>(
        &mut self,
        names: &[&str],
        dependencies: &[&str],
        derive: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&Inputs<'_>) -> std::result::Result<Vec<Value>, BoxError> + Send + Sync + 'static,
    {
        let combined = format!("<{}>", names.join(", "));

        let mut seen = HashSet::new();
        let taken = names
            .iter()
            .copied()
            .chain([combined.as_str()])
            .find(|name| !seen.insert(*name) || self.contains(name));
        if let Some(name) = taken {
            return Err(FlowError::DuplicateEntity {
                name: name.to_string(),
            });
        }

        let definition = Definition::Outputs {
            arity: names.len(),
            function: Arc::new(derive),
        };
        let mut declaration = Declaration::new(dependencies, definition);
        declaration.hidden = true;
        self.insert(&combined, declaration)?;

        for (index, name) in names.iter().enumerate() {
            let projection = Definition::Projection { index };
            self.insert(name, Declaration::new(&[combined.as_str()], projection))?;
        }
        Ok(self)
    }

    /// Choose whether values of `name` are kept in the cache. Unmemoized
    /// entities are recomputed on every `get`, though still at most once
    /// within a single resolution.
    pub fn memoize(&mut self, name: &str, enabled: bool) -> Result<&mut Self> {
        self.declaration_mut(name)?.memoize = Some(enabled);
        Ok(self)
    }

    /// Attach documentation to `name`. Shown in DAG snapshots.
    pub fn document(&mut self, name: &str, doc: impl Into<String>) -> Result<&mut Self> {
        self.declaration_mut(name)?.doc = Some(doc.into());
        Ok(self)
    }

    /// Validate the declarations and create a flow with an empty cache.
    ///
    /// The builder is left untouched and can be extended and built again;
    /// each build starts an independent lineage with its own cache.
    pub fn build(&self) -> Result<Flow> {
        let graph = self.build_graph()?;
        Ok(Flow::new(Arc::new(graph), self.config.clone()))
    }

    /// Resolve names to ids, link reverse edges and reject cycles.
    pub(crate) fn build_graph(&self) -> Result<EntityGraph> {
        let mut entities = IndexMap::with_capacity(self.declarations.len());

        for (index, (name, declaration)) in self.declarations.iter().enumerate() {
            let mut dependencies: SmallVec<[EntityId; 4]> = SmallVec::new();
            for dep_name in &declaration.dependencies {
                let dep = self
                    .declarations
                    .get_index_of(dep_name.as_str())
                    .map(EntityId::new)
                    .ok_or_else(|| FlowError::UnknownDependency {
                        entity: name.clone(),
                        dependency: dep_name.clone(),
                    })?;
                if !dependencies.contains(&dep) {
                    dependencies.push(dep);
                }
            }

            let memoize = declaration
                .memoize
                .unwrap_or(self.config.memoize_by_default);
            let entity = Entity::new(
                EntityId::new(index),
                name.clone(),
                declaration.definition.clone(),
                dependencies,
            )
            .with_memoize(memoize)
            .with_hidden(declaration.hidden)
            .with_doc(declaration.doc.clone());

            entities.insert(name.clone(), entity);
        }

        for index in 0..entities.len() {
            let dependencies = entities[index].dependencies().to_vec();
            for dep in dependencies {
                entities[dep.index()].add_dependent(EntityId::new(index));
            }
        }

        let graph = EntityGraph::new(self.name.clone(), entities);
        if let Some(cycle) = graph.find_cycle() {
            return Err(FlowError::Cycle {
                cycle: graph.names(&cycle),
            });
        }

        debug!(flow = %self.name, entities = graph.len(), "built entity graph");
        Ok(graph)
    }

    /// Recreate the declarations behind a flow. Overridden entities become
    /// literals holding their override.
    pub(crate) fn from_flow_parts(
        graph: &EntityGraph,
        config: &FlowConfig,
        overrides: &Overrides,
    ) -> Self {
        let declarations = graph
            .entities()
            .map(|entity| {
                let (dependencies, definition) = match overrides.get(entity.id()) {
                    Some(set) => (SmallVec::new(), Definition::Literal(Some(set.value.clone()))),
                    None => {
                        let names = entity
                            .dependencies()
                            .iter()
                            .map(|&dep| graph.entity(dep).name().to_string())
                            .collect();
                        (names, entity.definition().clone())
                    }
                };

                let declaration = Declaration {
                    dependencies,
                    definition,
                    memoize: Some(entity.memoize()),
                    hidden: entity.is_hidden(),
                    doc: entity.doc().map(str::to_string),
                };
                (entity.name().to_string(), declaration)
            })
            .collect();

        Self {
            name: graph.name().to_string(),
            config: config.clone(),
            declarations,
        }
    }

    fn insert(&mut self, name: &str, declaration: Declaration) -> Result<()> {
        if self.declarations.contains_key(name) {
            return Err(FlowError::DuplicateEntity {
                name: name.to_string(),
            });
        }
        self.declarations.insert(name.to_string(), declaration);
        Ok(())
    }

    fn declaration_mut(&mut self, name: &str) -> Result<&mut Declaration> {
        self.declarations
            .get_mut(name)
            .ok_or_else(|| FlowError::UnresolvedEntity {
                name: name.to_string(),
            })
    }
}

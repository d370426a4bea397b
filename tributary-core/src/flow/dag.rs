//! DAG snapshots.
//!
//! A read-only description of a flow's graph for visualization tools. Taking
//! a snapshot never resolves anything; it only reports what is declared,
//! overridden and already cached.

use serde::Serialize;

use crate::graph::EntityKind;

/// The graph of one flow, in dependency-first order.
#[derive(Debug, Clone, Serialize)]
pub struct DagSnapshot {
    pub flow: String,
    pub nodes: Vec<DagNode>,
}

/// One entity of a [`DagSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct DagNode {
    pub name: String,
    pub kind: EntityKind,

    /// Declared dependencies. Still listed when the entity is overridden,
    /// even though they are not consulted.
    pub dependencies: Vec<String>,

    pub overridden: bool,

    /// A value for the flow's current overrides is already available.
    pub cached: bool,

    pub memoized: bool,
    pub hidden: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl DagSnapshot {
    /// The node called `name`.
    pub fn node(&self, name: &str) -> Option<&DagNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// `(dependency, dependent)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.nodes.iter().flat_map(|node| {
            node.dependencies
                .iter()
                .map(move |dep| (dep.as_str(), node.name.as_str()))
        })
    }

    /// Snapshot without hidden entities. Edges through a hidden entity are
    /// rewired to its own dependencies.
    pub fn visible(&self) -> DagSnapshot {
        let nodes = self
            .nodes
            .iter()
            .filter(|node| !node.hidden)
            .map(|node| {
                let mut dependencies = Vec::new();
                for dep in &node.dependencies {
                    match self.node(dep) {
                        Some(hidden) if hidden.hidden => {
                            for inner in &hidden.dependencies {
                                if !dependencies.contains(inner) {
                                    dependencies.push(inner.clone());
                                }
                            }
                        }
                        _ => {
                            if !dependencies.contains(dep) {
                                dependencies.push(dep.clone());
                            }
                        }
                    }
                }
                DagNode {
                    dependencies,
                    ..node.clone()
                }
            })
            .collect();

        DagSnapshot {
            flow: self.flow.clone(),
            nodes,
        }
    }

    /// Compact JSON encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Indented JSON encoding, for humans.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::{FlowBuilder, Value};
    use serde_json::json;

    fn split_flow() -> crate::Flow {
        let mut builder = FlowBuilder::new("split");
        builder
            .assign("n", 9)
            .unwrap()
            .derive_outputs(&["div", "rem"], &["n"], |args| {
                let n = *args.get::<i32>("n")?;
                Ok(vec![Value::new(n / 4), Value::new(n % 4)])
            })
            .unwrap()
            .derive("total", &["div", "rem"], |args| {
                Ok(args.get::<i32>("div")? + args.get::<i32>("rem")?)
            })
            .unwrap()
            .document("total", "div plus rem")
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn snapshot_reports_state_without_computing() {
        let flow = split_flow();
        let dag = flow.dag();
        assert!(dag.nodes.iter().all(|node| !node.cached));
        assert!(flow.cache_entries().is_empty());

        flow.get("div").unwrap();
        let flow = flow.setting("rem", 0).unwrap();
        let dag = flow.dag();

        let names: Vec<_> = dag.nodes.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, vec!["n", "<div, rem>", "div", "rem", "total"]);
        assert!(dag.node("div").unwrap().cached);
        assert!(dag.node("rem").unwrap().overridden);
        assert!(!dag.node("total").unwrap().cached);
        assert_eq!(dag.node("total").unwrap().doc.as_deref(), Some("div plus rem"));
    }

    #[test]
    fn visible_snapshot_skips_hidden_nodes() {
        let dag = split_flow().dag().visible();
        let edges: Vec<_> = dag.edges().collect();

        assert!(dag.node("<div, rem>").is_none());
        assert_eq!(
            edges,
            vec![("n", "div"), ("n", "rem"), ("div", "total"), ("rem", "total")]
        );
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let dag = split_flow().dag();
        let parsed: serde_json::Value = serde_json::from_str(&dag.to_json().unwrap()).unwrap();

        assert_eq!(parsed["flow"], json!("split"));
        assert_eq!(parsed["nodes"][0]["kind"], json!("literal"));
        assert_eq!(parsed["nodes"][1]["kind"], json!("outputs"));
        assert_eq!(parsed["nodes"][4]["dependencies"], json!(["div", "rem"]));
        assert_eq!(parsed["nodes"][4]["doc"], json!("div plus rem"));
        assert!(parsed["nodes"][0].get("doc").is_none());

        // Indentation changes the text, not the content.
        let pretty = dag.to_json_pretty().unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(serde_json::from_str::<serde_json::Value>(&pretty).unwrap(), parsed);
    }
}

//! Dependency graph construction and cycle detection
//!
//! The graph is built eagerly from the requested specs by following
//! dependency declarations depth-first. Identity dedup happens here: a
//! node is created the first time its canonical key is seen and every
//! later reference resolves to the same node, so diamonds collapse and
//! each task can execute at most once per run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::registry::{Resolver, TaskSet};
use crate::task::{Task, TaskKey, TaskSpec};

pub type NodeId = usize;

/// One deduplicated task node
pub struct TaskNode {
    pub key: TaskKey,
    pub task: Arc<dyn Task>,
    /// Upstream nodes this one depends on
    pub deps: Vec<NodeId>,
    /// Downstream nodes that depend on this one
    pub dependents: Vec<NodeId>,
}

/// The full dependency graph for one run
pub struct TaskGraph {
    pub nodes: Vec<TaskNode>,
    index: HashMap<TaskKey, NodeId>,
    /// Nodes named directly in the run request, deduplicated
    pub requested: Vec<NodeId>,
}

impl TaskGraph {
    /// Build the graph for the requested specs, resolving instances
    /// through the registry and rejecting cycles.
    pub fn build(set: &TaskSet, requests: &[TaskSpec]) -> Result<Self, EngineError> {
        let mut graph = TaskGraph {
            nodes: Vec::new(),
            index: HashMap::new(),
            requested: Vec::new(),
        };
        let mut resolver = Resolver::new(set);
        let mut on_path: Vec<TaskKey> = Vec::new();

        for spec in requests {
            let id = graph.expand(spec, &mut resolver, &mut on_path)?;
            if !graph.requested.contains(&id) {
                graph.requested.push(id);
            }
        }
        Ok(graph)
    }

    /// Resolve one spec to a node id, recursing into its dependencies.
    /// `on_path` is the DFS stack of keys currently being expanded; seeing
    /// a key already on it means the declarations form a cycle.
    fn expand(
        &mut self,
        spec: &TaskSpec,
        resolver: &mut Resolver<'_>,
        on_path: &mut Vec<TaskKey>,
    ) -> Result<NodeId, EngineError> {
        let key = spec.key();

        if let Some(pos) = on_path.iter().position(|k| *k == key) {
            let mut chain: Vec<String> = on_path[pos..].iter().map(|k| k.to_string()).collect();
            chain.push(key.to_string());
            return Err(EngineError::Cycle {
                chain: chain.join(" -> "),
            });
        }

        if let Some(&id) = self.index.get(&key) {
            return Ok(id);
        }

        let task = resolver.resolve(spec)?;
        let id = self.nodes.len();
        self.nodes.push(TaskNode {
            key: key.clone(),
            task: Arc::clone(&task),
            deps: Vec::new(),
            dependents: Vec::new(),
        });
        self.index.insert(key.clone(), id);

        on_path.push(key);
        for dep_spec in task.dependencies() {
            let dep_id = self.expand(&dep_spec, resolver, on_path)?;
            if !self.nodes[id].deps.contains(&dep_id) {
                self.nodes[id].deps.push(dep_id);
                self.nodes[dep_id].dependents.push(id);
            }
        }
        on_path.pop();

        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &TaskNode {
        &self.nodes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::params::Params;
    use crate::target::{MemTarget, Target};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Chain {
        spec: TaskSpec,
        deps: Vec<TaskSpec>,
        target: MemTarget,
    }

    #[async_trait]
    impl crate::task::Task for Chain {
        fn spec(&self) -> TaskSpec {
            self.spec.clone()
        }

        fn dependencies(&self) -> Vec<TaskSpec> {
            self.deps.clone()
        }

        fn output(&self) -> Arc<dyn Target> {
            Arc::new(self.target.clone())
        }

        async fn run(&self, _cancel: &CancellationToken) -> Result<(), TaskError> {
            self.target.complete();
            Ok(())
        }
    }

    fn chain_task(spec: TaskSpec, deps: Vec<TaskSpec>) -> Arc<dyn Task> {
        let target = MemTarget::new(spec.key().to_string());
        Arc::new(Chain { spec, deps, target })
    }

    /// Diamond: D depends on B and C, both depend on A
    fn diamond_set() -> TaskSet {
        TaskSet::new()
            .register("A", |p: &Params| {
                Ok(chain_task(
                    TaskSpec::new("A").with_params(p.clone()),
                    vec![],
                ))
            })
            .register("B", |p: &Params| {
                Ok(chain_task(
                    TaskSpec::new("B").with_params(p.clone()),
                    vec![TaskSpec::new("A")],
                ))
            })
            .register("C", |p: &Params| {
                Ok(chain_task(
                    TaskSpec::new("C").with_params(p.clone()),
                    vec![TaskSpec::new("A")],
                ))
            })
            .register("D", |p: &Params| {
                Ok(chain_task(
                    TaskSpec::new("D").with_params(p.clone()),
                    vec![TaskSpec::new("B"), TaskSpec::new("C")],
                ))
            })
    }

    #[test]
    fn diamond_deduplicates_shared_upstream() {
        let set = diamond_set();
        let graph = TaskGraph::build(&set, &[TaskSpec::new("D")]).unwrap();

        assert_eq!(graph.len(), 4);
        let a = graph
            .nodes
            .iter()
            .position(|n| n.key.family() == "A")
            .unwrap();
        // both B and C point at the single A node
        assert_eq!(graph.nodes[a].dependents.len(), 2);
    }

    #[test]
    fn duplicate_requests_collapse() {
        let set = diamond_set();
        let graph =
            TaskGraph::build(&set, &[TaskSpec::new("A"), TaskSpec::new("A")]).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.requested.len(), 1);
    }

    #[test]
    fn cycle_is_rejected_with_chain() {
        let set = TaskSet::new()
            .register("X", |p: &Params| {
                Ok(chain_task(
                    TaskSpec::new("X").with_params(p.clone()),
                    vec![TaskSpec::new("Y")],
                ))
            })
            .register("Y", |p: &Params| {
                Ok(chain_task(
                    TaskSpec::new("Y").with_params(p.clone()),
                    vec![TaskSpec::new("X")],
                ))
            });

        let err = TaskGraph::build(&set, &[TaskSpec::new("X")]).err().unwrap();
        match err {
            EngineError::Cycle { chain } => {
                assert_eq!(chain, "X -> Y -> X");
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_cycle_is_rejected() {
        let set = TaskSet::new().register("Loop", |p: &Params| {
            Ok(chain_task(
                TaskSpec::new("Loop").with_params(p.clone()),
                vec![TaskSpec::new("Loop")],
            ))
        });

        let err = TaskGraph::build(&set, &[TaskSpec::new("Loop")]).err().unwrap();
        assert!(matches!(err, EngineError::Cycle { .. }));
    }

    #[test]
    fn distinct_params_are_distinct_nodes() {
        let set = diamond_set();
        let graph = TaskGraph::build(
            &set,
            &[
                TaskSpec::new("A").with("param", 1),
                TaskSpec::new("A").with("param", 2),
            ],
        )
        .unwrap();
        assert_eq!(graph.len(), 2);
    }
}

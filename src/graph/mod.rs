//! Target graph construction and resolution.
//!
//! Registration happens on a [`GraphBuilder`]; [`GraphBuilder::finish`] checks
//! every target reference and freezes the result into an immutable
//! [`TargetGraph`] that the scheduler shares between workers.

mod errors;

pub use errors::GraphError;

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::target::{Target, TargetDecl};

/// Collects target declarations during configuration load.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Register a target. Names are unique; re-registering is an error.
    pub fn register(&mut self, name: impl Into<String>, decl: TargetDecl) -> Result<(), GraphError> {
        let name = name.into();

        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateTarget { name });
        }

        if let Some(layer) = &decl.options {
            if let Some(key) = layer.layer().conflicting_keys().first() {
                return Err(GraphError::ConflictingOption {
                    target: name,
                    key: key.to_string(),
                });
            }
        }

        tracing::debug!("registered target `{}` ({})", name, decl.tool.kind());
        self.index.insert(name.clone(), self.targets.len());
        self.targets.push(Target::new(name, decl));
        Ok(())
    }

    /// Check if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Close registration and link target references.
    pub fn finish(self) -> Result<TargetGraph, GraphError> {
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let mut seen = HashSet::new();
            let mut target_deps = Vec::new();
            for dep in target.dependencies() {
                let idx = *self.index.get(dep).ok_or_else(|| GraphError::UnknownTarget {
                    name: dep.to_string(),
                    referenced_by: Some(target.name.clone()),
                })?;
                if seen.insert(idx) {
                    target_deps.push(idx);
                }
            }
            deps.push(target_deps);
        }

        // Node i is target i; an edge a -> b means "a depends on b".
        let mut graph = DiGraph::with_capacity(self.targets.len(), 0);
        for i in 0..self.targets.len() {
            graph.add_node(i);
        }
        for (from, target_deps) in deps.iter().enumerate() {
            for &to in target_deps {
                graph.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
            }
        }

        Ok(TargetGraph {
            targets: self.targets,
            index: self.index,
            deps,
            graph,
        })
    }
}

/// Immutable graph of registered targets.
#[derive(Debug)]
pub struct TargetGraph {
    targets: Vec<Target>,
    index: HashMap<String, usize>,
    /// Deduplicated dependencies of each target, in declared input order.
    deps: Vec<Vec<usize>>,
    graph: DiGraph<usize, ()>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl TargetGraph {
    /// Look up a target by name.
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.index.get(name).map(|&i| &self.targets[i])
    }

    /// All target names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name.as_str())
    }

    /// All targets, in registration order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Direct dependencies of a target, in declared order.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let idx = self.index_of(name)?;
        Ok(self.deps[idx].iter().map(|&d| self.name_of(d)).collect())
    }

    /// Targets that directly depend on `name`, in registration order.
    pub fn dependents(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let idx = self.index_of(name)?;
        let mut dependents: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(idx), Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        dependents.sort_unstable();
        dependents.dedup();
        Ok(dependents.into_iter().map(|d| self.name_of(d)).collect())
    }

    /// Targets nothing depends on, in registration order.
    pub fn sinks(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.name_of(self.graph[n]))
            .collect()
    }

    /// Build order for `root`: dependencies before dependents, siblings in
    /// declared input order.
    pub fn resolve(&self, root: &str) -> Result<Vec<String>, GraphError> {
        Ok(self
            .resolve_targets(root)?
            .into_iter()
            .map(|i| self.targets[i].name.clone())
            .collect())
    }

    /// Like [`resolve`](Self::resolve) but returns target indices.
    pub(crate) fn resolve_targets(&self, root: &str) -> Result<Vec<usize>, GraphError> {
        let root = self.index_of(root)?;
        let mut marks = vec![Mark::Unvisited; self.targets.len()];
        let mut order = Vec::new();
        // (target, position of the next dependency to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Visiting;

        while let Some(frame) = stack.last_mut() {
            let (node, pos) = *frame;

            let Some(&dep) = self.deps[node].get(pos) else {
                marks[node] = Mark::Done;
                order.push(node);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep] {
                Mark::Done => {}
                Mark::Unvisited => {
                    marks[dep] = Mark::Visiting;
                    stack.push((dep, 0));
                }
                Mark::Visiting => {
                    let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|&(n, _)| self.targets[n].name.clone())
                        .collect();
                    cycle.push(self.targets[dep].name.clone());
                    return Err(GraphError::GraphCycle { cycle });
                }
            }
        }

        tracing::debug!("resolved {} target(s) for `{}`", order.len(), self.name_of(root));
        Ok(order)
    }

    /// Check the whole graph for cycles, reporting the one through the
    /// earliest registered target.
    pub fn validate(&self) -> Result<(), GraphError> {
        let cyclic = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&n| self.deps[self.graph[n]].contains(&self.graph[n]))
            })
            .map(|scc| scc.into_iter().map(|n| self.graph[n]).collect::<HashSet<usize>>())
            .min_by_key(|members| members.iter().copied().min());

        match cyclic {
            None => Ok(()),
            Some(members) => Err(GraphError::GraphCycle {
                cycle: self.cycle_within(&members),
            }),
        }
    }

    /// Shortest cycle from the earliest member of a strongly connected set
    /// back to itself.
    fn cycle_within(&self, members: &HashSet<usize>) -> Vec<String> {
        let Some(&start) = members.iter().min() else {
            return Vec::new();
        };

        let mut parent: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut closing = start;

        'search: while let Some(node) = queue.pop_front() {
            for &dep in &self.deps[node] {
                if dep == start {
                    closing = node;
                    break 'search;
                }
                if members.contains(&dep) && !parent.contains_key(&dep) {
                    parent.insert(dep, node);
                    queue.push_back(dep);
                }
            }
        }

        let mut path = vec![closing];
        while let Some(&p) = parent.get(path.last().unwrap_or(&start)) {
            path.push(p);
        }
        path.reverse();
        path.push(start);
        path.into_iter().map(|i| self.targets[i].name.clone()).collect()
    }

    pub(crate) fn index_of(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTarget {
                name: name.to_string(),
                referenced_by: None,
            })
    }

    fn name_of(&self, idx: usize) -> &str {
        &self.targets[idx].name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::{keys, Layer};
    use crate::core::target::Input;
    use crate::core::tool::Tool;
    use proptest::prelude::*;

    fn empty(deps: &[&str]) -> TargetDecl {
        TargetDecl::new(Tool::Empty).inputs(deps.iter().map(|d| Input::target(*d)))
    }

    fn graph(decls: &[(&str, &[&str])]) -> Result<TargetGraph, GraphError> {
        let mut builder = GraphBuilder::new();
        for (name, deps) in decls {
            builder.register(*name, empty(deps))?;
        }
        builder.finish()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut builder = GraphBuilder::new();
        builder.register("X", empty(&[])).unwrap();

        assert_eq!(
            builder.register("X", empty(&[])),
            Err(GraphError::DuplicateTarget { name: "X".into() })
        );
    }

    #[test]
    fn test_conflicting_option_fails() {
        let mut builder = GraphBuilder::new();
        let layer = Layer::new()
            .override_with(keys::LIBS, "ntdll")
            .append(keys::LIBS, ["user32"]);

        let err = builder
            .register("X", TargetDecl::new(Tool::Compiler).options(layer))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::ConflictingOption {
                target: "X".into(),
                key: keys::LIBS.into()
            }
        );
        assert!(!builder.contains("X"));
    }

    #[test]
    fn test_unknown_reference_fails_at_finish() {
        let err = graph(&[("X", &["Y"])]).unwrap_err();

        assert_eq!(
            err,
            GraphError::UnknownTarget {
                name: "Y".into(),
                referenced_by: Some("X".into())
            }
        );
    }

    #[test]
    fn test_resolve_unknown_root() {
        let g = graph(&[("A", &[])]).unwrap();
        assert!(matches!(g.resolve("B"), Err(GraphError::UnknownTarget { .. })));
    }

    #[test]
    fn test_resolve_chain() {
        let g = graph(&[("A", &[]), ("B", &["A"]), ("C", &["B"])]).unwrap();
        assert_eq!(g.resolve("C").unwrap(), vec!["A", "B", "C"]);
        assert_eq!(g.resolve("B").unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_resolve_diamond_keeps_sibling_order() {
        let g = graph(&[
            ("base", &[]),
            ("right", &["base"]),
            ("left", &["base"]),
            ("all", &["left", "right", "left"]),
        ])
        .unwrap();

        assert_eq!(g.resolve("all").unwrap(), vec!["base", "left", "right", "all"]);
        assert_eq!(g.dependencies("all").unwrap(), vec!["left", "right"]);
        assert_eq!(g.dependents("base").unwrap(), vec!["right", "left"]);
        assert_eq!(g.sinks(), vec!["all"]);
    }

    #[test]
    fn test_cycle_reports_path() {
        let g = graph(&[("A", &["B"]), ("B", &["A"]), ("C", &["A"])]).unwrap();

        assert_eq!(
            g.resolve("A"),
            Err(GraphError::GraphCycle {
                cycle: vec!["A".into(), "B".into(), "A".into()]
            })
        );
        assert_eq!(
            g.resolve("C"),
            Err(GraphError::GraphCycle {
                cycle: vec!["A".into(), "B".into(), "A".into()]
            })
        );
        assert_eq!(
            g.validate(),
            Err(GraphError::GraphCycle {
                cycle: vec!["A".into(), "B".into(), "A".into()]
            })
        );
    }

    #[test]
    fn test_self_loop() {
        let g = graph(&[("A", &["A"])]).unwrap();
        let expected = GraphError::GraphCycle {
            cycle: vec!["A".into(), "A".into()],
        };

        assert_eq!(g.resolve("A"), Err(expected.clone()));
        assert_eq!(g.validate(), Err(expected));
    }

    #[test]
    fn test_validate_finds_unreachable_cycle() {
        let g = graph(&[("ok", &[]), ("x", &["y"]), ("y", &["z"]), ("z", &["x"])]).unwrap();

        assert!(g.resolve("ok").is_ok());
        assert_eq!(
            g.validate(),
            Err(GraphError::GraphCycle {
                cycle: vec!["x".into(), "y".into(), "z".into(), "x".into()]
            })
        );
    }

    #[test]
    fn test_validate_acyclic() {
        let g = graph(&[("A", &[]), ("B", &["A"]), ("C", &["A", "B"])]).unwrap();
        assert_eq!(g.validate(), Ok(()));
    }

    /// Random DAG: target `i` may only depend on targets with a lower index,
    /// and `root` depends on every target.
    fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..24).prop_flat_map(|n| {
            (0..n)
                .map(|i| prop::collection::vec(0..i.max(1), 0..4).prop_map(move |d| if i == 0 { vec![] } else { d }))
                .collect::<Vec<_>>()
        })
    }

    proptest! {
        #[test]
        fn prop_resolve_orders_dependencies_first(dag in arb_dag()) {
            let names: Vec<String> = (0..dag.len()).map(|i| format!("t{}", i)).collect();
            let mut builder = GraphBuilder::new();
            // Register in reverse so registration order differs from index order.
            for i in (0..dag.len()).rev() {
                builder
                    .register(&names[i], empty(&dag[i].iter().map(|&d| names[d].as_str()).collect::<Vec<_>>()))
                    .unwrap();
            }
            builder
                .register("root", empty(&names.iter().map(String::as_str).collect::<Vec<_>>()))
                .unwrap();
            let g = builder.finish().unwrap();

            let order = g.resolve("root").unwrap();
            prop_assert_eq!(order.len(), dag.len() + 1);
            prop_assert_eq!(order.last().map(String::as_str), Some("root"));

            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(p, n)| (n.as_str(), p)).collect();
            for (i, deps) in dag.iter().enumerate() {
                for &d in deps {
                    prop_assert!(position[names[d].as_str()] < position[names[i].as_str()]);
                }
            }
            prop_assert_eq!(g.validate(), Ok(()));
        }
    }
}

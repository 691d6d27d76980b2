//! Dependency resolution and activation ordering.
//!
//! Components declare what they depend on; the resolver validates the
//! references, rejects cycles, and produces a deterministic
//! topological activation order. When a canonical order is supplied,
//! the computed order must match it exactly, which catches silent
//! drift in component declarations.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{ComponentId, GraphError};

/// The expected order for the built-in component set: memory first,
/// then decisioning, then tooling.
pub fn canonical_activation_order() -> Vec<ComponentId> {
    vec![
        ComponentId::new("AE2"),
        ComponentId::new("AE1"),
        ComponentId::new("AE3"),
    ]
}

/// A component's declaration: identity, dependencies, and the
/// capabilities it provides and consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub id: ComponentId,
    pub depends_on: Vec<ComponentId>,
    pub declared_version: String,
    pub provides: Vec<String>,
    pub consumes: Vec<String>,
}

impl ComponentSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ComponentId::new(id),
            depends_on: Vec::new(),
            declared_version: "0.1.0".to_string(),
            provides: Vec::new(),
            consumes: Vec::new(),
        }
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|id| ComponentId::new(*id)).collect();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.declared_version = version.into();
        self
    }

    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        self.provides.push(capability.into());
        self
    }

    pub fn consumes(mut self, capability: impl Into<String>) -> Self {
        self.consumes.push(capability.into());
        self
    }
}

/// The built-in component set. AE2 holds memory, AE1 makes decisions
/// over it, AE3 exposes tooling over both.
pub fn default_component_set() -> Vec<ComponentSpec> {
    vec![
        ComponentSpec::new("AE1")
            .depends_on(&["AE2"])
            .provides("decision")
            .consumes("memory"),
        ComponentSpec::new("AE2").provides("memory"),
        ComponentSpec::new("AE3")
            .depends_on(&["AE1", "AE2"])
            .provides("tools")
            .consumes("decision")
            .consumes("memory"),
    ]
}

/// A validated dependency graph with its activation order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<ComponentId, ComponentSpec>,
    computed_order: Vec<ComponentId>,
}

impl DependencyGraph {
    pub fn node(&self, id: &ComponentId) -> Option<&ComponentSpec> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ComponentSpec> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Components in the order they must be activated.
    pub fn computed_order(&self) -> &[ComponentId] {
        &self.computed_order
    }
}

pub struct Resolver {
    components: Vec<ComponentSpec>,
    canonical_order: Option<Vec<ComponentId>>,
}

impl Resolver {
    pub fn new(components: Vec<ComponentSpec>) -> Self {
        Self {
            components,
            canonical_order: None,
        }
    }

    /// Require the computed order to equal `order` exactly.
    pub fn with_canonical_order(mut self, order: Vec<ComponentId>) -> Self {
        self.canonical_order = Some(order);
        self
    }

    /// Validate the component set and compute the activation order.
    pub fn resolve(self) -> Result<DependencyGraph, GraphError> {
        self.check_known_dependencies()?;

        let cycles = self.detect_cycles();
        if !cycles.is_empty() {
            return Err(GraphError::CyclicDependency { cycles });
        }

        let order = self.topological_order();
        debug!(order = ?order, "computed activation order");

        if let Some(canonical) = &self.canonical_order {
            if &order != canonical {
                return Err(GraphError::InvalidActivationOrder {
                    expected: canonical.clone(),
                    computed: order,
                });
            }
        }

        info!(components = self.components.len(), "dependency graph resolved");
        let nodes = self
            .components
            .into_iter()
            .map(|spec| (spec.id.clone(), spec))
            .collect();
        Ok(DependencyGraph {
            nodes,
            computed_order: order,
        })
    }

    fn check_known_dependencies(&self) -> Result<(), GraphError> {
        let known: Vec<&ComponentId> = self.components.iter().map(|c| &c.id).collect();
        for component in &self.components {
            for dependency in &component.depends_on {
                if !known.contains(&dependency) {
                    return Err(GraphError::UnknownDependency {
                        component: component.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Iterative DFS with three-color marking. Each cycle is reported
    /// as the path slice from the first re-visited node.
    fn detect_cycles(&self) -> Vec<Vec<ComponentId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let adjacency: HashMap<&ComponentId, &[ComponentId]> = self
            .components
            .iter()
            .map(|c| (&c.id, c.depends_on.as_slice()))
            .collect();
        let mut marks: HashMap<&ComponentId, Mark> = self
            .components
            .iter()
            .map(|c| (&c.id, Mark::Unvisited))
            .collect();

        let mut cycles = Vec::new();
        for component in &self.components {
            if marks[&component.id] != Mark::Unvisited {
                continue;
            }
            // Stack entries are (node, next child index to explore).
            let mut stack: Vec<(&ComponentId, usize)> = vec![(&component.id, 0)];
            let mut path: Vec<&ComponentId> = Vec::new();
            marks.insert(&component.id, Mark::OnPath);
            path.push(&component.id);

            while let Some(&(node, child_index)) = stack.last() {
                let children = adjacency.get(node).copied().unwrap_or(&[]);
                if child_index < children.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let child = &children[child_index];
                    match marks.get(child).copied().unwrap_or(Mark::Done) {
                        Mark::Unvisited => {
                            marks.insert(child, Mark::OnPath);
                            path.push(child);
                            stack.push((child, 0));
                        }
                        Mark::OnPath => {
                            if let Some(start) =
                                path.iter().position(|on_path| *on_path == child)
                            {
                                cycles.push(
                                    path[start..].iter().map(|id| (*id).clone()).collect(),
                                );
                            }
                        }
                        Mark::Done => {}
                    }
                } else {
                    stack.pop();
                    path.pop();
                    marks.insert(node, Mark::Done);
                }
            }
        }
        cycles
    }

    /// Kahn's algorithm. Ready nodes are processed in declaration
    /// order, so the result is deterministic for a given input.
    fn topological_order(&self) -> Vec<ComponentId> {
        let mut in_degree: HashMap<&ComponentId, usize> = self
            .components
            .iter()
            .map(|c| (&c.id, c.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&ComponentId, Vec<&ComponentId>> = HashMap::new();
        for component in &self.components {
            for dependency in &component.depends_on {
                dependents.entry(dependency).or_default().push(&component.id);
            }
        }

        let mut ready: VecDeque<&ComponentId> = self
            .components
            .iter()
            .filter(|c| c.depends_on.is_empty())
            .map(|c| &c.id)
            .collect();

        let mut order = Vec::with_capacity(self.components.len());
        while let Some(node) = ready.pop_front() {
            order.push(node.clone());
            if let Some(children) = dependents.get(node) {
                for child in children {
                    let degree = in_degree.entry(*child).or_insert(0);
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push_back(*child);
                    }
                }
            }
        }
        order
    }
}

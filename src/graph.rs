//! Contraction graphs: summation variables as nodes, co-occurrence in a
//! tensor factor as edges.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{OptimizeError, Result};

use FxHashMap as Dict;

pub type Node = u32;

/// A summation variable of the tensor network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    pub id: Node,
    /// number of values the variable ranges over
    pub size: usize,
    pub name: String,
}

impl Var {
    pub fn new(id: Node, size: usize, name: impl Into<String>) -> Self {
        Var {
            id,
            size,
            name: name.into(),
        }
    }

    /// A variable named after its id, the way circuit builders name them.
    pub fn with_default_name(id: Node, size: usize) -> Self {
        Var::new(id, size, format!("v_{}", id))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Attributes attached to every node, used to rebuild [`Var`]s after
/// optimization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeAttrs {
    pub size: usize,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContractionGraph {
    attrs: Dict<Node, NodeAttrs>,
    adjacency: Dict<Node, BTreeSet<Node>>,
}

impl ContractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, or overwrite the attributes of an existing one.
    pub fn add_node(&mut self, id: Node, size: usize, name: impl Into<String>) -> Result<()> {
        if size == 0 {
            return Err(OptimizeError::malformed(format!(
                "variable {} has an empty domain",
                id
            )));
        }
        self.attrs.insert(
            id,
            NodeAttrs {
                size,
                name: name.into(),
            },
        );
        self.adjacency.entry(id).or_default();
        Ok(())
    }

    pub fn add_var(&mut self, var: &Var) -> Result<()> {
        self.add_node(var.id, var.size, var.name.clone())
    }

    /// Connect two existing nodes. Self loops are ignored.
    pub fn add_edge(&mut self, a: Node, b: Node) -> Result<()> {
        for x in [a, b] {
            if !self.contains(x) {
                return Err(OptimizeError::malformed(format!(
                    "edge ({}, {}) refers to unknown variable {}",
                    a, b, x
                )));
            }
        }
        if a != b {
            self.adjacency.entry(a).or_default().insert(b);
            self.adjacency.entry(b).or_default().insert(a);
        }
        Ok(())
    }

    /// Remove a node and all its edges, returning its attributes.
    pub fn remove_node(&mut self, id: Node) -> Option<NodeAttrs> {
        let neighbors = self.adjacency.remove(&id)?;
        for j in neighbors {
            if let Some(js) = self.adjacency.get_mut(&j) {
                js.remove(&id);
            }
        }
        self.attrs.remove(&id)
    }

    pub fn contains(&self, id: Node) -> bool {
        self.attrs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// All node ids in ascending order.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.attrs.keys().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    pub fn attrs(&self, id: Node) -> Option<&NodeAttrs> {
        self.attrs.get(&id)
    }

    pub fn neighbors(&self, id: Node) -> Option<&BTreeSet<Node>> {
        self.adjacency.get(&id)
    }

    pub fn degree(&self, id: Node) -> usize {
        self.adjacency.get(&id).map_or(0, |s| s.len())
    }

    pub fn has_edge(&self, a: Node, b: Node) -> bool {
        self.adjacency.get(&a).map_or(false, |s| s.contains(&b))
    }

    /// Edges as sorted `(low, high)` pairs.
    pub fn edges(&self) -> Vec<(Node, Node)> {
        let mut edges: Vec<(Node, Node)> = self
            .adjacency
            .iter()
            .flat_map(|(&a, bs)| bs.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
            .collect();
        edges.sort_unstable();
        edges
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(|s| s.len()).sum::<usize>() / 2
    }

    /// Rebuild the [`Var`] for a node from its attributes.
    pub fn var(&self, id: Node) -> Result<Var> {
        match self.attrs.get(&id) {
            Some(attrs) => Ok(Var::new(id, attrs.size, attrs.name.clone())),
            None => Err(OptimizeError::malformed(format!(
                "variable {} is not a node of the graph",
                id
            ))),
        }
    }

    pub fn vars(&self, ids: &[Node]) -> Result<Vec<Var>> {
        ids.iter().map(|&id| self.var(id)).collect()
    }

    /// Connect every pair of the given nodes in place.
    pub fn insert_clique(&mut self, ids: &[Node]) -> Result<()> {
        for (p, &a) in ids.iter().enumerate() {
            if !self.contains(a) {
                return Err(OptimizeError::malformed(format!(
                    "cannot build a clique on unknown variable {}",
                    a
                )));
            }
            for &b in &ids[p + 1..] {
                self.add_edge(a, b)?;
            }
        }
        Ok(())
    }

    /// Copy of the graph with a clique connecting `vars`.
    pub fn make_clique_on(&self, vars: &[Var]) -> Result<ContractionGraph> {
        let ids: Vec<Node> = vars.iter().map(|v| v.id).collect();
        let mut graph = self.clone();
        graph.insert_clique(&ids)?;
        Ok(graph)
    }

    pub fn is_clique(&self, ids: &[Node]) -> bool {
        ids.iter().enumerate().all(|(p, &a)| {
            self.contains(a) && ids[p + 1..].iter().all(|&b| a == b || self.has_edge(a, b))
        })
    }

    /// Complete graph on `n` variables of uniform `size`, ids `0..n`.
    pub fn complete(n: usize, size: usize) -> Result<ContractionGraph> {
        let mut graph = ContractionGraph::new();
        let ids: Vec<Node> = (0..n as Node).collect();
        for &i in &ids {
            graph.add_node(i, size, format!("v_{}", i))?;
        }
        graph.insert_clique(&ids)?;
        Ok(graph)
    }
}

//! The tensor-network interface consumed by the optimizers.

use rustc_hash::FxHashSet;

use crate::error::{OptimizeError, Result};
use crate::graph::{ContractionGraph, Node, Var};

/// What the optimizers need to know about a tensor network.
pub trait TensorNetwork {
    /// Graph of the summation variables, with edges between variables that
    /// share a factor. Boundary variables are not part of it.
    fn line_graph(&self) -> Result<ContractionGraph>;

    /// Output variables that must survive until the last contraction step.
    fn free_vars(&self) -> &[Var];

    fn bra_vars(&self) -> &[Var];

    fn ket_vars(&self) -> &[Var];

    /// Boundary variables, placed first in every order.
    fn ignored_vars(&self) -> Vec<Var> {
        self.bra_vars()
            .iter()
            .chain(self.ket_vars())
            .cloned()
            .collect()
    }
}

/// A tensor network given as a list of factors, each factor being the list
/// of variables its tensor is indexed by.
#[derive(Clone, Debug, Default)]
pub struct FactorNetwork {
    pub factors: Vec<Vec<Var>>,
    pub free_vars: Vec<Var>,
    pub bra_vars: Vec<Var>,
    pub ket_vars: Vec<Var>,
}

impl FactorNetwork {
    pub fn new(factors: Vec<Vec<Var>>) -> Self {
        FactorNetwork {
            factors,
            ..Default::default()
        }
    }

    pub fn with_free_vars(mut self, free_vars: Vec<Var>) -> Self {
        self.free_vars = free_vars;
        self
    }

    pub fn with_bra_vars(mut self, bra_vars: Vec<Var>) -> Self {
        self.bra_vars = bra_vars;
        self
    }

    pub fn with_ket_vars(mut self, ket_vars: Vec<Var>) -> Self {
        self.ket_vars = ket_vars;
        self
    }

    /// Network whose only factors are the edges of `graph`, so that its line
    /// graph is `graph` itself (up to isolated nodes, which are kept as
    /// single-variable factors).
    pub fn from_graph(graph: &ContractionGraph) -> Result<Self> {
        let mut factors = Vec::with_capacity(graph.num_edges() + graph.len());
        for id in graph.nodes() {
            if graph.degree(id) == 0 {
                factors.push(vec![graph.var(id)?]);
            }
        }
        for (a, b) in graph.edges() {
            factors.push(vec![graph.var(a)?, graph.var(b)?]);
        }
        Ok(FactorNetwork::new(factors))
    }
}

impl TensorNetwork for FactorNetwork {
    fn line_graph(&self) -> Result<ContractionGraph> {
        let ignored: FxHashSet<Node> = self.ignored_vars().iter().map(|v| v.id).collect();
        let mut graph = ContractionGraph::new();

        for factor in &self.factors {
            let mut ids = Vec::with_capacity(factor.len());
            for var in factor.iter().filter(|v| !ignored.contains(&v.id)) {
                match graph.attrs(var.id) {
                    Some(attrs) if attrs.size != var.size => {
                        return Err(OptimizeError::malformed(format!(
                            "variable {} appears with sizes {} and {}",
                            var.id, attrs.size, var.size
                        )));
                    }
                    Some(_) => {}
                    None => graph.add_var(var)?,
                }
                ids.push(var.id);
            }
            graph.insert_clique(&ids)?;
        }
        Ok(graph)
    }

    fn free_vars(&self) -> &[Var] {
        &self.free_vars
    }

    fn bra_vars(&self) -> &[Var] {
        &self.bra_vars
    }

    fn ket_vars(&self) -> &[Var] {
        &self.ket_vars
    }
}

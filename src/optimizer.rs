//! Optimizers tying an ordering strategy, a slicing strategy and a memory
//! budget together.

use log::{debug, error, info};
use rustc_hash::FxHashSet;

use crate::budget::{max_treewidth, MemoryBudget, SystemMemory};
use crate::elimination::{self, equivalent_order, Width};
use crate::error::{OptimizeError, Result};
use crate::graph::{ContractionGraph, Node, Var};
use crate::network::TensorNetwork;
use crate::ordering::{GreedyOrdering, Ordering, OrderingStrategy, TamakiOrdering};
use crate::slicing::{GreedyParvars, SlicingStrategy, TreeTrimming};

/// Elimination order of a tensor network.
#[derive(Clone, Debug)]
pub struct OrderingResult {
    /// boundary variables, then every graph node
    pub peo: Vec<Var>,
    pub treewidth: Width,
    /// line graph, with the free variables joined into a clique
    pub graph: ContractionGraph,
    pub ignored_vars: Vec<Var>,
}

/// Elimination order of a tensor network that has been sliced to fit into
/// memory.
#[derive(Clone, Debug)]
pub struct SlicedResult {
    /// boundary variables, then the remaining graph nodes, then the parallel
    /// variables
    pub peo: Vec<Var>,
    pub parallel_vars: Vec<Var>,
    /// width of the order over `sliced_graph`, always below `max_tw`
    pub treewidth: Width,
    pub max_tw: i64,
    pub graph: ContractionGraph,
    /// `graph` without the parallel variables
    pub sliced_graph: ContractionGraph,
    pub ignored_vars: Vec<Var>,
}

impl SlicedResult {
    /// Number of independent contractions, one per assignment of the
    /// parallel variables.
    pub fn slice_count(&self) -> u128 {
        self.parallel_vars
            .iter()
            .fold(1u128, |acc, v| acc.saturating_mul(v.size as u128))
    }
}

/// Graph and first order shared by all optimizers.
struct Prepared {
    graph: ContractionGraph,
    free: Vec<Node>,
    ignored_vars: Vec<Var>,
    ordering: Ordering,
}

fn prepare<O, T>(ordering: &O, tn: &T) -> Result<Prepared>
where
    O: OrderingStrategy + ?Sized,
    T: TensorNetwork + ?Sized,
{
    let line_graph = tn.line_graph()?;
    let free_vars = tn.free_vars();
    let graph = if free_vars.is_empty() {
        line_graph
    } else {
        // output indices have to survive until the very last step
        line_graph.make_clique_on(free_vars)?
    };
    let ordering = ordering.order(&graph)?;
    Ok(Prepared {
        graph,
        free: free_vars.iter().map(|v| v.id).collect(),
        ignored_vars: tn.ignored_vars(),
        ordering,
    })
}

/// Put the free variables last and measure the resulting order.
fn finish_order(
    graph: &ContractionGraph,
    peo: &[Node],
    free: &[Node],
) -> Result<(Vec<Node>, Width)> {
    let peo = equivalent_order(graph, peo, free)?;
    let treewidth = elimination::treewidth(graph, &peo)?;
    Ok((peo, treewidth))
}

/// Computes an elimination order with the given strategy.
#[derive(Clone, Debug, Default)]
pub struct OrderingOptimizer<O = GreedyOrdering> {
    pub ordering: O,
}

pub type TamakiOptimizer = OrderingOptimizer<TamakiOrdering>;

impl<O: OrderingStrategy> OrderingOptimizer<O> {
    pub fn new(ordering: O) -> Self {
        OrderingOptimizer { ordering }
    }

    pub fn optimize<T: TensorNetwork + ?Sized>(&self, tn: &T) -> Result<OrderingResult> {
        let prepared = prepare(&self.ordering, tn)?;
        let treewidth = prepared.ordering.treewidth();
        let (peo, treewidth) = if prepared.free.is_empty() {
            (prepared.ordering.peo, treewidth)
        } else {
            finish_order(&prepared.graph, &prepared.ordering.peo, &prepared.free)?
        };

        let peo = prepared
            .ignored_vars
            .iter()
            .cloned()
            .chain(prepared.graph.vars(&peo)?)
            .collect();
        Ok(OrderingResult {
            peo,
            treewidth,
            graph: prepared.graph,
            ignored_vars: prepared.ignored_vars,
        })
    }
}

impl OrderingOptimizer {
    pub fn greedy() -> Self {
        OrderingOptimizer::new(GreedyOrdering::default())
    }
}

impl OrderingOptimizer<TamakiOrdering> {
    pub fn tamaki(wait_time: std::time::Duration) -> Self {
        OrderingOptimizer::new(TamakiOrdering::new(wait_time))
    }
}

/// Orders the network, then slices variables off until the treewidth fits
/// into the memory budget.
///
/// Each iteration re-orders the shrinking graph and checks the width against
/// `max_tw = floor(log2(available bytes)) - 4 - tw_bias`; if it is not below,
/// the slicing strategy removes more variables. Gives up with
/// [`OptimizeError::InfeasibleBudget`] once the strategy makes no progress.
#[derive(Clone, Debug)]
pub struct SlicesOptimizer<O = GreedyOrdering, S = GreedyParvars, M = SystemMemory> {
    pub ordering: O,
    pub slicing: S,
    pub memory: M,
    /// subtracted from the memory-derived treewidth ceiling
    pub tw_bias: i64,
}

pub const DEFAULT_TW_BIAS: i64 = 2;

pub type TreeTrimSplitter<O = GreedyOrdering, M = SystemMemory> =
    SlicesOptimizer<O, TreeTrimming, M>;

pub type TamakiTrimSlicing<M = SystemMemory> = SlicesOptimizer<TamakiOrdering, TreeTrimming, M>;

impl<O: Default, S: Default, M: Default> Default for SlicesOptimizer<O, S, M> {
    fn default() -> Self {
        SlicesOptimizer::new(O::default(), S::default(), M::default())
    }
}

impl SlicesOptimizer {
    /// Greedy ordering, one greedy parallel variable per step, system memory.
    pub fn greedy() -> Self {
        SlicesOptimizer::new(GreedyOrdering::default(), GreedyParvars, SystemMemory)
    }
}

impl TreeTrimSplitter {
    pub fn tree_trim() -> Self {
        SlicesOptimizer::new(GreedyOrdering::default(), TreeTrimming, SystemMemory)
    }
}

impl TamakiTrimSlicing {
    pub fn tamaki_trim(wait_time: std::time::Duration) -> Self {
        SlicesOptimizer::new(TamakiOrdering::new(wait_time), TreeTrimming, SystemMemory)
    }
}

impl<O, S, M> SlicesOptimizer<O, S, M> {
    pub fn new(ordering: O, slicing: S, memory: M) -> Self {
        SlicesOptimizer {
            ordering,
            slicing,
            memory,
            tw_bias: DEFAULT_TW_BIAS,
        }
    }

    pub fn with_tw_bias(mut self, tw_bias: i64) -> Self {
        self.tw_bias = tw_bias;
        self
    }

    pub fn with_memory<M2>(self, memory: M2) -> SlicesOptimizer<O, S, M2> {
        SlicesOptimizer {
            ordering: self.ordering,
            slicing: self.slicing,
            memory,
            tw_bias: self.tw_bias,
        }
    }
}

impl<O, S, M> SlicesOptimizer<O, S, M>
where
    O: OrderingStrategy,
    S: SlicingStrategy,
    M: MemoryBudget,
{
    /// Treewidth ceiling for the memory available right now.
    pub fn max_tw(&self) -> Result<i64> {
        let avail = self.memory.available_bytes()?;
        info!("Memory available: {}", avail);
        let max_tw = max_treewidth(avail);
        info!("Maximum treewidth: {}", max_tw);
        Ok(max_tw - self.tw_bias)
    }

    /// Slice `graph` in place until its order is narrower than `max_tw`,
    /// starting from `ordering`. Returns the final order and the removed
    /// variables, whose attributes are looked up in `full`.
    fn split_graph(
        &self,
        full: &ContractionGraph,
        graph: &mut ContractionGraph,
        mut ordering: Ordering,
        max_tw: i64,
        protected: &FxHashSet<Node>,
    ) -> Result<(Ordering, Vec<Node>)> {
        let mut parallel: Vec<Node> = Vec::new();
        loop {
            let tw = ordering.treewidth();
            info!("Treewidth: {}", tw);
            if (tw as i64) < max_tw {
                info!("Found parvars: {:?}", parallel);
                return Ok((ordering, parallel));
            }

            let excess = (tw as i64 - max_tw) as Width;
            let removed = self.slicing.slice(graph, &ordering, excess, protected)?;
            if removed.is_empty() {
                error!("Memory is not enough. Max tw: {}", max_tw);
                return Err(OptimizeError::InfeasibleBudget {
                    max_tw,
                    treewidth: tw,
                    parallel_vars: full.vars(&parallel)?,
                    graph: Box::new(graph.clone()),
                });
            }
            parallel.extend(removed);
            debug!(
                "Parvars count: {}. Amps count: {}",
                parallel.len(),
                2f64.powi(parallel.len() as i32)
            );

            ordering = self.ordering.order(graph)?;
        }
    }

    pub fn optimize<T: TensorNetwork + ?Sized>(&self, tn: &T) -> Result<SlicedResult> {
        let prepared = prepare(&self.ordering, tn)?;
        let max_tw = self.max_tw()?;

        let protected: FxHashSet<Node> = prepared.free.iter().copied().collect();
        let mut sliced_graph = prepared.graph.clone();
        let (ordering, parallel) = self.split_graph(
            &prepared.graph,
            &mut sliced_graph,
            prepared.ordering,
            max_tw,
            &protected,
        )?;

        let (peo, treewidth) = finish_order(&sliced_graph, &ordering.peo, &prepared.free)?;
        let parallel_vars = prepared.graph.vars(&parallel)?;
        let peo = prepared
            .ignored_vars
            .iter()
            .cloned()
            .chain(sliced_graph.vars(&peo)?)
            .chain(parallel_vars.iter().cloned())
            .collect();

        Ok(SlicedResult {
            peo,
            parallel_vars,
            treewidth,
            max_tw,
            graph: prepared.graph,
            sliced_graph,
            ignored_vars: prepared.ignored_vars,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_log::test;

    use super::*;
    use crate::budget::{bytes_for_treewidth, FixedMemory};
    use crate::network::FactorNetwork;
    use crate::ordering::GreedyCost;

    fn complete_network(n: usize) -> FactorNetwork {
        FactorNetwork::from_graph(&ContractionGraph::complete(n, 2).unwrap()).unwrap()
    }

    fn ids(vars: &[Var]) -> Vec<Node> {
        vars.iter().map(|v| v.id).collect()
    }

    #[test]
    fn test_complete_graph_treewidth() {
        let result = OrderingOptimizer::greedy().optimize(&complete_network(5)).unwrap();
        assert_eq!(result.treewidth, 4);
        assert_eq!(ids(&result.peo), vec![0, 1, 2, 3, 4]);
        assert!(result.ignored_vars.is_empty());
    }

    #[test]
    fn test_tamaki_complete_graph_treewidth() {
        let result = TamakiOptimizer::tamaki(Duration::from_millis(100))
            .optimize(&complete_network(5))
            .unwrap();
        assert_eq!(result.treewidth, 4);
    }

    #[test]
    fn test_free_vars_last() {
        let v = |i| Var::with_default_name(i, 2);
        // chain 0 - 1 - 2 - 3 - 4 with outputs at both ends
        let tn = FactorNetwork::new((0..4).map(|i| vec![v(i), v(i + 1)]).collect())
            .with_free_vars(vec![v(0), v(4)]);
        let optimizer = OrderingOptimizer::new(GreedyOrdering::new(GreedyCost::MinFill));
        let result = optimizer.optimize(&tn).unwrap();

        let peo = ids(&result.peo);
        assert_eq!(&peo[3..], &[0, 4]);
        assert!(result.graph.has_edge(0, 4));
        assert_eq!(result.treewidth, 2);
    }

    #[test]
    fn test_slices_not_needed() {
        let optimizer = SlicesOptimizer::greedy()
            .with_memory(FixedMemory(bytes_for_treewidth(30)))
            .with_tw_bias(0);
        let result = optimizer.optimize(&complete_network(5)).unwrap();
        assert!(result.parallel_vars.is_empty());
        assert_eq!(result.treewidth, 4);
        assert_eq!(result.max_tw, 30);
        assert_eq!(result.slice_count(), 1);
    }

    #[test]
    fn test_slices_complete_graph() {
        // max_tw = 5 - 2 = 3
        let optimizer = SlicesOptimizer::greedy().with_memory(FixedMemory(bytes_for_treewidth(5)));
        let result = optimizer.optimize(&complete_network(5)).unwrap();

        assert_eq!(result.max_tw, 3);
        assert_eq!(ids(&result.parallel_vars), vec![0, 1]);
        assert_eq!(result.treewidth, 2);
        assert_eq!(ids(&result.peo), vec![2, 3, 4, 0, 1]);
        assert_eq!(result.slice_count(), 4);
        assert_eq!(result.sliced_graph.len(), 3);
        assert_eq!(result.graph.len(), 5);
    }

    #[test]
    fn test_tree_trim_complete_graph() {
        let optimizer = TreeTrimSplitter::tree_trim().with_memory(FixedMemory(bytes_for_treewidth(5)));
        let result = optimizer.optimize(&complete_network(6)).unwrap();

        assert!(result.treewidth < 3);
        assert!(!result.parallel_vars.is_empty());
        assert_eq!(result.peo.len(), 6);
    }

    #[test]
    fn test_infeasible_budget() {
        let optimizer = SlicesOptimizer::greedy()
            .with_memory(FixedMemory(bytes_for_treewidth(0)))
            .with_tw_bias(0);
        let err = optimizer.optimize(&complete_network(5)).unwrap_err();
        match err {
            OptimizeError::InfeasibleBudget {
                max_tw,
                treewidth,
                parallel_vars,
                graph,
            } => {
                assert_eq!(max_tw, 0);
                assert_eq!(treewidth, 0);
                assert_eq!(parallel_vars.len(), 5);
                assert!(graph.is_empty());
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_free_vars_are_never_sliced() {
        let tn = complete_network(5).with_free_vars(vec![
            Var::with_default_name(0, 2),
            Var::with_default_name(1, 2),
            Var::with_default_name(2, 2),
        ]);
        let optimizer = SlicesOptimizer::greedy()
            .with_memory(FixedMemory(bytes_for_treewidth(1)))
            .with_tw_bias(-2);
        let result = optimizer.optimize(&tn).unwrap();
        assert_eq!(ids(&result.parallel_vars), vec![3, 4]);
        assert_eq!(ids(&result.peo), vec![0, 1, 2, 3, 4]);

        let too_tight = optimizer.with_tw_bias(-1);
        assert!(matches!(
            too_tight.optimize(&tn),
            Err(OptimizeError::InfeasibleBudget { .. })
        ));
    }
}

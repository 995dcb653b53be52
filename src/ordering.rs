//! Elimination-order heuristics.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::str::FromStr;
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};

use crate::elimination::{EliminationGraph, Width};
use crate::error::{OptimizeError, Result};
use crate::graph::{ContractionGraph, Node};

use FxHashMap as Dict;

/// An elimination order together with the width of every step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ordering {
    pub peo: Vec<Node>,
    pub path: Vec<Width>,
}

impl Ordering {
    pub fn treewidth(&self) -> Width {
        self.path.iter().copied().max().unwrap_or(0)
    }
}

/// Anything that can turn a graph into an elimination order.
pub trait OrderingStrategy {
    fn order(&self, graph: &ContractionGraph) -> Result<Ordering>;
}

impl<T: OrderingStrategy + ?Sized> OrderingStrategy for &T {
    fn order(&self, graph: &ContractionGraph) -> Result<Ordering> {
        (**self).order(graph)
    }
}

impl<T: OrderingStrategy + ?Sized> OrderingStrategy for Box<T> {
    fn order(&self, graph: &ContractionGraph) -> Result<Ordering> {
        (**self).order(graph)
    }
}

/// Local cost a greedy step minimizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GreedyCost {
    /// current number of neighbors
    #[default]
    MinNeighbors,
    /// number of edges the elimination would add
    MinFill,
}

impl FromStr for GreedyCost {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "n_neighbors" | "min_neighbors" | "min_degree" => Ok(GreedyCost::MinNeighbors),
            "min_fill" | "fill" => Ok(GreedyCost::MinFill),
            _ => Err(OptimizeError::malformed(format!(
                "greedy cost must be one of 'min_neighbors' or 'min_fill', got {}",
                s
            ))),
        }
    }
}

fn local_cost(eg: &EliminationGraph, i: usize, cost: GreedyCost) -> usize {
    match cost {
        GreedyCost::MinNeighbors => eg.degree(i),
        GreedyCost::MinFill => eg.fill_in(i),
    }
}

/// Greedily eliminate the cheapest node until none remain. With an `rng`,
/// ties are broken at random instead of by node id.
pub(crate) fn greedy_eliminate(
    graph: &ContractionGraph,
    cost: GreedyCost,
    mut rng: Option<&mut StdRng>,
) -> Ordering {
    let mut eg = EliminationGraph::new(graph);
    let n = eg.len();

    let tiebreak = |rng: &mut Option<&mut StdRng>| -> u32 {
        match rng {
            Some(rng) => rng.gen::<u32>(),
            None => 0,
        }
    };

    // current (cost, degree) of every node, heap entries not matching it are stale
    let mut keys: Vec<(usize, usize)> = (0..n)
        .map(|i| (local_cost(&eg, i, cost), eg.degree(i)))
        .collect();
    let mut queue: BinaryHeap<Reverse<(usize, usize, u32, usize)>> = BinaryHeap::with_capacity(2 * n);
    for (i, &(c, d)) in keys.iter().enumerate() {
        queue.push(Reverse((c, d, tiebreak(&mut rng), i)));
    }

    let mut peo = Vec::with_capacity(n);
    let mut path = Vec::with_capacity(n);
    while let Some(Reverse((c, d, _, i))) = queue.pop() {
        if !eg.is_alive(i) || keys[i] != (c, d) {
            continue;
        }
        let nbrs = eg.eliminate(i);
        peo.push(eg.id(i));
        path.push(nbrs.len());

        // fill only changes around the new clique
        let mut touched = nbrs.clone();
        if cost == GreedyCost::MinFill {
            for j in nbrs.iter() {
                touched.union_with(eg.neighbors(j));
            }
        }
        for k in touched.iter() {
            let key = (local_cost(&eg, k, cost), eg.degree(k));
            if key != keys[k] {
                keys[k] = key;
                queue.push(Reverse((key.0, key.1, tiebreak(&mut rng), k)));
            }
        }
    }
    Ordering { peo, path }
}

/// Lower bound on the treewidth: the largest minimum degree seen while
/// repeatedly deleting a minimum-degree node.
pub(crate) fn degeneracy(graph: &ContractionGraph) -> Width {
    let ids = graph.nodes();
    let index: Dict<Node, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut degree: Vec<usize> = ids.iter().map(|&id| graph.degree(id)).collect();
    let mut removed = vec![false; ids.len()];

    // stale entries are skipped, as in the greedy queue
    let mut queue: BinaryHeap<Reverse<(usize, Node, usize)>> = ids
        .iter()
        .enumerate()
        .map(|(i, &id)| Reverse((degree[i], id, i)))
        .collect();

    let mut bound = 0;
    while let Some(Reverse((d, id, i))) = queue.pop() {
        if removed[i] || degree[i] != d {
            continue;
        }
        bound = bound.max(d);
        removed[i] = true;
        for j in graph.neighbors(id).into_iter().flatten() {
            let k = index[j];
            if !removed[k] {
                degree[k] -= 1;
                queue.push(Reverse((degree[k], *j, k)));
            }
        }
    }
    bound
}

/// Deterministic greedy elimination.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyOrdering {
    pub cost: GreedyCost,
}

impl GreedyOrdering {
    pub fn new(cost: GreedyCost) -> Self {
        GreedyOrdering { cost }
    }
}

impl OrderingStrategy for GreedyOrdering {
    fn order(&self, graph: &ContractionGraph) -> Result<Ordering> {
        Ok(greedy_eliminate(graph, self.cost, None))
    }
}

/// Slower, better ordering search bounded by a wall-clock budget.
///
/// Always runs one min-neighbors pass. While time is left it follows up with
/// min-fill, then keeps retrying both with randomized tie-breaking until
/// `wait_time` elapses, `max_trials` is reached, or the best width matches
/// the degeneracy lower bound. The best order found is always returned, so
/// running out of time only costs quality. The path holds the single best
/// width.
#[derive(Clone, Debug)]
pub struct TamakiOrdering {
    pub wait_time: Duration,
    pub max_trials: Option<usize>,
    pub seed: u64,
}

impl Default for TamakiOrdering {
    fn default() -> Self {
        TamakiOrdering {
            wait_time: Duration::from_secs(5),
            max_trials: None,
            seed: 0,
        }
    }
}

impl TamakiOrdering {
    pub fn new(wait_time: Duration) -> Self {
        TamakiOrdering {
            wait_time,
            ..Default::default()
        }
    }

    /// Wait time given in seconds. Negative values mean no wait; infinite or
    /// out of range values are rejected.
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        let secs = secs.max(0.0);
        let wait_time = Duration::try_from_secs_f64(secs).map_err(|e| {
            OptimizeError::malformed(format!("invalid wait_time {}: {}", secs, e))
        })?;
        Ok(TamakiOrdering::new(wait_time))
    }

    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = Some(max_trials);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl OrderingStrategy for TamakiOrdering {
    fn order(&self, graph: &ContractionGraph) -> Result<Ordering> {
        let start = Instant::now();
        let lower = degeneracy(graph);
        let mut rng = StdRng::seed_from_u64(self.seed);

        // min-fill is far slower on large graphs, so only the cheap pass is unconditional
        let mut best = greedy_eliminate(graph, GreedyCost::MinNeighbors, None);
        let mut trial = 1;
        while best.treewidth() > lower
            && self.max_trials.map_or(true, |m| trial < m)
            && start.elapsed() < self.wait_time
        {
            let candidate = match trial {
                1 => greedy_eliminate(graph, GreedyCost::MinFill, None),
                t if t % 2 == 0 => greedy_eliminate(graph, GreedyCost::MinFill, Some(&mut rng)),
                _ => greedy_eliminate(graph, GreedyCost::MinNeighbors, Some(&mut rng)),
            };
            if candidate.treewidth() < best.treewidth() {
                debug!("Trial {}: treewidth {} -> {}", trial, best.treewidth(), candidate.treewidth());
                best = candidate;
            }
            trial += 1;
        }
        debug!(
            "Ordering search: {} trials in {:?}, treewidth {} (lower bound {})",
            trial,
            start.elapsed(),
            best.treewidth(),
            lower
        );

        let width = best.treewidth();
        Ok(Ordering {
            peo: best.peo,
            path: vec![width],
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::elimination::treewidth;

    fn grid(rows: Node, cols: Node) -> ContractionGraph {
        let mut g = ContractionGraph::new();
        for r in 0..rows {
            for c in 0..cols {
                g.add_node(r * cols + c, 2, format!("v_{}_{}", r, c)).unwrap();
            }
        }
        for r in 0..rows {
            for c in 0..cols {
                let i = r * cols + c;
                if c + 1 < cols {
                    g.add_edge(i, i + 1).unwrap();
                }
                if r + 1 < rows {
                    g.add_edge(i, i + cols).unwrap();
                }
            }
        }
        g
    }

    fn is_permutation(g: &ContractionGraph, peo: &[Node]) -> bool {
        let mut sorted = peo.to_vec();
        sorted.sort_unstable();
        sorted == g.nodes()
    }

    #[test]
    fn test_greedy_complete_graph() {
        let g = ContractionGraph::complete(5, 2).unwrap();
        for cost in [GreedyCost::MinNeighbors, GreedyCost::MinFill] {
            let ordering = GreedyOrdering::new(cost).order(&g).unwrap();
            assert_eq!(ordering.treewidth(), 4);
            assert_eq!(ordering.peo, vec![0, 1, 2, 3, 4]);
            assert_eq!(ordering.path, vec![4, 3, 2, 1, 0]);
        }
    }

    #[test]
    fn test_greedy_path_matches_replay() {
        let g = grid(4, 5);
        for cost in [GreedyCost::MinNeighbors, GreedyCost::MinFill] {
            let ordering = GreedyOrdering::new(cost).order(&g).unwrap();
            assert!(is_permutation(&g, &ordering.peo));
            assert_eq!(treewidth(&g, &ordering.peo).unwrap(), ordering.treewidth());
        }
    }

    #[test]
    fn test_greedy_tree_is_width_one() {
        let mut g = ContractionGraph::new();
        for i in 0..7 {
            g.add_node(i, 2, format!("v_{}", i)).unwrap();
        }
        for i in 1..7 {
            g.add_edge((i - 1) / 2, i).unwrap();
        }
        let ordering = GreedyOrdering::default().order(&g).unwrap();
        assert_eq!(ordering.treewidth(), 1);
    }

    #[test]
    fn test_greedy_deterministic() {
        let g = grid(5, 5);
        let a = GreedyOrdering::new(GreedyCost::MinFill).order(&g).unwrap();
        let b = GreedyOrdering::new(GreedyCost::MinFill).order(&g).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_cost() {
        assert_eq!("min_fill".parse::<GreedyCost>().unwrap(), GreedyCost::MinFill);
        assert_eq!("n_neighbors".parse::<GreedyCost>().unwrap(), GreedyCost::MinNeighbors);
        assert!("tamaki".parse::<GreedyCost>().is_err());
    }

    #[test]
    fn test_degeneracy() {
        assert_eq!(degeneracy(&ContractionGraph::complete(5, 2).unwrap()), 4);
        assert_eq!(degeneracy(&grid(3, 3)), 2);
        assert_eq!(degeneracy(&ContractionGraph::new()), 0);
    }

    #[test]
    fn test_tamaki_single_width_path() {
        let g = grid(4, 4);
        let tamaki = TamakiOrdering::new(Duration::from_millis(200)).with_max_trials(8);
        let ordering = tamaki.order(&g).unwrap();
        assert_eq!(ordering.path.len(), 1);
        assert!(is_permutation(&g, &ordering.peo));
        assert_eq!(treewidth(&g, &ordering.peo).unwrap(), ordering.treewidth());

        let greedy = GreedyOrdering::new(GreedyCost::MinFill).order(&g).unwrap();
        assert!(ordering.treewidth() <= greedy.treewidth());
    }

    #[test]
    fn test_tamaki_zero_budget_still_orders() {
        let g = grid(3, 6);
        let tamaki = TamakiOrdering::new(Duration::ZERO);
        let ordering = tamaki.order(&g).unwrap();
        assert!(is_permutation(&g, &ordering.peo));
    }

    #[test]
    fn test_tamaki_zero_budget_is_one_min_neighbors_pass() {
        let g = grid(60, 60);

        let start = Instant::now();
        let greedy = GreedyOrdering::default().order(&g).unwrap();
        let greedy_time = start.elapsed();

        let start = Instant::now();
        let ordering = TamakiOrdering::new(Duration::ZERO).order(&g).unwrap();
        let tamaki_time = start.elapsed();

        assert_eq!(ordering.peo, greedy.peo);
        assert_eq!(ordering.path, vec![greedy.treewidth()]);
        assert!(
            tamaki_time < 5 * greedy_time + Duration::from_millis(500),
            "zero wait took {:?}, one min-neighbors pass {:?}",
            tamaki_time,
            greedy_time
        );
    }

    #[test]
    fn test_tamaki_wait_time_from_seconds() {
        let tamaki = TamakiOrdering::from_secs_f64(1.5).unwrap();
        assert_eq!(tamaki.wait_time, Duration::from_millis(1500));
        assert_eq!(TamakiOrdering::from_secs_f64(-3.0).unwrap().wait_time, Duration::ZERO);

        for secs in [f64::INFINITY, 1e30] {
            match TamakiOrdering::from_secs_f64(secs) {
                Err(OptimizeError::MalformedInput { .. }) => {}
                other => panic!("expected malformed input, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_degeneracy_large_grid() {
        assert_eq!(degeneracy(&grid(60, 60)), 2);
        assert_eq!(degeneracy(&grid(1, 50)), 1);
    }

    #[test]
    fn test_tamaki_seeded_is_deterministic() {
        let g = grid(5, 5);
        let tamaki = TamakiOrdering::new(Duration::from_secs(60))
            .with_max_trials(6)
            .with_seed(7);
        assert_eq!(tamaki.order(&g).unwrap(), tamaki.order(&g).unwrap());
    }
}

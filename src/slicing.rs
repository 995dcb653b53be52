//! Slicing strategies: pick variables whose values get enumerated
//! separately ("parallel variables"), removing them from the graph to bring
//! the treewidth down.

use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;

use crate::elimination::{tree_decomposition, Width};
use crate::error::Result;
use crate::graph::{ContractionGraph, Node};
use crate::ordering::Ordering;

use FxHashMap as Dict;

/// One slicing step.
pub trait SlicingStrategy {
    /// Remove variables from `graph` to lower the width of `ordering`, which
    /// exceeds the budget by `excess`, and return them in removal order.
    /// Variables in `protected` are never removed. An empty result means no
    /// further progress is possible.
    fn slice(
        &self,
        graph: &mut ContractionGraph,
        ordering: &Ordering,
        excess: Width,
        protected: &FxHashSet<Node>,
    ) -> Result<Vec<Node>>;
}

impl<T: SlicingStrategy + ?Sized> SlicingStrategy for &T {
    fn slice(
        &self,
        graph: &mut ContractionGraph,
        ordering: &Ordering,
        excess: Width,
        protected: &FxHashSet<Node>,
    ) -> Result<Vec<Node>> {
        (**self).slice(graph, ordering, excess, protected)
    }
}

impl<T: SlicingStrategy + ?Sized> SlicingStrategy for Box<T> {
    fn slice(
        &self,
        graph: &mut ContractionGraph,
        ordering: &Ordering,
        excess: Width,
        protected: &FxHashSet<Node>,
    ) -> Result<Vec<Node>> {
        (**self).slice(graph, ordering, excess, protected)
    }
}

/// How often every unprotected variable occurs in the widest bags.
fn widest_bag_counts<'a>(
    bags: impl Iterator<Item = &'a Vec<Node>> + Clone,
    protected: &FxHashSet<Node>,
) -> Dict<Node, usize> {
    let width = bags.clone().map(Vec::len).max().unwrap_or(0);
    let mut counts: Dict<Node, usize> = Dict::default();
    for bag in bags.filter(|b| b.len() == width && width > 0) {
        for &m in bag.iter().filter(|&&m| !protected.contains(&m)) {
            *counts.entry(m).or_insert(0) += 1;
        }
    }
    counts
}

/// Removes a single variable per step: the one occurring in most of the
/// widest bags, relative to how many extra passes slicing it costs.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyParvars;

impl SlicingStrategy for GreedyParvars {
    fn slice(
        &self,
        graph: &mut ContractionGraph,
        ordering: &Ordering,
        _excess: Width,
        protected: &FxHashSet<Node>,
    ) -> Result<Vec<Node>> {
        let td = tree_decomposition(graph, &ordering.peo)?;
        let counts = widest_bag_counts(td.bags.iter().map(|b| &b.members), protected);

        let best = counts.into_iter().max_by_key(|&(id, count)| {
            // slicing multiplies the work by `size`
            let cost = graph.attrs(id).map_or(1.0, |a| (a.size as f64).log2());
            let gain = if cost > 0.0 {
                count as f64 / cost
            } else {
                f64::INFINITY
            };
            (OrderedFloat(gain), graph.degree(id), Reverse(id))
        });

        Ok(match best {
            Some((id, _)) => {
                graph.remove_node(id);
                vec![id]
            }
            None => Vec::new(),
        })
    }
}

/// Removes a batch of variables per step by trimming the tree decomposition
/// of the current order, without re-ordering between removals.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeTrimming;

impl TreeTrimming {
    /// Variables to remove when the width is `excess` over the budget.
    pub fn batch_size(excess: Width) -> usize {
        ((0.8 * (excess + 1) as f64).round() as usize).max(1)
    }
}

impl SlicingStrategy for TreeTrimming {
    fn slice(
        &self,
        graph: &mut ContractionGraph,
        ordering: &Ordering,
        excess: Width,
        protected: &FxHashSet<Node>,
    ) -> Result<Vec<Node>> {
        let td = tree_decomposition(graph, &ordering.peo)?;
        let mut bags: Vec<Vec<Node>> = td.bags.into_iter().map(|b| b.members).collect();

        let target = Self::batch_size(excess);
        let mut removed = Vec::with_capacity(target);
        for _ in 0..target {
            let counts = widest_bag_counts(bags.iter(), protected);
            let best = counts
                .into_iter()
                .max_by_key(|&(id, count)| (count, graph.degree(id), Reverse(id)));
            let Some((id, _)) = best else { break };

            for bag in bags.iter_mut() {
                bag.retain(|&m| m != id);
            }
            graph.remove_node(id);
            removed.push(id);
        }
        Ok(removed)
    }
}

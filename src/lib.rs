//! Contraction-order and slicing optimizer for tensor networks of quantum
//! circuits.
//!
//! The cost of contracting a tensor network is governed by the order in which
//! its summation variables are eliminated: the widest intermediate bag (the
//! treewidth of the order) sets the peak memory, `16 * 2^tw` bytes. This crate
//!
//! - finds a near-minimal width elimination order ([`OrderingOptimizer`],
//!   with a greedy or a time-bounded [`TamakiOrdering`] heuristic);
//! - when that order does not fit into memory, slices the network: it picks
//!   "parallel variables" whose values are enumerated one contraction at a
//!   time, until the remaining graph fits ([`SlicesOptimizer`], with either
//!   [`GreedyParvars`] or [`TreeTrimming`] as slicing strategy).
//!
//! Ordering and slicing strategies are independent: any
//! [`OrderingStrategy`] can be combined with any [`SlicingStrategy`] and any
//! [`MemoryBudget`].
//!
//! ```
//! use qensor_opt::{ContractionGraph, FactorNetwork, FixedMemory, SlicesOptimizer};
//!
//! let graph = ContractionGraph::complete(5, 2).unwrap();
//! let tn = FactorNetwork::from_graph(&graph).unwrap();
//!
//! // 2^9 bytes allow treewidth 5, minus the default bias of 2
//! let optimizer = SlicesOptimizer::greedy().with_memory(FixedMemory(1 << 9));
//! let result = optimizer.optimize(&tn).unwrap();
//! assert!(result.treewidth < 3);
//! assert_eq!(result.parallel_vars.len(), 2);
//! ```

pub mod budget;
pub mod elimination;
pub mod error;
pub mod graph;
pub mod network;
pub mod optimizer;
pub mod ordering;
pub mod slicing;

#[cfg(feature = "python")]
mod python;

pub use budget::{FixedMemory, MemoryBudget, SystemMemory};
pub use error::{OptimizeError, Result};
pub use graph::{ContractionGraph, Node, Var};
pub use network::{FactorNetwork, TensorNetwork};
pub use optimizer::{
    OrderingOptimizer, OrderingResult, SlicedResult, SlicesOptimizer, TamakiOptimizer,
    TamakiTrimSlicing, TreeTrimSplitter,
};
pub use ordering::{GreedyCost, GreedyOrdering, Ordering, OrderingStrategy, TamakiOrdering};
pub use slicing::{GreedyParvars, SlicingStrategy, TreeTrimming};

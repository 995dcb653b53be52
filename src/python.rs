//! Python bindings.
//!
//! Networks are passed as a list of factors (each a list of integer variable
//! ids) plus a dict of variable sizes; orders come back as lists of ids.

use pyo3::exceptions::{PyMemoryError, PyValueError};
use pyo3::prelude::*;
use rustc_hash::FxHashMap;

use crate::budget::{FixedMemory, MemoryBudget, SystemMemory};
use crate::elimination;
use crate::error::{OptimizeError, Result};
use crate::graph::{Node, Var};
use crate::network::{FactorNetwork, TensorNetwork};
use crate::optimizer::{OrderingOptimizer, SlicesOptimizer, DEFAULT_TW_BIAS};
use crate::ordering::{GreedyCost, GreedyOrdering, OrderingStrategy, TamakiOrdering};
use crate::slicing::{GreedyParvars, SlicingStrategy, TreeTrimming};

use FxHashMap as Dict;

fn to_py_err(e: OptimizeError) -> PyErr {
    match e {
        OptimizeError::InfeasibleBudget { .. } => PyMemoryError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn lookup(sizes: &Dict<Node, usize>, id: Node) -> Result<Var> {
    match sizes.get(&id) {
        Some(&size) => Ok(Var::with_default_name(id, size)),
        None => Err(OptimizeError::malformed(format!(
            "no size given for variable {}",
            id
        ))),
    }
}

fn build_network(
    factors: Vec<Vec<Node>>,
    sizes: &Dict<Node, usize>,
    free_vars: Option<Vec<Node>>,
    ignored_vars: Option<Vec<Node>>,
) -> Result<FactorNetwork> {
    let lookup_all = |ids: Vec<Node>| -> Result<Vec<Var>> {
        ids.into_iter().map(|id| lookup(sizes, id)).collect()
    };
    let factors = factors
        .into_iter()
        .map(lookup_all)
        .collect::<Result<Vec<_>>>()?;
    Ok(FactorNetwork::new(factors)
        .with_free_vars(lookup_all(free_vars.unwrap_or_default())?)
        .with_bra_vars(lookup_all(ignored_vars.unwrap_or_default())?))
}

fn ordering_strategy(
    method: Option<String>,
    wait_time: Option<f64>,
    seed: Option<u64>,
) -> Result<Box<dyn OrderingStrategy>> {
    let method = method.unwrap_or("min_neighbors".to_string());
    Ok(match method.as_str() {
        "tamaki" => {
            let tamaki = TamakiOrdering::from_secs_f64(wait_time.unwrap_or(5.0))?;
            Box::new(tamaki.with_seed(seed.unwrap_or(0)))
        }
        cost => Box::new(GreedyOrdering::new(cost.parse::<GreedyCost>()?)),
    })
}

fn slicing_strategy(strategy: Option<String>) -> Result<Box<dyn SlicingStrategy>> {
    match strategy.as_deref().unwrap_or("greedy") {
        "greedy" => Ok(Box::new(GreedyParvars)),
        "tree_trim" => Ok(Box::new(TreeTrimming)),
        other => Err(OptimizeError::malformed(format!(
            "strategy must be one of 'greedy' or 'tree_trim', got {}",
            other
        ))),
    }
}

fn ids(vars: &[Var]) -> Vec<Node> {
    vars.iter().map(|v| v.id).collect()
}

#[pyfunction]
#[pyo3(signature = (factors, sizes, free_vars=None, ignored_vars=None, method=None, wait_time=None, seed=None))]
fn optimize_order(
    py: Python,
    factors: Vec<Vec<Node>>,
    sizes: Dict<Node, usize>,
    free_vars: Option<Vec<Node>>,
    ignored_vars: Option<Vec<Node>>,
    method: Option<String>,
    wait_time: Option<f64>,
    seed: Option<u64>,
) -> PyResult<(Vec<Node>, usize)> {
    py.allow_threads(|| {
        let tn = build_network(factors, &sizes, free_vars, ignored_vars)?;
        let optimizer = OrderingOptimizer::new(ordering_strategy(method, wait_time, seed)?);
        let result = optimizer.optimize(&tn)?;
        Ok((ids(&result.peo), result.treewidth))
    })
    .map_err(to_py_err)
}

#[pyfunction]
#[pyo3(signature = (factors, sizes, free_vars=None, ignored_vars=None, method=None, strategy=None, tw_bias=None, available_memory=None, wait_time=None, seed=None))]
fn optimize_slices(
    py: Python,
    factors: Vec<Vec<Node>>,
    sizes: Dict<Node, usize>,
    free_vars: Option<Vec<Node>>,
    ignored_vars: Option<Vec<Node>>,
    method: Option<String>,
    strategy: Option<String>,
    tw_bias: Option<i64>,
    available_memory: Option<u64>,
    wait_time: Option<f64>,
    seed: Option<u64>,
) -> PyResult<(Vec<Node>, Vec<Node>, usize)> {
    py.allow_threads(|| {
        let tn = build_network(factors, &sizes, free_vars, ignored_vars)?;
        let memory: Box<dyn MemoryBudget> = match available_memory {
            Some(bytes) => Box::new(FixedMemory(bytes)),
            None => Box::new(SystemMemory),
        };
        let optimizer = SlicesOptimizer::new(
            ordering_strategy(method, wait_time, seed)?,
            slicing_strategy(strategy)?,
            memory,
        )
        .with_tw_bias(tw_bias.unwrap_or(DEFAULT_TW_BIAS));
        let result = optimizer.optimize(&tn)?;
        Ok((ids(&result.peo), ids(&result.parallel_vars), result.treewidth))
    })
    .map_err(to_py_err)
}

/// Width of `order` over the line graph of the network.
#[pyfunction]
fn treewidth(
    py: Python,
    factors: Vec<Vec<Node>>,
    sizes: Dict<Node, usize>,
    order: Vec<Node>,
) -> PyResult<usize> {
    py.allow_threads(|| {
        let graph = build_network(factors, &sizes, None, None)?.line_graph()?;
        elimination::treewidth(&graph, &order)
    })
    .map_err(to_py_err)
}

/// A Python module implemented in Rust.
#[pymodule]
fn qensor_opt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(optimize_order, m)?)?;
    m.add_function(wrap_pyfunction!(optimize_slices, m)?)?;
    m.add_function(wrap_pyfunction!(treewidth, m)?)?;
    Ok(())
}

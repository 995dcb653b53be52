//! Error types for the ordering and slicing optimizers.

use thiserror::Error;

use crate::graph::{ContractionGraph, Var};

/// Errors that can occur while computing an elimination order or a slicing.
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// Slicing cannot bring the treewidth under the memory-derived ceiling.
    ///
    /// Carries the state reached when the search gave up, so the caller can
    /// inspect how far slicing got.
    #[error("Estimated OOM: treewidth {treewidth} cannot be brought under {max_tw} (after slicing {} variables)", parallel_vars.len())]
    InfeasibleBudget {
        max_tw: i64,
        treewidth: usize,
        parallel_vars: Vec<Var>,
        graph: Box<ContractionGraph>,
    },

    /// Input that the graph model cannot represent
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    /// Available system memory could not be determined
    #[error("Failed to read available memory: {0}")]
    Memory(#[from] std::io::Error),
}

impl OptimizeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        OptimizeError::MalformedInput {
            message: message.into(),
        }
    }
}

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, OptimizeError>;

use std::{error::Error, fmt::Display};

pub mod builder;
pub mod graph;

pub use graph::{Csr, Geography};

/// Errors raised while building or querying a [`Geography`].
#[derive(Debug)]
pub enum GraphError {
    /// A site index was out of bounds for the graph's node count.
    NodeNotFound(usize),
    /// An edge referenced a site with no associated coordinate.
    MissingCoordinate(usize),
    /// `coords.len()` / `names.len()` disagreed with the declared site count.
    SiteCountMismatch { expected: usize, got: usize },
}

impl Error for GraphError {}

impl Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(node) => write!(f, "node_id: {node} not found in graph"),
            Self::MissingCoordinate(node) => {
                write!(f, "node \'{node}\' has no associated coordinate")
            }
            Self::SiteCountMismatch { expected, got } => write!(
                f,
                "expected {expected} sites, but got {got} coordinates/names"
            ),
        }
    }
}

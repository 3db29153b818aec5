use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::compartments::CompartmentSet;
use super::node::Node;
use super::population::PopulationCompartments;

/// Errors raised while assembling the node network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkBuildError {
    #[error("population row for node {node_id} has {actual} age groups, expected {expected}")]
    AgeGroupMismatch {
        node_id: u64,
        expected: usize,
        actual: usize,
    },
    #[error("high-risk ratios have length {actual}, expected {expected} (one per age group)")]
    HighRiskLength { expected: usize, actual: usize },
    #[error("flow matrix row {row} has {actual} columns, expected {expected}")]
    FlowNotSquare {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("flow matrix is {actual}x{actual}, expected {expected}x{expected} (one row per node)")]
    FlowSizeMismatch { expected: usize, actual: usize },
    #[error("population file contains no nodes")]
    Empty,
    #[error("unknown node id {0}")]
    UnknownNode(u64),
}

/// Ordered list of nodes plus the commuter flow matrix between them.
///
/// `flow(i, j)` is the daily commuter flow from node index `i` to node index
/// `j`; the diagonal is conventionally zero. Cloning a network is the deep
/// copy a realization starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    compartment_set: CompartmentSet,
    num_age_groups: usize,
    pub nodes: Vec<Node>,
    flow: Vec<f64>,
}

impl Network {
    /// Build nodes from population rows `(node_id, per-age populations)` and
    /// per-age high-risk ratios. The flow matrix starts zeroed.
    pub fn from_population(
        compartment_set: CompartmentSet,
        rows: &[(u64, Vec<f64>)],
        high_risk_ratios: &[f64],
        fips_prefix: Option<u64>,
    ) -> Result<Self, NetworkBuildError> {
        let Some((_, first)) = rows.first() else {
            return Err(NetworkBuildError::Empty);
        };
        let num_age_groups = first.len();
        if high_risk_ratios.len() != num_age_groups {
            return Err(NetworkBuildError::HighRiskLength {
                expected: num_age_groups,
                actual: high_risk_ratios.len(),
            });
        }
        let mut nodes = Vec::with_capacity(rows.len());
        for (index, (node_id, pops)) in rows.iter().enumerate() {
            if pops.len() != num_age_groups {
                return Err(NetworkBuildError::AgeGroupMismatch {
                    node_id: *node_id,
                    expected: num_age_groups,
                    actual: pops.len(),
                });
            }
            let compartments =
                PopulationCompartments::new(&compartment_set, pops, high_risk_ratios);
            let fips_id = fips_prefix.map(|p| p + node_id);
            nodes.push(Node::new(index, *node_id, fips_id, compartments));
        }
        let n = nodes.len();
        Ok(Self {
            compartment_set,
            num_age_groups,
            nodes,
            flow: vec![0.0; n * n],
        })
    }

    pub fn compartment_set(&self) -> &CompartmentSet {
        &self.compartment_set
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_age_groups(&self) -> usize {
        self.num_age_groups
    }

    pub fn total_population(&self) -> f64 {
        self.nodes.iter().map(Node::total_population).sum()
    }

    /// Install the commuter flow matrix, validating the M x M shape.
    pub fn set_travel_flow(&mut self, rows: Vec<Vec<f64>>) -> Result<(), NetworkBuildError> {
        let n = self.nodes.len();
        if rows.len() != n {
            return Err(NetworkBuildError::FlowSizeMismatch {
                expected: n,
                actual: rows.len(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(NetworkBuildError::FlowNotSquare {
                    row: i,
                    expected: n,
                    actual: row.len(),
                });
            }
        }
        self.flow = rows.into_iter().flatten().collect();
        Ok(())
    }

    /// Daily commuter flow from node index `from` to node index `to`.
    pub fn flow(&self, from: usize, to: usize) -> f64 {
        self.flow[from * self.nodes.len() + to]
    }

    pub fn node_index_by_id(&self, node_id: u64) -> Result<usize, NetworkBuildError> {
        self.nodes
            .iter()
            .position(|n| n.node_id == node_id)
            .ok_or(NetworkBuildError::UnknownNode(node_id))
    }
}

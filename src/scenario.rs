//! Small scenario builder for tests: networks with chosen populations,
//! flows and seeded infections, without touching the filesystem.

use crate::model::{CompartmentSet, Network, RiskGroup, Stratum, VaccineGroup};

/// Builder for a test network. Every node gets the same number of age
/// groups; flows default to zero.
pub struct Scenario {
    compartment_set: CompartmentSet,
    high_risk_ratios: Vec<f64>,
    rows: Vec<(u64, Vec<f64>)>,
    flow: Option<Vec<Vec<f64>>>,
}

impl Scenario {
    pub fn new(compartment_set: CompartmentSet, num_age_groups: usize) -> Self {
        Self {
            compartment_set,
            high_risk_ratios: vec![0.0; num_age_groups],
            rows: Vec::new(),
            flow: None,
        }
    }

    pub fn seatird(num_age_groups: usize) -> Self {
        Self::new(CompartmentSet::seatird(), num_age_groups)
    }

    pub fn high_risk_ratios(mut self, ratios: Vec<f64>) -> Self {
        self.high_risk_ratios = ratios;
        self
    }

    /// Add a node with per-age populations.
    pub fn node(mut self, node_id: u64, age_group_pops: Vec<f64>) -> Self {
        self.rows.push((node_id, age_group_pops));
        self
    }

    /// Install a full commuter flow matrix.
    pub fn flow(mut self, flow: Vec<Vec<f64>>) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Symmetric flow `f` between every pair of distinct nodes.
    pub fn uniform_flow(mut self, f: f64) -> Self {
        let n = self.rows.len();
        let mut matrix = vec![vec![f; n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        self.flow = Some(matrix);
        self
    }

    pub fn build(self) -> Network {
        let mut network = Network::from_population(
            self.compartment_set,
            &self.rows,
            &self.high_risk_ratios,
            None,
        )
        .expect("scenario network must be well formed");
        if let Some(flow) = self.flow {
            network
                .set_travel_flow(flow)
                .expect("scenario flow matrix must match node count");
        }
        for node in &mut network.nodes {
            node.rebuild_group_share();
        }
        network
    }
}

/// The unvaccinated low-risk stratum for an age group, where seeded
/// infections land.
pub fn seed_stratum(age: usize) -> Stratum {
    Stratum::new(age, RiskGroup::Low, VaccineGroup::Unvaccinated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_network_with_flow() {
        let net = Scenario::seatird(2)
            .high_risk_ratios(vec![0.1, 0.2])
            .node(113, vec![100.0, 200.0])
            .node(141, vec![50.0, 50.0])
            .uniform_flow(0.3)
            .build();
        assert_eq!(net.num_nodes(), 2);
        assert_eq!(net.flow(0, 1), 0.3);
        assert_eq!(net.flow(1, 1), 0.0);
        assert!((net.total_population() - 400.0).abs() < 1e-9);
        // Group shares are ready for the stochastic engine.
        let share: f64 = net.nodes[0]
            .compartments
            .strata()
            .map(|s| net.nodes[0].group_share(s))
            .sum();
        assert!((share - 1.0).abs() < 1e-12);
    }
}

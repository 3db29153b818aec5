//! Inter-node travel coupling (C5).
//!
//! Once per day, after the intra-node disease steps, commuter flow and
//! infectious prevalence combine into a per-age exposure probability at
//! every node, and fresh exposures are drawn from a binomial over the
//! rounded susceptible count.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::disease::DiseaseModel;
use crate::model::{Network, VaccineGroup};
use crate::rng::rand_binomial;
use crate::vaccine::VaccineModel;

/// Whose NPI state supplies beta for the force on sink-side susceptibles.
/// The reference semantics are `Sink`: commuters experience the
/// interventions of the node they are in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetaSource {
    #[default]
    Sink,
    Source,
}

/// Raw travel parameters from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelParameters {
    /// Global mobility-reduction scalar in [0, 1].
    pub rho: f64,
    /// Age-specific travel-damping denominators (e.g. 10 for ages 0-4).
    pub flow_reduction: Vec<f64>,
    #[serde(default)]
    pub beta_from: BetaSource,
    /// Legacy mode: the source->sink direction counts only the first
    /// transmitting compartment instead of the full weighted set.
    #[serde(default)]
    pub asymmetric_transmitting: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TravelError {
    #[error("rho {0} is outside [0, 1]")]
    RhoOutOfRange(f64),
    #[error("flow_reduction has length {actual}, expected {expected} (one per age group)")]
    WrongFlowReductionLength { expected: usize, actual: usize },
    #[error("flow_reduction entries must be positive, got {0}")]
    NonPositiveFlowReduction(f64),
}

/// Binomial travel model.
#[derive(Debug)]
pub struct BinomialTravel {
    rho: f64,
    flow_reduction: Vec<f64>,
    beta_from: BetaSource,
    asymmetric_transmitting: bool,
    contact_matrix: Vec<Vec<f64>>,
}

impl BinomialTravel {
    pub fn new(
        params: &TravelParameters,
        contact_matrix: Vec<Vec<f64>>,
        num_age_groups: usize,
    ) -> Result<Self, TravelError> {
        if !(0.0..=1.0).contains(&params.rho) {
            return Err(TravelError::RhoOutOfRange(params.rho));
        }
        if params.flow_reduction.len() != num_age_groups {
            return Err(TravelError::WrongFlowReductionLength {
                expected: num_age_groups,
                actual: params.flow_reduction.len(),
            });
        }
        for &f in &params.flow_reduction {
            if f <= 0.0 {
                return Err(TravelError::NonPositiveFlowReduction(f));
            }
        }
        Ok(Self {
            rho: params.rho,
            flow_reduction: params.flow_reduction.clone(),
            beta_from: params.beta_from,
            asymmetric_transmitting: params.asymmetric_transmitting,
            contact_matrix,
        })
    }

    /// Aggregate per-age exposure probabilities for every node, reading the
    /// whole network, then draw and apply exposures sink by sink.
    pub fn travel(
        &self,
        network: &mut Network,
        disease: &mut dyn DiseaseModel,
        vaccine: &VaccineModel,
        day: usize,
        rng: &mut dyn RngCore,
    ) {
        let probabilities = self.exposure_probabilities(network, disease, day);

        for sink in 0..network.num_nodes() {
            let p_by_age = &probabilities[sink];
            if p_by_age.iter().all(|&p| p <= 0.0) {
                continue;
            }
            let strata: Vec<_> = network.nodes[sink].compartments.strata().collect();
            let s_index = network.nodes[sink].compartments.susceptible_index();
            for stratum in strata {
                let mut p = p_by_age[stratum.age];
                if stratum.vaccine == VaccineGroup::Vaccinated {
                    p *= 1.0 - vaccine.effectiveness(stratum.age);
                }
                let p = p.clamp(0.0, 1.0);
                if p <= 0.0 {
                    continue;
                }
                let susceptible =
                    network.nodes[sink].compartments.get(stratum, s_index);
                let trials = (susceptible + 0.5).floor() as u64;
                let exposures = rand_binomial(trials, p, rng);
                if exposures > 0 {
                    disease.expose(
                        &mut network.nodes[sink],
                        stratum,
                        exposures as f64,
                        day,
                        vaccine,
                        rng,
                    );
                }
            }
        }
    }

    /// Pure read pass: `P[sink][age]`, the accumulated exposure probability
    /// from all ordered node pairs with nonzero flow in either direction.
    fn exposure_probabilities(
        &self,
        network: &Network,
        disease: &dyn DiseaseModel,
        day: usize,
    ) -> Vec<Vec<f64>> {
        let num_nodes = network.num_nodes();
        let ages = network.num_age_groups();
        let sigma = disease.relative_susceptibility().to_vec();
        let weights = disease.transmitting_weights().to_vec();
        // Legacy asymmetric mode: the source->sink direction sees only the
        // first transmitting compartment.
        let asymmetric_weights = vec![weights[0]];

        let transmitting: Vec<Vec<f64>> = network
            .nodes
            .iter()
            .map(|n| n.compartments.transmitting_per_age(&weights))
            .collect();
        let transmitting_inbound: Vec<Vec<f64>> = if self.asymmetric_transmitting {
            network
                .nodes
                .iter()
                .map(|n| n.compartments.transmitting_per_age(&asymmetric_weights))
                .collect()
        } else {
            transmitting.clone()
        };
        let populations: Vec<f64> =
            network.nodes.iter().map(|n| n.total_population()).collect();

        let mut probabilities = vec![vec![0.0; ages]; num_nodes];
        for sink in 0..num_nodes {
            for source in 0..num_nodes {
                if source == sink {
                    continue;
                }
                let flow_out = network.flow(sink, source);
                let flow_in = network.flow(source, sink);
                if flow_out == 0.0 && flow_in == 0.0 {
                    continue;
                }
                let beta_node = match self.beta_from {
                    BetaSource::Sink => sink,
                    BetaSource::Source => source,
                };
                let beta = disease.beta_with_npi(day, beta_node);

                for a1 in 0..ages {
                    let mut contacts_outbound = 0.0;
                    let mut contacts_inbound = 0.0;
                    for a2 in 0..ages {
                        let shared = beta[a1]
                            * self.rho
                            * self.contact_matrix[a1][a2]
                            * sigma[a1];
                        // Sink residents commuting into the source.
                        contacts_outbound += transmitting[source][a2] * shared
                            / self.flow_reduction[a1];
                        // Source residents commuting into the sink.
                        contacts_inbound += transmitting_inbound[source][a2] * shared
                            / self.flow_reduction[a2];
                    }
                    if populations[source] > 0.0 {
                        probabilities[sink][a1] +=
                            flow_out * contacts_outbound / populations[source];
                    }
                    if populations[sink] > 0.0 {
                        probabilities[sink][a1] +=
                            flow_in * contacts_inbound / populations[sink];
                    }
                }
            }
        }
        probabilities
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::disease::{DeterministicSeatird, DiseaseModel};
    use crate::model::{CompartmentSet, Network, RiskGroup, Stratum};
    use crate::npi::NpiSchedule;
    use crate::params::SeatirdParameters;

    fn two_node_network() -> Network {
        let mut net = Network::from_population(
            CompartmentSet::seatird(),
            &[(0, vec![1000.0]), (1, vec![1000.0])],
            &[0.0],
            None,
        )
        .unwrap();
        net.set_travel_flow(vec![vec![0.0, 0.2], vec![0.2, 0.0]]).unwrap();
        net
    }

    fn disease(num_nodes: usize) -> DeterministicSeatird {
        let rates = SeatirdParameters {
            r0: 1.5,
            beta_scale: 1.0,
            tau: 4.0,
            kappa: 4.0,
            chi: 4.0,
            gamma: 4.0,
            nu: vec![0.0],
            sigma: None,
        }
        .bind(1)
        .unwrap();
        DeterministicSeatird::new(rates, NpiSchedule::empty(30, num_nodes, 1), vec![vec![8.0]])
    }

    fn travel_params() -> TravelParameters {
        TravelParameters {
            rho: 1.0,
            flow_reduction: vec![2.0],
            beta_from: BetaSource::Sink,
            asymmetric_transmitting: false,
        }
    }

    fn infect(net: &mut Network, node: usize, count: f64) {
        let s = Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated);
        // Straight into I so transmitting is nonzero.
        net.nodes[node].compartments.transfer(s, 0, 4, count);
    }

    #[test]
    fn infected_source_exposes_connected_sink() {
        let mut net = two_node_network();
        infect(&mut net, 0, 100.0);
        let mut m = disease(2);
        let travel =
            BinomialTravel::new(&travel_params(), vec![vec![8.0]], 1).unwrap();
        let vax = VaccineModel::none(1);
        let mut rng = SmallRng::seed_from_u64(13);
        travel.travel(&mut net, &mut m, &vax, 1, &mut rng);
        let s = Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated);
        let exposed = net.nodes[1].compartments.get(s, 1);
        assert!(exposed > 0.0, "no travel exposures at sink");
        assert!((net.nodes[1].total_population() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn no_flow_means_no_exposure() {
        let mut net = two_node_network();
        net.set_travel_flow(vec![vec![0.0; 2]; 2]).unwrap();
        infect(&mut net, 0, 100.0);
        let mut m = disease(2);
        let travel =
            BinomialTravel::new(&travel_params(), vec![vec![8.0]], 1).unwrap();
        let vax = VaccineModel::none(1);
        let mut rng = SmallRng::seed_from_u64(13);
        travel.travel(&mut net, &mut m, &vax, 1, &mut rng);
        let s = Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated);
        assert_eq!(net.nodes[1].compartments.get(s, 1), 0.0);
    }

    #[test]
    fn zero_rho_disables_travel() {
        let mut net = two_node_network();
        infect(&mut net, 0, 100.0);
        let mut params = travel_params();
        params.rho = 0.0;
        let mut m = disease(2);
        let travel = BinomialTravel::new(&params, vec![vec![8.0]], 1).unwrap();
        let vax = VaccineModel::none(1);
        let mut rng = SmallRng::seed_from_u64(13);
        travel.travel(&mut net, &mut m, &vax, 1, &mut rng);
        let s = Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated);
        assert_eq!(net.nodes[1].compartments.get(s, 1), 0.0);
    }

    #[test]
    fn full_vaccine_effectiveness_shields_vaccinated_stratum() {
        let mut net = two_node_network();
        infect(&mut net, 0, 200.0);
        // Half of the sink population is vaccinated.
        let s = Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated);
        let sink = &mut net.nodes[1];
        sink.compartments.set(s, 0, 500.0);
        sink.compartments.set(s.vaccinated(), 0, 500.0);

        let mut m = disease(2);
        let travel =
            BinomialTravel::new(&travel_params(), vec![vec![8.0]], 1).unwrap();
        let vax = VaccineModel::with_effectiveness(vec![1.0], vec![0.0]);
        let mut rng = SmallRng::seed_from_u64(13);
        travel.travel(&mut net, &mut m, &vax, 1, &mut rng);
        assert_eq!(net.nodes[1].compartments.get(s.vaccinated(), 1), 0.0);
        assert!(net.nodes[1].compartments.get(s, 1) > 0.0);
    }

    #[test]
    fn parameter_validation() {
        let mut p = travel_params();
        p.rho = 1.5;
        assert_eq!(
            BinomialTravel::new(&p, vec![vec![8.0]], 1).unwrap_err(),
            TravelError::RhoOutOfRange(1.5)
        );
        let mut p = travel_params();
        p.flow_reduction = vec![2.0, 2.0];
        assert!(matches!(
            BinomialTravel::new(&p, vec![vec![8.0]], 1).unwrap_err(),
            TravelError::WrongFlowReductionLength { .. }
        ));
        let mut p = travel_params();
        p.flow_reduction = vec![0.0];
        assert_eq!(
            BinomialTravel::new(&p, vec![vec![8.0]], 1).unwrap_err(),
            TravelError::NonPositiveFlowReduction(0.0)
        );
    }
}

//! Disease dynamics engines.
//!
//! Every engine advances one node one day in place. The deterministic
//! variants take a forward-Euler step over each stratum; the stochastic
//! variants draw their transitions from the realization's RNG. All of them
//! share the compartment schema, the NPI-modulated beta vector, the contact
//! matrix and the vaccine effectiveness lookup.

pub mod seatird;
pub mod seihrd;
pub mod seirs;
pub mod stochastic_seatird;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::model::{CompartmentSet, Network, Node, RiskGroup, Stratum, VaccineGroup};
use crate::npi::NpiSchedule;
use crate::params::{SeatirdRates, SeihrdRates, SeirsRates};
use crate::vaccine::VaccineModel;

pub use seatird::DeterministicSeatird;
pub use seihrd::StochasticSeihrd;
pub use seirs::DeterministicSeirs;
pub use stochastic_seatird::StochasticSeatird;

/// One seeding record from the config: expose `infected` people of
/// `age_group` in the node whose id is `county`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialInfection {
    pub county: u64,
    pub age_group: usize,
    pub infected: f64,
}

/// A disease dynamics engine (C4). Implementations mutate node state in
/// place and never fail: empty strata and numerical underflow are no-ops.
pub trait DiseaseModel {
    /// `(compartment index, weight)` pairs counted as transmitting.
    fn transmitting_weights(&self) -> &[(usize, f64)];

    /// Per-age relative susceptibility, used by the travel coupler.
    fn relative_susceptibility(&self) -> &[f64];

    /// Today's NPI-modulated per-age beta for a node.
    fn beta_with_npi(&self, now: usize, node_index: usize) -> Vec<f64>;

    /// Advance one node from day `now - 1` to day `now`.
    fn simulate(
        &mut self,
        node: &mut Node,
        now: usize,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    );

    /// Expose up to `count` susceptibles of a stratum at time `now`.
    /// Deterministic engines transfer S -> E in bulk; the event-driven
    /// engine additionally samples each individual's trajectory.
    fn expose(
        &mut self,
        node: &mut Node,
        stratum: Stratum,
        count: f64,
        now: usize,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    );

    /// Seed the epidemic from the config's initial-infected list. Exposures
    /// land in the unvaccinated low-risk stratum of the named age group.
    /// Also freezes each node's demographic group shares.
    fn set_initial_conditions(
        &mut self,
        initial: &[InitialInfection],
        network: &mut Network,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    ) -> Result<(), crate::model::NetworkBuildError> {
        for node in &mut network.nodes {
            node.rebuild_group_share();
        }
        for item in initial {
            let index = network.node_index_by_id(item.county)?;
            let stratum = Stratum::new(
                item.age_group,
                RiskGroup::Low,
                VaccineGroup::Unvaccinated,
            );
            self.expose(
                &mut network.nodes[index],
                stratum,
                item.infected,
                0,
                vaccine,
                rng,
            );
        }
        Ok(())
    }
}

/// Bound rates for the selected engine. Cloning is cheap enough to rebuild
/// a fresh engine per realization.
#[derive(Debug, Clone)]
pub enum DiseaseRates {
    SeirsDeterministic(SeirsRates),
    SeatirdDeterministic(SeatirdRates),
    SeatirdStochastic(SeatirdRates),
    SeihrdStochastic(SeihrdRates),
}

impl DiseaseRates {
    /// The frozen compartment label set this engine runs on.
    pub fn compartment_set(&self) -> CompartmentSet {
        match self {
            DiseaseRates::SeirsDeterministic(_) => DeterministicSeirs::compartment_set(),
            DiseaseRates::SeatirdDeterministic(_) => DeterministicSeatird::compartment_set(),
            DiseaseRates::SeatirdStochastic(_) => StochasticSeatird::compartment_set(),
            DiseaseRates::SeihrdStochastic(_) => StochasticSeihrd::compartment_set(),
        }
    }

    /// Construct the engine for one realization.
    pub fn build(
        &self,
        npi: NpiSchedule,
        contact_matrix: Vec<Vec<f64>>,
    ) -> Box<dyn DiseaseModel + Send> {
        match self {
            DiseaseRates::SeirsDeterministic(rates) => {
                Box::new(DeterministicSeirs::new(rates.clone(), npi, contact_matrix))
            }
            DiseaseRates::SeatirdDeterministic(rates) => {
                Box::new(DeterministicSeatird::new(rates.clone(), npi, contact_matrix))
            }
            DiseaseRates::SeatirdStochastic(rates) => {
                Box::new(StochasticSeatird::new(rates.clone(), npi, contact_matrix))
            }
            DiseaseRates::SeihrdStochastic(rates) => {
                Box::new(StochasticSeihrd::new(rates.clone(), npi, contact_matrix))
            }
        }
    }
}

/// Force of infection accumulated over source strata, shared by the
/// deterministic engines and SEIHRD:
/// `sum_g' beta[a_s] * C[a_f][a_s] * w(g') / N`, where `w` is the caller's
/// per-stratum infectious weighting.
pub(crate) fn force_of_infection(
    node: &Node,
    focal_age: usize,
    beta_vector: &[f64],
    contact_matrix: &[Vec<f64>],
    total_population: f64,
    mut infectious: impl FnMut(Stratum) -> f64,
) -> f64 {
    let mut rate = 0.0;
    for contacted in node.compartments.strata() {
        let contact_rate = contact_matrix[focal_age][contacted.age];
        if contact_rate == 0.0 {
            continue;
        }
        rate += beta_vector[contacted.age] * contact_rate * infectious(contacted)
            / total_population;
    }
    rate
}

//! Deterministic SEIRS engine: forward-Euler step with optional waning
//! immunity. Vaccine effectiveness and relative susceptibility scale the
//! focal (susceptible) side of the force of infection.

use rand::RngCore;

use super::{DiseaseModel, force_of_infection};
use crate::model::{CompartmentSet, Node, Stratum, VaccineGroup};
use crate::npi::NpiSchedule;
use crate::params::SeirsRates;
use crate::vaccine::VaccineModel;

pub struct DeterministicSeirs {
    rates: SeirsRates,
    npi: NpiSchedule,
    contact_matrix: Vec<Vec<f64>>,
    transmitting: Vec<(usize, f64)>,
    s: usize,
    e: usize,
    i: usize,
    r: usize,
}

impl DeterministicSeirs {
    pub fn compartment_set() -> CompartmentSet {
        CompartmentSet::seirs()
    }

    pub fn new(rates: SeirsRates, npi: NpiSchedule, contact_matrix: Vec<Vec<f64>>) -> Self {
        let set = Self::compartment_set();
        let i = set.resolve("I");
        Self {
            rates,
            npi,
            contact_matrix,
            transmitting: vec![(i, 1.0)],
            s: set.resolve("S"),
            e: set.resolve("E"),
            i,
            r: set.resolve("R"),
        }
    }

    pub fn rates(&self) -> &SeirsRates {
        &self.rates
    }
}

/// One Euler step of the SEIRS system. `transmission_prob` already folds in
/// NPIs, vaccine effectiveness, contacts and the infectious fraction.
fn seirs_derivatives(
    y: &[f64],
    transmission_prob: f64,
    sigma: f64,
    gamma: f64,
    omega: f64,
) -> [f64; 4] {
    let (s, e, i, r) = (y[0], y[1], y[2], y[3]);
    let new_infections = (transmission_prob * s).min(s);
    [
        -new_infections + omega * r,
        new_infections - sigma * e,
        sigma * e - gamma * i,
        gamma * i - omega * r,
    ]
}

impl DiseaseModel for DeterministicSeirs {
    fn transmitting_weights(&self) -> &[(usize, f64)] {
        &self.transmitting
    }

    fn relative_susceptibility(&self) -> &[f64] {
        &self.rates.relative_susceptibility
    }

    fn beta_with_npi(&self, now: usize, node_index: usize) -> Vec<f64> {
        self.npi.beta_with_npi(self.rates.beta, now, node_index)
    }

    fn simulate(
        &mut self,
        node: &mut Node,
        now: usize,
        vaccine: &VaccineModel,
        _rng: &mut dyn RngCore,
    ) {
        let total_population = node.total_population();
        if total_population <= 0.0 {
            return;
        }
        let today = node.compartments.clone();
        let beta_vector = self.beta_with_npi(now, node.node_index);

        for focal in today.strata() {
            let row = today.row(focal);
            if row.iter().sum::<f64>() == 0.0 {
                continue;
            }
            let ve = match focal.vaccine {
                VaccineGroup::Vaccinated => vaccine.effectiveness(focal.age),
                VaccineGroup::Unvaccinated => 0.0,
            };

            let mut rate = force_of_infection(
                node,
                focal.age,
                &beta_vector,
                &self.contact_matrix,
                total_population,
                |contacted| today.get(contacted, self.i),
            );
            rate *= (1.0 - ve) * self.rates.relative_susceptibility[focal.age];
            rate = rate.max(0.0);
            let transmission_prob = 1.0 - (-rate).exp();

            let d = seirs_derivatives(
                row,
                transmission_prob,
                self.rates.sigma,
                self.rates.gamma,
                self.rates.omega,
            );
            let next = [
                row[self.s] + d[0],
                row[self.e] + d[1],
                row[self.i] + d[2],
                row[self.r] + d[3],
            ];
            node.compartments.set_row(focal, &next);
        }
    }

    fn expose(
        &mut self,
        node: &mut Node,
        stratum: Stratum,
        count: f64,
        _now: usize,
        _vaccine: &VaccineModel,
        _rng: &mut dyn RngCore,
    ) {
        node.compartments.expose_bulk(stratum, count);
    }
}

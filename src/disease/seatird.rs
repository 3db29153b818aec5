//! Deterministic SEATIRD engine: forward-Euler step over
//! `[S, E, A, T, I, R, D]`. Vaccine effectiveness and relative
//! susceptibility scale the source (contacted) side of the force of
//! infection, and the rate is applied directly without conversion to a
//! probability. Both conventions match the calibrated parameter sets this
//! model family ships with.

use rand::RngCore;

use super::{DiseaseModel, force_of_infection};
use crate::model::{CompartmentSet, Node, Stratum, VaccineGroup};
use crate::npi::NpiSchedule;
use crate::params::SeatirdRates;
use crate::vaccine::VaccineModel;

pub struct DeterministicSeatird {
    rates: SeatirdRates,
    npi: NpiSchedule,
    contact_matrix: Vec<Vec<f64>>,
    transmitting: Vec<(usize, f64)>,
    a: usize,
    t: usize,
    i: usize,
}

impl DeterministicSeatird {
    pub fn compartment_set() -> CompartmentSet {
        CompartmentSet::seatird()
    }

    pub fn new(rates: SeatirdRates, npi: NpiSchedule, contact_matrix: Vec<Vec<f64>>) -> Self {
        let set = Self::compartment_set();
        let (a, t, i) = (set.resolve("A"), set.resolve("T"), set.resolve("I"));
        Self {
            rates,
            npi,
            contact_matrix,
            transmitting: vec![(a, 1.0), (t, 1.0), (i, 1.0)],
            a,
            t,
            i,
        }
    }

    pub fn rates(&self) -> &SeatirdRates {
        &self.rates
    }
}

/// Derivatives of the SEATIRD system for one stratum.
///
/// `transmission_rate` folds in NPIs, vaccine effectiveness, contacts,
/// relative susceptibility and the transmitting fraction of the node.
/// New infections are capped at S so the compartment cannot go negative.
pub fn seatird_derivatives(
    y: &[f64],
    transmission_rate: f64,
    tau: f64,
    kappa: f64,
    chi: f64,
    gamma: f64,
    nu: f64,
) -> [f64; 7] {
    let (s, e, a, t, i) = (y[0], y[1], y[2], y[3], y[4]);
    let new_infections = (transmission_rate * s).min(s);
    [
        -new_infections,
        new_infections - tau * e,
        tau * e - (kappa + gamma + nu) * a,
        kappa * a - (chi + gamma + nu) * t,
        chi * t - (gamma + nu) * i,
        gamma * (a + t + i),
        nu * (a + t + i),
    ]
}

impl DiseaseModel for DeterministicSeatird {
    fn transmitting_weights(&self) -> &[(usize, f64)] {
        &self.transmitting
    }

    fn relative_susceptibility(&self) -> &[f64] {
        &self.rates.sigma
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
            let nu = self.rates.nu[focal.age][focal.risk.index()];

            let transmission_rate = force_of_infection(
                node,
                focal.age,
                &beta_vector,
                &self.contact_matrix,
                total_population,
                |contacted| {
                    let ve = match contacted.vaccine {
                        VaccineGroup::Vaccinated => vaccine.effectiveness(contacted.age),
                        VaccineGroup::Unvaccinated => 0.0,
                    };
                    let r = today.row(contacted);
                    (1.0 - ve)
                        * self.rates.sigma[contacted.age]
                        * (r[self.a] + r[self.t] + r[self.i])
                },
            )
            .max(0.0);

            let d = seatird_derivatives(
                row,
                transmission_rate,
                self.rates.tau,
                self.rates.kappa,
                self.rates.chi,
                self.rates.gamma,
                nu,
            );
            let next: Vec<f64> = row.iter().zip(d).map(|(y, dy)| y + dy).collect();
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

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::model::{Network, RiskGroup};
    use crate::params::SeatirdParameters;

    fn reference_params() -> SeatirdParameters {
        SeatirdParameters {
            r0: 1.0,
            beta_scale: 1.0,
            tau: 4.0,
            kappa: 4.0,
            chi: 4.0,
            gamma: 4.0,
            nu: vec![0.25, 0.25],
            sigma: Some(vec![1.0, 1.0]),
        }
    }

    fn two_age_network() -> Network {
        Network::from_population(
            CompartmentSet::seatird(),
            &[(0, vec![10.0, 10.0])],
            &[0.0, 0.0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn two_day_single_exposure_trajectory() {
        let mut net = two_age_network();
        let rates = reference_params().bind(2).unwrap();
        let mut m = DeterministicSeatird::new(
            rates,
            NpiSchedule::empty(2, 1, 2),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        let vax = VaccineModel::none(2);
        let mut rng = SmallRng::seed_from_u64(1);
        m.set_initial_conditions(
            &[crate::disease::InitialInfection {
                county: 0,
                age_group: 0,
                infected: 1.0,
            }],
            &mut net,
            &vax,
            &mut rng,
        )
        .unwrap();

        let node = &mut net.nodes[0];
        m.simulate(node, 0, &vax, &mut rng);

        let totals = node.compartments.compartment_totals();
        // One person was seeded out of S; E -> A flow is at most tau * E = 0.25.
        assert!((totals[0] - 19.0).abs() < 1e-2, "S day 1 = {}", totals[0]);
        assert!(totals[2] <= 0.25 + 1e-9, "A day 1 = {}", totals[2]);

        m.simulate(node, 1, &vax, &mut rng);
        let totals = node.compartments.compartment_totals();
        let expected: [f64; 7] = [18.8875, 0.675, 0.25, 0.0625, 0.0, 0.0625, 0.0625];
        for (label, (&got, &want)) in ["S", "E", "A", "T", "I", "R", "D"]
            .iter()
            .zip(totals.iter().zip(expected.iter()))
        {
            let tol = want.abs() * 1e-3 + 1e-4;
            assert!(
                (got - want).abs() <= tol,
                "{label}: got {got}, want {want}"
            );
        }
    }

    #[test]
    fn euler_step_conserves_mass_without_deaths() {
        let y = [9.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let d = seatird_derivatives(&y, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0);
        let before: f64 = y.iter().sum();
        let after: f64 = y.iter().zip(d).map(|(a, b)| a + b).sum();
        assert!((before - after).abs() < 1e-6);
    }

    #[test]
    fn deaths_accumulate_in_absorbing_compartment() {
        let mut net = two_age_network();
        let rates = reference_params().bind(2).unwrap();
        let mut m = DeterministicSeatird::new(
            rates,
            NpiSchedule::empty(30, 1, 2),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        );
        let vax = VaccineModel::none(2);
        let mut rng = SmallRng::seed_from_u64(1);
        let node = &mut net.nodes[0];
        let stratum = Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated);
        node.compartments.expose_bulk(stratum, 5.0);
        for day in 1..=30 {
            m.simulate(node, day, &vax, &mut rng);
        }
        let totals = node.compartments.compartment_totals();
        assert!(totals[6] > 0.0, "expected deaths, got {totals:?}");
        // Total population including D stays fixed.
        assert!((node.total_population() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn zero_beta_freezes_susceptibles() {
        let mut net = two_age_network();
        let mut params = reference_params();
        params.r0 = 0.0;
        let rates = params.bind(2).unwrap();
        let mut m = DeterministicSeatird::new(
            rates,
            NpiSchedule::empty(5, 1, 2),
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        );
        let vax = VaccineModel::none(2);
        let mut rng = SmallRng::seed_from_u64(1);
        let node = &mut net.nodes[0];
        let stratum = Stratum::new(1, RiskGroup::Low, VaccineGroup::Unvaccinated);
        node.compartments.transfer(stratum, 0, 4, 3.0);
        let s_before = node.compartments.compartment_totals()[0];
        for day in 1..=5 {
            m.simulate(node, day, &vax, &mut rng);
        }
        let s_after = node.compartments.compartment_totals()[0];
        assert!((s_before - s_after).abs() < 1e-12);
    }
}

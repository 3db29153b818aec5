//! Stochastic SEIHRD engine over `[S, E, IA, IP, IS, H, R, D]`.
//!
//! A per-stratum chain-binomial step: integer state, Poisson channel draws
//! clamped at the source counts, and two-way-split-corrected branch
//! fractions so the realized IS->H and H->D fractions match the configured
//! proportions. Vaccine effectiveness splits into an infection component
//! (focal susceptible side) and a hospitalization component (IS->H rate).

use rand::RngCore;

use super::{DiseaseModel, force_of_infection};
use crate::model::{CompartmentSet, Node, Stratum, VaccineGroup};
use crate::npi::NpiSchedule;
use crate::params::SeihrdRates;
use crate::rng::rand_poisson;
use crate::vaccine::VaccineModel;

#[derive(Debug, Clone, Copy)]
struct CompartmentIndices {
    s: usize,
    e: usize,
    ia: usize,
    ip: usize,
    is: usize,
    h: usize,
    r: usize,
    d: usize,
}

pub struct StochasticSeihrd {
    rates: SeihrdRates,
    npi: NpiSchedule,
    contact_matrix: Vec<Vec<f64>>,
    transmitting: Vec<(usize, f64)>,
    idx: CompartmentIndices,
}

impl StochasticSeihrd {
    pub fn compartment_set() -> CompartmentSet {
        CompartmentSet::seihrd()
    }

    pub fn new(rates: SeihrdRates, npi: NpiSchedule, contact_matrix: Vec<Vec<f64>>) -> Self {
        let set = Self::compartment_set();
        let idx = CompartmentIndices {
            s: set.resolve("S"),
            e: set.resolve("E"),
            ia: set.resolve("IA"),
            ip: set.resolve("IP"),
            is: set.resolve("IS"),
            h: set.resolve("H"),
            r: set.resolve("R"),
            d: set.resolve("D"),
        };
        let transmitting = vec![
            (idx.ia, rates.rel_inf_ia_to_is),
            (idx.ip, rates.rel_inf_ip_to_is),
            (idx.is, 1.0),
        ];
        Self {
            rates,
            npi,
            contact_matrix,
            transmitting,
            idx,
        }
    }

    pub fn rates(&self) -> &SeihrdRates {
        &self.rates
    }
}

impl DiseaseModel for StochasticSeihrd {
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
        rng: &mut dyn RngCore,
    ) {
        let total_population = node.total_population();
        if total_population <= 0.0 {
            return;
        }
        let today = node.compartments.clone();
        let beta_vector = self.beta_with_npi(now, node.node_index);
        let idx = self.idx;

        for focal in today.strata() {
            let row = today.row(focal);
            if row.iter().sum::<f64>() == 0.0 {
                continue;
            }
            let (ve_inf, ve_hosp) = match focal.vaccine {
                VaccineGroup::Vaccinated => (
                    vaccine.effectiveness(focal.age),
                    vaccine.effectiveness_hosp(focal.age),
                ),
                VaccineGroup::Unvaccinated => (0.0, 0.0),
            };

            let prop_hosp = self.rates.prop_is_to_h[focal.risk.index()][focal.age];
            let prop_death = self.rates.prop_h_to_d[focal.age];
            let is_to_h_rate = prop_hosp * self.rates.is_to_h_rate * (1.0 - ve_hosp);
            let is_to_r_rate = (1.0 - prop_hosp) * self.rates.is_to_r_rate;
            let h_to_d_rate = prop_death * self.rates.h_to_d_rate;
            let h_to_r_rate = (1.0 - prop_death) * self.rates.h_to_r_rates[focal.age];

            let mut transmission_rate = force_of_infection(
                node,
                focal.age,
                &beta_vector,
                &self.contact_matrix,
                total_population,
                |contacted| {
                    let r = today.row(contacted);
                    self.rates.rel_inf_ip_to_is * r[idx.ip]
                        + self.rates.rel_inf_ia_to_is * r[idx.ia]
                        + r[idx.is]
                },
            );
            transmission_rate *=
                (1.0 - ve_inf) * self.rates.relative_susceptibility[focal.age];
            transmission_rate = transmission_rate.max(0.0);

            // Integer state for the channel draws.
            let s = row[idx.s].floor();
            let e = row[idx.e].floor();
            let ia = row[idx.ia].floor();
            let ip = row[idx.ip].floor();
            let is = row[idx.is].floor();
            let h = row[idx.h].floor();

            let new_infections = rand_poisson(transmission_rate * s, rng).min(s);
            let e_out = rand_poisson(self.rates.e_out_rate * e, rng).min(e);
            let e_to_ia = (self.rates.prop_e_to_ia[focal.age] * e_out).floor();
            let e_to_ip = e_out - e_to_ia;
            let ip_to_is = rand_poisson(self.rates.ip_to_is_rate * ip, rng).min(ip);
            let ia_to_r = rand_poisson(self.rates.ia_to_r_rate * ia, rng).min(ia);

            // IS split: draw the target branch first, then the competing
            // branch from the remainder.
            let is_to_h = rand_poisson(is_to_h_rate * is, rng).min(is);
            let remaining_is = is - is_to_h;
            let is_to_r = rand_poisson(is_to_r_rate * remaining_is, rng).min(remaining_is);

            // Same pattern for H.
            let h_to_d = rand_poisson(h_to_d_rate * h, rng).min(h);
            let remaining_h = h - h_to_d;
            let h_to_r = rand_poisson(h_to_r_rate * remaining_h, rng).min(remaining_h);

            let mut next = row.to_vec();
            next[idx.s] += -new_infections;
            next[idx.e] += new_infections - e_to_ia - e_to_ip;
            next[idx.ia] += e_to_ia - ia_to_r;
            next[idx.ip] += e_to_ip - ip_to_is;
            next[idx.is] += ip_to_is - is_to_h - is_to_r;
            next[idx.h] += is_to_h - h_to_d - h_to_r;
            next[idx.d] += h_to_d;
            next[idx.r] += is_to_r + h_to_r + ia_to_r;
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
        node.compartments.expose_bulk(stratum, count.floor());
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::model::{Network, RiskGroup};
    use crate::params::SeihrdParameters;

    fn params() -> SeihrdParameters {
        SeihrdParameters {
            r0: 2.5,
            e_to_ip_and_ia_days: 3.0,
            ip_to_is_days: 2.0,
            is_to_h_days: 8.0,
            h_to_d_days: 10.0,
            h_to_r_days: vec![7.0],
            is_to_r_days: 5.0,
            ia_to_r_days: 5.0,
            prop_e_to_ia: vec![0.4],
            highrisk_hosp_multiplier: 3.0,
            prop_is_to_h_lowrisk: vec![0.1],
            prop_h_to_d: vec![0.2],
            rel_inf_ip_to_is: 1.0,
            rel_inf_ia_to_is: 0.5,
            relative_susceptibility: None,
        }
    }

    fn build(pop: f64) -> (Network, StochasticSeihrd) {
        let contact = vec![vec![12.0]];
        let rates = params().bind(1, &contact).unwrap();
        let net = Network::from_population(
            CompartmentSet::seihrd(),
            &[(0, vec![pop])],
            &[0.0],
            None,
        )
        .unwrap();
        let m = StochasticSeihrd::new(rates, NpiSchedule::empty(120, 1, 1), contact);
        (net, m)
    }

    fn stratum() -> Stratum {
        Stratum::new(0, RiskGroup::Low, VaccineGroup::Unvaccinated)
    }

    #[test]
    fn outbreak_conserves_mass_and_integrality() {
        let (mut net, mut m) = build(2000.0);
        let vax = VaccineModel::none(1);
        let mut rng = SmallRng::seed_from_u64(5);
        let mut seed_rng = SmallRng::seed_from_u64(6);
        m.expose(&mut net.nodes[0], stratum(), 20.0, 0, &vax, &mut seed_rng);

        for day in 1..=120 {
            m.simulate(&mut net.nodes[0], day, &vax, &mut rng);
            let node = &net.nodes[0];
            assert!(
                (node.total_population() - 2000.0).abs() < 1e-9,
                "mass drift on day {day}"
            );
            for s in node.compartments.strata() {
                for &v in node.compartments.row(s) {
                    assert!(v >= 0.0, "negative count on day {day}");
                    assert!((v - v.round()).abs() < 1e-9, "fractional count {v}");
                }
            }
        }
        let totals = net.nodes[0].compartments.compartment_totals();
        // Epidemic actually ran: recoveries and hospital outcomes exist.
        assert!(totals[6] > 0.0, "no recoveries: {totals:?}");
    }

    #[test]
    fn hospitalizations_and_deaths_appear_in_large_outbreak() {
        let (mut net, mut m) = build(20_000.0);
        let vax = VaccineModel::none(1);
        let mut rng = SmallRng::seed_from_u64(5);
        m.expose(&mut net.nodes[0], stratum(), 100.0, 0, &vax, &mut rng);
        for day in 1..=150 {
            m.simulate(&mut net.nodes[0], day, &vax, &mut rng);
        }
        let totals = net.nodes[0].compartments.compartment_totals();
        let d = totals[7];
        assert!(d > 0.0, "expected deaths in a 20k outbreak: {totals:?}");
    }

    #[test]
    fn hospitalization_ve_reduces_admissions() {
        let run = |ve_hosp: f64, seed: u64| {
            let (mut net, mut m) = build(10_000.0);
            // Everyone vaccinated.
            let node = &mut net.nodes[0];
            let s = stratum();
            let pop = node.compartments.get(s, 0);
            node.compartments.set(s, 0, 0.0);
            node.compartments.set(s.vaccinated(), 0, pop);
            let vax = VaccineModel::with_effectiveness(vec![0.0], vec![ve_hosp]);
            let mut rng = SmallRng::seed_from_u64(seed);
            m.expose(node, s.vaccinated(), 50.0, 0, &vax, &mut rng);
            let mut cumulative_h = 0.0;
            for day in 1..=100 {
                m.simulate(node, day, &vax, &mut rng);
                cumulative_h += node.compartments.get(s.vaccinated(), 5);
            }
            cumulative_h
        };
        let with_ve: f64 = (0..5).map(|s| run(0.9, s)).sum();
        let without: f64 = (0..5).map(|s| run(0.0, s)).sum();
        assert!(
            with_ve < without * 0.6,
            "hospital VE had no effect: {with_ve} vs {without}"
        );
    }

    #[test]
    fn zero_population_node_is_noop() {
        let contact = vec![vec![12.0]];
        let rates = params().bind(1, &contact).unwrap();
        let mut net = Network::from_population(
            CompartmentSet::seihrd(),
            &[(0, vec![0.0])],
            &[0.0],
            None,
        )
        .unwrap();
        let mut m = StochasticSeihrd::new(rates, NpiSchedule::empty(5, 1, 1), contact);
        let vax = VaccineModel::none(1);
        let mut rng = SmallRng::seed_from_u64(1);
        m.simulate(&mut net.nodes[0], 1, &vax, &mut rng);
        assert_eq!(net.nodes[0].total_population(), 0.0);
    }
}

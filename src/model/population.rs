use serde::{Deserialize, Serialize};

use super::compartments::CompartmentSet;
use super::stratum::{
    NUM_RISK_GROUPS, NUM_VACCINE_GROUPS, RiskGroup, Stratum, VaccineGroup, all_strata,
};

/// Dense per-node compartment tensor indexed by
/// `(age, risk, vaccine, compartment)`.
///
/// Counts are real-valued: the deterministic engines take fractional Euler
/// steps, the stochastic engines keep whole numbers in the same container.
/// Deaths are an absorbing compartment and are never subtracted, so
/// [`PopulationCompartments::total_population`] is constant over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationCompartments {
    num_age_groups: usize,
    num_compartments: usize,
    s_index: usize,
    e_index: usize,
    data: Vec<f64>,
}

impl PopulationCompartments {
    /// Build the tensor from per-age populations and per-age high-risk
    /// ratios. Everyone starts susceptible and unvaccinated; each age group
    /// is split `low = pop * (1 - ratio)`, `high = pop - low`.
    pub fn new(set: &CompartmentSet, age_group_pops: &[f64], high_risk_ratios: &[f64]) -> Self {
        assert_eq!(
            age_group_pops.len(),
            high_risk_ratios.len(),
            "age group populations and high-risk ratios must have the same length"
        );
        let num_age_groups = age_group_pops.len();
        let num_compartments = set.len();
        let mut this = Self {
            num_age_groups,
            num_compartments,
            s_index: set.resolve("S"),
            e_index: set.resolve("E"),
            data: vec![
                0.0;
                num_age_groups * NUM_RISK_GROUPS * NUM_VACCINE_GROUPS * num_compartments
            ],
        };
        for (age, (&pop, &ratio)) in age_group_pops.iter().zip(high_risk_ratios).enumerate() {
            let low = pop * (1.0 - ratio);
            let high = pop - low;
            let s = this.s_index;
            this.set(
                Stratum::new(age, RiskGroup::Low, VaccineGroup::Unvaccinated),
                s,
                low,
            );
            this.set(
                Stratum::new(age, RiskGroup::High, VaccineGroup::Unvaccinated),
                s,
                high,
            );
        }
        this
    }

    pub fn num_age_groups(&self) -> usize {
        self.num_age_groups
    }

    pub fn num_compartments(&self) -> usize {
        self.num_compartments
    }

    pub fn susceptible_index(&self) -> usize {
        self.s_index
    }

    pub fn exposed_index(&self) -> usize {
        self.e_index
    }

    fn offset(&self, stratum: Stratum) -> usize {
        debug_assert!(stratum.age < self.num_age_groups);
        ((stratum.age * NUM_RISK_GROUPS + stratum.risk.index()) * NUM_VACCINE_GROUPS
            + stratum.vaccine.index())
            * self.num_compartments
    }

    /// Compartment counts for one stratum, in label order.
    pub fn row(&self, stratum: Stratum) -> &[f64] {
        let o = self.offset(stratum);
        &self.data[o..o + self.num_compartments]
    }

    pub fn row_mut(&mut self, stratum: Stratum) -> &mut [f64] {
        let o = self.offset(stratum);
        &mut self.data[o..o + self.num_compartments]
    }

    pub fn set_row(&mut self, stratum: Stratum, values: &[f64]) {
        self.row_mut(stratum).copy_from_slice(values);
    }

    pub fn get(&self, stratum: Stratum, compartment: usize) -> f64 {
        self.row(stratum)[compartment]
    }

    pub fn set(&mut self, stratum: Stratum, compartment: usize, value: f64) {
        self.row_mut(stratum)[compartment] = value;
    }

    /// Move up to `amount` from one compartment to another within a stratum,
    /// clamped at the source count. Returns the amount actually moved.
    pub fn transfer(&mut self, stratum: Stratum, from: usize, to: usize, amount: f64) -> f64 {
        let row = self.row_mut(stratum);
        let moved = amount.min(row[from]).max(0.0);
        row[from] -= moved;
        row[to] += moved;
        moved
    }

    /// Move one individual between compartments, clamped at the source.
    pub fn move_one(&mut self, stratum: Stratum, from: usize, to: usize) -> bool {
        self.transfer(stratum, from, to, 1.0) > 0.0
    }

    /// Bulk S -> E transfer used by initial seeding and travel exposure.
    /// Returns the number actually exposed (never more than S).
    pub fn expose_bulk(&mut self, stratum: Stratum, count: f64) -> f64 {
        self.transfer(stratum, self.s_index, self.e_index, count)
    }

    /// All-compartment population of one stratum.
    pub fn demographic_population(&self, stratum: Stratum) -> f64 {
        self.row(stratum).iter().sum()
    }

    /// Total node population including the absorbing compartments.
    pub fn total_population(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Population of one age group across risk and vaccine strata.
    pub fn age_group_population(&self, age: usize) -> f64 {
        RiskGroup::ALL
            .into_iter()
            .flat_map(|risk| {
                VaccineGroup::ALL.into_iter().map(move |vaccine| {
                    self.demographic_population(Stratum::new(age, risk, vaccine))
                })
            })
            .sum()
    }

    /// Weighted transmitting population per age:
    /// `sum_c w_c * count_c` over the given `(compartment, weight)` pairs.
    pub fn transmitting_per_age(&self, weights: &[(usize, f64)]) -> Vec<f64> {
        let mut out = vec![0.0; self.num_age_groups];
        for stratum in self.strata() {
            let row = self.row(stratum);
            out[stratum.age] += weights.iter().map(|&(c, w)| w * row[c]).sum::<f64>();
        }
        out
    }

    /// Aggregate weighted transmitting population.
    pub fn transmitting_total(&self, weights: &[(usize, f64)]) -> f64 {
        self.transmitting_per_age(weights).iter().sum()
    }

    /// Per-compartment totals across all strata, in label order.
    pub fn compartment_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.num_compartments];
        for stratum in self.strata() {
            for (t, v) in totals.iter_mut().zip(self.row(stratum)) {
                *t += v;
            }
        }
        totals
    }

    /// Named per-compartment totals for the output writer.
    pub fn compartment_summary(&self, set: &CompartmentSet) -> Vec<(String, f64)> {
        set.labels()
            .iter()
            .cloned()
            .zip(self.compartment_totals())
            .collect()
    }

    /// Canonical stratum enumeration.
    pub fn strata(&self) -> impl Iterator<Item = Stratum> {
        all_strata(self.num_age_groups)
    }

    /// Eligible `(age, risk, count)` triples under a priority vector.
    ///
    /// `priority[a]` is 0 (age excluded), 0.5 (high-risk only) or 1 (all
    /// risks). `only_unvaccinated` restricts to the U stratum;
    /// `only_susceptible` counts only the S compartment instead of the whole
    /// stratum.
    pub fn eligible_by_group(
        &self,
        priority: &[f64],
        only_unvaccinated: bool,
        only_susceptible: bool,
    ) -> Vec<(usize, RiskGroup, f64)> {
        assert_eq!(priority.len(), self.num_age_groups);
        let mut out = Vec::new();
        for age in 0..self.num_age_groups {
            if priority[age] <= 0.0 {
                continue;
            }
            for risk in RiskGroup::ALL {
                if priority[age] < 1.0 && risk == RiskGroup::Low {
                    continue;
                }
                let mut count = 0.0;
                for vaccine in VaccineGroup::ALL {
                    if only_unvaccinated && vaccine == VaccineGroup::Vaccinated {
                        continue;
                    }
                    let stratum = Stratum::new(age, risk, vaccine);
                    count += if only_susceptible {
                        self.get(stratum, self.s_index)
                    } else {
                        self.demographic_population(stratum)
                    };
                }
                out.push((age, risk, count));
            }
        }
        out
    }

    /// Scalar eligible population under a priority vector.
    pub fn eligible_population(
        &self,
        priority: &[f64],
        only_unvaccinated: bool,
        only_susceptible: bool,
    ) -> f64 {
        self.eligible_by_group(priority, only_unvaccinated, only_susceptible)
            .iter()
            .map(|&(_, _, count)| count)
            .sum()
    }
}

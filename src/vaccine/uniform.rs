//! Uniform stockpile allocator: each node draws doses in proportion to its
//! share of the total population, and doses spread over unvaccinated
//! susceptible strata weighted by group size and adherence. Simpler and
//! greedier than the age/risk allocator; no rollover, no decay.

use std::collections::BTreeMap;

use tracing::warn;

use crate::model::{Network, Node, Stratum, VaccineGroup};

use super::{VaccineError, VaccineParameters, check_unit_vector, stockpile_by_effective_day};

#[derive(Debug, Clone)]
pub struct UniformStockpile {
    adherence: Vec<f64>,
    stockpile_by_day: BTreeMap<usize, f64>,
    total_population: f64,
}

impl UniformStockpile {
    pub fn new(params: &VaccineParameters, network: &Network) -> Result<Self, VaccineError> {
        let ages = network.num_age_groups();
        check_unit_vector("vaccine_adherence", &params.vaccine_adherence, ages)?;
        Ok(Self {
            adherence: params.vaccine_adherence.clone(),
            stockpile_by_day: stockpile_by_effective_day(
                &params.vaccine_stockpile,
                params.vaccine_eff_lag_days,
            )?,
            total_population: network.total_population(),
        })
    }

    /// Administer this node's population-proportional share of today's
    /// stockpile.
    pub fn distribute_to_population(&mut self, node: &mut Node, day: usize) {
        let Some(&stockpile_today) = self.stockpile_by_day.get(&day) else {
            return;
        };
        if self.total_population <= 0.0 {
            warn!("total population is zero; skipping vaccination");
            return;
        }
        let node_population = node.total_population();
        if node_population <= 0.0 {
            return;
        }
        let node_share =
            (stockpile_today * node_population / self.total_population).round();
        if node_share <= 0.0 {
            return;
        }
        let node_share = node_share.min(stockpile_today);
        if let Some(slot) = self.stockpile_by_day.get_mut(&day) {
            *slot -= node_share;
        }
        self.allocate_within_node(node, node_share);
    }

    fn allocate_within_node(&self, node: &mut Node, available: f64) {
        let s_index = node.compartments.susceptible_index();
        let eligible: Vec<(Stratum, f64)> = node
            .compartments
            .strata()
            .filter(|s| s.vaccine == VaccineGroup::Unvaccinated)
            .map(|s| (s, node.compartments.get(s, s_index)))
            .filter(|&(_, susceptible)| susceptible > 0.0)
            .collect();
        let total_susceptible: f64 = eligible.iter().map(|&(_, s)| s).sum();
        if total_susceptible <= 0.0 || available <= 0.0 {
            return;
        }

        let mut remaining = available;
        let last = eligible.len() - 1;
        for (i, (stratum, susceptible)) in eligible.into_iter().enumerate() {
            let count = if i == last {
                remaining
            } else {
                let proportion = susceptible / total_susceptible;
                (remaining * proportion * self.adherence[stratum.age])
                    .round()
                    .min(remaining)
            };
            let count = count.min(susceptible).round();
            let from_value = node.compartments.get(stratum, s_index);
            let moved = count.min(from_value);
            node.compartments.set(stratum, s_index, from_value - moved);
            let target = stratum.vaccinated();
            let to_value = node.compartments.get(target, s_index);
            node.compartments.set(target, s_index, to_value + moved);
            remaining -= moved;
            if remaining <= 0.0 {
                break;
            }
        }
    }
}

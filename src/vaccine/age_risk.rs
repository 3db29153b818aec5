//! Two-stage age/risk stockpile allocator.
//!
//! Stage one spreads the network stockpile across nodes in proportion to
//! their priority-eligible populations, whole doses only, leftovers by
//! largest fractional remainder with ties broken by node index. Stage two
//! administers each node's stockpile to its `(age, risk)` strata under the
//! adherence ceiling, daily capacity, optional half-life decay and
//! next-day rollover.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::{Network, Node, Stratum, VaccineGroup};

use super::{EPS, VaccineError, VaccineParameters, check_unit_vector, stockpile_by_effective_day};

#[derive(Debug, Clone)]
pub struct AgeRiskStockpile {
    priority: Vec<f64>,
    adherence: Vec<f64>,
    /// Surviving fraction per day of storage, `0.5^(1 / half_life)`.
    daily_decay: Option<f64>,
    capacity: f64,
    network_stockpile: BTreeMap<usize, f64>,
    /// Per-node `{day -> doses}`, indexed by `node_index`.
    node_stockpile: Vec<BTreeMap<usize, f64>>,
}

struct GroupAllocation {
    stratum: Stratum,
    headroom: f64,
    expected: f64,
    alloc: f64,
    remainder: f64,
    max_extra: f64,
}

impl AgeRiskStockpile {
    pub fn new(params: &VaccineParameters, network: &Network) -> Result<Self, VaccineError> {
        let ages = network.num_age_groups();
        check_unit_vector("vaccine_adherence", &params.vaccine_adherence, ages)?;
        let priority = match &params.age_risk_priority_groups {
            Some(p) => {
                if p.len() != ages {
                    return Err(VaccineError::WrongLength {
                        field: "age_risk_priority_groups",
                        expected: ages,
                        actual: p.len(),
                    });
                }
                for &v in p {
                    if v != 0.0 && v != 0.5 && v != 1.0 {
                        return Err(VaccineError::InvalidPriority(v));
                    }
                }
                p.clone()
            }
            None => vec![1.0; ages],
        };
        if !(0.0..=1.0).contains(&params.vaccine_capacity_proportion) {
            return Err(VaccineError::OutOfUnitRange {
                field: "vaccine_capacity_proportion",
                value: params.vaccine_capacity_proportion,
            });
        }
        let daily_decay = params
            .vaccine_half_life_days
            .filter(|&h| h > 0.0)
            .map(|h| 0.5f64.powf(1.0 / h));
        Ok(Self {
            priority,
            adherence: params.vaccine_adherence.clone(),
            daily_decay,
            capacity: params.vaccine_capacity_proportion,
            network_stockpile: stockpile_by_effective_day(
                &params.vaccine_stockpile,
                params.vaccine_eff_lag_days,
            )?,
            node_stockpile: vec![BTreeMap::new(); network.num_nodes()],
        })
    }

    /// Doses waiting at a node for a given day. Test hook and report input.
    pub fn node_stockpile(&self, node_index: usize, day: usize) -> f64 {
        self.node_stockpile[node_index]
            .get(&day)
            .copied()
            .unwrap_or(0.0)
    }

    /// Stage one: network -> node allocation by eligible population share.
    pub fn distribute_to_nodes(&mut self, network: &Network, day: usize) {
        let Some(&stockpile_today) = self.network_stockpile.get(&day) else {
            return;
        };
        if stockpile_today <= 0.0 {
            return;
        }
        let eligible: Vec<f64> = network
            .nodes
            .iter()
            .map(|n| {
                n.compartments
                    .eligible_population(&self.priority, false, false)
            })
            .collect();
        let network_population: f64 = eligible.iter().sum();
        if network_population <= 0.0 {
            warn!("no eligible population in network; skipping vaccine allocation");
            return;
        }

        // Floors first, then leftovers by largest fractional remainder with
        // node order breaking ties.
        let mut allocations: Vec<(usize, f64, f64)> = eligible
            .iter()
            .enumerate()
            .map(|(index, &pop)| {
                let share = stockpile_today * pop / network_population;
                (index, share.floor(), share - share.floor())
            })
            .collect();
        let total_floor: f64 = allocations.iter().map(|&(_, floor, _)| floor).sum();
        let mut leftover = (stockpile_today - total_floor).round() as i64;

        allocations.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap().then(a.0.cmp(&b.0)));
        for allocation in allocations.iter_mut() {
            if leftover <= 0 {
                break;
            }
            allocation.1 += 1.0;
            leftover -= 1;
        }

        let mut granted = 0.0;
        for &(index, doses, _) in &allocations {
            if doses <= 0.0 {
                continue;
            }
            *self.node_stockpile[index].entry(day).or_insert(0.0) += doses;
            granted += doses;
        }
        if let Some(slot) = self.network_stockpile.get_mut(&day) {
            *slot -= granted;
        }
        debug!(day, granted, "allocated network stockpile to nodes");
    }

    /// Stage two: node -> strata allocation.
    pub fn distribute_to_population(&mut self, node: &mut Node, day: usize) {
        let mut stockpile = self.node_stockpile(node.node_index, day);
        if stockpile <= 0.0 {
            return;
        }

        // Day 0 stock is delivered undecayed: it models pre-epidemic
        // coverage rather than doses sitting in storage.
        if let Some(decay) = self.daily_decay
            && day > 0
        {
            stockpile *= decay;
            self.node_stockpile[node.node_index].insert(day, stockpile);
        }

        let total_population = node.total_population();
        let given_today = if day > 0 || self.capacity < 1.0 {
            stockpile.min((self.capacity * total_population).floor())
        } else {
            stockpile.min(total_population)
        };
        let over_capacity = stockpile - given_today;

        let not_distributed = self.allocate_within_node(node, given_today);
        let rollover = over_capacity + not_distributed;
        if rollover > 0.0 {
            *self.node_stockpile[node.node_index]
                .entry(day + 1)
                .or_insert(0.0) += rollover;
            debug!(
                day,
                node = node.node_index,
                rollover,
                "rolled unused doses to the next day"
            );
        }
    }

    /// Distribute doses across eligible strata by adherence-aware headroom.
    /// Returns the whole doses that could not be used today; sub-integer
    /// residue is discarded.
    fn allocate_within_node(&self, node: &mut Node, available: f64) -> f64 {
        if available <= 0.0 {
            return available.max(0.0);
        }
        let eligible =
            node.compartments
                .eligible_by_group(&self.priority, true, true);
        if eligible.is_empty() {
            return available;
        }

        let mut groups: Vec<GroupAllocation> = Vec::with_capacity(eligible.len());
        let mut total_headroom = 0.0;
        for (age, risk, susceptible_unvax) in eligible {
            let stratum = Stratum::new(age, risk, VaccineGroup::Unvaccinated);
            let cumulative_vax = node
                .compartments
                .demographic_population(stratum.vaccinated());
            let group_total = node.compartments.demographic_population(stratum) + cumulative_vax;
            let cap_remaining = (self.adherence[age] * group_total - cumulative_vax).max(0.0);
            let headroom = susceptible_unvax.min(cap_remaining).max(0.0);
            total_headroom += headroom;
            groups.push(GroupAllocation {
                stratum,
                headroom,
                expected: 0.0,
                alloc: 0.0,
                remainder: 0.0,
                max_extra: 0.0,
            });
        }
        if total_headroom <= EPS {
            return available;
        }

        for group in groups.iter_mut() {
            group.expected = available * group.headroom / total_headroom;
            let bounded = group.expected.min(group.headroom);
            group.alloc = (bounded + EPS).floor();
            group.remainder = group.expected - (group.expected + EPS).floor();
            group.max_extra = (group.headroom - group.alloc).max(0.0);
        }

        let allocated: f64 = groups.iter().map(|g| g.alloc).sum();
        let mut leftover = ((available - allocated + EPS).floor()).max(0.0) as i64;
        if leftover > 0 {
            // Largest remainder first; the stable sort keeps canonical
            // stratum order for ties.
            let mut order: Vec<usize> = (0..groups.len())
                .filter(|&i| groups[i].max_extra > EPS && groups[i].remainder > EPS)
                .collect();
            order.sort_by(|&a, &b| groups[b].remainder.partial_cmp(&groups[a].remainder).unwrap());
            for i in order {
                if leftover <= 0 {
                    break;
                }
                groups[i].alloc += 1.0;
                groups[i].max_extra = (groups[i].max_extra - 1.0).max(0.0);
                leftover -= 1;
            }
        }

        let s_index = node.compartments.susceptible_index();
        let mut given = 0.0;
        for group in &groups {
            if group.alloc <= 0.0 {
                continue;
            }
            // U -> V move of susceptibles only.
            let row_from = group.stratum;
            let row_to = group.stratum.vaccinated();
            let amount = group
                .alloc
                .min(node.compartments.get(row_from, s_index));
            let from_value = node.compartments.get(row_from, s_index);
            node.compartments.set(row_from, s_index, from_value - amount);
            let to_value = node.compartments.get(row_to, s_index);
            node.compartments.set(row_to, s_index, to_value + amount);
            given += amount;
        }
        // Whole doses only; sub-integer residue from decay is discarded
        // rather than rolled.
        (available - given).max(0.0).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompartmentSet, Network, RiskGroup};
    use crate::vaccine::StockpileEntry;

    fn network(pops: &[(u64, f64)]) -> Network {
        let rows: Vec<(u64, Vec<f64>)> =
            pops.iter().map(|&(id, p)| (id, vec![p])).collect();
        Network::from_population(CompartmentSet::seatird(), &rows, &[0.0], None).unwrap()
    }

    fn params(stockpile: Vec<StockpileEntry>, lag: i64, adherence: f64) -> VaccineParameters {
        VaccineParameters {
            vaccine_effectiveness: vec![0.0],
            vaccine_adherence: vec![adherence],
            vaccine_eff_lag_days: lag,
            vaccine_stockpile: stockpile,
            ..VaccineParameters::default()
        }
    }

    fn vaccinated_susceptibles(node: &Node) -> f64 {
        let v = Stratum::new(0, RiskGroup::Low, VaccineGroup::Vaccinated);
        node.compartments.get(v, 0)
    }

    #[test]
    fn collapsed_stockpile_vaccinates_and_rolls_over() {
        // Entries (-80, 50), (-14, 100), (0, 25) with lag 14: day 0 holds
        // 150, day 14 holds 25. A 100-person node takes 100 on day 0 and
        // rolls 50 to day 1.
        let mut net = network(&[(0, 100.0)]);
        let p = params(
            vec![
                StockpileEntry {
                    day: -80,
                    amount: 50.0,
                },
                StockpileEntry {
                    day: -14,
                    amount: 100.0,
                },
                StockpileEntry {
                    day: 0,
                    amount: 25.0,
                },
            ],
            14,
            1.0,
        );
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        strategy.distribute_to_nodes(&net, 0);
        let node = &mut net.nodes[0];
        strategy.distribute_to_population(node, 0);

        assert_eq!(vaccinated_susceptibles(node), 100.0);
        assert_eq!(strategy.node_stockpile(0, 1), 50.0);
    }

    #[test]
    fn adherence_ceiling_limits_and_rolls() {
        // 100 people, adherence 0.5, 60 doses on day 0: 50 given, 10 rolled.
        let mut net = network(&[(0, 100.0)]);
        let p = params(
            vec![StockpileEntry {
                day: 0,
                amount: 60.0,
            }],
            0,
            0.5,
        );
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        strategy.distribute_to_nodes(&net, 0);
        let node = &mut net.nodes[0];
        strategy.distribute_to_population(node, 0);

        assert_eq!(vaccinated_susceptibles(node), 50.0);
        assert_eq!(strategy.node_stockpile(0, 1), 10.0);

        // Next day the ceiling is already reached: everything rolls again.
        strategy.distribute_to_nodes(&net, 1);
        let node = &mut net.nodes[0];
        strategy.distribute_to_population(node, 1);
        assert_eq!(vaccinated_susceptibles(node), 50.0);
        assert_eq!(strategy.node_stockpile(0, 2), 10.0);
    }

    #[test]
    fn network_allocation_uses_largest_remainder() {
        // 10 doses over eligible populations 100/100/50: shares are 4, 4, 2.
        let net = network(&[(0, 100.0), (1, 100.0), (2, 50.0)]);
        let p = params(
            vec![StockpileEntry {
                day: 0,
                amount: 10.0,
            }],
            0,
            1.0,
        );
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        strategy.distribute_to_nodes(&net, 0);
        assert_eq!(strategy.node_stockpile(0, 0), 4.0);
        assert_eq!(strategy.node_stockpile(1, 0), 4.0);
        assert_eq!(strategy.node_stockpile(2, 0), 2.0);
    }

    #[test]
    fn remainder_ties_break_by_node_index() {
        // 3 doses over equal populations: each share is 1.5; the two
        // leftover-eligible remainders tie and the lower index wins.
        let net = network(&[(7, 50.0), (8, 50.0)]);
        let p = params(
            vec![StockpileEntry {
                day: 0,
                amount: 3.0,
            }],
            0,
            1.0,
        );
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        strategy.distribute_to_nodes(&net, 0);
        assert_eq!(strategy.node_stockpile(0, 0), 2.0);
        assert_eq!(strategy.node_stockpile(1, 0), 1.0);
    }

    #[test]
    fn capacity_caps_daily_throughput() {
        let mut net = network(&[(0, 100.0)]);
        let mut p = params(
            vec![StockpileEntry {
                day: 0,
                amount: 80.0,
            }],
            0,
            1.0,
        );
        p.vaccine_capacity_proportion = 0.25;
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        strategy.distribute_to_nodes(&net, 0);
        let node = &mut net.nodes[0];
        strategy.distribute_to_population(node, 0);
        assert_eq!(vaccinated_susceptibles(node), 25.0);
        assert_eq!(strategy.node_stockpile(0, 1), 55.0);
    }

    #[test]
    fn half_life_decay_skips_day_zero_and_discards_residue() {
        let mut net = network(&[(0, 1000.0)]);
        let mut p = params(
            vec![
                StockpileEntry {
                    day: 0,
                    amount: 64.0,
                },
                StockpileEntry {
                    day: 1,
                    amount: 64.0,
                },
            ],
            0,
            1.0,
        );
        // Half life of one day: stock halves before use.
        p.vaccine_half_life_days = Some(1.0);
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();

        strategy.distribute_to_nodes(&net, 0);
        strategy.distribute_to_population(&mut net.nodes[0], 0);
        // Day 0 undecayed.
        assert_eq!(vaccinated_susceptibles(&net.nodes[0]), 64.0);

        strategy.distribute_to_nodes(&net, 1);
        strategy.distribute_to_population(&mut net.nodes[0], 1);
        // Day 1: 64 decays to 32, all administered, nothing rolls.
        assert_eq!(vaccinated_susceptibles(&net.nodes[0]), 96.0);
        assert_eq!(strategy.node_stockpile(0, 2), 0.0);
    }

    #[test]
    fn no_eligible_headroom_rolls_everything() {
        let mut net = network(&[(0, 100.0)]);
        let p = params(
            vec![StockpileEntry {
                day: 0,
                amount: 30.0,
            }],
            0,
            0.0, // nobody adheres
        );
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        strategy.distribute_to_nodes(&net, 0);
        strategy.distribute_to_population(&mut net.nodes[0], 0);
        assert_eq!(vaccinated_susceptibles(&net.nodes[0]), 0.0);
        assert_eq!(strategy.node_stockpile(0, 1), 30.0);
    }

    #[test]
    fn cumulative_vaccinations_never_exceed_adherence_ceiling() {
        let mut net = network(&[(0, 200.0)]);
        let p = params(
            vec![
                StockpileEntry {
                    day: 0,
                    amount: 90.0,
                },
                StockpileEntry {
                    day: 1,
                    amount: 90.0,
                },
                StockpileEntry {
                    day: 2,
                    amount: 90.0,
                },
            ],
            0,
            0.6,
        );
        let mut strategy = AgeRiskStockpile::new(&p, &net).unwrap();
        for day in 0..5 {
            strategy.distribute_to_nodes(&net, day);
            strategy.distribute_to_population(&mut net.nodes[0], day);
            assert!(
                vaccinated_susceptibles(&net.nodes[0]) <= 0.6 * 200.0 + 1e-9,
                "ceiling violated on day {day}"
            );
        }
        assert_eq!(vaccinated_susceptibles(&net.nodes[0]), 120.0);
    }
}

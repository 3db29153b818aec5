//! Non-pharmaceutical interventions: a precomputed
//! `[day][node][age]` effectiveness cube and the per-day beta modulation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Network;

/// One intervention record from the config file. `location` is `"0"` for
/// every node, otherwise a comma-separated list of node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpiRecord {
    pub day: usize,
    pub duration: usize,
    pub location: String,
    pub effectiveness: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NpiError {
    #[error("NPI location '{0}' is not a known node id")]
    UnknownLocation(String),
    #[error("NPI effectiveness has length {actual}, expected {expected} (one per age group)")]
    WrongEffectivenessLength { expected: usize, actual: usize },
    #[error("NPI effectiveness {0} is outside [0, 1]")]
    EffectivenessOutOfRange(f64),
}

/// Dense effectiveness cube covering days `0..=num_days`.
///
/// Overlapping interventions compose multiplicatively on the surviving
/// fraction: `E <- E + (1 - E) * eff`. Days past the simulation horizon are
/// discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpiSchedule {
    num_days: usize,
    num_nodes: usize,
    num_age_groups: usize,
    cube: Vec<f64>,
}

impl NpiSchedule {
    pub fn build(
        npis: &[NpiRecord],
        num_days: usize,
        network: &Network,
    ) -> Result<Self, NpiError> {
        let num_nodes = network.num_nodes();
        let num_age_groups = network.num_age_groups();
        let mut schedule = Self {
            num_days,
            num_nodes,
            num_age_groups,
            cube: vec![0.0; (num_days + 1) * num_nodes * num_age_groups],
        };
        for npi in npis {
            if npi.effectiveness.len() != num_age_groups {
                return Err(NpiError::WrongEffectivenessLength {
                    expected: num_age_groups,
                    actual: npi.effectiveness.len(),
                });
            }
            for &eff in &npi.effectiveness {
                if !(0.0..=1.0).contains(&eff) {
                    return Err(NpiError::EffectivenessOutOfRange(eff));
                }
            }
            let node_indices = schedule.location_to_indices(&npi.location, network)?;
            for day in npi.day..npi.day + npi.duration {
                if day > num_days {
                    continue;
                }
                for &node in &node_indices {
                    schedule.compose(day, node, &npi.effectiveness);
                }
            }
        }
        Ok(schedule)
    }

    /// An all-zero schedule (no interventions).
    pub fn empty(num_days: usize, num_nodes: usize, num_age_groups: usize) -> Self {
        Self {
            num_days,
            num_nodes,
            num_age_groups,
            cube: vec![0.0; (num_days + 1) * num_nodes * num_age_groups],
        }
    }

    fn location_to_indices(
        &self,
        location: &str,
        network: &Network,
    ) -> Result<Vec<usize>, NpiError> {
        if location.trim() == "0" {
            return Ok((0..self.num_nodes).collect());
        }
        location
            .split(',')
            .map(|part| {
                let id: u64 = part
                    .trim()
                    .parse()
                    .map_err(|_| NpiError::UnknownLocation(part.trim().to_string()))?;
                network
                    .node_index_by_id(id)
                    .map_err(|_| NpiError::UnknownLocation(part.trim().to_string()))
            })
            .collect()
    }

    fn offset(&self, day: usize, node_index: usize) -> usize {
        (day * self.num_nodes + node_index) * self.num_age_groups
    }

    fn compose(&mut self, day: usize, node_index: usize, effectiveness: &[f64]) {
        let o = self.offset(day, node_index);
        for (slot, &eff) in self.cube[o..o + self.num_age_groups]
            .iter_mut()
            .zip(effectiveness)
        {
            *slot += (1.0 - *slot) * eff;
        }
    }

    /// Effectiveness vector for one schedule row.
    pub fn effectiveness(&self, day: usize, node_index: usize) -> &[f64] {
        let o = self.offset(day.min(self.num_days), node_index);
        &self.cube[o..o + self.num_age_groups]
    }

    /// Per-age beta after NPI modulation for simulation time `now`.
    ///
    /// The schedule row is `now - 1` (row 0 while `now <= 1`): a step
    /// advancing from day `now - 1` to `now` sees the interventions active
    /// during that day. Negative betas clamp to 0.
    pub fn beta_with_npi(&self, beta_baseline: f64, now: usize, node_index: usize) -> Vec<f64> {
        let day = now.saturating_sub(1);
        self.effectiveness(day, node_index)
            .iter()
            .map(|&eff| (beta_baseline * (1.0 - eff)).max(0.0))
            .collect()
    }
}

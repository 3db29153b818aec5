//! Vaccine effectiveness and stockpile allocation (C6).
//!
//! The [`VaccineModel`] always carries the per-age effectiveness vectors,
//! because the disease and travel models read them even when no doses are
//! ever administered. The allocation strategy behind it is chosen by the
//! config: the two-stage age/risk stockpile allocator, the uniform
//! population-proportional allocator, or nothing.

mod age_risk;
mod uniform;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Network, Node};

pub use age_risk::AgeRiskStockpile;
pub use uniform::UniformStockpile;

/// Tolerance for "no headroom left" checks in the allocators.
pub(crate) const EPS: f64 = 1e-9;

/// One scheduled stockpile delivery. Negative days model doses ordered
/// before the simulation start; the effectiveness lag shifts them forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockpileEntry {
    pub day: i64,
    pub amount: f64,
}

/// Raw vaccine parameters from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaccineParameters {
    #[serde(default)]
    pub vaccine_effectiveness: Vec<f64>,
    #[serde(default)]
    pub vaccine_effectiveness_hosp: Option<Vec<f64>>,
    #[serde(default)]
    pub vaccine_adherence: Vec<f64>,
    /// Per-age priority: 0 = excluded, 0.5 = high-risk only, 1 = all risks.
    #[serde(default)]
    pub age_risk_priority_groups: Option<Vec<f64>>,
    #[serde(default)]
    pub vaccine_half_life_days: Option<f64>,
    /// Fraction of a node's population that can be vaccinated per day.
    #[serde(default = "default_capacity")]
    pub vaccine_capacity_proportion: f64,
    #[serde(default)]
    pub vaccine_eff_lag_days: i64,
    #[serde(default)]
    pub vaccine_stockpile: Vec<StockpileEntry>,
}

fn default_capacity() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VaccineError {
    #[error("'{field}' has length {actual}, expected {expected} (one per age group)")]
    WrongLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("'{field}' value {value} is outside [0, 1]")]
    OutOfUnitRange { field: &'static str, value: f64 },
    #[error("age_risk_priority_groups values must be 0, 0.5 or 1, got {0}")]
    InvalidPriority(f64),
    #[error("vaccine stockpile amount {0} is negative")]
    NegativeStockpile(f64),
}

fn check_unit_vector(
    field: &'static str,
    values: &[f64],
    expected: usize,
) -> Result<(), VaccineError> {
    if values.len() != expected {
        return Err(VaccineError::WrongLength {
            field,
            expected,
            actual: values.len(),
        });
    }
    for &v in values {
        if !(0.0..=1.0).contains(&v) {
            return Err(VaccineError::OutOfUnitRange { field, value: v });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Strategy {
    None,
    AgeRisk(AgeRiskStockpile),
    Uniform(UniformStockpile),
}

/// Vaccine effectiveness plus the configured allocation strategy.
///
/// Cloning yields the pristine pre-realization state: stockpile mutations
/// during a run never leak across realizations.
#[derive(Debug, Clone)]
pub struct VaccineModel {
    effectiveness: Vec<f64>,
    effectiveness_hosp: Vec<f64>,
    strategy: Strategy,
}

impl VaccineModel {
    /// No vaccination at all: zero effectiveness, no stockpile.
    pub fn none(num_age_groups: usize) -> Self {
        Self {
            effectiveness: vec![0.0; num_age_groups],
            effectiveness_hosp: vec![0.0; num_age_groups],
            strategy: Strategy::None,
        }
    }

    /// Effectiveness-only model without an allocation strategy.
    pub fn with_effectiveness(effectiveness: Vec<f64>, effectiveness_hosp: Vec<f64>) -> Self {
        Self {
            effectiveness,
            effectiveness_hosp,
            strategy: Strategy::None,
        }
    }

    pub fn age_risk_stockpile(
        params: &VaccineParameters,
        network: &Network,
    ) -> Result<Self, VaccineError> {
        let (effectiveness, effectiveness_hosp) = Self::validated_effectiveness(params, network)?;
        Ok(Self {
            effectiveness,
            effectiveness_hosp,
            strategy: Strategy::AgeRisk(AgeRiskStockpile::new(params, network)?),
        })
    }

    pub fn uniform_stockpile(
        params: &VaccineParameters,
        network: &Network,
    ) -> Result<Self, VaccineError> {
        let (effectiveness, effectiveness_hosp) = Self::validated_effectiveness(params, network)?;
        Ok(Self {
            effectiveness,
            effectiveness_hosp,
            strategy: Strategy::Uniform(UniformStockpile::new(params, network)?),
        })
    }

    fn validated_effectiveness(
        params: &VaccineParameters,
        network: &Network,
    ) -> Result<(Vec<f64>, Vec<f64>), VaccineError> {
        let ages = network.num_age_groups();
        check_unit_vector("vaccine_effectiveness", &params.vaccine_effectiveness, ages)?;
        let hosp = match &params.vaccine_effectiveness_hosp {
            Some(v) => {
                check_unit_vector("vaccine_effectiveness_hosp", v, ages)?;
                v.clone()
            }
            None => vec![0.0; ages],
        };
        Ok((params.vaccine_effectiveness.clone(), hosp))
    }

    /// Vaccine effectiveness against infection for one age group.
    pub fn effectiveness(&self, age: usize) -> f64 {
        self.effectiveness[age]
    }

    /// Vaccine effectiveness against hospitalization for one age group.
    pub fn effectiveness_hosp(&self, age: usize) -> f64 {
        self.effectiveness_hosp[age]
    }

    /// Stage one: allocate today's network stockpile across nodes.
    pub fn distribute_to_nodes(&mut self, network: &Network, day: usize) {
        match &mut self.strategy {
            Strategy::None | Strategy::Uniform(_) => {}
            Strategy::AgeRisk(s) => s.distribute_to_nodes(network, day),
        }
    }

    /// Stage two: administer a node's stockpile to its strata.
    pub fn distribute_to_population(&mut self, node: &mut Node, day: usize) {
        match &mut self.strategy {
            Strategy::None => {}
            Strategy::AgeRisk(s) => s.distribute_to_population(node, day),
            Strategy::Uniform(s) => s.distribute_to_population(node, day),
        }
    }
}

/// Fold raw stockpile entries into `{effective_day -> amount}` with the
/// effectiveness lag applied and negative effective days clamped to day 0.
/// Colliding days sum.
pub(crate) fn stockpile_by_effective_day(
    entries: &[StockpileEntry],
    lag_days: i64,
) -> Result<std::collections::BTreeMap<usize, f64>, VaccineError> {
    use std::collections::BTreeMap;
    let mut by_day: BTreeMap<usize, f64> = BTreeMap::new();
    for entry in entries {
        if entry.amount < 0.0 {
            return Err(VaccineError::NegativeStockpile(entry.amount));
        }
        let effective_day = (entry.day + lag_days).max(0) as usize;
        if by_day.contains_key(&effective_day) {
            tracing::warn!(
                day = effective_day,
                "multiple stockpile entries collapse to the same effective day; summing"
            );
        }
        *by_day.entry(effective_day).or_insert(0.0) += entry.amount;
    }
    Ok(by_day)
}

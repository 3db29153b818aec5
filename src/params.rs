//! Parameter binding: raw user inputs (periods in days, R0, per-age vectors)
//! normalized into the rate parameters the engines consume.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::model::stratum::NUM_RISK_GROUPS;

/// Fixed multiplier deriving high-risk mortality from the user-supplied
/// low-risk values.
pub const HIGH_RISK_MORTALITY_MULTIPLIER: f64 = 9.0;

/// Power-iteration tolerance for the next-generation-matrix spectral radius.
const SPECTRAL_TOL: f64 = 1e-12;
const SPECTRAL_MAX_ITER: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("parameter '{field}' has length {actual}, expected {expected} (one per age group)")]
    WrongLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("parameter '{field}' must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("parameter '{field}' must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },
    #[error("next-generation matrix has non-positive spectral radius")]
    DegenerateSpectralRadius,
}

/// Contact structure and demographic vectors shared by every engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    pub num_age_groups: usize,
    /// Symmetric age-structured contact matrix, `contact_matrix[a1][a2]`.
    pub contact_matrix: Vec<Vec<f64>>,
    pub high_risk_ratios: Vec<f64>,
}

/// Convert a user-supplied period in days to a rate in 1/days.
/// Non-positive periods mean the transition is off.
pub fn rate_from_period(days: f64) -> f64 {
    if days > 0.0 { 1.0 / days } else { 0.0 }
}

/// Two-way-split correction: adjusted fraction `pi` so that the realized
/// long-run fraction to the target branch equals `p` under competing rate
/// `gamma` and target rate `eta`:
///
/// `pi = p * gamma / ((gamma - eta) * p + eta)`
pub fn two_way_split_correction(p: f64, competing_rate: f64, target_rate: f64) -> f64 {
    let denom = (competing_rate - target_rate) * p + target_rate;
    p * competing_rate / denom
}

/// Dominant eigenvalue of a nonnegative square matrix by power iteration.
pub fn spectral_radius(matrix: &[Vec<f64>]) -> f64 {
    let n = matrix.len();
    if n == 0 {
        return 0.0;
    }
    let mut v = vec![1.0 / n as f64; n];
    let mut lambda = 0.0;
    for _ in 0..SPECTRAL_MAX_ITER {
        let mut next = vec![0.0; n];
        for (i, row) in matrix.iter().enumerate() {
            next[i] = row.iter().zip(&v).map(|(m, x)| m * x).sum();
        }
        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return 0.0;
        }
        for x in &mut next {
            *x /= norm;
        }
        let prev = lambda;
        // Rayleigh quotient with the normalized iterate
        lambda = next
            .iter()
            .enumerate()
            .map(|(i, x)| x * matrix[i].iter().zip(&next).map(|(m, y)| m * y).sum::<f64>())
            .sum::<f64>();
        v = next;
        if (lambda - prev).abs() < SPECTRAL_TOL {
            break;
        }
    }
    lambda
}

fn check_len(field: &'static str, v: &[f64], expected: usize) -> Result<(), ParamsError> {
    if v.len() != expected {
        return Err(ParamsError::WrongLength {
            field,
            expected,
            actual: v.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SEIRS
// ---------------------------------------------------------------------------

/// Raw SEIRS inputs as they appear in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeirsParameters {
    #[serde(rename = "R0")]
    pub r0: f64,
    pub latent_period_days: f64,
    pub infectious_period_days: f64,
    /// Zero (or absent) disables waning.
    #[serde(default)]
    pub immune_period_days: f64,
    #[serde(default)]
    pub relative_susceptibility: Option<Vec<f64>>,
}

/// Bound SEIRS rates. `sigma` is E->I, `gamma` I->R, `omega` R->S (0 = no
/// waning).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeirsRates {
    pub beta: f64,
    pub sigma: f64,
    pub gamma: f64,
    pub omega: f64,
    pub relative_susceptibility: Vec<f64>,
}

impl SeirsParameters {
    pub fn bind(&self, num_age_groups: usize) -> Result<SeirsRates, ParamsError> {
        if self.r0 <= 0.0 {
            return Err(ParamsError::NonPositive {
                field: "R0",
                value: self.r0,
            });
        }
        let gamma = rate_from_period(self.infectious_period_days);
        let relative_susceptibility = match &self.relative_susceptibility {
            Some(v) => {
                check_len("relative_susceptibility", v, num_age_groups)?;
                v.clone()
            }
            None => vec![1.0; num_age_groups],
        };
        Ok(SeirsRates {
            beta: self.r0 * gamma,
            sigma: rate_from_period(self.latent_period_days),
            gamma,
            omega: rate_from_period(self.immune_period_days),
            relative_susceptibility,
        })
    }
}

// ---------------------------------------------------------------------------
// SEATIRD
// ---------------------------------------------------------------------------

/// Raw SEATIRD inputs: periods in days, per-age mortality and
/// susceptibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatirdParameters {
    #[serde(rename = "R0")]
    pub r0: f64,
    pub beta_scale: f64,
    /// Latency period (E->A), days.
    pub tau: f64,
    /// Asymptomatic period (A->T), days.
    pub kappa: f64,
    /// Treatable period (T->I), days.
    pub chi: f64,
    /// Recovery period (A/T/I -> R), days.
    pub gamma: f64,
    /// Low-risk mortality rate per age group, 1/days.
    pub nu: Vec<f64>,
    #[serde(default)]
    pub sigma: Option<Vec<f64>>,
}

/// Bound SEATIRD rates. `nu[age][risk]` carries the high-risk multiplier;
/// `chi_period` keeps the raw treatable period for the stochastic engine's
/// deterministic T->I offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatirdRates {
    pub beta: f64,
    pub tau: f64,
    pub kappa: f64,
    pub chi: f64,
    pub gamma: f64,
    pub chi_period: f64,
    pub nu: Vec<[f64; NUM_RISK_GROUPS]>,
    pub sigma: Vec<f64>,
}

impl SeatirdParameters {
    pub fn bind(&self, num_age_groups: usize) -> Result<SeatirdRates, ParamsError> {
        if self.beta_scale <= 0.0 {
            return Err(ParamsError::NonPositive {
                field: "beta_scale",
                value: self.beta_scale,
            });
        }
        check_len("nu", &self.nu, num_age_groups)?;
        let sigma = match &self.sigma {
            Some(v) => {
                check_len("sigma", v, num_age_groups)?;
                v.clone()
            }
            None => vec![1.0; num_age_groups],
        };
        let nu = self
            .nu
            .iter()
            .map(|&low| [low, low * HIGH_RISK_MORTALITY_MULTIPLIER])
            .collect();
        Ok(SeatirdRates {
            beta: self.r0 / self.beta_scale,
            tau: rate_from_period(self.tau),
            kappa: rate_from_period(self.kappa),
            chi: rate_from_period(self.chi),
            gamma: rate_from_period(self.gamma),
            chi_period: self.chi,
            nu,
            sigma,
        })
    }
}

// ---------------------------------------------------------------------------
// SEIHRD
// ---------------------------------------------------------------------------

/// Raw SEIHRD inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeihrdParameters {
    #[serde(rename = "R0")]
    pub r0: f64,
    #[serde(rename = "E_to_IPandIA_days")]
    pub e_to_ip_and_ia_days: f64,
    #[serde(rename = "IP_to_IS_days")]
    pub ip_to_is_days: f64,
    #[serde(rename = "IS_to_H_days")]
    pub is_to_h_days: f64,
    #[serde(rename = "H_to_D_days")]
    pub h_to_d_days: f64,
    /// Per-age hospital discharge periods.
    #[serde(rename = "H_to_R_days")]
    pub h_to_r_days: Vec<f64>,
    #[serde(rename = "IS_to_R_days")]
    pub is_to_r_days: f64,
    #[serde(rename = "IA_to_R_days")]
    pub ia_to_r_days: f64,
    /// Per-age fraction of E leaving to the asymptomatic branch.
    #[serde(rename = "prop_E_to_IA")]
    pub prop_e_to_ia: Vec<f64>,
    pub highrisk_hosp_multiplier: f64,
    /// Per-age low-risk hospitalization fractions.
    #[serde(rename = "prop_IS_to_H_lowrisk")]
    pub prop_is_to_h_lowrisk: Vec<f64>,
    /// Per-age hospital fatality fractions.
    #[serde(rename = "prop_H_to_D")]
    pub prop_h_to_d: Vec<f64>,
    #[serde(rename = "rel_inf_IP_to_IS")]
    pub rel_inf_ip_to_is: f64,
    #[serde(rename = "rel_inf_IA_to_IS")]
    pub rel_inf_ia_to_is: f64,
    #[serde(default)]
    pub relative_susceptibility: Option<Vec<f64>>,
}

/// Bound SEIHRD rates with split-corrected branch fractions.
/// `prop_is_to_h[risk][age]` and `prop_h_to_d[age]` are the corrected
/// fractions `pi`, not the raw user proportions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeihrdRates {
    pub beta: f64,
    pub e_out_rate: f64,
    pub ip_to_is_rate: f64,
    pub is_to_h_rate: f64,
    pub h_to_d_rate: f64,
    pub h_to_r_rates: Vec<f64>,
    pub is_to_r_rate: f64,
    pub ia_to_r_rate: f64,
    pub prop_e_to_ia: Vec<f64>,
    pub prop_is_to_h: [Vec<f64>; NUM_RISK_GROUPS],
    pub prop_h_to_d: Vec<f64>,
    pub rel_inf_ip_to_is: f64,
    pub rel_inf_ia_to_is: f64,
    pub relative_susceptibility: Vec<f64>,
}

impl SeihrdParameters {
    pub fn bind(
        &self,
        num_age_groups: usize,
        contact_matrix: &[Vec<f64>],
    ) -> Result<SeihrdRates, ParamsError> {
        check_len("H_to_R_days", &self.h_to_r_days, num_age_groups)?;
        check_len("prop_E_to_IA", &self.prop_e_to_ia, num_age_groups)?;
        check_len("prop_IS_to_H_lowrisk", &self.prop_is_to_h_lowrisk, num_age_groups)?;
        check_len("prop_H_to_D", &self.prop_h_to_d, num_age_groups)?;
        for &p in &self.prop_e_to_ia {
            if !(0.0..=1.0).contains(&p) {
                return Err(ParamsError::OutOfUnitRange {
                    field: "prop_E_to_IA",
                    value: p,
                });
            }
        }

        let e_out_rate = rate_from_period(self.e_to_ip_and_ia_days);
        let ip_to_is_rate = rate_from_period(self.ip_to_is_days);
        let is_to_h_rate = rate_from_period(self.is_to_h_days);
        let h_to_d_rate = rate_from_period(self.h_to_d_days);
        let is_to_r_rate = rate_from_period(self.is_to_r_days);
        let ia_to_r_rate = rate_from_period(self.ia_to_r_days);
        let h_to_r_rates: Vec<f64> = self
            .h_to_r_days
            .iter()
            .map(|&d| rate_from_period(d))
            .collect();

        let lowrisk = self.prop_is_to_h_lowrisk.clone();
        let highrisk: Vec<f64> = lowrisk
            .iter()
            .map(|&p| (p * self.highrisk_hosp_multiplier).min(1.0))
            .collect();
        let prop_is_to_h = [lowrisk, highrisk].map(|props| {
            props
                .iter()
                .map(|&p| two_way_split_correction(p, is_to_r_rate, is_to_h_rate))
                .collect()
        });
        let prop_h_to_d = self
            .prop_h_to_d
            .iter()
            .zip(&h_to_r_rates)
            .map(|(&p, &r)| two_way_split_correction(p, r, h_to_d_rate))
            .collect();

        let relative_susceptibility = match &self.relative_susceptibility {
            Some(v) => {
                check_len("relative_susceptibility", v, num_age_groups)?;
                v.clone()
            }
            None => vec![1.0; num_age_groups],
        };

        let w = compute_infectiousness_weights(
            &self.prop_e_to_ia,
            ip_to_is_rate,
            is_to_h_rate,
            is_to_r_rate,
            ia_to_r_rate,
            self.rel_inf_ip_to_is,
            self.rel_inf_ia_to_is,
        );
        let beta = estimate_baseline_beta(contact_matrix, self.r0, &w, &relative_susceptibility)?;
        info!(beta, "estimated baseline beta from next-generation matrix");

        let generation_time = estimate_generation_time(
            e_out_rate,
            ip_to_is_rate,
            is_to_h_rate,
            is_to_r_rate,
            ia_to_r_rate,
            &self.prop_e_to_ia,
            self.rel_inf_ip_to_is,
            self.rel_inf_ia_to_is,
        );
        info!(generation_time, "estimated mean generation time in days");

        Ok(SeihrdRates {
            beta,
            e_out_rate,
            ip_to_is_rate,
            is_to_h_rate,
            h_to_d_rate,
            h_to_r_rates,
            is_to_r_rate,
            ia_to_r_rate,
            prop_e_to_ia: self.prop_e_to_ia.clone(),
            prop_is_to_h,
            prop_h_to_d,
            rel_inf_ip_to_is: self.rel_inf_ip_to_is,
            rel_inf_ia_to_is: self.rel_inf_ia_to_is,
            relative_susceptibility,
        })
    }
}

/// Per-age infectiousness weights `w_a`: expected infectious person-days
/// weighted by relative infectiousness, mixing the symptomatic and
/// asymptomatic branches by the asymptomatic proportion.
pub fn compute_infectiousness_weights(
    prop_e_to_ia: &[f64],
    ip_to_is_rate: f64,
    is_to_h_rate: f64,
    is_to_r_rate: f64,
    ia_to_r_rate: f64,
    rel_inf_ip: f64,
    rel_inf_ia: f64,
) -> Vec<f64> {
    let d_ip = 1.0 / ip_to_is_rate;
    let d_is = 1.0 / (is_to_h_rate + is_to_r_rate);
    let d_ia = 1.0 / ia_to_r_rate;
    let symptomatic = rel_inf_ip * d_ip + d_is;
    let asymptomatic = rel_inf_ia * d_ia;
    prop_e_to_ia
        .iter()
        .map(|&p| (1.0 - p) * symptomatic + p * asymptomatic)
        .collect()
}

/// Solve `rho(beta * diag(s) * C * diag(w)) = R0` for the scalar `beta`.
pub fn estimate_baseline_beta(
    contact_matrix: &[Vec<f64>],
    r0: f64,
    w: &[f64],
    susceptibility: &[f64],
) -> Result<f64, ParamsError> {
    let n = contact_matrix.len();
    let core: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| susceptibility[i] * contact_matrix[i][j] * w[j]).collect())
        .collect();
    let rho = spectral_radius(&core);
    if rho <= 0.0 {
        return Err(ParamsError::DegenerateSpectralRadius);
    }
    Ok(r0 / rho)
}

/// Approximate mean generation time in days from the bound rates.
#[allow(clippy::too_many_arguments)]
pub fn estimate_generation_time(
    e_out_rate: f64,
    ip_to_is_rate: f64,
    is_to_h_rate: f64,
    is_to_r_rate: f64,
    ia_to_r_rate: f64,
    prop_e_to_ia: &[f64],
    rel_inf_ip: f64,
    rel_inf_ia: f64,
) -> f64 {
    let d_e = 1.0 / e_out_rate;
    let d_ip = 1.0 / ip_to_is_rate;
    let d_is = 1.0 / (is_to_h_rate + is_to_r_rate);
    let d_ia = 1.0 / ia_to_r_rate;
    let prop_asymp = prop_e_to_ia.iter().sum::<f64>() / prop_e_to_ia.len() as f64;

    let w_ip = (1.0 - prop_asymp) * rel_inf_ip * d_ip;
    let w_is = (1.0 - prop_asymp) * d_is;
    let w_ia = prop_asymp * rel_inf_ia * d_ia;
    let numerator =
        w_ip * (d_e + d_ip) + w_is * (d_e + d_ip + d_is) + w_ia * (d_e + d_ia);
    numerator / (w_ip + w_is + w_ia)
}

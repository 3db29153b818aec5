//! Simulation properties file: the JSON document handed to the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::disease::InitialInfection;
use crate::npi::NpiRecord;
use crate::params::{SeatirdParameters, SeihrdParameters, SeirsParameters};
use crate::travel::TravelParameters;
use crate::vaccine::VaccineParameters;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("must provide either 'realization_range' or 'number_of_realizations'")]
    MissingRealizations,
    #[error("number_of_realizations must be positive")]
    NoRealizations,
    #[error("realization_range end {end} must be >= start {start}")]
    InvalidRealizationRange { start: usize, end: usize },
    #[error("travel model '{0}' not recognized")]
    UnknownTravelModel(String),
    #[error("initial_infected age_group {age_group} is out of range (0..{num_age_groups})")]
    InitialAgeOutOfRange {
        age_group: usize,
        num_age_groups: usize,
    },
    #[error("initial_infected count {0} is negative")]
    NegativeInitialInfected(f64),
}

/// Paths of the four required data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFiles {
    pub population: PathBuf,
    pub contact: PathBuf,
    pub flow: PathBuf,
    pub high_risk_ratios: PathBuf,
}

/// Disease model selection; the identity string picks the engine and its
/// raw parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "identity", content = "parameters", rename_all = "kebab-case")]
pub enum DiseaseModelSpec {
    SeirDeterministic(SeirsParameters),
    SeatirdDeterministic(SeatirdParameters),
    SeatirdStochastic(SeatirdParameters),
    SeihrdStochastic(SeihrdParameters),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelModelSpec {
    pub identity: String,
    pub parameters: TravelParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaccineModelSpec {
    /// `stockpile-age-risk`, `uniform-stockpile`, or null for none.
    pub identity: Option<String>,
    #[serde(default)]
    pub parameters: VaccineParameters,
}

/// The whole simulation properties document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationProperties {
    pub output_dir_path: PathBuf,
    #[serde(default)]
    pub number_of_realizations: Option<usize>,
    #[serde(default)]
    pub realization_range: Option<[usize; 2]>,
    #[serde(default)]
    pub batch_num: Option<usize>,
    /// Parent seed; each realization derives its own stream from it.
    #[serde(default)]
    pub seed: u64,
    /// Added to each node id to form the external FIPS code, when given.
    #[serde(default)]
    pub fips_prefix: Option<u64>,
    pub data: DataFiles,
    pub disease_model: DiseaseModelSpec,
    pub travel_model: TravelModelSpec,
    #[serde(default)]
    pub vaccine_model: Option<VaccineModelSpec>,
    #[serde(default)]
    pub non_pharma_interventions: Vec<NpiRecord>,
    pub initial_infected: Vec<InitialInfection>,
}

impl SimulationProperties {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let properties: SimulationProperties =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        properties.validate()?;
        Ok(properties)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.realization_indices()?;
        if self.travel_model.identity != "binomial" {
            return Err(ConfigError::UnknownTravelModel(
                self.travel_model.identity.clone(),
            ));
        }
        for item in &self.initial_infected {
            if item.infected < 0.0 {
                return Err(ConfigError::NegativeInitialInfected(item.infected));
            }
        }
        Ok(())
    }

    /// The realization indices this run covers, either `0..n` or the
    /// configured inclusive range.
    pub fn realization_indices(&self) -> Result<Vec<usize>, ConfigError> {
        if let Some([start, end]) = self.realization_range {
            if end < start {
                return Err(ConfigError::InvalidRealizationRange { start, end });
            }
            return Ok((start..=end).collect());
        }
        match self.number_of_realizations {
            Some(0) => Err(ConfigError::NoRealizations),
            Some(n) => Ok((0..n).collect()),
            None => Err(ConfigError::MissingRealizations),
        }
    }

    pub fn batch_num(&self) -> usize {
        self.batch_num.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "output_dir_path": "/tmp/out",
            "number_of_realizations": 2,
            "data": {
                "population": "pop.csv",
                "contact": "contact.csv",
                "flow": "flow.csv",
                "high_risk_ratios": "risk.csv"
            },
            "disease_model": {
                "identity": "seatird-deterministic",
                "parameters": {
                    "R0": 1.2,
                    "beta_scale": 10.0,
                    "tau": 1.2,
                    "kappa": 1.9,
                    "chi": 1.0,
                    "gamma": 4.1,
                    "nu": [0.01, 0.02],
                    "sigma": [1.0, 0.9]
                }
            },
            "travel_model": {
                "identity": "binomial",
                "parameters": { "rho": 0.39, "flow_reduction": [10.0, 2.0] }
            },
            "initial_infected": [
                { "county": 113, "age_group": 1, "infected": 10.0 }
            ]
        })
    }

    #[test]
    fn minimal_config_parses() {
        let props: SimulationProperties =
            serde_json::from_value(minimal_json()).unwrap();
        props.validate().unwrap();
        assert_eq!(props.realization_indices().unwrap(), vec![0, 1]);
        assert_eq!(props.batch_num(), 0);
        assert!(props.vaccine_model.is_none());
        assert!(matches!(
            props.disease_model,
            DiseaseModelSpec::SeatirdDeterministic(_)
        ));
    }

    #[test]
    fn realization_range_inclusive() {
        let mut json = minimal_json();
        json["number_of_realizations"] = serde_json::Value::Null;
        json["realization_range"] = serde_json::json!([3, 5]);
        json["batch_num"] = serde_json::json!(2);
        let props: SimulationProperties = serde_json::from_value(json).unwrap();
        assert_eq!(props.realization_indices().unwrap(), vec![3, 4, 5]);
        assert_eq!(props.batch_num(), 2);
    }

    #[test]
    fn reversed_range_rejected() {
        let mut json = minimal_json();
        json["number_of_realizations"] = serde_json::Value::Null;
        json["realization_range"] = serde_json::json!([5, 3]);
        let props: SimulationProperties = serde_json::from_value(json).unwrap();
        assert!(matches!(
            props.realization_indices(),
            Err(ConfigError::InvalidRealizationRange { start: 5, end: 3 })
        ));
    }

    #[test]
    fn missing_realizations_rejected() {
        let mut json = minimal_json();
        json["number_of_realizations"] = serde_json::Value::Null;
        let props: SimulationProperties = serde_json::from_value(json).unwrap();
        assert!(matches!(
            props.realization_indices(),
            Err(ConfigError::MissingRealizations)
        ));
    }

    #[test]
    fn unknown_travel_model_rejected() {
        let mut json = minimal_json();
        json["travel_model"]["identity"] = serde_json::json!("gravity");
        let props: SimulationProperties = serde_json::from_value(json).unwrap();
        assert!(matches!(
            props.validate(),
            Err(ConfigError::UnknownTravelModel(_))
        ));
    }

    #[test]
    fn vaccine_model_with_null_identity_parses() {
        let mut json = minimal_json();
        json["vaccine_model"] = serde_json::json!({
            "identity": null,
            "parameters": {}
        });
        let props: SimulationProperties = serde_json::from_value(json).unwrap();
        assert!(props.vaccine_model.unwrap().identity.is_none());
    }

    #[test]
    fn stochastic_identities_parse() {
        let mut json = minimal_json();
        json["disease_model"]["identity"] = serde_json::json!("seatird-stochastic");
        let props: SimulationProperties = serde_json::from_value(json).unwrap();
        assert!(matches!(
            props.disease_model,
            DiseaseModelSpec::SeatirdStochastic(_)
        ));
    }
}

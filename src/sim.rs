//! Simulation driver (C7): assembles the network, parameters and models
//! from the config, then runs each realization's daily loop of
//! vaccinate -> per-node disease step -> travel -> snapshot -> early stop.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, DiseaseModelSpec, SimulationProperties};
use crate::data::{self, DataError};
use crate::disease::{DiseaseModel, DiseaseRates, InitialInfection};
use crate::model::{Network, NetworkBuildError};
use crate::npi::{NpiError, NpiSchedule};
use crate::output::{OutputError, Writer};
use crate::params::ParamsError;
use crate::travel::{BinomialTravel, TravelError};
use crate::vaccine::{VaccineError, VaccineModel};

/// Stop a realization once fewer than one expected infection remains in
/// the exposed and transmitting compartments.
pub const EARLY_STOP_TOLERANCE: f64 = 1.0;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Network(#[from] NetworkBuildError),
    #[error(transparent)]
    Npi(#[from] NpiError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Travel(#[from] TravelError),
    #[error(transparent)]
    Vaccine(#[from] VaccineError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("contact matrix is {rows}x{cols}, expected {expected}x{expected} (one row per age group)")]
    ContactMatrixShape {
        rows: usize,
        cols: usize,
        expected: usize,
    },
    #[error("vaccine model '{0}' not recognized")]
    UnknownVaccineModel(String),
}

/// Everything a run needs, in pristine pre-realization state. Each
/// realization clones what it mutates and derives its own RNG stream.
#[derive(Debug)]
pub struct Simulation {
    pristine: Network,
    vaccine: VaccineModel,
    travel: BinomialTravel,
    disease: DiseaseRates,
    npi: NpiSchedule,
    contact_matrix: Vec<Vec<f64>>,
    initial: Vec<InitialInfection>,
    num_days: usize,
    base_seed: u64,
    realization_indices: Vec<usize>,
    batch_num: usize,
    output_dir: PathBuf,
}

impl Simulation {
    /// Load data files, bind parameters and assemble the pristine state.
    /// Any config, I/O or shape problem aborts here, before realizations.
    pub fn from_properties(
        properties: &SimulationProperties,
        num_days: usize,
    ) -> Result<Self, SimError> {
        let population = data::load_population(&properties.data.population)?;
        let contact_matrix = data::load_matrix(&properties.data.contact)?;
        let flow = data::load_matrix(&properties.data.flow)?;
        let high_risk_ratios = data::load_high_risk_ratios(&properties.data.high_risk_ratios)?;

        let num_age_groups = population[0].1.len();
        if contact_matrix.len() != num_age_groups
            || contact_matrix.iter().any(|row| row.len() != num_age_groups)
        {
            return Err(SimError::ContactMatrixShape {
                rows: contact_matrix.len(),
                cols: contact_matrix.first().map_or(0, Vec::len),
                expected: num_age_groups,
            });
        }

        let disease = match &properties.disease_model {
            DiseaseModelSpec::SeirDeterministic(raw) => {
                DiseaseRates::SeirsDeterministic(raw.bind(num_age_groups)?)
            }
            DiseaseModelSpec::SeatirdDeterministic(raw) => {
                DiseaseRates::SeatirdDeterministic(raw.bind(num_age_groups)?)
            }
            DiseaseModelSpec::SeatirdStochastic(raw) => {
                DiseaseRates::SeatirdStochastic(raw.bind(num_age_groups)?)
            }
            DiseaseModelSpec::SeihrdStochastic(raw) => {
                DiseaseRates::SeihrdStochastic(raw.bind(num_age_groups, &contact_matrix)?)
            }
        };

        let mut pristine = Network::from_population(
            disease.compartment_set(),
            &population,
            &high_risk_ratios,
            properties.fips_prefix,
        )?;
        pristine.set_travel_flow(flow)?;
        info!(
            nodes = pristine.num_nodes(),
            population = pristine.total_population(),
            "assembled network"
        );

        for item in &properties.initial_infected {
            if item.age_group >= num_age_groups {
                return Err(ConfigError::InitialAgeOutOfRange {
                    age_group: item.age_group,
                    num_age_groups,
                }
                .into());
            }
            pristine.node_index_by_id(item.county)?;
        }

        let npi =
            NpiSchedule::build(&properties.non_pharma_interventions, num_days, &pristine)?;
        let travel = BinomialTravel::new(
            &properties.travel_model.parameters,
            contact_matrix.clone(),
            num_age_groups,
        )?;
        let vaccine = match &properties.vaccine_model {
            None => VaccineModel::none(num_age_groups),
            Some(spec) => match spec.identity.as_deref() {
                None => VaccineModel::none(num_age_groups),
                Some("stockpile-age-risk") => {
                    VaccineModel::age_risk_stockpile(&spec.parameters, &pristine)?
                }
                Some("uniform-stockpile") => {
                    VaccineModel::uniform_stockpile(&spec.parameters, &pristine)?
                }
                Some(other) => return Err(SimError::UnknownVaccineModel(other.to_string())),
            },
        };

        Ok(Self {
            pristine,
            vaccine,
            travel,
            disease,
            npi,
            contact_matrix,
            initial: properties.initial_infected.clone(),
            num_days,
            base_seed: properties.seed,
            realization_indices: properties.realization_indices()?,
            batch_num: properties.batch_num(),
            output_dir: properties.output_dir_path.clone(),
        })
    }

    pub fn num_days(&self) -> usize {
        self.num_days
    }

    pub fn pristine_network(&self) -> &Network {
        &self.pristine
    }

    /// Run every configured realization. Single realizations write JSON;
    /// batches write CSV and fan out across threads.
    pub fn run(&self) -> Result<(), SimError> {
        let writer = Writer::new(
            &self.output_dir,
            self.realization_indices.len(),
            self.batch_num,
        )?;
        let io_lock = Mutex::new(());
        if self.realization_indices.len() == 1 {
            self.run_realization(self.realization_indices[0], &writer, &io_lock)
        } else {
            self.realization_indices
                .par_iter()
                .try_for_each(|&realization| self.run_realization(realization, &writer, &io_lock))
        }
    }

    /// One realization: deep copy of the pristine state, its own RNG
    /// stream, then the daily loop.
    pub fn run_realization(
        &self,
        realization: usize,
        writer: &Writer,
        io_lock: &Mutex<()>,
    ) -> Result<(), SimError> {
        let started = Instant::now();
        let mut rng =
            ChaCha12Rng::seed_from_u64(self.base_seed.wrapping_add(realization as u64));
        let mut network = self.pristine.clone();
        for node in &mut network.nodes {
            node.reset_stochastic_state();
        }
        let mut vaccine = self.vaccine.clone();
        let mut disease = self
            .disease
            .build(self.npi.clone(), self.contact_matrix.clone());
        disease.set_initial_conditions(&self.initial, &mut network, &vaccine, &mut rng)?;

        // Day 0: allocation ahead of the epidemic, then the initial state.
        vaccine.distribute_to_nodes(&network, 0);
        for i in 0..network.num_nodes() {
            vaccine.distribute_to_population(&mut network.nodes[i], 0);
        }
        {
            let _guard = io_lock.lock().unwrap();
            writer.write(realization, 0, &network)?;
        }

        for day in 1..=self.num_days {
            vaccine.distribute_to_nodes(&network, day);
            for i in 0..network.num_nodes() {
                vaccine.distribute_to_population(&mut network.nodes[i], day);
                disease.simulate(&mut network.nodes[i], day, &vaccine, &mut rng);
            }
            self.travel
                .travel(&mut network, disease.as_mut(), &vaccine, day, &mut rng);
            {
                let _guard = io_lock.lock().unwrap();
                writer.write(realization, day, &network)?;
            }

            let active = active_infections(&network, disease.as_ref());
            debug!(realization, day, active, "completed day");
            if active < EARLY_STOP_TOLERANCE {
                info!(
                    realization,
                    day, active, "active infections below tolerance, ending early"
                );
                break;
            }
        }

        let _guard = io_lock.lock().unwrap();
        writer.record_wall_time(realization, started.elapsed().as_secs_f64())?;
        Ok(())
    }
}

/// Exposed plus weighted transmitting population across the network.
pub fn active_infections(network: &Network, disease: &dyn DiseaseModel) -> f64 {
    network
        .nodes
        .iter()
        .map(|node| {
            let totals = node.compartments.compartment_totals();
            totals[node.compartments.exposed_index()]
                + node
                    .compartments
                    .transmitting_total(disease.transmitting_weights())
        })
        .sum()
}

pub mod config;
pub mod data;
pub mod disease;
pub mod model;
pub mod npi;
pub mod output;
pub mod params;
pub mod rng;
pub mod scenario;
pub mod sim;
pub mod travel;
pub mod vaccine;

pub use config::SimulationProperties;
pub use disease::{DiseaseModel, DiseaseRates, InitialInfection};
pub use model::{
    CompartmentSet, Network, Node, PopulationCompartments, RiskGroup, Stratum, VaccineGroup,
};
pub use npi::{NpiRecord, NpiSchedule};
pub use sim::{EARLY_STOP_TOLERANCE, SimError, Simulation, active_infections};
pub use travel::{BinomialTravel, TravelParameters};
pub use vaccine::{VaccineModel, VaccineParameters};

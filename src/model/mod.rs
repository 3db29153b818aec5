pub mod compartments;
pub mod event;
pub mod network;
pub mod node;
pub mod population;
pub mod stratum;

pub use compartments::{CompartmentSet, CompartmentSetError};
pub use event::{Event, EventKind, EventQueue};
pub use network::{Network, NetworkBuildError};
pub use node::Node;
pub use population::PopulationCompartments;
pub use stratum::{
    NUM_RISK_GROUPS, NUM_VACCINE_GROUPS, RiskGroup, Stratum, VaccineGroup, all_strata,
};

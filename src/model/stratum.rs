use serde::{Deserialize, Serialize};

pub const NUM_RISK_GROUPS: usize = 2;
pub const NUM_VACCINE_GROUPS: usize = 2;

/// Chronic-condition risk status within an age group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskGroup {
    Low,
    High,
}

impl RiskGroup {
    pub const ALL: [RiskGroup; NUM_RISK_GROUPS] = [RiskGroup::Low, RiskGroup::High];

    pub fn index(self) -> usize {
        match self {
            RiskGroup::Low => 0,
            RiskGroup::High => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskGroup::Low => "L",
            RiskGroup::High => "H",
        }
    }
}

/// Vaccination status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VaccineGroup {
    Unvaccinated,
    Vaccinated,
}

impl VaccineGroup {
    pub const ALL: [VaccineGroup; NUM_VACCINE_GROUPS] =
        [VaccineGroup::Unvaccinated, VaccineGroup::Vaccinated];

    pub fn index(self) -> usize {
        match self {
            VaccineGroup::Unvaccinated => 0,
            VaccineGroup::Vaccinated => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VaccineGroup::Unvaccinated => "U",
            VaccineGroup::Vaccinated => "V",
        }
    }
}

/// An `(age, risk, vaccine)` triple indexing one row of compartment counts
/// within a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stratum {
    pub age: usize,
    pub risk: RiskGroup,
    pub vaccine: VaccineGroup,
}

impl Stratum {
    pub fn new(age: usize, risk: RiskGroup, vaccine: VaccineGroup) -> Self {
        Self { age, risk, vaccine }
    }

    /// Same stratum on the vaccinated side.
    pub fn vaccinated(self) -> Self {
        Self {
            vaccine: VaccineGroup::Vaccinated,
            ..self
        }
    }
}

/// Enumerate all strata for `num_age_groups` in canonical
/// `(age, risk, vaccine)` lexicographic order. Every observable iteration in
/// the simulator (allocations, tie-breaks, dispatch) uses this order.
pub fn all_strata(num_age_groups: usize) -> impl Iterator<Item = Stratum> {
    (0..num_age_groups).flat_map(|age| {
        RiskGroup::ALL.into_iter().flat_map(move |risk| {
            VaccineGroup::ALL
                .into_iter()
                .map(move |vaccine| Stratum { age, risk, vaccine })
        })
    })
}

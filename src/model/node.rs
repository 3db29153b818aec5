use serde::{Deserialize, Serialize};

use super::event::EventQueue;
use super::population::PopulationCompartments;
use super::stratum::{NUM_RISK_GROUPS, NUM_VACCINE_GROUPS, Stratum};

/// One geographic unit (county, city, zip) with its compartment tensor and
/// the bookkeeping the stochastic engine needs.
///
/// `node_index` is the dense position in the network's node list and in the
/// flow matrix; `node_id` is the user-facing identifier from the population
/// file; `fips_id` is an optional external code carried through to outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_index: usize,
    pub node_id: u64,
    pub fips_id: Option<u64>,
    pub compartments: PopulationCompartments,
    /// Fraction of node population per stratum at t=0. Filled by
    /// [`Node::rebuild_group_share`] during seeding, immutable afterwards.
    group_share: Vec<f64>,
    /// Queued contacts per destination stratum (stochastic engine).
    contact_counter: Vec<f64>,
    /// Contacts invalidated since queuing (stochastic engine).
    unqueued_contact_counter: Vec<f64>,
    /// Transition events invalidated since queuing, per stratum and source
    /// compartment (stochastic engine).
    unqueued_event_counter: Vec<f64>,
    #[serde(skip)]
    pub event_queue: EventQueue,
}

impl Node {
    pub fn new(
        node_index: usize,
        node_id: u64,
        fips_id: Option<u64>,
        compartments: PopulationCompartments,
    ) -> Self {
        let strata = compartments.num_age_groups() * NUM_RISK_GROUPS * NUM_VACCINE_GROUPS;
        let cells = strata * compartments.num_compartments();
        Self {
            node_index,
            node_id,
            fips_id,
            compartments,
            group_share: vec![0.0; strata],
            contact_counter: vec![0.0; strata],
            unqueued_contact_counter: vec![0.0; strata],
            unqueued_event_counter: vec![0.0; cells],
            event_queue: EventQueue::new(),
        }
    }

    pub fn total_population(&self) -> f64 {
        self.compartments.total_population()
    }

    fn stratum_offset(&self, stratum: Stratum) -> usize {
        (stratum.age * NUM_RISK_GROUPS + stratum.risk.index()) * NUM_VACCINE_GROUPS
            + stratum.vaccine.index()
    }

    fn cell_offset(&self, stratum: Stratum, compartment: usize) -> usize {
        self.stratum_offset(stratum) * self.compartments.num_compartments() + compartment
    }

    /// Recompute the demographic share of each stratum. Called once at
    /// seeding; shares are frozen for the rest of the realization.
    pub fn rebuild_group_share(&mut self) {
        let total = self.total_population();
        for stratum in self.compartments.strata() {
            let share = if total > 0.0 {
                self.compartments.demographic_population(stratum) / total
            } else {
                0.0
            };
            let o = self.stratum_offset(stratum);
            self.group_share[o] = share;
        }
    }

    pub fn group_share(&self, stratum: Stratum) -> f64 {
        self.group_share[self.stratum_offset(stratum)]
    }

    pub fn contact_counter(&self, stratum: Stratum) -> f64 {
        self.contact_counter[self.stratum_offset(stratum)]
    }

    pub fn unqueued_contact_counter(&self, stratum: Stratum) -> f64 {
        self.unqueued_contact_counter[self.stratum_offset(stratum)]
    }

    pub fn unqueued_event_counter(&self, stratum: Stratum, compartment: usize) -> f64 {
        self.unqueued_event_counter[self.cell_offset(stratum, compartment)]
    }

    pub fn add_contact(&mut self, stratum: Stratum, delta: f64) {
        let o = self.stratum_offset(stratum);
        self.contact_counter[o] = (self.contact_counter[o] + delta).max(0.0);
    }

    pub fn add_unqueued_contact(&mut self, stratum: Stratum, delta: f64) {
        let o = self.stratum_offset(stratum);
        self.unqueued_contact_counter[o] = (self.unqueued_contact_counter[o] + delta).max(0.0);
    }

    pub fn add_unqueued_event(&mut self, stratum: Stratum, compartment: usize, delta: f64) {
        let o = self.cell_offset(stratum, compartment);
        self.unqueued_event_counter[o] = (self.unqueued_event_counter[o] + delta).max(0.0);
    }

    /// Reset per-realization stochastic state. The event queue keeps its
    /// capacity; counters zero; the tensor itself is restored by cloning the
    /// pristine network, not here.
    pub fn reset_stochastic_state(&mut self) {
        self.event_queue.clear();
        self.contact_counter.fill(0.0);
        self.unqueued_contact_counter.fill(0.0);
        self.unqueued_event_counter.fill(0.0);
    }
}

//! Event-driven stochastic SEATIRD engine.
//!
//! Each exposure pre-samples the individual's full trajectory through the
//! A/T/I stages and queues exactly one transition event per stage actually
//! reached, plus a stream of contact events while the individual is
//! transmitting. The daily step dispatches queued events in ascending time
//! order up to `t_max = day + 1`, thinning stale events and contacts with
//! the node's bookkeeping counters.

use rand::{Rng, RngCore};

use super::DiseaseModel;
use crate::model::{CompartmentSet, Event, EventKind, Node, PopulationCompartments, Stratum, VaccineGroup};
use crate::npi::NpiSchedule;
use crate::params::SeatirdRates;
use crate::rng::{rand_exp, rand_exp_min1, rand_int};
use crate::vaccine::VaccineModel;

#[derive(Debug, Clone, Copy)]
struct CompartmentIndices {
    e: usize,
    a: usize,
    t: usize,
    i: usize,
    r: usize,
    d: usize,
}

/// Pre-sampled transition times for one newly exposed individual.
///
/// `exit_asymptomatic` is the time the individual leaves A by recovery or
/// death (infinity when progression to T happens first);
/// `exit_infectious` covers the treatable/infectious stages; `trd_ati` is
/// the earliest exit from any transmitting stage, bounding the contact
/// stream.
#[derive(Debug, Clone, Copy)]
struct TransitionSchedule {
    ta: f64,
    tt: f64,
    ti: f64,
    td_a: f64,
    td_ti: f64,
    tr_a: f64,
    tr_ti: f64,
    exit_asymptomatic: f64,
    exit_infectious: f64,
    trd_ati: f64,
}

impl TransitionSchedule {
    fn draw(rates: &SeatirdRates, now: f64, stratum: Stratum, rng: &mut dyn RngCore) -> Self {
        let nu = rates.nu[stratum.age][stratum.risk.index()];
        let ta = rand_exp_min1(rates.tau, rng) + now;
        let tt = rand_exp_min1(rates.kappa, rng) + ta;
        let ti = tt + rates.chi_period;
        let td_a = rand_exp(nu, rng) + ta;
        let tr_a = rand_exp(rates.gamma, rng) + ta;
        let td_ti = rand_exp(nu, rng) + tt;
        let tr_ti = rand_exp(rates.gamma, rng) + tt;

        let mut exit_asymptomatic = td_a.min(tr_a);
        if tt < exit_asymptomatic {
            exit_asymptomatic = f64::INFINITY;
        }
        let exit_infectious = td_ti.min(tr_ti);
        Self {
            ta,
            tt,
            ti,
            td_a,
            td_ti,
            tr_a,
            tr_ti,
            exit_asymptomatic,
            exit_infectious,
            trd_ati: exit_asymptomatic.min(exit_infectious),
        }
    }
}

pub struct StochasticSeatird {
    rates: SeatirdRates,
    npi: NpiSchedule,
    contact_matrix: Vec<Vec<f64>>,
    transmitting: Vec<(usize, f64)>,
    idx: CompartmentIndices,
}

impl StochasticSeatird {
    pub fn compartment_set() -> CompartmentSet {
        CompartmentSet::seatird()
    }

    pub fn new(rates: SeatirdRates, npi: NpiSchedule, contact_matrix: Vec<Vec<f64>>) -> Self {
        let set = Self::compartment_set();
        let idx = CompartmentIndices {
            e: set.resolve("E"),
            a: set.resolve("A"),
            t: set.resolve("T"),
            i: set.resolve("I"),
            r: set.resolve("R"),
            d: set.resolve("D"),
        };
        Self {
            rates,
            npi,
            contact_matrix,
            transmitting: vec![(idx.a, 1.0), (idx.t, 1.0), (idx.i, 1.0)],
            idx,
        }
    }

    fn transition_indices(&self, kind: EventKind) -> Option<(usize, usize)> {
        let idx = self.idx;
        match kind {
            EventKind::EtoA => Some((idx.e, idx.a)),
            EventKind::AtoT => Some((idx.a, idx.t)),
            EventKind::AtoR => Some((idx.a, idx.r)),
            EventKind::AtoD => Some((idx.a, idx.d)),
            EventKind::TtoI => Some((idx.t, idx.i)),
            EventKind::TtoR => Some((idx.t, idx.r)),
            EventKind::TtoD => Some((idx.t, idx.d)),
            EventKind::ItoR => Some((idx.i, idx.r)),
            EventKind::ItoD => Some((idx.i, idx.d)),
            EventKind::Contact => None,
        }
    }

    /// Expose one susceptible: move S -> E, queue the individual's
    /// transition events and generate their contact stream.
    fn expose_one(
        &self,
        node: &mut Node,
        stratum: Stratum,
        now: f64,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    ) -> bool {
        let s_index = node.compartments.susceptible_index();
        if node.compartments.get(stratum, s_index) < 1.0 {
            return false;
        }
        node.compartments.move_one(stratum, s_index, self.idx.e);

        let schedule = TransitionSchedule::draw(&self.rates, now, stratum, rng);
        self.queue_transitions(node, stratum, now, &schedule);
        self.generate_contacts(node, stratum, now, &schedule, vaccine, rng);
        true
    }

    /// Queue exactly one transition event per stage the individual reaches;
    /// the earliest-time branch wins at each stage.
    fn queue_transitions(
        &self,
        node: &mut Node,
        stratum: Stratum,
        now: f64,
        schedule: &TransitionSchedule,
    ) {
        let mut push = |time: f64, kind: EventKind| {
            if time.is_finite() {
                node.event_queue.push(Event {
                    init_time: now,
                    time,
                    kind,
                    origin: stratum,
                    destination: stratum,
                });
            }
        };
        push(schedule.ta, EventKind::EtoA);

        if schedule.exit_asymptomatic.is_finite() {
            // Leaves A by death or recovery before turning treatable.
            if schedule.td_a <= schedule.tr_a {
                push(schedule.td_a, EventKind::AtoD);
            } else {
                push(schedule.tr_a, EventKind::AtoR);
            }
            return;
        }
        push(schedule.tt, EventKind::AtoT);
        if schedule.exit_infectious < schedule.ti {
            // Leaves T before progressing to I.
            if schedule.td_ti <= schedule.tr_ti {
                push(schedule.td_ti, EventKind::TtoD);
            } else {
                push(schedule.tr_ti, EventKind::TtoR);
            }
        } else {
            push(schedule.ti, EventKind::TtoI);
            if schedule.td_ti <= schedule.tr_ti {
                push(schedule.td_ti, EventKind::ItoD);
            } else {
                push(schedule.tr_ti, EventKind::ItoR);
            }
        }
    }

    /// Generate the individual's contact events from symptom-free onset
    /// (`Ta`) until they stop transmitting (`Trd_ati`).
    fn generate_contacts(
        &self,
        node: &mut Node,
        stratum: Stratum,
        now: f64,
        schedule: &TransitionSchedule,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    ) {
        let beta_vector =
            self.npi
                .beta_with_npi(self.rates.beta, now.ceil() as usize, node.node_index);
        let destinations: Vec<Stratum> = node.compartments.strata().collect();
        for destination in destinations {
            let share = node.group_share(destination);
            if share <= 0.0 {
                continue;
            }
            let ve = match destination.vaccine {
                VaccineGroup::Vaccinated => vaccine.effectiveness(destination.age),
                VaccineGroup::Unvaccinated => 0.0,
            };
            let rate = (1.0 - ve)
                * beta_vector[destination.age]
                * self.contact_matrix[stratum.age][destination.age]
                * self.rates.sigma[destination.age]
                * share;
            if rate <= 0.0 {
                continue;
            }
            let mut time = schedule.ta + rand_exp(rate, rng);
            while time < schedule.trd_ati {
                node.event_queue.push(Event {
                    init_time: now,
                    time,
                    kind: EventKind::Contact,
                    origin: stratum,
                    destination,
                });
                node.add_contact(destination, 1.0);
                time += rand_exp(rate, rng);
            }
        }
    }

    /// Decide whether a queued transition still represents a live
    /// individual. Fresh treatable-stage events pass outright; everything
    /// else survives a Bernoulli thinning against the day-start counts.
    fn keep_event(
        &self,
        node: &Node,
        day_start: &PopulationCompartments,
        event: &Event,
        source: usize,
        now: f64,
        rng: &mut dyn RngCore,
    ) -> bool {
        if source == self.idx.t && event.init_time == now {
            return true;
        }
        let unqueued = node.unqueued_event_counter(event.origin, source);
        if unqueued <= 0.0 {
            return true;
        }
        let initial = day_start.get(event.origin, source);
        let p = initial / (initial + unqueued);
        rng.random::<f64>() < p
    }

    fn handle_transition(
        &self,
        node: &mut Node,
        day_start: &PopulationCompartments,
        event: Event,
        now: f64,
        rng: &mut dyn RngCore,
    ) {
        let Some((source, destination)) = self.transition_indices(event.kind) else {
            return;
        };
        if node.compartments.get(event.origin, source) < 1.0 {
            // Orphaned: the compartment emptied through another path since
            // this event was queued.
            node.add_unqueued_event(event.origin, source, 1.0);
            return;
        }
        if !self.keep_event(node, day_start, &event, source, now, rng) {
            node.add_unqueued_event(event.origin, source, -1.0);
            return;
        }
        node.compartments.move_one(event.origin, source, destination);
    }

    fn handle_contact(
        &self,
        node: &mut Node,
        event: Event,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    ) {
        let destination = event.destination;
        let queued = node.contact_counter(destination);
        if queued <= 0.0 {
            return;
        }
        let stale = node.unqueued_contact_counter(destination);
        if stale > 0.0 {
            let keep = rng.random::<f64>() < queued / (queued + stale);
            node.add_contact(destination, -1.0);
            if !keep {
                node.add_unqueued_contact(destination, -1.0);
                return;
            }
        } else {
            node.add_contact(destination, -1.0);
        }

        let population = node.compartments.demographic_population(destination).floor();
        if population < 1.0 {
            node.add_unqueued_contact(destination, 1.0);
            return;
        }
        // Uniform contactee; only an index landing within the susceptible
        // block produces an exposure.
        let contactee = rand_int(1, population as u64, rng) as f64;
        let s_index = node.compartments.susceptible_index();
        if contactee <= node.compartments.get(destination, s_index) {
            self.expose_one(node, destination, event.time, vaccine, rng);
        }
    }
}

impl DiseaseModel for StochasticSeatird {
    fn transmitting_weights(&self) -> &[(usize, f64)] {
        &self.transmitting
    }

    fn relative_susceptibility(&self) -> &[f64] {
        &self.rates.sigma
    }

    fn beta_with_npi(&self, now: usize, node_index: usize) -> Vec<f64> {
        self.npi.beta_with_npi(self.rates.beta, now, node_index)
    }

    fn simulate(
        &mut self,
        node: &mut Node,
        now: usize,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    ) {
        let t_max = now as f64;
        let day_start = node.compartments.clone();
        while let Some(event) = node.event_queue.pop_before(t_max) {
            let event_now = event.time;
            match event.kind {
                EventKind::Contact => self.handle_contact(node, event, vaccine, rng),
                _ => self.handle_transition(node, &day_start, event, event_now, rng),
            }
        }
    }

    fn expose(
        &mut self,
        node: &mut Node,
        stratum: Stratum,
        count: f64,
        now: usize,
        vaccine: &VaccineModel,
        rng: &mut dyn RngCore,
    ) {
        let s_index = node.compartments.susceptible_index();
        let available = node.compartments.get(stratum, s_index);
        let n = count.min(available).floor() as u64;
        for _ in 0..n {
            if !self.expose_one(node, stratum, now as f64, vaccine, rng) {
                break;
            }
        }
    }
}

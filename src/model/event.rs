use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::stratum::Stratum;

/// Transition and contact event kinds for the event-driven engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EtoA,
    AtoT,
    AtoR,
    AtoD,
    TtoI,
    TtoR,
    TtoD,
    ItoR,
    ItoD,
    Contact,
}

impl EventKind {
    /// `(origin, destination)` compartment labels for transition events.
    pub fn transition_labels(self) -> Option<(&'static str, &'static str)> {
        match self {
            EventKind::EtoA => Some(("E", "A")),
            EventKind::AtoT => Some(("A", "T")),
            EventKind::AtoR => Some(("A", "R")),
            EventKind::AtoD => Some(("A", "D")),
            EventKind::TtoI => Some(("T", "I")),
            EventKind::TtoR => Some(("T", "R")),
            EventKind::TtoD => Some(("T", "D")),
            EventKind::ItoR => Some(("I", "R")),
            EventKind::ItoD => Some(("I", "D")),
            EventKind::Contact => None,
        }
    }
}

/// One future occurrence in the stochastic engine.
///
/// `origin` is the stratum whose compartment the event acts on; for contact
/// events `destination` is the stratum a contact lands in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub init_time: f64,
    pub time: f64,
    pub kind: EventKind,
    pub origin: Stratum,
    pub destination: Stratum,
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    event: Event,
    seq: u64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // Max-heap inverted into a min-heap on time; equal times dispatch in
    // insertion order so trajectories are reproducible under a fixed seed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of pending events, owned by a node.
///
/// A min-heap keyed by event time; `clear` keeps the allocation so a
/// realization restart reuses capacity.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(QueuedEvent { event, seq });
    }

    /// Time of the next pending event, if any.
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|q| q.event.time)
    }

    /// Pop the next event if it occurs strictly before `t_max`.
    pub fn pop_before(&mut self, t_max: f64) -> Option<Event> {
        match self.heap.peek() {
            Some(q) if q.event.time < t_max => Some(self.heap.pop().unwrap().event),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.seq = 0;
    }
}

//! Discrete-event clock underlying the tick scheduler (C11).
//!
//! A `BinaryHeap<Event>` min-heap ordered by `(timestamp, kind)` for
//! deterministic same-timestamp tie-breaking, with `EventKind`/
//! `EventSubject` enums and a `schedule_at`/`schedule_in`/`pop_next` API
//! surface. A recurring `Tick` event is what realizes the fixed-UPS update
//! loop described in §4.11 on top of this event-queue substrate.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

/// Ordered so that, at equal timestamps, administrative events (halt, kill)
/// are processed before ordinary per-tick work, and completions are
/// processed before the state machine re-evaluates a product — this is the
/// engine's own deterministic tie-break, not specified numerically by §5
/// beyond "messages preserve sender→receiver FIFO order".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Halt,
    KillProduct,
    ProductionBailed,
    ProcessingCompleted,
    TransportCompleted,
    StartProcessing,
    CreateProduct,
    Tick,
    Render,
    SimulationStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSubject {
    None,
    Mover(Entity),
    Producer(Entity),
    Product(Entity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: EventSubject,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap, we want the smallest timestamp
        // (and, within a timestamp, the highest-priority kind) on top.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.kind.cmp(&self.kind))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being handled, inserted as a resource for the
/// duration of one dispatch pass.
#[derive(Resource, Debug, Clone, Copy)]
pub struct CurrentEvent(pub Event);

#[derive(Resource, Debug, Default)]
pub struct SimulationClock {
    now: u64,
    events: BinaryHeap<Event>,
}

impl SimulationClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.events.push(Event {
            timestamp,
            kind,
            subject: subject.unwrap_or(EventSubject::None),
        });
    }

    pub fn schedule_in(&mut self, delta_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now + delta_ms, kind, subject);
    }

    pub fn schedule_in_secs(&mut self, delta_secs: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_in(delta_secs * 1000, kind, subject);
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}

//! Producer service queue and processing timer (C7).
//!
//! Cost delegation is plain calculation functions plus a `Copy` config
//! struct; the service-requester handle is an `Option<Entity>` backlink,
//! same idiom as the rest of this crate's cross-entity relationships.

use std::collections::{HashMap, VecDeque};

use bevy_ecs::prelude::*;

use crate::cost::{self, CostModel, COST_UNAVAILABLE};
use crate::geometry::{Rect, Vec2};

/// Closed enumeration of interaction kinds; the specific set is data (loaded
/// from the blueprint), not code (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Interaction(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Alive,
    Blocked,
}

/// Immutable per-interaction timing/cost table entry.
#[derive(Debug, Clone, Copy)]
pub struct InteractionSpec {
    pub ticks: u64,
    pub cost: u64,
}

/// Ticks per second of processing-countdown time; ties the 2 mm/tick mover
/// speed convention to 2 m/s real speed (§4.7).
pub const PROCESSING_TIME_UNIT: u64 = 1000;

#[derive(Component, Debug)]
pub struct Producer {
    pub id: String,
    pub center: Vec2,
    pub radius: f64,
    /// Rendezvous region where movers deliver and processing is drawn.
    pub processer: Rect,
    pub state: ProducerState,
    pub interactions: HashMap<Interaction, InteractionSpec>,
    pub executed_counts: HashMap<Interaction, u64>,
    pub ticks_so_far: HashMap<Interaction, u64>,
    pub queue: VecDeque<Entity>,
    pub max_queue: u32,
    pub countdown: u64,
    pub active_interaction: Option<Interaction>,
    /// Product currently being served, mirrors `Mover::service_requester`.
    pub service_requester: Option<Entity>,
    pub empty_queue_ticks: u64,
}

impl Producer {
    pub fn new(id: String, center: Vec2, processer: Rect, max_queue: u32) -> Self {
        Self {
            id,
            center,
            radius: processer.radius(),
            processer,
            state: ProducerState::Alive,
            interactions: HashMap::new(),
            executed_counts: HashMap::new(),
            ticks_so_far: HashMap::new(),
            queue: VecDeque::new(),
            max_queue,
            countdown: 0,
            active_interaction: None,
            service_requester: None,
            empty_queue_ticks: 0,
        }
    }

    pub fn offers(&self, interaction: &Interaction) -> bool {
        self.interactions.contains_key(interaction)
    }

    pub fn is_queue_full(&self) -> bool {
        self.queue.len() as u32 >= self.max_queue
    }

    /// Removes `product` from the wait queue without processing it, used
    /// when a queued product can't find a mover and gives up its slot, or
    /// when the producer blocks mid-service and bails whoever it was
    /// serving. Clears the processing countdown along with the requester so
    /// invariant 2 (`service_requester.is_some() <=> countdown > 0`) holds.
    pub fn cancel_queue(&mut self, product: Entity) {
        self.queue.retain(|&p| p != product);
        if self.service_requester == Some(product) {
            self.service_requester = None;
            self.countdown = 0;
            self.active_interaction = None;
        }
    }

    /// `start_processing(interaction, actor)`: countdown =
    /// `PROCESSING_TIME_UNIT · ticks(interaction)` (§4.7).
    pub fn start_processing(&mut self, interaction: Interaction, actor: Entity) {
        let ticks = self.interactions.get(&interaction).map(|s| s.ticks).unwrap_or(0);
        self.countdown = PROCESSING_TIME_UNIT * ticks;
        self.active_interaction = Some(interaction);
        self.service_requester = Some(actor);
    }

    /// `get_dummy_cost`/`get_mqtt_cost`: `u64::MAX` if the queue is full or
    /// the interaction is unsupported, otherwise delegates to the chosen
    /// cost model (§4.7).
    pub fn get_dummy_cost(&self, interaction: &Interaction, model: CostModel, tau: u64) -> u64 {
        let Some(spec) = self.interactions.get(interaction) else {
            return COST_UNAVAILABLE;
        };
        if self.is_queue_full() {
            return COST_UNAVAILABLE;
        }
        let raw = cost::producer_raw_cost(model, spec.ticks, spec.cost, self.queue.len() as u64);
        cost::dummy_cost(raw, tau)
    }

    pub fn get_mqtt_cost(&self, interaction: &Interaction, model: CostModel) -> u64 {
        let Some(spec) = self.interactions.get(interaction) else {
            return COST_UNAVAILABLE;
        };
        if self.is_queue_full() {
            return COST_UNAVAILABLE;
        }
        let raw = cost::producer_raw_cost(model, spec.ticks, spec.cost, self.queue.len() as u64);
        cost::mqtt_cost(raw)
    }

    /// `update()` per §4.7: decrement countdown while Alive; on reaching
    /// zero, bump counters and report completion, popping the served
    /// product off the queue. Returns the completed `(product, ticks)` pair,
    /// if any.
    pub fn update(&mut self) -> Option<(Entity, u64)> {
        if self.state != ProducerState::Alive {
            return None;
        }
        if self.countdown == 0 {
            if self.queue.is_empty() {
                self.empty_queue_ticks += 1;
            }
            return None;
        }

        self.countdown -= 1;
        if self.countdown == 0 {
            if let Some(interaction) = self.active_interaction.take() {
                *self.executed_counts.entry(interaction.clone()).or_insert(0) += 1;
                let ticks = self.interactions.get(&interaction).map(|s| s.ticks).unwrap_or(0);
                *self.ticks_so_far.entry(interaction).or_insert(0) += ticks;
                let requester = self.service_requester.take();
                self.queue.pop_front();
                if let Some(product) = requester {
                    return Some((product, ticks));
                }
            }
        }
        None
    }
}

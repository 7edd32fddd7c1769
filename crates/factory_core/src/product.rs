//! Product coordination state machine (C9): recipe progression, the
//! contract-net-style bidding that selects a producer and a mover for each
//! step, and retry/bail handling.
//!
//! The bidding/proposal functions follow a pluggable-strategy shape, and
//! `producer`/`mover` are held as `Option<Entity>` backlinks rather than
//! owning references.

use bevy_ecs::prelude::*;

use crate::cost::{self, CostModel, COST_UNAVAILABLE};
use crate::geometry::Vec2;
use crate::mover::{Mover, MoverKinematics, MoverState};
use crate::producer::{Interaction, Producer, ProducerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductState {
    WaitingForStart,
    AwaitingProductionQueued,
    AwaitingTransportAllocated,
    AwaitingTransport,
    AwaitingProcessing,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct Recipe(pub Vec<Interaction>);

#[derive(Component, Debug)]
pub struct Product {
    pub id: String,
    pub kind: String,
    pub recipe: Recipe,
    pub step: usize,
    pub producer: Option<Entity>,
    pub mover: Option<Entity>,
    pub state: ProductState,
    pub transport_ticks: u64,
    pub transport_distance: f64,
    pub processing_ticks: u64,
}

impl Product {
    pub fn new(id: String, kind: String, recipe: Recipe) -> Self {
        Self {
            id,
            kind,
            recipe,
            step: 0,
            producer: None,
            mover: None,
            state: ProductState::WaitingForStart,
            transport_ticks: 0,
            transport_distance: 0.0,
            processing_ticks: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step >= self.recipe.0.len()
    }

    pub fn current_interaction(&self) -> Option<&Interaction> {
        self.recipe.0.get(self.step)
    }
}

/// Period between a dropped step and its retry (§4.9).
pub const PRODUCE_CYCLE_MS: u64 = 1000;

/// Closed set of buildable product kinds and their recipes, loaded from the
/// blueprint's `productKinds` (§11 supplemental detail) and consulted by the
/// spawner (C12) when it creates a new product.
#[derive(Debug, Default, Resource)]
pub struct ProductKinds {
    pub recipes: std::collections::HashMap<String, Recipe>,
}

impl ProductKinds {
    pub fn kind_names(&self) -> Vec<&str> {
        self.recipes.keys().map(String::as_str).collect()
    }
}

/// Monotone per-kind counter used to mint `{kind}_{N}` product IDs (§3),
/// mirroring `MoverId`'s numbering convention.
#[derive(Debug, Default, Resource)]
pub struct ProductIdAllocator {
    next: std::collections::HashMap<String, u32>,
}

impl ProductIdAllocator {
    pub fn next_id(&mut self, kind: &str) -> String {
        let counter = self.next.entry(kind.to_string()).or_insert(0);
        let id = format!("{kind}_{counter}");
        *counter += 1;
        id
    }
}

/// `Call-For-Production-Proposal` (§4.9 step 1). Evaluates every producer
/// that offers `interaction` and is Alive (skipping if an already-assigned
/// mover is not Alive), keeping the first-seen tied minimum cost.
///
/// Also carries an early-accept branch (`mover_cost ≤ 10`) that is
/// unreachable under these conditions, kept for behavioral parity — see
/// DESIGN.md's open-question note on this function.
pub fn call_for_production_proposal<'a>(
    producers: impl IntoIterator<Item = (Entity, &'a Producer)>,
    mover: Option<(&Mover, &MoverKinematics)>,
    interaction: &Interaction,
    cost_model: CostModel,
    mqtt: bool,
) -> Option<Entity> {
    let mut best: Option<(u64, Entity)> = None;

    for (producer_entity, producer) in producers {
        if producer.state != ProducerState::Alive || !producer.offers(interaction) {
            continue;
        }
        if let Some((m, _)) = mover {
            if m.state != MoverState::Alive {
                continue;
            }
        }

        let mover_cost = match mover {
            Some((_, kin)) => cost::transport_cost(kin.center(), producer.processer.center()),
            None => COST_UNAVAILABLE,
        };

        if mover_cost == COST_UNAVAILABLE {
            // Unreachable: `mover_cost` is only `COST_UNAVAILABLE` when no
            // mover is assigned, in which case a real "mover cost" doesn't
            // exist to compare against 10. Reproduced as the source has it.
            if mover_cost <= 10 {
                return Some(producer_entity);
            }
        }

        let tau = if mover_cost == COST_UNAVAILABLE { 1 } else { 1 + mover_cost };
        let raw_cost = if mqtt {
            producer.get_mqtt_cost(interaction, cost_model)
        } else {
            producer.get_dummy_cost(interaction, cost_model, tau)
        };
        if raw_cost == COST_UNAVAILABLE {
            continue;
        }

        best = match best {
            Some((best_cost, _)) if best_cost <= raw_cost => best,
            _ => Some((raw_cost, producer_entity)),
        };
    }

    best.map(|(_, e)| e)
}

/// `Call-For-Transport-Proposal` (§4.9 step 3): tied-minimum among Alive,
/// unassigned movers by transport cost to `target`.
pub fn call_for_transport_proposal<'a>(
    movers: impl IntoIterator<Item = (Entity, &'a Mover, &'a MoverKinematics)>,
    target: Vec2,
) -> Option<Entity> {
    let mut best: Option<(u64, Entity)> = None;

    for (entity, mover, kinematics) in movers {
        if mover.state != MoverState::Alive || mover.service_requester.is_some() {
            continue;
        }
        let cost = cost::transport_cost(kinematics.center(), target);
        best = match best {
            Some((best_cost, _)) if best_cost <= cost => best,
            _ => Some((cost, entity)),
        };
    }

    best.map(|(_, e)| e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::mover::MoverModel;
    use crate::producer::InteractionSpec;

    fn producer_with_queue(len: usize, max: u32) -> Producer {
        let mut p = Producer::new(
            "p1".into(),
            Vec2::new(0.0, 0.0),
            Rect::from_center(Vec2::ZERO, Vec2::new(2.0, 2.0)),
            max,
        );
        p.interactions.insert(Interaction("Place".into()), InteractionSpec { ticks: 1, cost: 1 });
        for _ in 0..len {
            p.queue.push_back(Entity::PLACEHOLDER);
        }
        p
    }

    #[test]
    fn production_proposal_skips_full_queue() {
        let full = producer_with_queue(2, 2);
        let e = Entity::from_raw(1);
        let result = call_for_production_proposal(
            [(e, &full)],
            None,
            &Interaction("Place".into()),
            CostModel::Linear,
            false,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn production_proposal_picks_cheaper_producer() {
        let cheap = producer_with_queue(0, 2);
        let mut pricier = producer_with_queue(0, 2);
        pricier.interactions.insert(Interaction("Place".into()), InteractionSpec { ticks: 50, cost: 50 });
        let cheap_e = Entity::from_raw(1);
        let pricier_e = Entity::from_raw(2);
        let result = call_for_production_proposal(
            [(pricier_e, &pricier), (cheap_e, &cheap)],
            None,
            &Interaction("Place".into()),
            CostModel::Linear,
            false,
        );
        assert_eq!(result, Some(cheap_e));
    }

    #[test]
    fn transport_proposal_skips_already_assigned_movers() {
        let model = MoverModel("forklift".into());
        let busy = Mover {
            id: crate::mover::MoverId::new("forklift", 1),
            model: model.clone(),
            state: MoverState::Alive,
            service_requester: Some(Entity::PLACEHOLDER),
        };
        let free = Mover {
            id: crate::mover::MoverId::new("forklift", 2),
            model,
            state: MoverState::Alive,
            service_requester: None,
        };
        let busy_kin = MoverKinematics {
            position: Vec2::ZERO,
            dim: Vec2::new(2.0, 2.0),
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            max_speed: 2.0,
            max_force: 1.0,
            cell_weight: 16,
        };
        let free_kin = MoverKinematics { position: Vec2::new(50.0, 0.0), ..busy_kin };
        let busy_e = Entity::from_raw(1);
        let free_e = Entity::from_raw(2);
        let result = call_for_transport_proposal(
            [(busy_e, &busy, &busy_kin), (free_e, &free, &free_kin)],
            Vec2::new(60.0, 0.0),
        );
        assert_eq!(result, Some(free_e));
    }
}

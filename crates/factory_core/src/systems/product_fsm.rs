//! Product state machine event handlers (§4.9): `StartProcessing`,
//! `TransportCompleted`, `ProcessingCompleted`, `ProductionBailed` and
//! `KillProduct`. Drives the bidding functions in `product.rs` and the
//! single-writer coordinators behind `bidding_transport::BiddingTransport`.
//!
//! The coordinators resolve synchronously (§9, see `coordinators.rs`'s doc
//! comment), so this module folds the conceptual request/response event pair
//! (e.g. `RequestQueueProduction` -> `ProductionQueued`) into a single
//! function call rather than scheduling a second clock event for the
//! response half.

use std::collections::HashSet;

use bevy_ecs::prelude::{Entity, World};

use crate::bidding_transport::BiddingTransport;
use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::cost::CostModel;
use crate::grid::{CellCoord, Grid};
use crate::mover::{self, Mover, MoverKinematics, MoverNavigation, MoverStats};
use crate::pathfind::find_path;
use crate::producer::Producer;
use crate::product::{call_for_production_proposal, call_for_transport_proposal, Product, ProductState, PRODUCE_CYCLE_MS};
use crate::spawner::Spawner;
use crate::supervisor::{ProductProgress, Supervisor};

fn schedule_retry(clock: &mut SimulationClock, product: Entity) {
    clock.schedule_in(PRODUCE_CYCLE_MS, EventKind::StartProcessing, Some(EventSubject::Product(product)));
}

fn schedule_start_processing_now(clock: &mut SimulationClock, product: Entity) {
    clock.schedule_in(0, EventKind::StartProcessing, Some(EventSubject::Product(product)));
}

/// Releases whatever mover the product still carries back to the fleet.
/// §4.9's happy-path prose never says this in so many words, but §3's
/// invariant 3 ("a mover's `service_requester` is either None or the
/// product it carries") and §9's "resolve via the environment on each
/// message" cyclic-reference guidance both require it: the product actor
/// is about to stop, so its claim on the mover must not outlive it, or the
/// mover would sit permanently unavailable to every future product.
fn release_mover(world: &mut World, product_entity: Entity) {
    let Some(mover_entity) = world.get::<Product>(product_entity).and_then(|p| p.mover) else {
        return;
    };
    if let Some(mut mover) = world.get_mut::<Mover>(mover_entity) {
        if mover.service_requester == Some(product_entity) {
            mover.service_requester = None;
        }
    }
}

fn finalize(world: &mut World, product_entity: Entity) {
    let Some(product) = world.get::<Product>(product_entity) else { return };
    let progress = ProductProgress::from_product(product);
    world.resource_mut::<Supervisor>().record_completed(product_entity, progress);
    release_mover(world, product_entity);
    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.state = ProductState::Terminal;
        product.mover = None;
    }
    world.resource_mut::<Spawner>().on_terminated();
}

/// `StartProcessing` (§4.9 steps 1-5): runs the producer bid, then the mover
/// bid (skipping either if the product already carries an assignment from a
/// prior recipe step), then kicks off the transport leg.
pub fn handle_start_processing(
    world: &mut World,
    clock: &mut SimulationClock,
    transport: &mut dyn BiddingTransport,
    cost_model: CostModel,
    mqtt: bool,
    cycle_running: bool,
    product_entity: Entity,
) {
    if !cycle_running {
        schedule_retry(clock, product_entity);
        return;
    }

    let Some((is_terminal, interaction, producer, mover)) = world.get::<Product>(product_entity).map(|p| {
        (p.is_terminal(), p.current_interaction().cloned(), p.producer, p.mover)
    }) else {
        return;
    };

    if is_terminal {
        finalize(world, product_entity);
        return;
    }
    let Some(interaction) = interaction else {
        finalize(world, product_entity);
        return;
    };

    if let Some(product) = world.get::<Product>(product_entity) {
        let progress = ProductProgress::from_product(product);
        world.resource_mut::<Supervisor>().track_in_progress(product_entity, progress);
    }

    let producer_entity = match producer {
        Some(p) => p,
        None => {
            let proposal = {
                let mut q = world.query::<(Entity, &Producer)>();
                let mover_data = mover.and_then(|m| {
                    let mv = world.get::<Mover>(m)?;
                    let kin = world.get::<MoverKinematics>(m)?;
                    Some((mv, kin))
                });
                call_for_production_proposal(q.iter(world), mover_data, &interaction, cost_model, mqtt)
            };
            let Some(candidate) = proposal else {
                schedule_retry(clock, product_entity);
                return;
            };
            if !transport.request_queue_production(world, candidate, product_entity) {
                schedule_retry(clock, product_entity);
                return;
            }
            if let Some(mut product) = world.get_mut::<Product>(product_entity) {
                product.producer = Some(candidate);
                product.state = ProductState::AwaitingProductionQueued;
            }
            candidate
        }
    };

    let mover_entity = match mover {
        Some(m) => m,
        None => {
            let target = match world.get::<Producer>(producer_entity) {
                Some(p) => p.processer.center(),
                None => {
                    schedule_retry(clock, product_entity);
                    return;
                }
            };
            let proposal = {
                let mut q = world.query::<(Entity, &Mover, &MoverKinematics)>();
                call_for_transport_proposal(q.iter(world), target)
            };
            let Some(candidate) = proposal else {
                // No mover anywhere in the fleet can be dispatched; give up
                // the producer's queue slot rather than hold it forever.
                if let Some(mut p) = world.get_mut::<Producer>(producer_entity) {
                    p.cancel_queue(product_entity);
                }
                if let Some(mut product) = world.get_mut::<Product>(product_entity) {
                    product.producer = None;
                    product.state = ProductState::WaitingForStart;
                }
                schedule_retry(clock, product_entity);
                return;
            };
            if !transport.request_transport_allocation(world, candidate, product_entity) {
                // Keep the producer queued; only the mover bid failed.
                schedule_retry(clock, product_entity);
                return;
            }
            if let Some(mut product) = world.get_mut::<Product>(product_entity) {
                product.mover = Some(candidate);
                product.state = ProductState::AwaitingTransportAllocated;
            }
            candidate
        }
    };

    execute_transport(world, clock, producer_entity, mover_entity, product_entity);
}

/// `ExecuteTransport` (§4.9 step 5): paths the assigned mover to the
/// producer's processer rendezvous and starts its transport leg.
fn execute_transport(world: &mut World, clock: &mut SimulationClock, producer_entity: Entity, mover_entity: Entity, product_entity: Entity) {
    let Some(destination) = world.get::<Producer>(producer_entity).map(|p| p.processer.center()) else {
        schedule_retry(clock, product_entity);
        return;
    };
    let origin = match world.get::<MoverKinematics>(mover_entity) {
        Some(k) => k.center(),
        None => {
            schedule_retry(clock, product_entity);
            return;
        }
    };
    let path = {
        let grid = world.resource::<Grid>();
        find_path(grid, origin, destination)
    };
    if path.is_empty() {
        if let Some(mut nav) = world.get_mut::<MoverNavigation>(mover_entity) {
            nav.flags.destination_unreachable = true;
        }
        schedule_retry(clock, product_entity);
        return;
    }

    if let (Some(mut nav), Some(mut stats)) = (
        world.get_mut::<MoverNavigation>(mover_entity),
        world.get_mut::<MoverStats>(mover_entity),
    ) {
        mover::start_transport(&mut nav, &mut stats, destination, path);
        nav.flags.active = true;
        nav.flags.destination_unreachable = false;
    }
    // §4.6: `start_transport` releases parking. The mover now carries a
    // `service_requester`, so `systems::parking_system::update_parking` will
    // no longer touch it anyway, but dropping its slot here immediately
    // frees it for another idle mover to claim this tick rather than next.
    if let Some(model) = world.get::<Mover>(mover_entity).map(|m| m.model.clone()) {
        world.resource_mut::<crate::parking::ParkingManager>().leave_space(&model, mover_entity);
    }
    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.state = ProductState::AwaitingTransport;
    }
}

/// `TransportCompleted` (§4.9 step 5 -> 6): the mover has arrived at its
/// producer's rendezvous; accumulate its leg and start processing, or bail
/// if the producer went Blocked while the mover was en route.
pub fn handle_transport_completed(world: &mut World, clock: &mut SimulationClock, mover_entity: Entity, product_entity: Entity) {
    let (ticks, distance) = match world.get::<MoverStats>(mover_entity) {
        Some(stats) => (stats.transport_ticks, stats.transport_distance),
        None => (0, 0.0),
    };
    let Some(producer_entity) = world.get::<Product>(product_entity).and_then(|p| p.producer) else {
        return;
    };

    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.transport_ticks += ticks;
        product.transport_distance += distance;
    }

    let producer_alive = world
        .get::<Producer>(producer_entity)
        .map(|p| p.state == crate::producer::ProducerState::Alive)
        .unwrap_or(false);

    if !producer_alive {
        handle_production_bailed(world, clock, product_entity);
        return;
    }

    let interaction = world.get::<Product>(product_entity).and_then(|p| p.current_interaction().cloned());
    let Some(interaction) = interaction else { return };
    if let Some(mut producer) = world.get_mut::<Producer>(producer_entity) {
        producer.start_processing(interaction, product_entity);
    }
    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.state = ProductState::AwaitingProcessing;
    }
}

/// `ProcessingCompleted` (§4.9 step 6 -> 1): accumulate the processing leg,
/// free the mover's rendezvous cell, advance the recipe step and retry
/// `StartProcessing` immediately.
pub fn handle_processing_completed(
    world: &mut World,
    clock: &mut SimulationClock,
    grid: &Grid,
    exclude_cells: &HashSet<CellCoord>,
    product_entity: Entity,
    ticks: u64,
) {
    let Some(producer_entity) = world.get::<Product>(product_entity).and_then(|p| p.producer) else {
        return;
    };
    let mover_entity = world.get::<Product>(product_entity).and_then(|p| p.mover);

    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.processing_ticks += ticks;
        product.producer = None;
        product.step += 1;
    }
    let _ = producer_entity;

    if let Some(mover_entity) = mover_entity {
        let snapshot = world.get::<MoverKinematics>(mover_entity).map(|k| MoverKinematics {
            position: k.position,
            dim: k.dim,
            velocity: k.velocity,
            acceleration: k.acceleration,
            max_speed: k.max_speed,
            max_force: k.max_force,
            cell_weight: k.cell_weight,
        });
        if let (Some(snapshot), Some(mut nav)) = (snapshot, world.get_mut::<MoverNavigation>(mover_entity)) {
            mover::vacate_processing_rendezvous(grid, &mut nav, &snapshot, exclude_cells);
        }
    }

    schedule_start_processing_now(clock, product_entity);
}

/// `ProductionBailed` (§4.9, §4.14): the producer went Blocked while this
/// product was mid-leg. Drop the producer assignment, bail the mover's
/// interaction (§4.6's `interaction_bailed`, mirroring
/// `handle_processing_completed`'s `interaction_completed` path: vacate the
/// processing rendezvous so the mover isn't left parked on top of a producer
/// it's no longer serving) and retry.
pub fn handle_production_bailed(world: &mut World, clock: &mut SimulationClock, product_entity: Entity) {
    let mover_entity = world.get::<Product>(product_entity).and_then(|p| p.mover);
    let producer_entity = world.get::<Product>(product_entity).and_then(|p| p.producer);

    if let Some(producer_entity) = producer_entity {
        if let Some(mut producer) = world.get_mut::<Producer>(producer_entity) {
            producer.cancel_queue(product_entity);
        }
    }

    if let Some(mover_entity) = mover_entity {
        let grid = world.resource::<Grid>().clone();
        let exclude = crate::systems::tick::producer_processing_cells(world, &grid);
        let snapshot = world.get::<MoverKinematics>(mover_entity).map(|k| MoverKinematics {
            position: k.position,
            dim: k.dim,
            velocity: k.velocity,
            acceleration: k.acceleration,
            max_speed: k.max_speed,
            max_force: k.max_force,
            cell_weight: k.cell_weight,
        });
        if let (Some(snapshot), Some(mut nav)) = (snapshot, world.get_mut::<MoverNavigation>(mover_entity)) {
            mover::vacate_processing_rendezvous(&grid, &mut nav, &snapshot, &exclude);
        }
    }

    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.producer = None;
        product.state = ProductState::WaitingForStart;
    }
    schedule_retry(clock, product_entity);
}

/// `KillProduct` (§4.9, §7 tier 3): forcibly terminates a product, releasing
/// whatever mover/producer it held.
pub fn handle_kill_product(world: &mut World, product_entity: Entity) {
    let (mover_entity, producer_entity) = world
        .get::<Product>(product_entity)
        .map(|p| (p.mover, p.producer))
        .unwrap_or((None, None));

    if let Some(mover_entity) = mover_entity {
        if let Some(mut mover) = world.get_mut::<Mover>(mover_entity) {
            if mover.service_requester == Some(product_entity) {
                mover.service_requester = None;
            }
        }
    }
    if let Some(producer_entity) = producer_entity {
        if let Some(mut producer) = world.get_mut::<Producer>(producer_entity) {
            producer.cancel_queue(product_entity);
        }
    }
    if let Some(mut product) = world.get_mut::<Product>(product_entity) {
        product.state = ProductState::Terminal;
    }
    world.resource_mut::<Supervisor>().untrack(product_entity);
    world.resource_mut::<Spawner>().on_terminated();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding_transport::InProcessTransport;
    use crate::geometry::{Rect, Vec2};
    use crate::mover::{spawn_mover, MoverId, MoverModel};
    use crate::producer::{Interaction, InteractionSpec};
    use crate::product::{Product, ProductKinds, Recipe};

    fn test_world() -> World {
        let mut world = World::new();
        let mut grid = Grid::new(Vec2::new(10.0, 10.0), Vec2::new(200.0, 200.0));
        grid.generate(std::iter::empty());
        world.insert_resource(crate::grid::BorderIndex::build(&grid));
        world.insert_resource(grid);
        world.insert_resource(Supervisor::default());
        world.insert_resource(Spawner::new(10, 10));
        world.insert_resource(ProductKinds::default());
        world.insert_resource(crate::parking::ParkingManager::default());
        world
    }

    #[test]
    fn start_processing_assigns_producer_and_mover_then_begins_transport() {
        let mut world = test_world();
        let mut clock = SimulationClock::default();
        let mut transport = InProcessTransport;

        let mut producer = Producer::new(
            "p1".into(),
            Vec2::new(50.0, 50.0),
            Rect::from_center(Vec2::new(50.0, 50.0), Vec2::new(4.0, 4.0)),
            3,
        );
        producer.interactions.insert(Interaction("Place".into()), InteractionSpec { ticks: 1, cost: 1 });
        world.spawn(producer);

        spawn_mover(
            &mut world,
            MoverId::new("forklift", 1),
            MoverModel("forklift".into()),
            Vec2::new(10.0, 10.0),
            Vec2::new(2.0, 2.0),
            2.0,
            1.0,
            Vec2::new(10.0, 10.0),
        );

        let product_entity = world
            .spawn(Product::new("widget_0".into(), "widget".into(), Recipe(vec![Interaction("Place".into())])))
            .id();

        handle_start_processing(&mut world, &mut clock, &mut transport, CostModel::Linear, false, true, product_entity);

        let product = world.get::<Product>(product_entity).unwrap();
        assert!(product.producer.is_some());
        assert!(product.mover.is_some());
        assert_eq!(product.state, ProductState::AwaitingTransport);
    }

    #[test]
    fn start_processing_retries_when_cycle_not_running() {
        let mut world = test_world();
        let mut clock = SimulationClock::default();
        let mut transport = InProcessTransport;
        let product_entity = world
            .spawn(Product::new("widget_0".into(), "widget".into(), Recipe(vec![Interaction("Place".into())])))
            .id();

        handle_start_processing(&mut world, &mut clock, &mut transport, CostModel::Linear, false, false, product_entity);

        assert_eq!(clock.pending_event_count(), 1);
        assert_eq!(world.get::<Product>(product_entity).unwrap().state, ProductState::WaitingForStart);
    }

    #[test]
    fn kill_product_releases_its_mover() {
        let mut world = test_world();
        let mover_entity = world
            .spawn(Mover {
                id: MoverId::new("forklift", 1),
                model: MoverModel("forklift".into()),
                state: crate::mover::MoverState::Alive,
                service_requester: None,
            })
            .id();
        let product_entity = world
            .spawn(Product::new("widget_0".into(), "widget".into(), Recipe(vec![])))
            .id();
        world.get_mut::<Mover>(mover_entity).unwrap().service_requester = Some(product_entity);
        world.get_mut::<Product>(product_entity).unwrap().mover = Some(mover_entity);

        handle_kill_product(&mut world, product_entity);

        assert_eq!(world.get::<Mover>(mover_entity).unwrap().service_requester, None);
        assert_eq!(world.get::<Product>(product_entity).unwrap().state, ProductState::Terminal);
    }

    /// A product that finishes its recipe normally (no `KillProduct`
    /// involved) must still hand its mover back to the fleet, or that mover
    /// is stranded forever on a dead product and no later product can ever
    /// claim it (§3 invariant 3).
    #[test]
    fn finalize_on_recipe_completion_releases_the_mover() {
        let mut world = test_world();
        let mut clock = SimulationClock::default();
        let mut transport = InProcessTransport;

        let mover_entity = spawn_mover(
            &mut world,
            MoverId::new("forklift", 1),
            MoverModel("forklift".into()),
            Vec2::new(10.0, 10.0),
            Vec2::new(2.0, 2.0),
            2.0,
            1.0,
            Vec2::new(10.0, 10.0),
        );
        // recipe already exhausted (step == len): the next StartProcessing
        // should finalize immediately rather than bid for anything.
        let mut product = Product::new("widget_0".into(), "widget".into(), Recipe(vec![Interaction("Place".into())]));
        product.step = 1;
        product.mover = Some(mover_entity);
        let product_entity = world.spawn(product).id();
        world.get_mut::<Mover>(mover_entity).unwrap().service_requester = Some(product_entity);

        handle_start_processing(&mut world, &mut clock, &mut transport, CostModel::Linear, false, true, product_entity);

        assert_eq!(world.get::<Product>(product_entity).unwrap().state, ProductState::Terminal);
        assert_eq!(world.get::<Mover>(mover_entity).unwrap().service_requester, None);
    }

    #[test]
    fn production_bailed_drops_producer_and_vacates_the_mover_rendezvous() {
        let mut world = test_world();
        let mut clock = SimulationClock::default();

        let producer_entity = world
            .spawn(Producer::new(
                "p1".into(),
                Vec2::new(50.0, 50.0),
                Rect::from_center(Vec2::new(50.0, 50.0), Vec2::new(2.0, 2.0)),
                2,
            ))
            .id();
        let mover_entity = spawn_mover(
            &mut world,
            MoverId::new("forklift", 1),
            MoverModel("forklift".into()),
            Vec2::new(49.0, 49.0),
            Vec2::new(2.0, 2.0),
            2.0,
            1.0,
            Vec2::new(10.0, 10.0),
        );
        let mut product = Product::new("widget_0".into(), "widget".into(), Recipe(vec![Interaction("Place".into())]));
        product.producer = Some(producer_entity);
        product.mover = Some(mover_entity);
        product.state = ProductState::AwaitingProcessing;
        let product_entity = world.spawn(product).id();
        {
            let mut producer = world.get_mut::<Producer>(producer_entity).unwrap();
            producer.queue.push_back(product_entity);
            producer.start_processing(Interaction("Place".into()), product_entity);
        }

        handle_production_bailed(&mut world, &mut clock, product_entity);

        let product = world.get::<Product>(product_entity).unwrap();
        assert_eq!(product.producer, None);
        assert_eq!(product.state, ProductState::WaitingForStart);
        // mover got re-pointed away from the producer's own rendezvous cell
        let nav = world.get::<MoverNavigation>(mover_entity).unwrap();
        assert!(nav.flags.active);
        assert_ne!(nav.destination, Vec2::new(50.0, 50.0));
        // the bailed product must not remain in the blocked producer's queue,
        // and its processing countdown must be cleared (invariant 2) or a
        // later unblock would emit a stale ProcessingCompleted for it
        let producer = world.get::<Producer>(producer_entity).unwrap();
        assert!(!producer.queue.contains(&product_entity));
        assert_eq!(producer.service_requester, None);
        assert_eq!(producer.countdown, 0);
    }
}

//! Per-UPS-tick update: producer timers then mover kinematics (§4.11:
//! "producers.update; movers.update" ordering).

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::{Entity, World};

use crate::grid::{BorderIndex, CellCoord, Grid};
use crate::mover::{update_mover, GridCell, Mover, MoverKinematics, MoverNavigation, MoverStats};
use crate::producer::Producer;
use crate::steering::NeighborView;

/// Producer completions this tick: product entity -> ticks spent (§4.7).
/// Read and cleared by `product_fsm::drain_processing_completions`.
pub type ProcessingCompletions = HashMap<Entity, u64>;

/// Runs every producer's countdown (§4.7). Returns the set of products whose
/// processing just completed this tick.
pub fn update_producers(world: &mut World) -> ProcessingCompletions {
    let mut completions = ProcessingCompletions::new();
    let mut query = world.query::<&mut Producer>();
    for mut producer in query.iter_mut(world) {
        if let Some((product, ticks)) = producer.update() {
            completions.insert(product, ticks);
        }
    }
    completions
}

/// Snapshot of every alive mover's kinematics, taken once per tick before any
/// mover mutates its own state, so every agent steers against the
/// *start-of-tick* positions of its peers (mover.rs's non-aliasing
/// invariant).
fn snapshot_neighbors(world: &mut World) -> Vec<(Entity, NeighborView)> {
    let mut query = world.query::<(Entity, &MoverKinematics)>();
    query
        .iter(world)
        .map(|(e, k)| {
            (
                e,
                NeighborView {
                    center: k.center(),
                    dim: k.dim,
                    velocity: k.velocity,
                },
            )
        })
        .collect()
}

/// Nearest neighbors to `center`, sorted ascending by distance, excluding
/// `self_entity`. Steering behaviors themselves cap how many they actually
/// use (`COLLISION_NEIGHBOR_COUNT`); sorting here just ensures a `.take(n)`
/// downstream picks the closest ones.
fn nearest(all: &[(Entity, NeighborView)], self_entity: Entity, center: crate::geometry::Vec2) -> Vec<NeighborView> {
    let mut others: Vec<(f64, NeighborView)> = all
        .iter()
        .filter(|(e, _)| *e != self_entity)
        .map(|(_, n)| (center.distance(n.center), *n))
        .collect();
    others.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    others.into_iter().map(|(_, n)| n).collect()
}

/// A mover that arrived at its destination this tick while serving a
/// product: the `TransportCompleted` signal (§4.6). Ticks/distance are read
/// live off `MoverStats` by the handler rather than carried in this struct,
/// since nothing else mutates them before the handler runs (single update
/// thread, §5).
pub struct ArrivedTransport {
    pub mover: Entity,
    pub product: Entity,
}

/// Collects every grid cell currently acting as a producer's processing
/// rendezvous; these cells are excluded from `least_crowded_nearby` search
/// (§4.1) so a relocating mover never lands on top of a producer.
pub fn producer_processing_cells(world: &mut World, grid: &Grid) -> HashSet<CellCoord> {
    let mut query = world.query::<&Producer>();
    query.iter(world).map(|p| grid.cell(p.center)).collect()
}

/// Runs every alive mover's steering + kinematics integration (§4.6).
/// Returns the movers that completed a transport leg this tick.
pub fn update_movers(
    world: &mut World,
    grid: &mut Grid,
    borders: &BorderIndex,
    exclude_cells: &HashSet<CellCoord>,
    collision_counter: &mut u64,
) -> Vec<ArrivedTransport> {
    let neighbor_snapshot = snapshot_neighbors(world);
    let mut arrivals = Vec::new();

    let mut query = world.query::<(
        Entity,
        &mut Mover,
        &mut MoverKinematics,
        &mut MoverNavigation,
        &mut MoverStats,
        &mut GridCell,
    )>();

    for (entity, mut mover, mut kinematics, mut nav, mut stats, mut cell) in query.iter_mut(world) {
        let neighbors = nearest(&neighbor_snapshot, entity, kinematics.center());
        let arrived = update_mover(
            grid,
            borders,
            &mut mover,
            &mut kinematics,
            &mut nav,
            &mut stats,
            &neighbors,
            exclude_cells,
            collision_counter,
        );
        cell.0 = grid.cell(kinematics.center());

        if arrived {
            if let Some(product) = mover.service_requester {
                arrivals.push(ArrivedTransport { mover: entity, product });
            }
        }
    }

    arrivals
}

//! Mover kinematics and lifecycle (C6).
//!
//! Integration and follow-up-event scheduling live together in
//! `update_mover`; components are split for query efficiency, and the
//! service-requester relationship is an `Option<Entity>` backlink rather
//! than an owning reference.

use bevy_ecs::prelude::*;
use std::collections::HashSet;

use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::cost::transport_cost;
use crate::geometry::Vec2;
use crate::grid::{cell_weight_class, BorderIndex, CellCoord, Grid};
use crate::steering::{
    accumulate_forces, current_overlap_neighbors, default_behaviors, NeighborView, SteeringContext,
};

/// Mover identifier, `{model}_{N}` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MoverId(pub String);

impl MoverId {
    pub fn new(model: &str, n: u32) -> Self {
        Self(format!("{model}_{n}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MoverModel(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverState {
    Alive,
    Blocked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MoverFlags {
    pub active: bool,
    pub completed: bool,
    pub disabled: bool,
    pub reset: bool,
    pub destination_unreachable: bool,
}

/// Identity, service relationship, and closed-set model/state fields.
#[derive(Component, Debug)]
pub struct Mover {
    pub id: MoverId,
    pub model: MoverModel,
    pub state: MoverState,
    /// Product entity currently holding this mover, if any. Mutated only
    /// via the transport coordinator (§4.9) — an `Option<Entity>` handle
    /// rather than an owning reference, per §9's cyclic-reference guidance.
    pub service_requester: Option<Entity>,
}

/// Position/velocity/acceleration and the limits steering must respect.
#[derive(Component, Debug)]
pub struct MoverKinematics {
    /// Top-left corner (§3).
    pub position: Vec2,
    pub dim: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub max_speed: f64,
    pub max_force: f64,
    pub cell_weight: u32,
}

impl MoverKinematics {
    pub fn center(&self) -> Vec2 {
        self.position + self.dim * 0.5
    }

    pub fn radius(&self) -> f64 {
        self.dim.length() * 0.5
    }
}

/// Destination, path stack, and swap-destination bookkeeping for seek/arrive.
#[derive(Component, Debug, Default)]
pub struct MoverNavigation {
    pub destination: Vec2,
    pub swap_destination: Option<Vec2>,
    /// LIFO stack of waypoints: `.pop()` yields the next hop, index 0 is the
    /// final destination (see `pathfind::find_path`).
    pub path: Vec<Vec2>,
    pub flags: MoverFlags,
}

/// Collision cooldown and the tick/distance counters described in §8.
#[derive(Component, Debug, Default)]
pub struct MoverStats {
    pub collision_cooldown: u32,
    pub parking_cooldown: u32,
    pub idle_ticks: u64,
    pub transport_ticks: u64,
    pub transport_distance: f64,
}

/// Mirrors the mover's current grid cell; kept in sync by
/// `systems::tick::update_movers` each time `MoverKinematics` changes.
#[derive(Component, Debug, Clone, Copy)]
pub struct GridCell(pub CellCoord);

#[derive(Bundle)]
pub struct MoverBundle {
    pub mover: Mover,
    pub kinematics: MoverKinematics,
    pub navigation: MoverNavigation,
    pub stats: MoverStats,
    pub cell: GridCell,
}

pub fn spawn_mover(world: &mut World, id: MoverId, model: MoverModel, position: Vec2, dim: Vec2, max_speed: f64, max_force: f64, cell_size: Vec2) -> Entity {
    let cell_weight = cell_weight_class(dim, cell_size);
    world
        .spawn(MoverBundle {
            mover: Mover {
                id,
                model,
                state: MoverState::Alive,
                service_requester: None,
            },
            kinematics: MoverKinematics {
                position,
                dim,
                velocity: Vec2::ZERO,
                acceleration: Vec2::ZERO,
                max_speed,
                max_force,
                cell_weight,
            },
            navigation: MoverNavigation {
                destination: position,
                ..Default::default()
            },
            stats: MoverStats::default(),
            cell: GridCell((0, 0)),
        })
        .id()
}

/// Has the mover arrived? Center within ±0.05 of destination on both axes
/// (§4.6).
pub const ARRIVAL_EPSILON: f64 = 0.05;

pub fn has_arrived(kinematics: &MoverKinematics, nav: &MoverNavigation) -> bool {
    let center = kinematics.center();
    (center.x - nav.destination.x).abs() <= ARRIVAL_EPSILON
        && (center.y - nav.destination.y).abs() <= ARRIVAL_EPSILON
}

/// `start_transport(producer)`: destination = processer center, clears
/// `completed`, resets transport counters, releases parking (§4.6).
pub fn start_transport(nav: &mut MoverNavigation, stats: &mut MoverStats, destination: Vec2, path: Vec<Vec2>) {
    nav.destination = destination;
    nav.path = path;
    nav.flags.completed = false;
    nav.flags.reset = false;
    stats.transport_ticks = 0;
    stats.transport_distance = 0.0;
}

/// `interaction_completed`/`interaction_bailed`: re-enable `active` and move
/// the mover to a least-crowded cell two steps away, freeing the processing
/// rendezvous (§4.6).
pub fn vacate_processing_rendezvous(
    grid: &Grid,
    nav: &mut MoverNavigation,
    kinematics: &MoverKinematics,
    exclude: &HashSet<CellCoord>,
) {
    nav.flags.active = true;
    let target = grid.least_crowded_nearby(
        kinematics.center(),
        kinematics.dim,
        kinematics.cell_weight,
        2,
        exclude,
    );
    nav.destination = target;
    nav.path = vec![target];
}

/// Per-tick update for a single mover (§4.6), given a start-of-tick snapshot
/// of its nearby peers and border segments. Returns `true` if the mover just
/// arrived at its destination this tick.
#[allow(clippy::too_many_arguments)]
pub fn update_mover(
    grid: &mut Grid,
    borders: &BorderIndex,
    mover: &mut Mover,
    kinematics: &mut MoverKinematics,
    nav: &mut MoverNavigation,
    stats: &mut MoverStats,
    neighbors: &[NeighborView],
    exclude_cells: &HashSet<CellCoord>,
    collision_counter: &mut u64,
) -> bool {
    stats.collision_cooldown = stats.collision_cooldown.saturating_sub(1);
    stats.parking_cooldown = stats.parking_cooldown.saturating_sub(1);

    if mover.service_requester.is_some() {
        stats.transport_ticks += 1;
    } else {
        stats.idle_ticks += 1;
    }

    if !nav.flags.active {
        return false;
    }

    let old_center = kinematics.center();
    let cell_segments = borders.nearby(grid.cell(old_center));

    let mut zero_velocity_requested = false;
    let force = {
        let mut ctx = SteeringContext {
            position: kinematics.position,
            dim: kinematics.dim,
            velocity: kinematics.velocity,
            max_speed: kinematics.max_speed,
            max_force: kinematics.max_force,
            path: &mut nav.path,
            destination: &mut nav.destination,
            swap_destination: &mut nav.swap_destination,
            reset: &mut nav.flags.reset,
            neighbors,
            borders: &cell_segments,
            grid,
            own_cell_weight: kinematics.cell_weight,
            exclude_cells,
            zero_velocity_requested: &mut zero_velocity_requested,
        };
        let behaviors = default_behaviors();
        let overlaps = current_overlap_neighbors(&ctx);
        if !overlaps.is_empty() && stats.collision_cooldown == 0 {
            *collision_counter += overlaps.len() as u64;
            stats.collision_cooldown = crate::steering::COLLISION_COOLDOWN_TICKS;
        }
        accumulate_forces(&behaviors, &mut ctx)
    };

    kinematics.acceleration += force;
    if zero_velocity_requested {
        kinematics.velocity = Vec2::ZERO;
    }
    kinematics.velocity = (kinematics.velocity + kinematics.acceleration).clamp_length(kinematics.max_speed);
    kinematics.position += kinematics.velocity;
    kinematics.acceleration = Vec2::ZERO;

    let new_center = kinematics.center();
    stats.transport_distance += old_center.distance(new_center);

    grid.update_cell_weight(old_center, kinematics.dim, kinematics.cell_weight, false);
    grid.update_cell_weight(new_center, kinematics.dim, kinematics.cell_weight, true);

    if nav.flags.reset {
        nav.flags.reset = false;
        nav.flags.active = true;
        if let Some(swap) = nav.swap_destination {
            nav.path = vec![swap];
        }
    }

    if has_arrived(kinematics, nav) {
        kinematics.velocity = Vec2::ZERO;
        kinematics.acceleration = Vec2::ZERO;
        if mover.service_requester.is_some() && !nav.flags.completed {
            nav.flags.completed = true;
            return true;
        }
    }
    false
}

/// Schedules the `TransportCompleted` follow-up event for a product once its
/// mover arrives, off the back of the kinematic step that just completed.
pub fn schedule_transport_completed(clock: &mut SimulationClock, product: Entity) {
    clock.schedule_in(0, EventKind::TransportCompleted, Some(EventSubject::Product(product)));
}

pub fn euclidean_ticks_estimate(from: Vec2, to: Vec2, max_speed: f64) -> u64 {
    let dist = from.distance(to);
    (dist / max_speed.max(1.0)).ceil() as u64
}

pub fn transport_tau(from: Vec2, to: Vec2) -> u64 {
    transport_cost(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mover_id_formats_model_and_number() {
        assert_eq!(MoverId::new("forklift", 3).0, "forklift_3");
    }

    #[test]
    fn arrival_detects_within_epsilon_on_both_axes() {
        let kinematics = MoverKinematics {
            position: Vec2::new(9.99, 9.98),
            dim: Vec2::new(2.0, 2.0),
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            max_speed: 2.0,
            max_force: 1.0,
            cell_weight: 16,
        };
        let nav = MoverNavigation {
            destination: Vec2::new(11.0, 11.0),
            ..Default::default()
        };
        assert!(has_arrived(&kinematics, &nav));
    }

    #[test]
    fn euclidean_ticks_rounds_up() {
        let ticks = euclidean_ticks_estimate(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 3.0);
        assert_eq!(ticks, 4);
    }
}

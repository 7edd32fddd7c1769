//! Idle mover parking housekeeping (§4.6, §4.8): assigns/reassigns parking
//! slots and toggles `Mover::state` between Alive/Blocked while parked.
//!
//! §4.6 says parking housekeeping "may ... toggle Alive<->Blocked based on
//! whether possible collisions exist both with neighbors and with borders"
//! without specifying the exact predicate. This implementation's reading
//! (recorded in DESIGN.md): a parked mover is Blocked while it is currently
//! overlapping a neighbor's AABB or sitting inside a border's safe-distance
//! margin — i.e. it cannot safely be pulled back into active bidding until
//! its parking spot is genuinely clear — and Alive otherwise.

use bevy_ecs::prelude::{Entity, World};

use crate::geometry::{sat_overlap, Rect};
use crate::grid::BorderIndex;
use crate::mover::{Mover, MoverKinematics, MoverNavigation, MoverModel, MoverState};
use crate::parking::ParkingManager;

const BORDER_SAFE_DISTANCE: f64 = 2.0;

fn has_collision_risk(
    entity: Entity,
    kinematics: &MoverKinematics,
    all: &[(Entity, MoverModel, crate::geometry::Vec2, crate::geometry::Vec2)],
    borders: &BorderIndex,
    grid_cell: crate::grid::CellCoord,
) -> bool {
    let self_rect = Rect::from_center(kinematics.center(), kinematics.dim);
    for (other_entity, _, other_center, other_dim) in all {
        if *other_entity == entity {
            continue;
        }
        let other_rect = Rect::from_center(*other_center, *other_dim);
        if sat_overlap(&self_rect, &other_rect, None) {
            return true;
        }
    }
    for segment in borders.nearby(grid_cell) {
        let closest = crate::geometry::closest_point_on_segment(kinematics.center(), &segment);
        if kinematics.center().distance(closest) < BORDER_SAFE_DISTANCE {
            return true;
        }
    }
    false
}

/// Runs parking assignment/reclamation and the Alive/Blocked toggle for
/// every idle mover — one with no `service_requester`, i.e. not currently
/// carrying or transporting a product (§4.6, §4.8). A mover mid-transport
/// keeps its parking slot released (see `product_fsm::execute_transport`'s
/// `leave_space` call) and must not be pulled back toward it here.
pub fn update_parking(world: &mut World, grid: &crate::grid::Grid, borders: &BorderIndex) {
    let mut snapshot_query = world.query::<(Entity, &Mover, &MoverKinematics)>();
    let snapshot: Vec<(Entity, MoverModel, crate::geometry::Vec2, crate::geometry::Vec2)> = snapshot_query
        .iter(world)
        .map(|(e, m, k)| (e, m.model.clone(), k.center(), k.dim))
        .collect();

    let mut mover_query = world.query::<(Entity, &Mover)>();
    let idle_entities: Vec<Entity> = mover_query
        .iter(world)
        .filter(|(_, m)| m.service_requester.is_none())
        .map(|(e, _)| e)
        .collect();

    for entity in idle_entities {
        let (model, center) = {
            let Some(mover) = world.get::<Mover>(entity) else { continue };
            let Some(kinematics) = world.get::<MoverKinematics>(entity) else { continue };
            (mover.model.clone(), kinematics.center())
        };

        let cell = grid.cell(center);
        let blocked = {
            let kinematics = world.get::<MoverKinematics>(entity).unwrap();
            has_collision_risk(entity, kinematics, &snapshot, borders, cell)
        };

        if let Some(mut mover) = world.get_mut::<Mover>(entity) {
            mover.state = if blocked { MoverState::Blocked } else { MoverState::Alive };
        }

        let mut parking = world.resource_mut::<ParkingManager>();
        if let Some(slot_pos) = parking.assign_space(&model, entity) {
            if let Some(mut nav) = world.get_mut::<MoverNavigation>(entity) {
                if nav.path.is_empty() {
                    nav.destination = slot_pos;
                    nav.path = vec![slot_pos];
                    nav.flags.active = true;
                }
            }
            parking.check_neighbor(&model, entity, center);
        }
    }
}

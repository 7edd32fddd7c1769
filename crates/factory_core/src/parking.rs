//! Parking manager (C8): per-model parking slots, assign/release/relocate.
//!
//! A `Resource` holding per-entity slot assignment, plus a nearest-candidate
//! scan used to pick a swap target.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::geometry::Vec2;
use crate::mover::MoverModel;

#[derive(Debug, Clone)]
pub struct ParkingSlot {
    /// Numeric ID, derived from the mover numeric ID the slot was created
    /// with (§3) — lower IDs are preferred by `assign_space`.
    pub id: u32,
    pub position: Vec2,
    pub occupant: Option<Entity>,
}

/// Per-model ordered slot list, one slot seeded per mover from its initial
/// position (§4.8).
#[derive(Resource, Debug, Default)]
pub struct ParkingManager {
    slots: HashMap<MoverModel, Vec<ParkingSlot>>,
}

impl ParkingManager {
    pub fn seed_slot(&mut self, model: MoverModel, id: u32, position: Vec2) {
        self.slots.entry(model).or_default().push(ParkingSlot { id, position, occupant: None });
    }

    fn slots_for_mut(&mut self, model: &MoverModel) -> &mut Vec<ParkingSlot> {
        self.slots.entry(model.clone()).or_default()
    }

    /// `assign_space(mover)`: picks the lowest-ID free slot (or the slot the
    /// mover already holds) and returns its world position.
    pub fn assign_space(&mut self, model: &MoverModel, mover: Entity) -> Option<Vec2> {
        let slots = self.slots_for_mut(model);
        slots.sort_by_key(|s| s.id);

        if let Some(existing) = slots.iter().find(|s| s.occupant == Some(mover)) {
            return Some(existing.position);
        }

        for slot in slots.iter_mut() {
            if slot.occupant.is_none() {
                slot.occupant = Some(mover);
                return Some(slot.position);
            }
        }
        None
    }

    /// Read-only view of a model's slot list, for inspection/telemetry.
    pub fn slots(&self, model: &MoverModel) -> &[ParkingSlot] {
        self.slots.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `leave_space`: clears the slot held by `mover`, if any.
    pub fn leave_space(&mut self, model: &MoverModel, mover: Entity) {
        if let Some(slots) = self.slots.get_mut(model) {
            for slot in slots.iter_mut() {
                if slot.occupant == Some(mover) {
                    slot.occupant = None;
                }
            }
        }
    }

    /// `check_neighbor`: searches for a lower-ID slot that is closer to
    /// `mover_position` than the slot's current occupant, and swaps
    /// occupants when beneficial to keep movers compact at the head of the
    /// slot list (§4.8).
    pub fn check_neighbor(&mut self, model: &MoverModel, mover: Entity, mover_position: Vec2) {
        let slots = self.slots_for_mut(model);
        slots.sort_by_key(|s| s.id);

        let Some(mover_idx) = slots.iter().position(|s| s.occupant == Some(mover)) else {
            return;
        };

        for lower_idx in 0..mover_idx {
            let lower_slot_pos = slots[lower_idx].position;
            let lower_occupant = slots[lower_idx].occupant;

            let lower_is_better = match lower_occupant {
                None => true,
                Some(_) => mover_position.distance(lower_slot_pos) < slots[mover_idx].position.distance(lower_slot_pos),
            };

            if lower_is_better {
                slots[lower_idx].occupant = Some(mover);
                slots[mover_idx].occupant = lower_occupant;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MoverModel {
        MoverModel("forklift".into())
    }

    #[test]
    fn assign_space_picks_lowest_free_slot() {
        let mut pm = ParkingManager::default();
        pm.seed_slot(model(), 2, Vec2::new(20.0, 0.0));
        pm.seed_slot(model(), 1, Vec2::new(10.0, 0.0));
        let pos = pm.assign_space(&model(), Entity::from_raw(1));
        assert_eq!(pos, Some(Vec2::new(10.0, 0.0)));
    }

    #[test]
    fn leave_space_frees_the_slot() {
        let mut pm = ParkingManager::default();
        pm.seed_slot(model(), 1, Vec2::new(10.0, 0.0));
        let mover = Entity::from_raw(1);
        pm.assign_space(&model(), mover);
        pm.leave_space(&model(), mover);
        let pos = pm.assign_space(&model(), Entity::from_raw(2));
        assert_eq!(pos, Some(Vec2::new(10.0, 0.0)));
    }

    #[test]
    fn check_neighbor_swaps_when_closer() {
        let mut pm = ParkingManager::default();
        pm.seed_slot(model(), 1, Vec2::new(0.0, 0.0));
        pm.seed_slot(model(), 2, Vec2::new(100.0, 0.0));
        let close_mover = Entity::from_raw(1);
        let far_mover = Entity::from_raw(2);
        pm.assign_space(&model(), far_mover); // takes slot 1 first (lowest free)
        pm.assign_space(&model(), close_mover); // takes slot 2
        pm.check_neighbor(&model(), close_mover, Vec2::new(1.0, 0.0));
        let slots = pm.slots.get(&model()).unwrap();
        let slot1 = slots.iter().find(|s| s.id == 1).unwrap();
        assert_eq!(slot1.occupant, Some(close_mover));
    }
}

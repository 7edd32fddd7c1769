//! `CreateProduct` handling (C12): rate-controlled product creation up to
//! `max_products`.

use bevy_ecs::prelude::{Entity, World};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::product::{Product, ProductIdAllocator, ProductKinds, Recipe};
use crate::spawner::Spawner;

/// If the spawner's rate/cap allow it, creates a new product entity of a
/// randomly chosen kind (§4.12) and returns it so the caller can schedule
/// its initial `StartProcessing`.
pub fn maybe_spawn_product(world: &mut World, rng: &mut impl Rng) -> Option<Entity> {
    let should_spawn = world.resource::<Spawner>().should_spawn();
    if !should_spawn {
        return None;
    }

    let kind = {
        let kinds = world.resource::<ProductKinds>();
        let names = kinds.kind_names();
        let chosen = *names.choose(rng)?;
        chosen.to_string()
    };

    let recipe: Recipe = world.resource::<ProductKinds>().recipes.get(&kind).cloned()?;
    let id = world.resource_mut::<ProductIdAllocator>().next_id(&kind);

    let entity = world.spawn(Product::new(id, kind, recipe)).id();
    world.resource_mut::<Spawner>().on_spawned();
    Some(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::Interaction;
    use std::collections::HashMap;

    fn world_with_one_kind() -> World {
        let mut world = World::new();
        let mut recipes = HashMap::new();
        recipes.insert("widget".to_string(), Recipe(vec![Interaction("Place".into())]));
        world.insert_resource(ProductKinds { recipes });
        world.insert_resource(ProductIdAllocator::default());
        world.insert_resource(Spawner::new(1, 10));
        world
    }

    #[test]
    fn spawns_up_to_cap_then_stops() {
        let mut world = world_with_one_kind();
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        assert!(maybe_spawn_product(&mut world, &mut rng).is_some());
        assert!(maybe_spawn_product(&mut world, &mut rng).is_none());
    }

    #[test]
    fn termination_frees_a_spawn_slot() {
        let mut world = world_with_one_kind();
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        maybe_spawn_product(&mut world, &mut rng);
        world.resource_mut::<Spawner>().on_terminated();
        assert!(maybe_spawn_product(&mut world, &mut rng).is_some());
    }
}

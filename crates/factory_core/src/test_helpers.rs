//! Shared test scaffolding (§10.5), gated behind `test-helpers` so
//! `factory_cli`'s integration tests and this crate's `tests/` directory can
//! both reuse it without depending on `#[cfg(test)]`-only items.
//!
//! Generalizes the `test_world()` helper duplicated across this crate's
//! inline `#[cfg(test)]` modules (see `systems::product_fsm::tests`).

use bevy_ecs::prelude::World;

use crate::geometry::Vec2;
use crate::grid::{BorderIndex, Grid};
use crate::parking::ParkingManager;
use crate::product::ProductKinds;
use crate::spawner::Spawner;
use crate::supervisor::Supervisor;

/// A `World` with an empty 20x20-cell grid (no forbidden cells) and every
/// resource the product/mover systems require already inserted, so tests
/// only need to spawn the entities specific to the scenario under test.
pub fn create_test_world() -> World {
    let mut world = World::new();
    let mut grid = Grid::new(Vec2::new(10.0, 10.0), Vec2::new(200.0, 200.0));
    grid.generate(std::iter::empty());
    world.insert_resource(BorderIndex::build(&grid));
    world.insert_resource(grid);
    world.insert_resource(Supervisor::default());
    world.insert_resource(Spawner::new(10, 10));
    world.insert_resource(ProductKinds::default());
    world.insert_resource(ParkingManager::default());
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn create_test_world_seeds_a_navigable_grid() {
        let world = create_test_world();
        let grid = world.get_resource::<Grid>().unwrap();
        assert!(grid.is_navigable((0, 0)));
    }
}

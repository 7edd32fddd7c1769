//! Rate-controlled product spawner (C12).
//!
//! Fixed `produce_cycle` period derived from UPS (§4.12), rather than a
//! variable inter-arrival distribution.

use bevy_ecs::prelude::Resource;

/// One creation cycle runs every `1000/ups` ms (§4.12).
pub fn spawn_cycle_ms(ups: u32) -> u64 {
    (1000u64 / ups.max(1) as u64).max(1)
}

/// Tracks in-flight product count against `max_products` and the spawn
/// cadence. `count` is incremented on `CreateProduct`, decremented when a
/// product terminates (§4.12).
#[derive(Debug, Resource)]
pub struct Spawner {
    pub max_products: u32,
    pub count: u32,
    pub cycle_ms: u64,
    pub paused: bool,
}

impl Spawner {
    pub fn new(max_products: u32, ups: u32) -> Self {
        Self {
            max_products,
            count: 0,
            cycle_ms: spawn_cycle_ms(ups),
            paused: false,
        }
    }

    /// Whether this cycle should emit a new `CreateProduct` message.
    pub fn should_spawn(&self) -> bool {
        !self.paused && self.count < self.max_products
    }

    pub fn on_spawned(&mut self) {
        self.count += 1;
    }

    pub fn on_terminated(&mut self) {
        self.count = self.count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_ms_derives_from_ups() {
        assert_eq!(spawn_cycle_ms(10), 100);
        assert_eq!(spawn_cycle_ms(1000), 1);
    }

    #[test]
    fn should_spawn_honors_max_products_cap() {
        let mut spawner = Spawner::new(2, 10);
        assert!(spawner.should_spawn());
        spawner.on_spawned();
        assert!(spawner.should_spawn());
        spawner.on_spawned();
        assert!(!spawner.should_spawn(), "count == max must stop further spawns");
        spawner.on_terminated();
        assert!(spawner.should_spawn(), "a termination frees a spawn slot");
    }

    #[test]
    fn should_spawn_false_while_paused() {
        let mut spawner = Spawner::new(5, 10);
        spawner.paused = true;
        assert!(!spawner.should_spawn());
    }
}

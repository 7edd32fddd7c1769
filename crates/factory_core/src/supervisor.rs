//! Product actor lifecycle and progress trackers (C10).
//!
//! A plain `Resource` holding record maps, populated on message receipt
//! rather than computed on demand.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::product::Product;

/// Snapshot of a product's accumulated progress, keyed by product ID.
/// `step_label` is `"{step}/{total}"`, matching the scenario wording in §8.
#[derive(Debug, Clone, Default)]
pub struct ProductProgress {
    pub ticks_transport: u64,
    pub distance_transport: f64,
    pub ticks_processing: u64,
    pub step_label: String,
}

impl ProductProgress {
    pub fn from_product(product: &Product) -> Self {
        Self {
            ticks_transport: product.transport_ticks,
            distance_transport: product.transport_distance,
            ticks_processing: product.processing_ticks,
            step_label: format!("{}/{}", product.step, product.recipe.0.len()),
        }
    }
}

/// Owns the set of product actors (by entity) and their progress maps.
/// Spawning happens on `CreateProduct`; this resource only tracks progress,
/// it does not own component storage (the `World` does, via `Product`).
#[derive(Debug, Default, Resource)]
pub struct Supervisor {
    in_progress: HashMap<Entity, ProductProgress>,
    completed: HashMap<Entity, ProductProgress>,
}

impl Supervisor {
    /// Called each tick a tracked product makes progress, or on a forced
    /// reset (`ProductInProgress`, §4.10).
    pub fn track_in_progress(&mut self, product: Entity, progress: ProductProgress) {
        self.in_progress.insert(product, progress);
    }

    pub fn untrack(&mut self, product: Entity) {
        self.in_progress.remove(&product);
    }

    /// Called on terminal (`ProductCompleted`, §4.10): moves the product out
    /// of `in_progress` into `completed`.
    pub fn record_completed(&mut self, product: Entity, progress: ProductProgress) {
        self.in_progress.remove(&product);
        self.completed.insert(product, progress);
    }

    pub fn in_progress(&self) -> &HashMap<Entity, ProductProgress> {
        &self.in_progress
    }

    pub fn completed(&self) -> &HashMap<Entity, ProductProgress> {
        &self.completed
    }

    /// Snapshot both trackers, used by the halt path (§4.11) before
    /// transitioning to the load screen.
    pub fn snapshot(&self) -> (HashMap<Entity, ProductProgress>, HashMap<Entity, ProductProgress>) {
        (self.in_progress.clone(), self.completed.clone())
    }

    pub fn clear(&mut self) {
        self.in_progress.clear();
        self.completed.clear();
    }
}

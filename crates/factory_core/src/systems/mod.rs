//! Per-tick and per-event reaction systems: one file per reacting concern,
//! driven by `Environment::dispatch`'s event match rather than bevy's
//! `App`/plugin machinery.

pub mod parking_system;
pub mod product_fsm;
pub mod spawn_system;
pub mod tick;

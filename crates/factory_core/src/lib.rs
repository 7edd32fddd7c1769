//! Factory-floor logistics simulation engine.
//!
//! A population of movers ferries products between producers according to
//! per-product recipes, on a 2-D world discretized into a uniform grid. See
//! the workspace root's `SPEC_FULL.md` for the full behavioral contract;
//! this crate is the coupled simulation core (C1-C13) and has no I/O side
//! effects beyond the narrow `output` surface.

pub mod bidding_transport;
pub mod blueprint;
pub mod clock;
pub mod coordinators;
pub mod cost;
pub mod environment;
pub mod geometry;
pub mod grid;
pub mod mover;
pub mod output;
pub mod parking;
pub mod pathfind;
pub mod producer;
pub mod product;
pub mod scheduler;
pub mod spawner;
pub mod steering;
pub mod supervisor;
pub mod systems;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use blueprint::{Blueprint, BlueprintError};
pub use environment::{Environment, EnvironmentState, RunConfig};

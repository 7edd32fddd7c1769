//! Steering behaviors (C5): seek/arrive, predictive collision avoidance,
//! reactive overlap response, and border repulsion (rect + circle flavors).
//!
//! Each behavior is a small `compute`-style trait implementation behind a
//! `Box<dyn SteeringBehavior>`, summed per tick by a force-accumulation
//! loop.

use std::collections::HashSet;

use crate::geometry::{closest_point_on_segment, sat_overlap, Rect, Segment, Vec2};
use crate::grid::{CellCoord, Grid};

/// Read-only snapshot of a nearby mover, taken once per tick before any
/// mover mutates its own state (avoids aliasing: every agent steers against
/// the *start-of-tick* positions of its neighbors).
#[derive(Debug, Clone, Copy)]
pub struct NeighborView {
    pub center: Vec2,
    pub dim: Vec2,
    pub velocity: Vec2,
}

/// Everything a steering behavior needs to compute a force, plus the
/// mutable path-stack/destination fields that `SeekAndArrival` updates as a
/// side effect of popping waypoints or swapping destinations.
pub struct SteeringContext<'a> {
    pub position: Vec2,
    pub dim: Vec2,
    pub velocity: Vec2,
    pub max_speed: f64,
    pub max_force: f64,
    pub path: &'a mut Vec<Vec2>,
    pub destination: &'a mut Vec2,
    pub swap_destination: &'a mut Option<Vec2>,
    pub reset: &'a mut bool,
    pub neighbors: &'a [NeighborView],
    pub borders: &'a [Segment],
    pub grid: &'a Grid,
    pub own_cell_weight: u32,
    pub exclude_cells: &'a HashSet<CellCoord>,
    /// Set by `SeekAndArrival` when `destination_blocked` fires; the caller
    /// (mover-update system) zeroes the mover's actual velocity in response,
    /// since steering contexts only report the force to accumulate.
    pub zero_velocity_requested: &'a mut bool,
}

impl<'a> SteeringContext<'a> {
    pub fn center(&self) -> Vec2 {
        self.position + self.dim * 0.5
    }

    pub fn radius(&self) -> f64 {
        self.dim.length() * 0.5
    }

    pub fn rect_at(&self, position: Vec2) -> Rect {
        Rect::new(position, self.dim)
    }
}

/// Pluggable steering behavior: `compute` returns a force to accumulate into
/// the agent's acceleration this tick.
pub trait SteeringBehavior: Send + Sync {
    fn compute(&self, ctx: &mut SteeringContext) -> Vec2;
}

/// Sums every behavior's force for one tick, in a fixed order.
pub fn accumulate_forces(behaviors: &[Box<dyn SteeringBehavior>], ctx: &mut SteeringContext) -> Vec2 {
    let mut total = Vec2::ZERO;
    for behavior in behaviors {
        total += behavior.compute(ctx);
    }
    total
}

/// Both border-repulsion flavors run every tick rather than picking one per
/// mover: `BorderRepulsionRadius`'s bounding-circle test has the larger safe
/// distance (3 vs 2) and fires first as a soft outer margin, while
/// `BorderRepulsionRect`'s half-extent/corner test is the firmer inner
/// margin. Every mover in this engine is rectangular-bodied (§3), so there is
/// no per-model shape to select between; summing both is consistent with
/// §4.5's own framing of `BorderRepulsionRect` as already multi-pass
/// (wall segment, then corners) and with "forces are summed per tick".
pub fn default_behaviors() -> Vec<Box<dyn SteeringBehavior>> {
    vec![
        Box::new(SeekAndArrival),
        Box::new(CollisionAvoidance),
        Box::new(CollisionDetection),
        Box::new(BorderRepulsionRadius),
        Box::new(BorderRepulsionRect),
    ]
}

// ---------------------------------------------------------------------------
// SeekAndArrival
// ---------------------------------------------------------------------------

pub struct SeekAndArrival;

/// How close (beyond `radius + max_speed`) the agent must be to a waypoint
/// before it is popped off the path stack.
fn waypoint_reached(position: Vec2, waypoint: Vec2, radius: f64, max_speed: f64) -> bool {
    position.distance(waypoint) <= radius + max_speed
}

/// Is a neighbor about to occupy `destination` within `‖dim‖` of it? Used by
/// `destination_blocked` to trigger the swap-destination path (§4.5, §7
/// tier 2 transient unreachability).
fn destination_blocked(destination: Vec2, dim: Vec2, neighbors: &[NeighborView]) -> bool {
    let threshold = dim.length();
    neighbors.iter().any(|n| n.center.distance(destination) < threshold)
}

impl SteeringBehavior for SeekAndArrival {
    fn compute(&self, ctx: &mut SteeringContext) -> Vec2 {
        // Pop the next waypoint once we're close enough and more than one
        // item remains on the stack (the last item is always `destination`
        // itself and is never popped here).
        if ctx.path.len() > 1 {
            if let Some(&top) = ctx.path.last() {
                if waypoint_reached(ctx.center(), top, ctx.radius(), ctx.max_speed) {
                    ctx.path.pop();
                }
            }
        }

        let target = ctx.path.last().copied().unwrap_or(*ctx.destination);

        if destination_blocked(*ctx.destination, ctx.dim, ctx.neighbors) {
            *ctx.zero_velocity_requested = true;
            if ctx.swap_destination.is_none() {
                let swap = ctx.grid.least_crowded_nearby(
                    *ctx.destination,
                    ctx.dim,
                    ctx.own_cell_weight,
                    1,
                    ctx.exclude_cells,
                );
                *ctx.swap_destination = Some(swap);
            }
            *ctx.reset = true;
            return Vec2::ZERO;
        } else if ctx.swap_destination.is_some() {
            // original destination is clear again: swap back
            *ctx.swap_destination = None;
        }

        let to_target = target - ctx.center();
        let distance = to_target.length();
        let arrival_radius = ctx.radius();

        let desired_speed = if distance < arrival_radius {
            ctx.max_speed * (distance / arrival_radius).max(0.0)
        } else {
            ctx.max_speed
        };

        let desired = if distance > f64::EPSILON {
            to_target.normalized() * desired_speed
        } else {
            Vec2::ZERO
        };

        (desired - ctx.velocity).clamp_length(ctx.max_force)
    }
}

// ---------------------------------------------------------------------------
// CollisionAvoidance (predictive)
// ---------------------------------------------------------------------------

/// §9 open question: whether the "steps" parameter should scale with
/// `max_speed` is left unresolved by the source; this implementation fixes
/// both constants rather than guessing at a scaling rule.
pub const COLLISION_NEIGHBOR_COUNT: usize = 8;
pub const COLLISION_PREDICTION_STEPS: u32 = 8;
const PREDICTIVE_DIM_SCALE: f64 = 1.025;

pub struct CollisionAvoidance;

impl SteeringBehavior for CollisionAvoidance {
    fn compute(&self, ctx: &mut SteeringContext) -> Vec2 {
        let widened_dim = ctx.dim * PREDICTIVE_DIM_SCALE;
        let mut total = Vec2::ZERO;
        let mut involved = 0u32;

        for neighbor in ctx.neighbors.iter().take(COLLISION_NEIGHBOR_COUNT) {
            let neighbor_widened_dim = neighbor.dim * PREDICTIVE_DIM_SCALE;
            let mut self_pos = ctx.position;
            let mut other_pos = neighbor.center - neighbor.dim * 0.5;

            for _ in 0..COLLISION_PREDICTION_STEPS {
                self_pos += ctx.velocity;
                other_pos += neighbor.velocity;

                let self_rect = Rect::new(self_pos, widened_dim);
                let other_rect = Rect::new(other_pos, neighbor_widened_dim);
                if sat_overlap(&self_rect, &other_rect, None) {
                    let separation = ctx.center() - neighbor.center;
                    let d = separation.length().max(1.0);
                    let repulsion = separation.normalized() * (1.0 / (d * d * d));
                    total += repulsion;
                    involved += 1;
                    break;
                }
            }
        }

        if involved > 0 {
            (total / involved as f64).clamp_length(ctx.max_force)
        } else {
            Vec2::ZERO
        }
    }
}

// ---------------------------------------------------------------------------
// CollisionDetection (reactive)
// ---------------------------------------------------------------------------

pub const COLLISION_COOLDOWN_TICKS: u32 = 10;

pub struct CollisionDetection;

/// Indices into `ctx.neighbors` that currently (this tick, no prediction)
/// overlap the agent's AABB. Exposed so the mover-update system can drive
/// the environment-wide collision counter from the same overlap test the
/// force uses, rather than recomputing it.
pub fn current_overlap_neighbors(ctx: &SteeringContext) -> Vec<usize> {
    let self_rect = ctx.rect_at(ctx.position);
    ctx.neighbors
        .iter()
        .enumerate()
        .filter_map(|(i, n)| {
            let other_rect = Rect::from_center(n.center, n.dim);
            sat_overlap(&self_rect, &other_rect, None).then_some(i)
        })
        .collect()
}

impl SteeringBehavior for CollisionDetection {
    fn compute(&self, ctx: &mut SteeringContext) -> Vec2 {
        let overlapping = current_overlap_neighbors(ctx);
        let mut total = Vec2::ZERO;
        for i in overlapping {
            let neighbor = ctx.neighbors[i];
            let delta = ctx.center() - neighbor.center;
            let d = delta.length().max(0.01);
            total += delta.normalized() * (10.0 / d).max(1.0);
        }
        total.clamp_length(ctx.max_force)
    }
}

// ---------------------------------------------------------------------------
// Border repulsion
// ---------------------------------------------------------------------------

pub struct BorderRepulsionRect;

const BORDER_SAFE_DISTANCE_RECT: f64 = 2.0;

impl SteeringBehavior for BorderRepulsionRect {
    fn compute(&self, ctx: &mut SteeringContext) -> Vec2 {
        let mut total = Vec2::ZERO;
        let half = ctx.dim * 0.5;
        let center = ctx.center();

        for border in ctx.borders {
            // pass 1: repulsion against the segment as a wall (closest point)
            let closest = closest_point_on_segment(center, border);
            let delta = center - closest;
            let d = delta.length();
            if d < BORDER_SAFE_DISTANCE_RECT && d > f64::EPSILON {
                total += delta.normalized() * (1.0 / (d * d));
            }

            // pass 2: corner-point repulsion using the agent's half-extents
            for corner in [
                center + Vec2::new(-half.x, -half.y),
                center + Vec2::new(half.x, -half.y),
                center + Vec2::new(-half.x, half.y),
                center + Vec2::new(half.x, half.y),
            ] {
                let closest_corner = closest_point_on_segment(corner, border);
                let corner_delta = corner - closest_corner;
                let cd = corner_delta.length();
                if cd < BORDER_SAFE_DISTANCE_RECT && cd > f64::EPSILON {
                    total += corner_delta.normalized() * (1.0 / (cd * cd));
                }
            }
        }

        total.clamp_length(ctx.max_force)
    }
}

pub struct BorderRepulsionRadius;

const BORDER_SAFE_DISTANCE_RADIUS: f64 = 3.0;

impl SteeringBehavior for BorderRepulsionRadius {
    fn compute(&self, ctx: &mut SteeringContext) -> Vec2 {
        let mut total = Vec2::ZERO;
        let center = ctx.center();
        let radius = ctx.radius();

        for border in ctx.borders {
            let closest = closest_point_on_segment(center, border);
            let d = center.distance(closest) - radius;
            if d < BORDER_SAFE_DISTANCE_RADIUS && d > f64::EPSILON {
                let delta = (center - closest).normalized();
                total += delta * (1.0 / (d * d));
            }
        }

        total.clamp_length(ctx.max_force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ctx_grid() -> Grid {
        let mut grid = Grid::new(Vec2::new(10.0, 10.0), Vec2::new(100.0, 100.0));
        grid.generate(std::iter::empty());
        grid
    }

    #[test]
    fn seek_moves_toward_destination_when_clear() {
        let grid = ctx_grid();
        let mut path = vec![Vec2::new(50.0, 10.0)];
        let mut destination = Vec2::new(50.0, 10.0);
        let mut swap = None;
        let mut reset = false;
        let exclude = HashSet::new();
        let mut zero_velocity = false;
        let mut ctx = SteeringContext {
            position: Vec2::new(10.0, 10.0),
            dim: Vec2::new(2.0, 2.0),
            velocity: Vec2::ZERO,
            max_speed: 2.0,
            max_force: 1.0,
            path: &mut path,
            destination: &mut destination,
            swap_destination: &mut swap,
            reset: &mut reset,
            neighbors: &[],
            borders: &[],
            grid: &grid,
            own_cell_weight: 16,
            exclude_cells: &exclude,
            zero_velocity_requested: &mut zero_velocity,
        };
        let force = SeekAndArrival.compute(&mut ctx);
        assert!(force.x > 0.0, "force should pull toward +x destination");
    }

    #[test]
    fn collision_avoidance_repels_from_converging_neighbor() {
        let grid = ctx_grid();
        let mut path = vec![Vec2::new(50.0, 10.0)];
        let mut destination = Vec2::new(50.0, 10.0);
        let mut swap = None;
        let mut reset = false;
        let exclude = HashSet::new();
        let mut zero_velocity = false;
        let neighbor = NeighborView {
            center: Vec2::new(14.0, 10.0),
            dim: Vec2::new(2.0, 2.0),
            velocity: Vec2::new(-1.0, 0.0),
        };
        let neighbors = [neighbor];
        let mut ctx = SteeringContext {
            position: Vec2::new(10.0, 10.0),
            dim: Vec2::new(2.0, 2.0),
            velocity: Vec2::new(1.0, 0.0),
            max_speed: 2.0,
            max_force: 5.0,
            path: &mut path,
            destination: &mut destination,
            swap_destination: &mut swap,
            reset: &mut reset,
            neighbors: &neighbors,
            borders: &[],
            grid: &grid,
            own_cell_weight: 16,
            exclude_cells: &exclude,
            zero_velocity_requested: &mut zero_velocity,
        };
        let force = CollisionAvoidance.compute(&mut ctx);
        assert!(force.x < 0.0, "should push away from the converging neighbor");
    }

    #[test]
    fn border_repulsion_zero_when_far_from_any_wall() {
        let grid = ctx_grid();
        let mut path = vec![Vec2::new(50.0, 50.0)];
        let mut destination = Vec2::new(50.0, 50.0);
        let mut swap = None;
        let mut reset = false;
        let exclude = HashSet::new();
        let mut zero_velocity = false;
        let mut ctx = SteeringContext {
            position: Vec2::new(50.0, 50.0),
            dim: Vec2::new(2.0, 2.0),
            velocity: Vec2::ZERO,
            max_speed: 2.0,
            max_force: 1.0,
            path: &mut path,
            destination: &mut destination,
            swap_destination: &mut swap,
            reset: &mut reset,
            neighbors: &[],
            borders: &[],
            grid: &grid,
            own_cell_weight: 16,
            exclude_cells: &exclude,
            zero_velocity_requested: &mut zero_velocity,
        };
        let force = BorderRepulsionRect.compute(&mut ctx);
        assert_eq!(force, Vec2::ZERO);
    }
}

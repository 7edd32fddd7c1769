//! A* pathfinder over the grid's free cells (C4).
//!
//! Not a general pathfinder library: A* only ever runs over this grid
//! (§1 Non-goals).

use pathfinding::prelude::astar;

use crate::geometry::Vec2;
use crate::grid::{CellCoord, Grid};

const DIAGONAL_SCALE: f64 = 1000.0;

fn octile_heuristic(a: CellCoord, b: CellCoord) -> u64 {
    let dx = (a.0 - b.0).unsigned_abs() as f64;
    let dy = (a.1 - b.1).unsigned_abs() as f64;
    let (max, min) = if dx > dy { (dx, dy) } else { (dy, dx) };
    let octile = max + (std::f64::consts::SQRT_2 - 1.0) * min;
    (octile * DIAGONAL_SCALE) as u64
}

fn step_cost(grid: &Grid, cell: CellCoord) -> u64 {
    (1 + grid.weight_at(cell) as u64) * DIAGONAL_SCALE as u64
}

const MOVES: [(i32, i32); 8] = [
    (-1, 0), (1, 0), (0, -1), (0, 1),
    (-1, -1), (-1, 1), (1, -1), (1, 1),
];

/// Find a path from `from` to `to` over `grid`'s navigable cells.
///
/// Returns a stack of world-space waypoints ordered so the **top** (last
/// element, what `.pop()` returns) is the next hop and the **bottom**
/// (index 0) is the final destination. An empty vector means "destination
/// unreachable" (§4.4) — callers must not treat this as an error, only as a
/// transient-unreachability signal (§7 tier 2).
pub fn find_path(grid: &Grid, from: Vec2, to: Vec2) -> Vec<Vec2> {
    let start = grid.cell(from);
    let goal = grid.cell(to);

    if start == goal {
        return Vec::new();
    }
    if !grid.is_navigable(start) || !grid.is_navigable(goal) {
        return Vec::new();
    }

    let result = astar(
        &start,
        |&cell| {
            MOVES
                .iter()
                .map(|(di, dj)| (cell.0 + di, cell.1 + dj))
                .filter(|n| grid.is_navigable(*n))
                .map(|n| (n, step_cost(grid, n)))
                .collect::<Vec<_>>()
        },
        |&cell| octile_heuristic(cell, goal),
        |&cell| cell == goal,
    );

    let Some((path, _cost)) = result else {
        return Vec::new();
    };

    // `path` is [start, ..., goal]; drop `start`, convert to world space,
    // then reverse so goal ends up at the bottom and the next hop on top.
    let mut waypoints: Vec<Vec2> = path[1..].iter().map(|&c| grid.world_of(c)).collect();
    waypoints.reverse();
    waypoints
}

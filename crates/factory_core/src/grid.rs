//! Uniform spatial grid, occupancy heat, and cell-border generation (C1).
//!
//! A flat Cartesian `(i32, i32)` grid over the mm-unit world described in
//! §3, wrapped in a cache-friendly struct with bucketed occupancy weights.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::Resource;

use crate::geometry::{Rect, Vec2};

/// Integer grid coordinates. Always clamped to `>= 0` (§3: "clamped at 0").
pub type CellCoord = (i32, i32);

/// Owns the cell→heat-weight map plus the grid's physical dimensions. One
/// instance per running simulation, inserted as a `bevy_ecs` [`Resource`].
#[derive(Resource, Debug, Clone)]
pub struct Grid {
    cell_size: Vec2,
    dimension: Vec2,
    weights: HashMap<CellCoord, u32>,
    forbidden: HashSet<CellCoord>,
}

impl Grid {
    pub fn new(cell_size: Vec2, dimension: Vec2) -> Self {
        Self {
            cell_size,
            dimension,
            weights: HashMap::new(),
            forbidden: HashSet::new(),
        }
    }

    pub fn cell_size(&self) -> Vec2 {
        self.cell_size
    }

    pub fn dimension(&self) -> Vec2 {
        self.dimension
    }

    /// Number of cells along each axis.
    pub fn bounds(&self) -> (i32, i32) {
        (
            (self.dimension.x / self.cell_size.x).ceil().max(1.0) as i32,
            (self.dimension.y / self.cell_size.y).ceil().max(1.0) as i32,
        )
    }

    /// `cell(p)` — clamped floor division (§4.1).
    pub fn cell(&self, p: Vec2) -> CellCoord {
        let (nx, ny) = self.bounds();
        let i = (p.x / self.cell_size.x).floor() as i32;
        let j = (p.y / self.cell_size.y).floor() as i32;
        (i.clamp(0, nx - 1), j.clamp(0, ny - 1))
    }

    /// World-space center of a cell, used by `least_crowded_nearby`'s result
    /// and by the round-trip law `cell(world_of(cell)) == cell`.
    pub fn world_of(&self, cell: CellCoord) -> Vec2 {
        Vec2::new(
            (cell.0 as f64 + 0.5) * self.cell_size.x,
            (cell.1 as f64 + 0.5) * self.cell_size.y,
        )
    }

    /// `generate(forbidden_cells)` — fills every non-forbidden cell with 0.
    pub fn generate(&mut self, forbidden_cells: impl IntoIterator<Item = CellCoord>) {
        self.forbidden = forbidden_cells.into_iter().collect();
        self.weights.clear();
        let (nx, ny) = self.bounds();
        for i in 0..nx {
            for j in 0..ny {
                let c = (i, j);
                if !self.forbidden.contains(&c) {
                    self.weights.insert(c, 0);
                }
            }
        }
    }

    pub fn is_forbidden(&self, cell: CellCoord) -> bool {
        self.forbidden.contains(&cell)
    }

    pub fn is_navigable(&self, cell: CellCoord) -> bool {
        self.weights.contains_key(&cell)
    }

    pub fn weight_at(&self, cell: CellCoord) -> u32 {
        self.weights.get(&cell).copied().unwrap_or(0)
    }

    /// Four corner cells of the AABB `center ± dim/2`, in a fixed scan order.
    fn corner_cells(&self, center: Vec2, dim: Vec2) -> [CellCoord; 4] {
        let hx = dim.x / 2.0;
        let hy = dim.y / 2.0;
        [
            self.cell(Vec2::new(center.x - hx, center.y - hy)),
            self.cell(Vec2::new(center.x + hx, center.y - hy)),
            self.cell(Vec2::new(center.x - hx, center.y + hy)),
            self.cell(Vec2::new(center.x + hx, center.y + hy)),
        ]
    }

    /// `update_cell_weight(pos, dim, w, add)` — distribute ¼·w to each of the
    /// four corner cells of the AABB `pos ± dim/2`. Underflow saturates at 0
    /// (§9: avoid unsigned underflow with explicit saturating ops).
    pub fn update_cell_weight(&mut self, center: Vec2, dim: Vec2, w: u32, add: bool) {
        let share = w / 4;
        for corner in self.corner_cells(center, dim) {
            if let Some(existing) = self.weights.get_mut(&corner) {
                *existing = if add {
                    existing.saturating_add(share)
                } else {
                    existing.saturating_sub(share)
                };
            }
        }
    }

    /// Add a mover's heat contribution (see C6: cell-weight class).
    pub fn add_weights(&mut self, center: Vec2, dim: Vec2, w: u32) {
        self.update_cell_weight(center, dim, w, true);
    }

    fn free_neighbor_count(&self, cell: CellCoord) -> u32 {
        let mut count = 0;
        for (di, dj) in [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)] {
            let n = (cell.0 + di, cell.1 + dj);
            if self.is_navigable(n) {
                count += 1;
            }
        }
        count
    }

    /// `least_crowded_nearby(center, dim, w, min_steps)` — concentric ring
    /// search around `cell(center)`. `exclude` holds cells that are currently
    /// a producer's processing cell and must never be selected (§4.1).
    ///
    /// Bounds the ring radius to `max(W/cx, H/cy)` and falls back to the
    /// starting cell's world position if nothing strictly better is found
    /// within that bound — resolves the open question in §9 about
    /// `GetLeastCrowdedNearbyPosition` potentially spinning forever.
    pub fn least_crowded_nearby(
        &self,
        center: Vec2,
        dim: Vec2,
        w: u32,
        min_steps: i32,
        exclude: &HashSet<CellCoord>,
    ) -> Vec2 {
        let start = self.cell(center);
        let (nx, ny) = self.bounds();
        let max_radius = (nx.max(ny)) as i32;
        let own_contribution = w / 4;

        let mut best: Option<(u32, CellCoord)> = None;

        let mut radius = min_steps.max(1);
        while radius <= max_radius {
            for dj in -radius..=radius {
                for di in -radius..=radius {
                    // only the ring boundary, not the interior already scanned
                    if di.abs() != radius && dj.abs() != radius {
                        continue;
                    }
                    let candidate = (start.0 + di, start.1 + dj);
                    if candidate == start || exclude.contains(&candidate) {
                        continue;
                    }
                    if !self.is_navigable(candidate) {
                        continue;
                    }
                    let weight = self.weight_at(candidate);
                    let adjusted = weight.saturating_sub(own_contribution);
                    let adjacency_penalty = (di.abs() + dj.abs()) as u32;
                    let free_neighbors = self.free_neighbor_count(candidate);
                    let score = adjusted + adjacency_penalty + free_neighbors;

                    best = match best {
                        Some((best_score, _)) if best_score <= score => best,
                        _ => Some((score, candidate)),
                    };
                }
            }
            if best.is_some() {
                break;
            }
            radius += 1;
        }

        match best {
            Some((_, cell)) => self.world_of(cell),
            None => self.world_of(start),
        }
    }
}

/// Maps a cell to its border wall segments (sides where the 4-neighbor cell
/// is absent), plus a 3×3-neighborhood lookup for an agent's collision
/// queries (§4.1).
#[derive(Resource, Debug, Clone, Default)]
pub struct BorderIndex {
    segments: HashMap<CellCoord, Vec<crate::geometry::Segment>>,
}

impl BorderIndex {
    pub fn build(grid: &Grid) -> Self {
        let mut segments: HashMap<CellCoord, Vec<crate::geometry::Segment>> = HashMap::new();
        let cs = grid.cell_size();
        for &cell in grid.weights.keys() {
            let (i, j) = cell;
            let origin = Vec2::new(i as f64 * cs.x, j as f64 * cs.y);
            let top_right = Vec2::new(origin.x + cs.x, origin.y);
            let bottom_left = Vec2::new(origin.x, origin.y + cs.y);
            let bottom_right = Vec2::new(origin.x + cs.x, origin.y + cs.y);

            let mut walls = Vec::new();
            if !grid.is_navigable((i, j - 1)) {
                walls.push(crate::geometry::Segment::new(origin, top_right));
            }
            if !grid.is_navigable((i, j + 1)) {
                walls.push(crate::geometry::Segment::new(bottom_left, bottom_right));
            }
            if !grid.is_navigable((i - 1, j)) {
                walls.push(crate::geometry::Segment::new(origin, bottom_left));
            }
            if !grid.is_navigable((i + 1, j)) {
                walls.push(crate::geometry::Segment::new(top_right, bottom_right));
            }
            if !walls.is_empty() {
                segments.insert(cell, walls);
            }
        }
        Self { segments }
    }

    /// Candidate wall segments within the 3×3 neighborhood of `cell`.
    pub fn nearby(&self, cell: CellCoord) -> Vec<crate::geometry::Segment> {
        let mut out = Vec::new();
        for dj in -1..=1 {
            for di in -1..=1 {
                if let Some(segs) = self.segments.get(&(cell.0 + di, cell.1 + dj)) {
                    out.extend(segs.iter().copied());
                }
            }
        }
        out
    }
}

/// Cell-weight class derived from a mover's cell coverage (§3), one of
/// `{16, 8, 4}` per the coarse classification scheme.
pub fn cell_weight_class(dim: Vec2, cell_size: Vec2) -> u32 {
    let cells_covered = (dim.x / cell_size.x).max(dim.y / cell_size.y);
    if cells_covered <= 1.0 {
        16
    } else if cells_covered <= 2.0 {
        8
    } else {
        4
    }
}

//! Blueprint JSON loading and validation (§6, §7 tier 3).
//!
//! The runtime-tunable side (`RunConfig`, see `environment.rs`) follows a
//! builder-with-`Default` idiom; the wire-format side follows a standard
//! `serde` + `thiserror` config-loader convention.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Vec2;
use crate::producer::Interaction;

#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("failed to read blueprint file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse blueprint JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("blueprint validation failed: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xy {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

impl From<Xy> for Vec2 {
    fn from(xy: Xy) -> Vec2 {
        Vec2::new(xy.x, xy.y)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionSeed {
    pub name: String,
    pub ticks: u64,
    pub cost: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProducerSeed {
    pub id: String,
    pub position: Xy,
    pub dimension: Xy,
    #[serde(default)]
    pub max_queue: Option<u32>,
    #[serde(default)]
    pub interactions: Vec<InteractionSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoverSeed {
    pub id: String,
    pub model: String,
    pub position: Xy,
    pub dimension: Xy,
    pub max_speed: f64,
    #[serde(default = "default_max_force")]
    pub max_force: f64,
}

fn default_max_force() -> f64 {
    1.0
}

/// Group entries expand to a grid of instances filling `dimension` with
/// `spacing` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct MoverGroup {
    pub model: String,
    pub origin: Xy,
    /// Total footprint the group's instances are spread across.
    pub dimension: Xy,
    pub spacing: Xy,
    pub instance_dimension: Xy,
    pub max_speed: f64,
    #[serde(default = "default_max_force")]
    pub max_force: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProducerGroup {
    pub model: String,
    pub origin: Xy,
    pub dimension: Xy,
    pub spacing: Xy,
    pub instance_dimension: Xy,
    #[serde(default)]
    pub max_queue: Option<u32>,
    #[serde(default)]
    pub interactions: Vec<InteractionSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForbiddenZone {
    pub position: Xy,
    pub dimension: Xy,
}

/// Product kinds are not part of the upstream schema's named fields, but
/// the engine cannot run without recipe data somewhere; this is an
/// undocumented, additive field our own loader writes and reads (unknown
/// fields are ignored per §6, so any other reader of this file tolerates
/// it). See DESIGN.md "supplemental details".
#[derive(Debug, Clone, Deserialize)]
pub struct ProductKindSeed {
    pub name: String,
    pub recipe: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintFile {
    pub name: String,
    pub tick_cap: u64,
    pub cell_size: Xy,
    pub mover_max_extent: f32,
    pub producer_max_queue: u32,
    pub dimension: Xy,
    #[serde(default)]
    pub producers: Vec<ProducerSeed>,
    #[serde(default)]
    pub movers: Vec<MoverSeed>,
    #[serde(default)]
    pub mover_groups: Vec<MoverGroup>,
    #[serde(default)]
    pub producer_groups: Vec<ProducerGroup>,
    #[serde(default)]
    pub forbidden_zones: Vec<ForbiddenZone>,
    #[serde(default)]
    pub product_kinds: Vec<ProductKindSeed>,
}

/// Fully expanded blueprint: groups have been materialized into their
/// individual seed entries (§6: "group entries expand to a grid of
/// instances").
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub name: String,
    pub tick_cap: u64,
    pub cell_size: Vec2,
    pub mover_max_extent: f32,
    pub producer_max_queue: u32,
    pub dimension: Vec2,
    pub producers: Vec<ProducerSeed>,
    pub movers: Vec<MoverSeed>,
    pub forbidden_zones: Vec<ForbiddenZone>,
    pub product_kinds: HashMap<String, Vec<Interaction>>,
}

fn expand_mover_group(group: &MoverGroup, start_index: &mut u32) -> Vec<MoverSeed> {
    let cols = (group.dimension.x / group.spacing.x.max(1.0)).floor().max(1.0) as u32;
    let rows = (group.dimension.y / group.spacing.y.max(1.0)).floor().max(1.0) as u32;
    let mut out = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let id = MoverGroupIdAllocator::next(start_index);
            out.push(MoverSeed {
                id: format!("{}_{}", group.model, id),
                model: group.model.clone(),
                position: Xy {
                    x: group.origin.x + col as f64 * group.spacing.x,
                    y: group.origin.y + row as f64 * group.spacing.y,
                },
                dimension: group.instance_dimension,
                max_speed: group.max_speed,
                max_force: group.max_force,
            });
        }
    }
    out
}

fn expand_producer_group(group: &ProducerGroup, start_index: &mut u32) -> Vec<ProducerSeed> {
    let cols = (group.dimension.x / group.spacing.x.max(1.0)).floor().max(1.0) as u32;
    let rows = (group.dimension.y / group.spacing.y.max(1.0)).floor().max(1.0) as u32;
    let mut out = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let id = MoverGroupIdAllocator::next(start_index);
            out.push(ProducerSeed {
                id: format!("{}_{}", group.model, id),
                position: Xy {
                    x: group.origin.x + col as f64 * group.spacing.x,
                    y: group.origin.y + row as f64 * group.spacing.y,
                },
                dimension: group.instance_dimension,
                max_queue: group.max_queue,
                interactions: group.interactions.clone(),
            });
        }
    }
    out
}

/// Trivial monotone counter so expanded group instance IDs never collide
/// with explicit seed IDs or each other.
struct MoverGroupIdAllocator;
impl MoverGroupIdAllocator {
    fn next(counter: &mut u32) -> u32 {
        let v = *counter;
        *counter += 1;
        v
    }
}

impl Blueprint {
    pub fn load(path: impl AsRef<Path>) -> Result<Blueprint, BlueprintError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BlueprintError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Blueprint, BlueprintError> {
        let file: BlueprintFile = serde_json::from_str(text)?;
        Self::from_file(file)
    }

    fn from_file(file: BlueprintFile) -> Result<Blueprint, BlueprintError> {
        if file.cell_size.x <= 0.0 || file.cell_size.y <= 0.0 {
            return Err(BlueprintError::Invalid("cellSize must be positive".into()));
        }
        if file.dimension.x <= 0.0 || file.dimension.y <= 0.0 {
            return Err(BlueprintError::Invalid("dimension must be positive".into()));
        }
        if file.tick_cap == 0 {
            return Err(BlueprintError::Invalid("tickCap must be non-zero".into()));
        }

        let mut movers = file.movers;
        let mut group_counter = movers.len() as u32;
        for group in &file.mover_groups {
            movers.extend(expand_mover_group(group, &mut group_counter));
        }

        let mut producers = file.producers;
        let mut producer_group_counter = producers.len() as u32;
        for group in &file.producer_groups {
            producers.extend(expand_producer_group(group, &mut producer_group_counter));
        }

        if movers.is_empty() {
            return Err(BlueprintError::Invalid("blueprint has no movers".into()));
        }
        if producers.is_empty() {
            return Err(BlueprintError::Invalid("blueprint has no producers".into()));
        }

        let mut product_kinds = HashMap::new();
        for kind in file.product_kinds {
            let recipe = kind.recipe.into_iter().map(Interaction).collect();
            product_kinds.insert(kind.name, recipe);
        }
        if product_kinds.is_empty() {
            return Err(BlueprintError::Invalid(
                "blueprint must define at least one product kind".into(),
            ));
        }

        Ok(Blueprint {
            name: file.name,
            tick_cap: file.tick_cap,
            cell_size: file.cell_size.into(),
            mover_max_extent: file.mover_max_extent,
            producer_max_queue: file.producer_max_queue,
            dimension: file.dimension.into(),
            producers,
            movers,
            forbidden_zones: file.forbidden_zones,
            product_kinds,
        })
    }
}

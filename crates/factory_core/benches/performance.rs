//! Performance benchmarks for factory_core using Criterion.rs.
//!
//! Two groups: whole-run throughput (a full blueprint run to its tick cap)
//! and isolated-subsystem micro-benchmarks for the grid heat, pathfinder,
//! and steering hot paths.

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use factory_core::blueprint::Blueprint;
use factory_core::environment::{Environment, RunConfig};
use factory_core::geometry::Vec2;
use factory_core::grid::Grid;
use factory_core::pathfind::find_path;

fn small_blueprint_json(tick_cap: u64, movers: u32, producers: u32) -> String {
    let producer_entries: Vec<String> = (0..producers)
        .map(|i| {
            format!(
                r#"{{"id": "press_{i}", "position": {{"X": {x}.0, "Y": 50.0}}, "dimension": {{"X": 2.0, "Y": 2.0}},
                 "interactions": [{{"name": "PersonalizeCard", "ticks": 1, "cost": 1}}]}}"#,
                i = i,
                x = 20 + i * 10
            )
        })
        .collect();
    let mover_entries: Vec<String> = (0..movers)
        .map(|i| {
            format!(
                r#"{{"id": "forklift_{i}", "model": "forklift", "position": {{"X": {x}.0, "Y": 0.0}},
                 "dimension": {{"X": 2.0, "Y": 2.0}}, "max_speed": 2.0}}"#,
                i = i,
                x = i * 3
            )
        })
        .collect();
    format!(
        r#"{{
            "name": "bench_line",
            "tickCap": {tick_cap},
            "cellSize": {{"X": 10.0, "Y": 10.0}},
            "moverMaxExtent": 2.0,
            "producerMaxQueue": 4,
            "dimension": {{"X": 300.0, "Y": 300.0}},
            "producers": [{producers}],
            "movers": [{movers}],
            "productKinds": [{{"name": "widget", "recipe": ["PersonalizeCard"]}}]
        }}"#,
        tick_cap = tick_cap,
        producers = producer_entries.join(","),
        movers = mover_entries.join(","),
    )
}

fn bench_simulation_run(c: &mut Criterion) {
    let scenarios = vec![("small", 5, 1, 2_000u64), ("medium", 20, 3, 2_000u64), ("large", 50, 5, 2_000u64)];

    let mut group = c.benchmark_group("simulation_run");
    for (name, movers, producers, tick_cap) in scenarios {
        group.bench_with_input(BenchmarkId::from_parameter(name), &(movers, producers, tick_cap), |b, &(movers, producers, tick_cap)| {
            let json = small_blueprint_json(tick_cap, movers, producers);
            let blueprint = Blueprint::parse(&json).expect("valid bench blueprint");
            b.iter(|| {
                let mut env = Environment::new(RunConfig::default().with_max_products(movers).with_ups(1000).with_fps(30));
                env.load_blueprint(&blueprint).expect("blueprint applies");
                black_box(env.run_to_halt(tick_cap + 10));
            });
        });
    }
    group.finish();
}

fn bench_grid_heat(c: &mut Criterion) {
    let mut grid = Grid::new(Vec2::new(10.0, 10.0), Vec2::new(500.0, 500.0));
    grid.generate(std::iter::empty());
    let exclude: HashSet<(i32, i32)> = HashSet::new();

    let mut group = c.benchmark_group("grid_heat");
    group.bench_function("add_weights", |b| {
        b.iter(|| {
            grid.add_weights(black_box(Vec2::new(150.0, 150.0)), Vec2::new(2.0, 2.0), 16);
        });
    });
    group.bench_function("least_crowded_nearby", |b| {
        b.iter(|| {
            black_box(grid.least_crowded_nearby(Vec2::new(250.0, 250.0), Vec2::new(2.0, 2.0), 16, 1, &exclude));
        });
    });
    group.finish();
}

fn bench_pathfinder(c: &mut Criterion) {
    let mut grid = Grid::new(Vec2::new(10.0, 10.0), Vec2::new(500.0, 500.0));
    grid.generate(std::iter::empty());

    let mut group = c.benchmark_group("pathfinder");
    for (name, to) in [("short", Vec2::new(50.0, 50.0)), ("long", Vec2::new(490.0, 490.0))] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &to, |b, &to| {
            b.iter(|| {
                black_box(find_path(&grid, Vec2::new(5.0, 5.0), to));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_simulation_run, bench_grid_heat, bench_pathfinder);
criterion_main!(benches);

//! Environment (C13): aggregates every other component, owns blueprint
//! loading and the load-screen lifecycle, and dispatches the clock's event
//! stream (§4.13, §4.11).
//!
//! Resources are inserted up front when a blueprint is applied, and the
//! first event is scheduled at time 0. Per the dispatch-shape decision
//! recorded in `DESIGN.md`, this module drives the clock with a plain
//! `match EventKind { ... }` rather than building a `bevy_ecs::Schedule`:
//! the event-kind surface here is small and fixed, and §5's single-update-
//! thread model gets no benefit from schedule-level system parallelism.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, World};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bidding_transport::{BiddingTransport, InProcessTransport};
use crate::blueprint::{Blueprint, BlueprintError};
use crate::clock::{Event, EventKind, EventSubject, SimulationClock};
use crate::cost::CostModel;
use crate::geometry::{Rect, Vec2};
use crate::grid::{BorderIndex, CellCoord, Grid};
use crate::mover::{self, spawn_mover, Mover, MoverId, MoverKinematics, MoverModel};
use crate::output::{CompletedProductRecord, MoverTraceLine, RunTelemetry};
use crate::parking::ParkingManager;
use crate::producer::{Interaction, InteractionSpec, Producer};
use crate::product::{Product, ProductIdAllocator, ProductKinds, Recipe};
use crate::scheduler::TickScheduler;
use crate::spawner::Spawner;
use crate::supervisor::{ProductProgress, Supervisor};
use crate::systems::{parking_system, product_fsm, spawn_system, tick as tick_system};

/// Runtime-tunable knobs not carried by the blueprint's wire format (§10.3):
/// tick-rate targets, the cost-model variant, MQTT on/off, the product cap,
/// and the RNG seed. Builder-with-`Default` + fluent `with_*` setters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub ups: u32,
    pub fps: u32,
    pub cost_model: CostModel,
    pub mqtt: bool,
    pub max_products: u32,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ups: 1000,
            fps: 60,
            cost_model: CostModel::Linear,
            mqtt: false,
            max_products: 50,
            seed: 0,
        }
    }
}

impl RunConfig {
    pub fn with_ups(mut self, ups: u32) -> Self {
        self.ups = ups;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_mqtt(mut self, mqtt: bool) -> Self {
        self.mqtt = mqtt;
        self
    }

    pub fn with_max_products(mut self, max_products: u32) -> Self {
        self.max_products = max_products;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// `LoadScreen` per §4.13: "degrade to empty collections and stop."
/// `Running` is the only state in which clock events actually do work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    LoadScreen,
    Running,
}

/// Aggregates every other component (§4.13) behind one driveable object: a
/// `bevy_ecs::World` for the mover/producer/product components and their
/// resources, a `SimulationClock` for the event queue, and a
/// `TickScheduler` for the UPS/FPS/pause/cap bookkeeping described in §4.11.
pub struct Environment {
    pub world: World,
    pub clock: SimulationClock,
    pub scheduler: TickScheduler,
    pub state: EnvironmentState,
    run_config: RunConfig,
    transport: Box<dyn BiddingTransport>,
    rng: StdRng,
    collision_counter: u64,
    /// Ticks a `ProcessingCompleted` event carries, stashed between the
    /// producer countdown reaching zero (this tick) and the event being
    /// popped off the clock (this tick's FIFO end, per §5), since
    /// `EventSubject` itself has no payload slot for it.
    pending_processing_ticks: HashMap<Entity, u64>,
    mover_ids: HashMap<Entity, String>,
    product_ids: HashMap<Entity, String>,
    pub telemetry: RunTelemetry,
}

impl Environment {
    pub fn new(run_config: RunConfig) -> Self {
        let seed = run_config.seed;
        Self {
            world: World::new(),
            clock: SimulationClock::default(),
            scheduler: TickScheduler::new(run_config.ups as f64, run_config.fps as f64, 1),
            state: EnvironmentState::LoadScreen,
            run_config,
            transport: Box::new(InProcessTransport),
            rng: StdRng::seed_from_u64(seed),
            collision_counter: 0,
            pending_processing_ticks: HashMap::new(),
            mover_ids: HashMap::new(),
            product_ids: HashMap::new(),
            telemetry: RunTelemetry::default(),
        }
    }

    pub fn mover_ids(&self) -> &HashMap<Entity, String> {
        &self.mover_ids
    }

    pub fn product_ids(&self) -> &HashMap<Entity, String> {
        &self.product_ids
    }

    pub fn collision_counter(&self) -> u64 {
        self.collision_counter
    }

    /// `LoadBlueprint` (§4.13): builds forbidden zones, producers, grid,
    /// borders, movers, parking; computes initial per-cell heat; starts
    /// the scheduler and the spawner; rotates the output directory.
    pub fn load_blueprint(&mut self, blueprint: &Blueprint) -> Result<(), BlueprintError> {
        tracing::info!(name = %blueprint.name, tick_cap = blueprint.tick_cap, "loading blueprint");

        self.world = World::new();
        self.clock = SimulationClock::default();
        self.rng = StdRng::seed_from_u64(self.run_config.seed);
        self.collision_counter = 0;
        self.pending_processing_ticks.clear();
        self.mover_ids.clear();
        self.product_ids.clear();
        self.telemetry = RunTelemetry::default();

        let mut grid = Grid::new(blueprint.cell_size, blueprint.dimension);
        let forbidden_cells = forbidden_zone_cells(&grid, &blueprint.forbidden_zones);
        grid.generate(forbidden_cells);

        for seed in &blueprint.producers {
            let position: Vec2 = seed.position.into();
            let dim: Vec2 = seed.dimension.into();
            let center = position + dim * 0.5;
            let processer = Rect::from_center(center, dim);
            let max_queue = seed.max_queue.unwrap_or(blueprint.producer_max_queue);
            let mut producer = Producer::new(seed.id.clone(), center, processer, max_queue);
            for interaction in &seed.interactions {
                producer.interactions.insert(
                    Interaction(interaction.name.clone()),
                    InteractionSpec { ticks: interaction.ticks, cost: interaction.cost },
                );
            }
            self.world.spawn(producer);
        }

        let mut parking = ParkingManager::default();
        for seed in &blueprint.movers {
            let position: Vec2 = seed.position.into();
            let dim: Vec2 = seed.dimension.into();
            let model = MoverModel(seed.model.clone());
            let entity = spawn_mover(
                &mut self.world,
                MoverId(seed.id.clone()),
                model.clone(),
                position,
                dim,
                seed.max_speed,
                seed.max_force,
                blueprint.cell_size,
            );
            let slot_id = numeric_suffix(&seed.id).unwrap_or(self.mover_ids.len() as u32);
            self.mover_ids.insert(entity, seed.id.clone());
            parking.seed_slot(model, slot_id, position + dim * 0.5);

            let cell_weight = self.world.get::<MoverKinematics>(entity).map(|k| k.cell_weight).unwrap_or(16);
            grid.add_weights(position + dim * 0.5, dim, cell_weight);
        }

        let borders = BorderIndex::build(&grid);

        self.world.insert_resource(grid);
        self.world.insert_resource(borders);
        self.world.insert_resource(parking);
        self.world.insert_resource(Supervisor::default());
        self.world.insert_resource(Spawner::new(self.run_config.max_products, self.run_config.ups));
        self.world.insert_resource(ProductKinds {
            recipes: blueprint
                .product_kinds
                .iter()
                .map(|(name, interactions)| (name.clone(), Recipe(interactions.clone())))
                .collect(),
        });
        self.world.insert_resource(ProductIdAllocator::default());

        self.scheduler.reset(blueprint.tick_cap);
        self.clock.schedule_at(0, EventKind::SimulationStarted, None);
        self.state = EnvironmentState::Running;

        Ok(())
    }

    /// `LoadScreen` (§4.13): degrade to empty collections and stop.
    pub fn load_screen(&mut self) {
        self.world = World::new();
        self.clock = SimulationClock::default();
        self.state = EnvironmentState::LoadScreen;
        tracing::info!("environment degraded to load screen");
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    pub fn update_ticks(&self) -> u64 {
        self.scheduler.update_ticks
    }

    fn dt_ms(&self) -> u64 {
        (1000.0 / self.scheduler.ups_rate.target().max(1.0)).max(1.0) as u64
    }

    fn render_dt_ms(&self) -> u64 {
        (1000.0 / self.scheduler.fps_rate.target().max(1.0)).max(1.0) as u64
    }

    fn spawn_cycle_ms(&self) -> u64 {
        crate::spawner::spawn_cycle_ms(self.run_config.ups)
    }

    /// `Halt` (§4.11, §4.14): quiesces the update loop, snapshots trackers
    /// and writes them into telemetry, then transitions to the load screen.
    pub fn halt(&mut self) {
        self.scheduler.halt();
        if let Some(mut supervisor) = self.world.get_resource_mut::<Supervisor>() {
            let (_in_progress, completed) = supervisor.snapshot();
            for (entity, progress) in completed {
                if let Some(id) = self.product_ids.get(&entity) {
                    self.telemetry.record_completion(CompletedProductRecord {
                        product_id: id.clone(),
                        transport_ticks: progress.ticks_transport,
                        transport_distance: progress.distance_transport,
                        processing_ticks: progress.ticks_processing,
                        step_label: progress.step_label,
                    });
                }
            }
            supervisor.clear();
        }
        tracing::info!(update_ticks = self.scheduler.update_ticks, "halting simulation");
        self.load_screen();
    }

    fn exclude_cells(&mut self) -> std::collections::HashSet<CellCoord> {
        let grid = self.world.resource::<Grid>().clone();
        tick_system::producer_processing_cells(&mut self.world, &grid)
    }

    /// Runs one tick of work (producers then movers, §4.11), recording
    /// completions for the product FSM to react to. Skipped entirely while
    /// paused (§4.11: cooperative pause check).
    fn run_tick_work(&mut self) {
        let completions = tick_system::update_producers(&mut self.world);
        for (&product, &ticks) in &completions {
            self.pending_processing_ticks.insert(product, ticks);
            self.clock.schedule_in(0, EventKind::ProcessingCompleted, Some(EventSubject::Product(product)));
        }

        let exclude = self.exclude_cells();
        let mut grid = self.world.remove_resource::<Grid>().expect("grid resource present while running");
        let borders = self.world.remove_resource::<BorderIndex>().expect("border index present while running");
        let arrivals = tick_system::update_movers(&mut self.world, &mut grid, &borders, &exclude, &mut self.collision_counter);
        self.world.insert_resource(grid);
        self.world.insert_resource(borders);

        for arrival in arrivals {
            mover::schedule_transport_completed(&mut self.clock, arrival.product);
        }

        let grid = self.world.resource::<Grid>().clone();
        let borders = self.world.resource::<BorderIndex>().clone();
        parking_system::update_parking(&mut self.world, &grid, &borders);

        self.telemetry.collision_events = self.collision_counter;
        self.trace_movers();
    }

    fn trace_movers(&mut self) {
        let tick = self.scheduler.update_ticks;
        let ids = self.mover_ids.clone();
        let mut query = self.world.query::<(Entity, &MoverKinematics, &Mover)>();
        for (entity, kin, mover) in query.iter(&self.world) {
            if !ids.contains_key(&entity) {
                continue;
            }
            let state = match mover.state {
                crate::mover::MoverState::Alive => "Alive",
                crate::mover::MoverState::Blocked => "Blocked",
            };
            self.telemetry.record_mover_trace(
                entity,
                MoverTraceLine { tick, position_x: kin.position.x, position_y: kin.position.y, state },
            );
        }
    }

    /// Pops and dispatches exactly one clock event. Returns `false` once the
    /// environment has halted (load-screen state, §4.13) and no further
    /// progress should be made.
    pub fn step(&mut self) -> bool {
        if self.state != EnvironmentState::Running {
            return false;
        }
        let Some(event) = self.clock.pop_next() else {
            return false;
        };
        self.dispatch(event);
        self.state == EnvironmentState::Running
    }

    /// Runs `step()` until the environment halts or `max_steps` safety
    /// valve is hit (a backstop against a pathological blueprint that never
    /// reaches `tick_cap`, not a normal termination path).
    pub fn run_to_halt(&mut self, max_steps: u64) -> u64 {
        let mut steps = 0;
        while steps < max_steps && self.state == EnvironmentState::Running {
            if !self.step() {
                break;
            }
            steps += 1;
        }
        steps
    }

    fn cycle_running(&self) -> bool {
        self.state == EnvironmentState::Running && !self.scheduler.is_paused()
    }

    fn dispatch(&mut self, event: Event) {
        match event.kind {
            EventKind::SimulationStarted => {
                self.clock.schedule_at(event.timestamp, EventKind::Tick, None);
                self.clock.schedule_at(event.timestamp, EventKind::Render, None);
                self.clock.schedule_at(event.timestamp, EventKind::CreateProduct, None);
            }
            EventKind::Tick => {
                if self.cycle_running() {
                    self.run_tick_work();
                    if self.scheduler.advance_tick() {
                        self.clock.schedule_in(0, EventKind::Halt, None);
                        return;
                    }
                }
                self.clock.schedule_in(self.dt_ms(), EventKind::Tick, None);
            }
            EventKind::Render => {
                self.clock.schedule_in(self.render_dt_ms(), EventKind::Render, None);
            }
            EventKind::CreateProduct => {
                if self.cycle_running() {
                    if let Some(entity) = spawn_system::maybe_spawn_product(&mut self.world, &mut self.rng) {
                        if let Some(product) = self.world.get::<Product>(entity) {
                            self.product_ids.insert(entity, product.id.clone());
                        }
                        self.clock.schedule_in(0, EventKind::StartProcessing, Some(EventSubject::Product(entity)));
                    }
                }
                self.clock.schedule_in(self.spawn_cycle_ms(), EventKind::CreateProduct, None);
            }
            EventKind::StartProcessing => {
                if let EventSubject::Product(product) = event.subject {
                    let cycle_running = self.cycle_running();
                    product_fsm::handle_start_processing(
                        &mut self.world,
                        &mut self.clock,
                        self.transport.as_mut(),
                        self.run_config.cost_model,
                        self.run_config.mqtt,
                        cycle_running,
                        product,
                    );
                }
            }
            EventKind::TransportCompleted => {
                if let EventSubject::Product(product) = event.subject {
                    let mover_entity = self.world.get::<Product>(product).and_then(|p| p.mover);
                    if let Some(mover_entity) = mover_entity {
                        product_fsm::handle_transport_completed(&mut self.world, &mut self.clock, mover_entity, product);
                    }
                }
            }
            EventKind::ProcessingCompleted => {
                if let EventSubject::Product(product) = event.subject {
                    let ticks = self.pending_processing_ticks.remove(&product).unwrap_or(0);
                    let exclude = self.exclude_cells();
                    let grid = self.world.resource::<Grid>().clone();
                    product_fsm::handle_processing_completed(&mut self.world, &mut self.clock, &grid, &exclude, product, ticks);
                }
            }
            EventKind::ProductionBailed => {
                if let EventSubject::Product(product) = event.subject {
                    product_fsm::handle_production_bailed(&mut self.world, &mut self.clock, product);
                }
            }
            EventKind::KillProduct => {
                if let EventSubject::Product(product) = event.subject {
                    product_fsm::handle_kill_product(&mut self.world, product);
                }
            }
            EventKind::Halt => {
                self.halt();
            }
        }
    }

    /// Forces a producer to `Blocked` and schedules `ProductionBailed` for
    /// whichever product it was serving (§4.14), matching the external
    /// trigger described in §8 scenario 2.
    pub fn block_producer(&mut self, producer_entity: Entity) {
        let served = self.world.get::<Producer>(producer_entity).and_then(|p| p.service_requester);
        if let Some(mut producer) = self.world.get_mut::<Producer>(producer_entity) {
            producer.state = crate::producer::ProducerState::Blocked;
        }
        if let Some(product) = served {
            self.clock.schedule_in(0, EventKind::ProductionBailed, Some(EventSubject::Product(product)));
        }
    }

    pub fn unblock_producer(&mut self, producer_entity: Entity) {
        if let Some(mut producer) = self.world.get_mut::<Producer>(producer_entity) {
            producer.state = crate::producer::ProducerState::Alive;
        }
    }
}

/// Expands each forbidden zone rect into the set of grid cells it covers,
/// for `Grid::generate` (§4.13: "build forbidden zones").
fn forbidden_zone_cells(grid: &Grid, zones: &[crate::blueprint::ForbiddenZone]) -> std::collections::HashSet<CellCoord> {
    let mut cells = std::collections::HashSet::new();
    for zone in zones {
        let position: Vec2 = zone.position.into();
        let dimension: Vec2 = zone.dimension.into();
        let min_cell = grid.cell(position);
        let max_cell = grid.cell(position + dimension);
        for i in min_cell.0..=max_cell.0 {
            for j in min_cell.1..=max_cell.1 {
                cells.insert((i, j));
            }
        }
    }
    cells
}

/// Parses the trailing `_{N}` numeric suffix off a `{model}_{N}`-shaped ID
/// (§3), used to derive a parking slot's ID from the mover it was created
/// with (§4.8).
fn numeric_suffix(id: &str) -> Option<u32> {
    id.rsplit('_').next().and_then(|s| s.parse().ok())
}

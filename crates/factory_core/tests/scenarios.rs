//! End-to-end scenario tests (§8), driven entirely through `Environment`'s
//! public surface — the same entry point `factory_cli` uses.

use factory_core::blueprint::Blueprint;
use factory_core::environment::{Environment, EnvironmentState, RunConfig};
use factory_core::mover::{Mover, MoverModel};
use factory_core::parking::ParkingManager;
use factory_core::producer::Producer;

/// Every tick advance costs at least one `Tick` clock event but also shares
/// the event queue with `CreateProduct`/`Render` events firing on their own
/// cadences, so "steps" and "update ticks" are not 1:1. Step with a generous
/// safety multiplier and stop as soon as the target tick count is reached
/// (or the environment halts on its own).
fn run_until_ticks(env: &mut Environment, target_ticks: u64) {
    let safety = 20 * target_ticks + 10_000;
    let mut steps = 0u64;
    while env.update_ticks() < target_ticks && env.state == EnvironmentState::Running && steps < safety {
        if !env.step() {
            break;
        }
        steps += 1;
    }
}

fn run_to_halt(env: &mut Environment, tick_cap: u64) {
    env.run_to_halt(20 * tick_cap + 10_000);
}

/// §8 scenario 1: single producer, single mover, single recipe step.
fn single_step_blueprint_json(tick_cap: u64, max_queue: u32) -> String {
    format!(
        r#"{{
            "name": "line1",
            "tickCap": {tick_cap},
            "cellSize": {{"X": 10.0, "Y": 10.0}},
            "moverMaxExtent": 2.0,
            "producerMaxQueue": {max_queue},
            "dimension": {{"X": 100.0, "Y": 100.0}},
            "producers": [
                {{"id": "press_1", "position": {{"X": 5.0, "Y": 5.0}}, "dimension": {{"X": 2.0, "Y": 2.0}},
                 "interactions": [{{"name": "PersonalizeCard", "ticks": 1, "cost": 1}}]}}
            ],
            "movers": [
                {{"id": "forklift_1", "model": "forklift", "position": {{"X": 0.0, "Y": 0.0}},
                 "dimension": {{"X": 2.0, "Y": 2.0}}, "max_speed": 2.0}}
            ],
            "productKinds": [{{"name": "widget", "recipe": ["PersonalizeCard"]}}]
        }}"#
    )
}

#[test]
fn scenario_1_single_producer_single_mover_completes_recipe() {
    let json = single_step_blueprint_json(50_000, 2);
    let blueprint = Blueprint::parse(&json).unwrap();
    let mut env = Environment::new(RunConfig::default().with_max_products(1).with_ups(1000).with_fps(30));
    env.load_blueprint(&blueprint).unwrap();

    run_to_halt(&mut env, 50_000);

    assert_eq!(env.state, EnvironmentState::LoadScreen, "tick cap should have halted the run");
    assert!(
        !env.telemetry.completed_products.is_empty(),
        "at least one ProductCompleted should have been emitted"
    );
    let record = &env.telemetry.completed_products[0];
    assert_eq!(record.step_label, "1/1");
    assert!(record.transport_ticks >= 3, "mover starts 5*sqrt(2) away from the producer at max_speed 2");
    assert!(
        (record.transport_distance - 50f64.sqrt()).abs() < 2.0,
        "transport distance {} should approximate the straight-line distance {}",
        record.transport_distance,
        50f64.sqrt()
    );
    assert_eq!(record.processing_ticks, 1000);
    // with max_products=1 the lone mover must be released back to the fleet
    // once its product finalizes, so the spawner's next product can reuse it
    // -- otherwise the single mover would be permanently stranded on its
    // first dead product and nothing further would ever complete.
    assert!(
        env.telemetry.completed_products.len() > 1,
        "the sole mover should be freed and reused by later spawned products within 50k ticks"
    );
}

#[test]
fn scenario_2_producer_blocked_mid_processing_bails_and_resumes() {
    let json = single_step_blueprint_json(80_000, 2);
    let blueprint = Blueprint::parse(&json).unwrap();
    let mut env = Environment::new(RunConfig::default().with_max_products(1).with_ups(1000).with_fps(30));
    env.load_blueprint(&blueprint).unwrap();

    // Run until the mover has reached the producer and processing has begun
    // (well before the 1000-tick processing countdown completes).
    run_until_ticks(&mut env, 500);
    assert!(env.telemetry.completed_products.is_empty(), "processing should still be in flight");

    let producer_entity = {
        let mut query = env.world.query::<(bevy_ecs::prelude::Entity, &Producer)>();
        query.iter(&env.world).next().map(|(e, _)| e).expect("producer exists")
    };
    env.block_producer(producer_entity);
    // let the bail + retry cycle run for a while; still blocked, so no
    // completion should appear no matter how long this runs.
    run_until_ticks(&mut env, 9_500);
    assert!(env.telemetry.completed_products.is_empty(), "still blocked, must not have completed");

    env.unblock_producer(producer_entity);
    run_to_halt(&mut env, 80_000);

    // The bail/retry cycle must not have fabricated duplicate completions
    // for the one product that was in flight when the producer blocked, and
    // once it finalizes its mover is freed (§3 invariant 3), so the spawner
    // may go on to complete further products before the tick cap -- the
    // assertion only pins down the first one, not the total count.
    assert!(
        !env.telemetry.completed_products.is_empty(),
        "the bailed product should eventually complete once unblocked"
    );
    assert_eq!(env.telemetry.completed_products[0].step_label, "1/1");
}

#[test]
fn scenario_3_queue_cap_respected_under_contention() {
    // Three products targeting one producer whose queue caps at 2; the
    // queue must never exceed its cap regardless of contention.
    let json = r#"{
            "name": "contended",
            "tickCap": 30000,
            "cellSize": {"X": 10.0, "Y": 10.0},
            "moverMaxExtent": 2.0,
            "producerMaxQueue": 2,
            "dimension": {"X": 100.0, "Y": 100.0},
            "producers": [
                {"id": "press_1", "position": {"X": 5.0, "Y": 5.0}, "dimension": {"X": 2.0, "Y": 2.0},
                 "interactions": [{"name": "PersonalizeCard", "ticks": 1, "cost": 1}]}
            ],
            "movers": [
                {"id": "forklift_1", "model": "forklift", "position": {"X": 0.0, "Y": 0.0}, "dimension": {"X": 2.0, "Y": 2.0}, "max_speed": 2.0},
                {"id": "forklift_2", "model": "forklift", "position": {"X": 0.0, "Y": 20.0}, "dimension": {"X": 2.0, "Y": 2.0}, "max_speed": 2.0},
                {"id": "forklift_3", "model": "forklift", "position": {"X": 0.0, "Y": 40.0}, "dimension": {"X": 2.0, "Y": 2.0}, "max_speed": 2.0}
            ],
            "productKinds": [{"name": "widget", "recipe": ["PersonalizeCard"]}]
        }"#;
    let blueprint = Blueprint::parse(json).unwrap();
    let mut env = Environment::new(RunConfig::default().with_max_products(3).with_ups(1000).with_fps(30));
    env.load_blueprint(&blueprint).unwrap();

    // Spot-check the invariant at every step for the first stretch of the
    // run, well before any product has had a chance to finish processing.
    for _ in 0..2_000 {
        if env.state != EnvironmentState::Running || !env.step() {
            break;
        }
        let queue_len = {
            let mut query = env.world.query::<&Producer>();
            query.iter(&env.world).next().map(|p| p.queue.len()).unwrap_or(0)
        };
        assert!(queue_len <= 2, "producer queue must never exceed max_queue");
    }

    run_to_halt(&mut env, 30_000);
    assert_eq!(env.state, EnvironmentState::LoadScreen);
}

#[test]
fn scenario_6_tick_cap_halt_then_accepts_a_new_blueprint() {
    let json = single_step_blueprint_json(1_000, 2);
    let blueprint = Blueprint::parse(&json).unwrap();
    let mut env = Environment::new(RunConfig::default().with_max_products(1).with_ups(1000).with_fps(30));
    env.load_blueprint(&blueprint).unwrap();

    run_to_halt(&mut env, 1_000);

    assert_eq!(env.update_ticks(), 1_000, "update ticks must stop exactly at tick_cap");
    assert_eq!(env.state, EnvironmentState::LoadScreen);

    // "subsequent StartRenderer succeeds and accepts a new blueprint" (§8
    // scenario 6) -- stands in here as: the environment can load another
    // blueprint and resume running from the load screen.
    env.load_blueprint(&blueprint).unwrap();
    assert_eq!(env.state, EnvironmentState::Running);
    assert_eq!(env.update_ticks(), 0);
}

/// §8 scenario 4: parking reclamation. One mover gets pulled into a real
/// transport; its parking slot must come back free (`leave_space`), and the
/// other, still-idle mover must never be shown as occupying two slots.
#[test]
fn scenario_4_mover_dispatched_on_transport_releases_its_parking_slot() {
    let json = single_step_blueprint_json(60_000, 1);
    let blueprint = Blueprint::parse(&json).unwrap();
    let mut env = Environment::new(RunConfig::default().with_max_products(1).with_ups(1000).with_fps(30));
    env.load_blueprint(&blueprint).unwrap();

    // Let the lone mover settle into its parking slot before anything else
    // happens.
    run_until_ticks(&mut env, 20);
    let (mover_entity, model) = {
        let mut query = env.world.query::<(bevy_ecs::prelude::Entity, &Mover)>();
        let (e, m) = query.iter(&env.world).next().expect("mover exists");
        (e, m.model.clone())
    };
    {
        let parking = env.world.resource::<ParkingManager>();
        assert!(
            parking.slots(&model).iter().any(|s| s.occupant == Some(mover_entity)),
            "idle mover should hold a parking slot before any product exists"
        );
    }

    // Drive the run far enough for the spawner to hand the mover a product
    // and for it to actually start transporting (service_requester set).
    let mut dispatched = false;
    for _ in 0..2_000 {
        if env.state != EnvironmentState::Running || !env.step() {
            break;
        }
        if env.world.get::<Mover>(mover_entity).unwrap().service_requester.is_some() {
            dispatched = true;
            break;
        }
    }
    assert!(dispatched, "the only mover in the run must eventually be dispatched on a transport");

    let parking = env.world.resource::<ParkingManager>();
    assert!(
        !parking.slots(&model).iter().any(|s| s.occupant == Some(mover_entity)),
        "a mover mid-transport must not still be shown occupying its parking slot"
    );
}

/// §8 scenario 5: the collision counter must advance once per overlapping
/// pair per cooldown window, not once per tick while the pair stays
/// overlapped.
#[test]
fn scenario_5_collision_counter_is_cooldown_gated_not_per_tick() {
    let json = r#"{
            "name": "headon",
            "tickCap": 500,
            "cellSize": {"X": 10.0, "Y": 10.0},
            "moverMaxExtent": 2.0,
            "producerMaxQueue": 2,
            "dimension": {"X": 100.0, "Y": 100.0},
            "producers": [
                {"id": "press_1", "position": {"X": 90.0, "Y": 90.0}, "dimension": {"X": 2.0, "Y": 2.0},
                 "interactions": [{"name": "PersonalizeCard", "ticks": 1, "cost": 1}]}
            ],
            "movers": [
                {"id": "forklift_1", "model": "forklift", "position": {"X": 40.0, "Y": 40.0}, "dimension": {"X": 2.0, "Y": 2.0}, "max_speed": 2.0},
                {"id": "forklift_2", "model": "forklift", "position": {"X": 41.0, "Y": 40.0}, "dimension": {"X": 2.0, "Y": 2.0}, "max_speed": 2.0}
            ],
            "productKinds": [{"name": "widget", "recipe": ["PersonalizeCard"]}]
        }"#;
    let blueprint = Blueprint::parse(json).unwrap();
    // No products ever spawn, so the two movers just sit parked, overlapping
    // each other's AABB for the entire run.
    let mut env = Environment::new(RunConfig::default().with_max_products(0).with_ups(1000).with_fps(30));
    env.load_blueprint(&blueprint).unwrap();

    run_to_halt(&mut env, 500);

    let counter = env.collision_counter();
    assert!(counter > 0, "overlapping movers must register at least one collision");
    assert!(
        counter < 500 / 5,
        "a 10-tick cooldown must suppress most of the 500 ticks the pair spends overlapping, got {counter}"
    );
}

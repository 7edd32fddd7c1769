//! Headless runner binary (§0, §6): loads a blueprint, drives the
//! simulation to its tick cap (or Ctrl-C), and writes the `Output/`
//! directory tree.
//!
//! `clap` derive argument parsing, single binary: build -> run -> print
//! summary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

use factory_core::blueprint::Blueprint;
use factory_core::cost::CostModel;
use factory_core::environment::{Environment, EnvironmentState, RunConfig};
use factory_core::output;

/// The pathfinding strategy label embedded in the output directory name
/// (§6: `Output/{blueprint}_{nav}_{mov}_{prod}_{timestamp}_{guid16}/`). A*
/// is the only navigation strategy this engine implements (C6).
const NAV_LABEL: &str = "astar";

/// A backstop against a blueprint whose tick cap is unreachable; not a
/// normal termination path (see `Environment::run_to_halt`'s own doc).
const MAX_STEPS_SAFETY_VALVE: u64 = 50_000_000;

#[derive(Parser)]
#[command(
    name = "factory_cli",
    about = "Headless runner for the factory-floor logistics simulation",
    long_about = "Loads a blueprint JSON file, drives the simulation to its tick cap \
                  (or Ctrl-C), and writes the Output/ directory tree."
)]
struct Cli {
    /// Path to the blueprint JSON file to load
    blueprint: PathBuf,

    /// Target updates per second (§4.11)
    #[arg(long, default_value_t = 1000)]
    ups: u32,

    /// Target renders per second (§4.11)
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Transport/production bid cost model (§4.9)
    #[arg(long, value_enum, default_value_t = CostModelArg::Linear)]
    cost_model: CostModelArg,

    /// Route contract-net bidding over the MQTT transport instead of
    /// in-process (requires the `mqtt` feature)
    #[arg(long)]
    mqtt: bool,

    /// Maximum number of products the spawner will create this run (§4.12)
    #[arg(long, default_value_t = 50)]
    max_products: u32,

    /// RNG seed, for reproducible runs
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory under which the per-run `Output/{...}/` tree is written
    #[arg(long, default_value = "Output")]
    output_root: PathBuf,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CostModelArg {
    Linear,
    Quadratic,
}

impl From<CostModelArg> for CostModel {
    fn from(value: CostModelArg) -> Self {
        match value {
            CostModelArg::Linear => CostModel::Linear,
            CostModelArg::Quadratic => CostModel::Quadratic,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let blueprint = match Blueprint::load(&cli.blueprint) {
        Ok(blueprint) => blueprint,
        Err(error) => {
            tracing::error!(path = %cli.blueprint.display(), %error, "failed to load blueprint");
            eprintln!("error loading blueprint {}: {error}", cli.blueprint.display());
            std::process::exit(1);
        }
    };

    let run_config = RunConfig::default()
        .with_ups(cli.ups)
        .with_fps(cli.fps)
        .with_cost_model(cli.cost_model.into())
        .with_mqtt(cli.mqtt)
        .with_max_products(cli.max_products)
        .with_seed(cli.seed);

    let mover_count = blueprint.movers.len();
    let producer_count = blueprint.producers.len();
    let blueprint_name = blueprint.name.clone();

    let mut environment = Environment::new(run_config);
    if let Err(error) = environment.load_blueprint(&blueprint) {
        tracing::error!(%error, "failed to apply blueprint");
        eprintln!("error applying blueprint: {error}");
        std::process::exit(1);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if let Err(error) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        }) {
            tracing::warn!(%error, "failed to install Ctrl-C handler; run can only stop at tick_cap");
        }
    }

    let mut steps = 0u64;
    while steps < MAX_STEPS_SAFETY_VALVE && environment.state == EnvironmentState::Running {
        if interrupted.load(Ordering::SeqCst) {
            tracing::info!("interrupted, halting");
            environment.halt();
            break;
        }
        if !environment.step() {
            break;
        }
        steps += 1;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let guid16 = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();
    let run_dir_name = output::run_directory_name(&blueprint_name, NAV_LABEL, mover_count, producer_count, timestamp, &guid16);
    let run_dir = cli.output_root.join(run_dir_name);

    if let Err(error) = output::ensure_run_directory(&run_dir) {
        tracing::error!(%error, "failed to create output directory");
        output::write_crash_dump(&cli.output_root, None, steps, Some(&environment.telemetry), timestamp);
        std::process::exit(1);
    }

    let write_result = (|| -> Result<(), Box<dyn std::error::Error>> {
        output::write_log(&run_dir, &environment.telemetry)?;
        output::write_mover_traces(&run_dir, environment.mover_ids(), &environment.telemetry)?;
        output::write_product_traces(&run_dir, environment.product_ids(), &environment.telemetry)?;
        output::write_dump(&run_dir, steps, blueprint.tick_cap, &environment.telemetry)?;
        Ok(())
    })();

    if let Err(error) = write_result {
        tracing::error!(%error, "failed to write run output; falling back to crash dump");
        let path = output::write_crash_dump(&cli.output_root, Some(&run_dir), steps, Some(&environment.telemetry), timestamp);
        eprintln!("output write failed: {error}; wrote fallback dump to {}", path.display());
    }

    println!("--- Factory run ({blueprint_name}, {mover_count} movers, {producer_count} producers) ---");
    println!("Steps executed: {steps}");
    println!("Completed products: {}", environment.telemetry.completed_products.len());
    println!("Collision events: {}", environment.telemetry.collision_events);
    println!("Output written to: {}", run_dir.display());
}

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crossroads_sim::simulation::{FailOpen, SafetyPolicy, World};

#[derive(Parser)]
#[command(name = "crossroads_sim")]
#[command(about = "Headless intersection physics-and-safety simulation")]
struct Cli {
    /// Number of cars per scenario
    #[arg(long, default_value = "6")]
    cars: usize,

    /// Seed for the network layout and every scenario
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Tick budget per scenario
    #[arg(long, default_value = "4000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.05")]
    delta: f64,

    /// Number of scenarios to run back to back
    #[arg(long, default_value = "1")]
    scenarios: u32,

    /// JSON file overriding any subset of the safety policy
    #[arg(long)]
    policy: Option<std::path::PathBuf>,

    /// Disable the predictive collision guard
    #[arg(long)]
    no_guard: bool,

    /// Disable the overlap resolver
    #[arg(long)]
    no_overlap_resolver: bool,

    /// Run every intersection on signs only
    #[arg(long)]
    no_semaphores: bool,

    /// Enable the score-based virtual signal
    #[arg(long)]
    virtual_signal: bool,

    /// Draw the ASCII map once per simulated second
    #[arg(long)]
    map: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let policy = build_policy(&cli)?;
    run_headless(&cli, policy);
    Ok(())
}

fn build_policy(cli: &Cli) -> Result<SafetyPolicy> {
    let mut policy = match &cli.policy {
        Some(path) => SafetyPolicy::from_json_file(path)?,
        None => SafetyPolicy::default(),
    };
    if cli.no_guard {
        policy.collision_guard_enabled = false;
    }
    if cli.no_overlap_resolver {
        policy.overlap_resolver_enabled = false;
    }
    if cli.no_semaphores {
        policy.semaphores_enabled = false;
    }
    if cli.virtual_signal {
        policy.virtual_signal_enabled = true;
    }
    policy.validate().context("Invalid policy after applying flags")?;
    Ok(policy)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli, policy: SafetyPolicy) {
    info!(
        "Running {} scenario(s): {} cars, seed {}, up to {} ticks of {}s",
        cli.scenarios, cli.cars, cli.seed, cli.ticks, cli.delta
    );

    // Ticks in one second of simulated time
    let ticks_per_second = (1.0 / cli.delta.max(1e-3)).ceil() as u32;

    let mut world = World::new(cli.cars, cli.seed, policy);
    let mut oracle = FailOpen;

    if cli.map {
        world.print_summary();
        world.draw_map();
    }

    for scenario in 0..cli.scenarios {
        if scenario > 0 {
            world.reset();
        }

        let mut tick = 0;
        while tick < cli.ticks && !world.is_finished() {
            let decisions = world.decisions_from(&mut oracle);
            world.update_physics(cli.delta, &decisions);
            tick += 1;

            if cli.map && tick % ticks_per_second == 0 {
                world.draw_map();
            }
        }

        let stats = world.stats();
        info!("=== SIMULATION COMPLETE ===");
        info!("Scenario: {}", stats.scenario);
        info!("Simulated time: {:.1}s over {} ticks", stats.time, tick);
        info!("Finished: {}", world.is_finished());
        info!("Cars parked: {}/{}", stats.parked, stats.cars);
        info!("Intersection transitions: {}", stats.transitions);
        info!("Safety interventions: {}", stats.safety_interventions);
        info!("Collision resolutions: {}", stats.collision_resolutions);
        info!("Priority demotions: {}", stats.priority_demotions);
        match stats.min_distance_m {
            Some(distance) => info!("Minimum pair distance: {:.2} m", distance),
            None => info!("Minimum pair distance: n/a"),
        }
        if let Some(distance) = stats.guard_min_distance_m {
            info!("Guard-only minimum distance: {:.2} m", distance);
        }

        if cli.map {
            world.print_summary();
        }
    }
}

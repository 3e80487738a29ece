#![deny(warnings)]

//! Headless CLI: load a scenario, run the Monte Carlo forecast and the
//! steady-state solver, and print a report or JSON.

mod report;
mod scenario;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use funnel_sim::{MonteCarloRun, RunSupervisor, SimulationResult};
use funnel_steady::SteadyStateResult;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scenario::Scenario;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<String>,
    trials: Option<usize>,
    seed: Option<u64>,
    chunk: Option<usize>,
    as_of: Option<NaiveDate>,
    json: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--trials" => args.trials = it.next().and_then(|s| s.parse().ok()),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--chunk" => args.chunk = it.next().and_then(|s| s.parse().ok()),
            "--as-of" => args.as_of = Some(parse_as_of(&it.next().unwrap_or_default())?),
            "--json" => args.json = true,
            _ => {}
        }
    }
    Ok(args)
}

fn parse_as_of(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("--as-of expects YYYY-MM-DD, got {raw:?}"))
}

#[derive(Serialize)]
struct Report<'a> {
    simulation: &'a SimulationResult,
    steady_state: Option<&'a SteadyStateResult>,
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    info!(scenario = ?args.scenario, trials = ?args.trials, seed = ?args.seed, "starting CLI");

    let mut scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo(),
    };
    if let Some(t) = args.trials {
        scenario.simulation.trials = t;
    }
    if let Some(s) = args.seed {
        scenario.simulation.seed = Some(s);
    }
    if let Some(c) = args.chunk {
        scenario.simulation.chunk_size = c;
    }
    scenario::validate_trials(scenario.simulation.trials)?;

    let funnel = scenario.funnel()?;
    let cases = scenario.cases(&funnel);
    let rng = match scenario.simulation.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let supervisor = RunSupervisor::new();
    let mut run = MonteCarloRun::new(
        &cases,
        &funnel,
        scenario.variance,
        scenario.simulation.trials,
        rng,
    )?
    .with_chunk_size(scenario.simulation.chunk_size)?
    .with_ticket(supervisor.begin());
    for progress in run.chunks() {
        let p = progress?;
        debug!(percent = p.fraction() * 100.0, "simulating");
    }
    let simulation = run.finish()?;

    let steady_state = scenario
        .steady_state_inputs()?
        .map(|inputs| funnel_steady::solve(&inputs))
        .transpose()?;

    if args.json {
        let report = Report {
            simulation: &simulation,
            steady_state: steady_state.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report::render_simulation(&simulation, args.as_of)?);
        if let Some(ss) = &steady_state {
            println!();
            print!("{}", report::render_steady_state(ss)?);
        }
    }

    Ok(())
}

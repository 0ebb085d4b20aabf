use clap::Parser;
use std::path::Path;
use tracing::{error, info, Level};

use rust_pimc::{
    Communicator, LocalComm, PathIntegralNvt, PimcError, PimcResult, PqrOutput, RunSummary, SimulationConfig,
    ThreadGroup,
};

#[derive(Parser, Debug)]
#[command(version, about = "Path-integral Monte Carlo (NVT) for molecular systems", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "pimc.yml")]
    config: String,

    /// Run one thread per replica instead of all replicas in one loop
    #[arg(short, long)]
    threads: bool,

    #[arg(short, long)]
    debug: bool,
}

fn simulate<C: Communicator>(config: SimulationConfig, comm: C, seed: u64) -> PimcResult<RunSummary> {
    let replicas = config.build_replicas()?;
    let energy_model = config.energy_model();
    let output = PqrOutput::new(&config.output.output_dir, config.output.pqr_restart, config.output.pqr_output);
    let mut engine = PathIntegralNvt::new(config, replicas, energy_model, comm, output, seed)?;
    engine.run()
}

fn run(args: &Args) -> PimcResult<RunSummary> {
    let config = SimulationConfig::load(Path::new(&args.config))?;
    config.validate()?;
    std::fs::create_dir_all(&config.output.output_dir)?;

    // one seed for the whole group so every participant replays the same draws
    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, beads = config.trotter_number, threads = args.threads, "starting run");

    if !args.threads {
        return simulate(config, LocalComm, seed);
    }

    let group = ThreadGroup::new(config.trotter_number);
    let results: Vec<PimcResult<RunSummary>> = std::thread::scope(|s| {
        let handles: Vec<_> = group
            .members()
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                s.spawn(move || simulate(config, comm, seed))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(PimcError::Internal("replica thread panicked".to_string())))
            })
            .collect()
    });

    first_failure(results)
}

/// Rank 0's summary, or the error that broke the group rather than the
/// `GroupAborted` it caused in the other members.
fn first_failure(results: Vec<PimcResult<RunSummary>>) -> PimcResult<RunSummary> {
    let mut summary = None;
    let mut cause = None;
    let mut aborted = None;
    for result in results {
        match result {
            Ok(s) => {
                summary.get_or_insert(s);
            }
            Err(e @ PimcError::GroupAborted { .. }) => {
                aborted.get_or_insert(e);
            }
            Err(e) => {
                cause.get_or_insert(e);
            }
        }
    }
    if let Some(e) = cause.or(aborted) {
        return Err(e);
    }
    summary.ok_or_else(|| PimcError::Internal("no replica threads ran".to_string()))
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .init();

    match run(&args) {
        Ok(summary) => {
            info!(
                steps = summary.steps,
                accepted = summary.accepted,
                rejected = summary.rejected,
                energy = summary.energy,
                temperature = summary.temperature,
                "done"
            );
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

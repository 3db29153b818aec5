use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use epi_sim::Simulation;
use epi_sim::config::SimulationProperties;

/// Spatially explicit, age- and risk-stratified epidemic simulator for
/// pandemic tabletop exercises.
#[derive(Parser, Debug)]
#[command(name = "simulator", version)]
struct Args {
    /// Path of the input simulation properties JSON file
    #[arg(short = 'i', long = "input-filename")]
    input_filename: PathBuf,

    /// Number of days to simulate
    #[arg(short = 'd', long = "days", default_value_t = 365)]
    days: usize,

    /// Log level: trace, debug, info, warn or error
    #[arg(short = 'l', long = "loglevel", default_value = "warn")]
    loglevel: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_new(&args.loglevel)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let properties = match SimulationProperties::load(&args.input_filename) {
        Ok(properties) => properties,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };
    let simulation = match Simulation::from_properties(&properties, args.days) {
        Ok(simulation) => simulation,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = simulation.run() {
        eprintln!("error: {error}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hase_zenoh_runtime::config::{BaseConfig, MOTOR_PORT};
use hase_zenoh_runtime::runtime::{self, RuntimeOptions};

#[derive(Parser, Debug)]
#[command(version, about = "Hase base runtime: wheel speed control, odometry and watchdog")]
struct Args {
    /// Serial port of the wheel board
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Drive a simulated base instead of the wheel board
    #[arg(long)]
    sim: bool,

    /// JSON file overriding the built-in calibration, gains and rates
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for per-cycle detail)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match BaseConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid config {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => BaseConfig::default(),
    };

    let options = RuntimeOptions {
        config,
        port: args.port,
        sim: args.sim,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

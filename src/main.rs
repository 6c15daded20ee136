use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_drive_runtime::config::{DriveConfig, MOTOR_PORT, RobotMode};
use swerve_drive_runtime::runtime::{self, RunOptions};

/// Swerve drive runtime: closed-loop module control over zenoh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Which backends to drive
    #[arg(long, value_enum, default_value_t = RobotMode::Sim)]
    mode: RobotMode,

    /// JSON drive configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the Feetech servo bus (real mode)
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => match DriveConfig::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => DriveConfig::default(),
    };

    let options = RunOptions {
        mode: args.mode,
        config,
        port: args.port,
    };
    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

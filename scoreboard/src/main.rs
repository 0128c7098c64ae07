mod config;
mod telemetry;

use clap::{Args, Parser};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "Player high score and leaderboard API")]
enum CliCommand {
    /// Run the score API server
    Serve(ConfigArgs),
    /// Load and validate the configuration, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Optional YAML config file. Environment variables override its values.
    #[arg(long, short, env = "SCOREBOARD_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Serve(args) => serve(args),
        CliCommand::CheckConfig(args) => match Config::load(args.config.as_deref()) {
            Ok(_) => {
                println!("Config is valid");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn serve(args: ConfigArgs) -> ExitCode {
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _telemetry = match telemetry::init(&config) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("Failed to initialise telemetry: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Starting score API");
    match runtime.block_on(score_api::run(config.api)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Score API exited: {e}");
            ExitCode::FAILURE
        }
    }
}

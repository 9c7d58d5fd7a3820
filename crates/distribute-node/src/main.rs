use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

mod config;
mod demo;
mod logging;

use config::NodeConfig;

const DEFAULT_CONFIG: &str = "./distribute.toml";

#[derive(Parser)]
#[command(name = "distribute-node")]
#[command(about = "Distribute - project funding and work verification", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "DISTRIBUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted project lifecycle against in-memory ledgers
    Run {
        /// Project cost in wei
        #[arg(long, default_value = "100000")]
        cost: u64,

        /// Print the settlement report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => NodeConfig::from_file(Path::new(DEFAULT_CONFIG))?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading configuration")?;

    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Run { cost, json } => {
            info!(cost, "🚀 Starting demo lifecycle");
            let report = demo::run_demo(&config, cost).await?;
            if report.escrow_left > 0 {
                warn!(escrow = report.escrow_left, "Escrow not fully settled");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("project {} ended {}", report.project, report.final_state);
                for line in &report.payouts {
                    println!(
                        "  {:<10} {}  wei={} tokens={} reputation={}",
                        line.role, line.account, line.wei, line.tokens, line.reputation
                    );
                }
                println!(
                    "pool={} supply={} escrow_left={}",
                    report.pool, report.token_supply, report.escrow_left
                );
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

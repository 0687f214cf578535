use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use agitated::config::Config;
use agitated::controller::Controller;
use agitated::daemon;
use agitated::host::XfceHost;
use agitated::sampler::SignalSampler;

#[derive(Parser)]
#[command(name = "agitated")]
#[command(about = "Adaptive power-management daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Evaluate the policy even while externally powered, with verbose logging
    #[arg(short, long)]
    debug: bool,

    /// Path to the config file (default: ~/.config/agitated.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the merged effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let path = cli
        .config
        .or_else(Config::default_path)
        .context("Could not determine the user config directory")?;
    let mut config = Config::load(&path)?;
    if cli.debug {
        config.debug = true;
    }

    if cli.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let mode = if config.debug { "debug mode" } else { "normally" };
    println!(
        "{} starting agitated power manager {mode}",
        format!("[{}]", Local::now().format("%H:%M:%S")).magenta()
    );
    if config.debug {
        println!("{}", "DEBUG MODE".magenta().bold());
    }

    let controller = Controller::new(config, XfceHost::new(), SignalSampler::new());
    daemon::run(controller)
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "agitated=debug" } else { "agitated=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

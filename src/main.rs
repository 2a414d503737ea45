//! CLI entry point: loads configuration, builds the gateway, and runs
//! until SIGINT/SIGTERM (§6 external interface).

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use villas_gateway::config::GatewayConfig;
use villas_gateway::node::NodeRegistry;
use villas_gateway::Gateway;

#[derive(Parser, Debug)]
#[command(name = "villas-gateway", about = "Route samples between nodes over rate-controlled paths")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Parse and validate configuration, then exit without starting anything.
    #[arg(long)]
    validate: bool,

    /// Increase log verbosity (stacks: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity.
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(cli: &Cli, configured_level: &str) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => configured_level,
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref())?;
    init_tracing(&cli, &config.log_level);

    if cli.validate {
        info!("configuration valid");
        return Ok(());
    }

    let registry = NodeRegistry::with_builtins();
    let gateway = Gateway::build(&config, &registry)?;
    info!(paths = gateway.path_count(), "starting gateway");
    gateway.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::Release);
    })?;

    while running.load(Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    info!("shutdown signal received");
    gateway.shutdown()?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

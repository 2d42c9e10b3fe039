use bank_ledger::config::Config;
use bank_ledger::{input, run};

use clap::Parser;
use std::fs::File;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr, so that stdout only holds the balances CSV.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let plan = match &config.plan {
        Some(path) => Some(input::parse(File::open(path)?)?),
        None => None,
    };

    let summary = run::run(&config, plan, std::io::stdout().lock())?;
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "some transfers were not applied");
    }

    Ok(())
}

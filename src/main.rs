// Kudos ledger
// Command line front end for the points, coins and achievement engine

use std::env;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kudos::cli::Cli;
use kudos::commands;
use kudos::engine::Engine;
use kudos::store::init_backends;
use kudos::utils::config::Config;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "kudos=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Command failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let backends = init_backends(&config).await?;
    info!("Storage backend ready: {:?}", config.store);

    let engine = Engine::new(backends, config.day);
    commands::run(&engine, &config, cli).await
}

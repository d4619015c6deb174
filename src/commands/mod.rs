// Handlers behind the `kudos` subcommands

use serde::Serialize;

use crate::cli::{Cli, Commands, OutputFormat};
use crate::engine::Engine;
use crate::utils::config::Config;

pub mod award;
pub mod ledger;
pub mod reward;

/// Dispatch a parsed command line
pub async fn run(engine: &Engine, config: &Config, cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;

    match cli.command {
        Commands::Award(cmd) => award::handle(engine, cmd, format).await,
        Commands::Convert {
            employee,
            coins,
            description,
        } => award::convert(engine, employee, coins, &description, format).await,
        Commands::Adjust {
            employee,
            points,
            coins,
            description,
        } => award::adjust(engine, employee, points, coins, &description, format).await,
        Commands::Ledger(cmd) => ledger::handle(engine, cmd, config.transaction_limit, format).await,
        Commands::Unlocks(cmd) => ledger::unlocks(engine, cmd, format).await,
        Commands::Reward(cmd) => reward::handle(engine, cmd, format).await,
    }
}

/// Print `value` as pretty JSON
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print JSON in JSON mode, otherwise run the text renderer
pub(crate) fn emit<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => {
            text(value);
            Ok(())
        }
    }
}

// Command line definitions for the `kudos` binary

use clap::{Parser, Subcommand, ValueEnum};

use crate::models::ledger::{CoinKind, EmployeeId, PointKind};
use crate::models::reward::RedemptionStatus;

/// Points, coins and achievement ledger
#[derive(Parser, Debug)]
#[command(name = "kudos")]
#[command(version)]
#[command(about = "Points, coins and achievement ledger for employee gamification")]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum, env = "KUDOS_OUTPUT", default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Table,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Award points, coins or a productivity tier
    #[command(subcommand)]
    Award(AwardCommands),

    /// Convert coins out of the economy
    Convert {
        #[arg(short, long)]
        employee: EmployeeId,

        #[arg(short, long)]
        coins: i64,

        #[arg(short, long, default_value = "Coin conversion")]
        description: String,
    },

    /// Admin correction without coin bonus or unlock pass
    Adjust {
        #[arg(short, long)]
        employee: EmployeeId,

        #[arg(short, long, allow_hyphen_values = true)]
        points: Option<i64>,

        #[arg(short, long, allow_hyphen_values = true)]
        coins: Option<i64>,

        #[arg(short, long)]
        description: String,
    },

    /// Inspect ledgers
    #[command(subcommand)]
    Ledger(LedgerCommands),

    /// Achievement unlocks
    #[command(subcommand)]
    Unlocks(UnlockCommands),

    /// Reward catalog and redemptions
    #[command(subcommand)]
    Reward(RewardCommands),
}

#[derive(Subcommand, Debug)]
pub enum AwardCommands {
    /// Award (or deduct) points
    Points {
        #[arg(short, long)]
        employee: EmployeeId,

        /// Signed amount
        #[arg(short, long, allow_hyphen_values = true)]
        points: i64,

        /// earned, spent, bonus or penalty
        #[arg(short = 't', long = "type", default_value = "earned")]
        kind: PointKind,

        #[arg(short, long)]
        description: String,

        /// Traceability tag, e.g. flowace:1234
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Award (or deduct) coins
    Coins {
        #[arg(short, long)]
        employee: EmployeeId,

        /// Signed amount
        #[arg(short, long, allow_hyphen_values = true)]
        coins: i64,

        /// earned, spent, converted, bonus or achievement
        #[arg(short = 't', long = "type", default_value = "earned")]
        kind: CoinKind,

        #[arg(short, long)]
        description: String,

        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Award the tier matching a day's productivity percentage
    Productivity {
        #[arg(short, long)]
        employee: EmployeeId,

        #[arg(short, long)]
        percentage: f64,

        /// Productivity record the award traces back to
        #[arg(short, long)]
        record: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// Balances, level and rank
    Show {
        #[arg(short, long)]
        employee: EmployeeId,
    },

    /// Recent point transactions
    Transactions {
        #[arg(short, long)]
        employee: EmployeeId,

        /// Defaults to KUDOS_TRANSACTION_LIMIT
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Recent coin transactions
    Coins {
        #[arg(short, long)]
        employee: EmployeeId,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Achievements with progress
    Achievements {
        #[arg(short, long)]
        employee: EmployeeId,
    },

    /// Leaderboard position
    Rank {
        #[arg(short, long)]
        employee: EmployeeId,
    },

    /// Leaderboard
    Top {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum UnlockCommands {
    /// Evaluate every achievement for an employee
    Resolve {
        #[arg(short, long)]
        employee: EmployeeId,
    },
}

#[derive(Subcommand, Debug)]
pub enum RewardCommands {
    /// List the catalog
    List {
        /// Include inactive rewards
        #[arg(short, long)]
        all: bool,
    },

    /// Add a reward priced in points or coins
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long, conflicts_with = "coins", required_unless_present = "coins")]
        points: Option<i64>,

        #[arg(short, long)]
        coins: Option<i64>,

        /// Omit for unlimited stock
        #[arg(short, long)]
        stock: Option<i64>,
    },

    /// Change fields of a reward
    Update {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long, conflicts_with = "coins")]
        points: Option<i64>,

        #[arg(short, long)]
        coins: Option<i64>,

        #[arg(short, long, conflicts_with = "unlimited")]
        stock: Option<i64>,

        /// Remove the stock limit
        #[arg(long)]
        unlimited: bool,

        #[arg(long)]
        active: Option<bool>,
    },

    /// Remove a reward
    Delete { id: String },

    /// Redeem a reward for an employee
    Redeem {
        #[arg(short, long)]
        employee: EmployeeId,

        #[arg(short, long)]
        reward: String,
    },

    /// Move a redemption to a new status
    Status {
        id: String,

        /// approved, rejected or used
        status: RedemptionStatus,
    },

    /// Redemptions of an employee
    Redemptions {
        #[arg(short, long)]
        employee: EmployeeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_negative_award() {
        let cli = Cli::try_parse_from([
            "kudos", "award", "points", "-e", "7", "-p", "-60", "-t", "spent", "-d", "redeem",
        ])
        .unwrap();

        match cli.command {
            Commands::Award(AwardCommands::Points {
                employee,
                points,
                kind,
                ..
            }) => {
                assert_eq!(employee, 7);
                assert_eq!(points, -60);
                assert_eq!(kind, PointKind::Spent);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_reject_unknown_point_type() {
        let parsed = Cli::try_parse_from([
            "kudos", "award", "points", "-e", "7", "-p", "10", "-t", "refund", "-d", "x",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_reward_needs_one_currency() {
        assert!(Cli::try_parse_from(["kudos", "reward", "create", "-n", "Mug"]).is_err());
        assert!(Cli::try_parse_from([
            "kudos", "reward", "create", "-n", "Mug", "-p", "10", "-c", "5"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["kudos", "reward", "create", "-n", "Mug", "-c", "5"]).is_ok());
    }
}

// Ledger inspection and unlock commands

use serde_json::json;

use crate::cli::{LedgerCommands, OutputFormat, UnlockCommands};
use crate::engine::Engine;
use crate::utils::formatters::{
    format_delta, format_number, format_points_short, format_since, progress_bar, truncate,
};
use crate::utils::progression::experience_to_next_level;

use super::award::print_balances;
use super::emit;

pub async fn handle(
    engine: &Engine,
    cmd: LedgerCommands,
    default_limit: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        LedgerCommands::Show { employee } => {
            let ledger = engine.get_ledger(employee).await?;
            emit(format, &ledger, |l| {
                println!("Employee {}", l.employee_id);
                print_balances(l);
                println!(
                    "  Experience: {} ({} to next level)",
                    format_number(l.experience()),
                    format_number(experience_to_next_level(l.experience()))
                );
                println!(
                    "  Lifetime: {} points, {} coins",
                    format_number(l.lifetime_points),
                    format_number(l.lifetime_coins)
                );
            })
        }
        LedgerCommands::Transactions { employee, limit } => {
            let rows = engine
                .list_transactions(employee, limit.unwrap_or(default_limit))
                .await?;
            emit(format, &rows, |rows| {
                if rows.is_empty() {
                    println!("No point transactions yet");
                }
                for tx in rows {
                    println!(
                        "{:>8}  {:<8} {:<40} {}",
                        format_delta(tx.amount),
                        tx.kind.as_str(),
                        truncate(&tx.description, 40),
                        format_since(tx.created_at)
                    );
                }
            })
        }
        LedgerCommands::Coins { employee, limit } => {
            let rows = engine
                .list_coin_transactions(employee, limit.unwrap_or(default_limit))
                .await?;
            emit(format, &rows, |rows| {
                if rows.is_empty() {
                    println!("No coin transactions yet");
                }
                for tx in rows {
                    println!(
                        "{:>8}  {:<11} {:<40} {}",
                        format_delta(tx.amount),
                        tx.kind.as_str(),
                        truncate(&tx.description, 40),
                        format_since(tx.created_at)
                    );
                }
            })
        }
        LedgerCommands::Achievements { employee } => {
            let listed = engine.list_achievements_with_progress(employee).await?;
            emit(format, &listed, |listed| {
                for entry in listed {
                    let a = &entry.achievement;
                    let status = match entry.unlocked_at {
                        Some(at) => format!("unlocked {}", format_since(at)),
                        None => "locked".to_string(),
                    };
                    println!(
                        "{} {:<24} {}  {}",
                        a.icon,
                        truncate(&a.name, 24),
                        progress_bar(entry.progress),
                        status
                    );
                }
            })
        }
        LedgerCommands::Rank { employee } => {
            let rank = engine.get_leaderboard_rank(employee).await?;
            emit(format, &json!({ "employeeId": employee, "rank": rank }), |_| {
                println!("Employee {} is #{} on the leaderboard", employee, rank)
            })
        }
        LedgerCommands::Top { limit } => {
            let top = engine.leaderboard(limit).await?;
            emit(format, &top, |top| {
                for (i, ledger) in top.iter().enumerate() {
                    println!(
                        "{:>3}. Employee {:<8} {:>7} pts  Lv {:<3} {}",
                        i + 1,
                        ledger.employee_id,
                        format_points_short(ledger.points),
                        ledger.level(),
                        ledger.rank()
                    );
                }
            })
        }
    }
}

pub async fn unlocks(engine: &Engine, cmd: UnlockCommands, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UnlockCommands::Resolve { employee } => {
            let unlocked = engine.resolve_unlocks(employee).await?;
            emit(format, &unlocked, |unlocked| {
                if unlocked.is_empty() {
                    println!("No new achievements for employee {}", employee);
                }
                for a in unlocked {
                    println!("Unlocked {} {} for employee {}", a.icon, a.name, employee);
                }
            })
        }
    }
}

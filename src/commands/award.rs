// Award, convert and adjust commands

use crate::cli::{AwardCommands, OutputFormat};
use crate::engine::{AwardOutcome, CoinAward, CoinAwardOutcome, Engine, PointAward};
use crate::models::achievement::Achievement;
use crate::models::ledger::{EmployeeId, EmployeeLedger};
use crate::utils::formatters::{format_delta, format_number};

use super::emit;

pub async fn handle(engine: &Engine, cmd: AwardCommands, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AwardCommands::Points {
            employee,
            points,
            kind,
            description,
            reference,
        } => {
            let mut award = PointAward::new(employee, points, kind, description);
            award.reference = reference;

            let outcome = engine.award_points(award).await?;
            emit(format, &outcome, print_award)
        }
        AwardCommands::Coins {
            employee,
            coins,
            kind,
            description,
            reference,
        } => {
            let mut award = CoinAward::new(employee, coins, kind, description);
            award.reference = reference;

            let outcome = engine.award_coins(award).await?;
            emit(format, &outcome, print_coin_award)
        }
        AwardCommands::Productivity {
            employee,
            percentage,
            record,
        } => match engine.award_productivity(employee, percentage, &record).await? {
            Some(outcome) => emit(format, &outcome, print_award),
            None => emit(format, &serde_json::Value::Null, |_| {
                println!("{:.1}% is below every productivity tier, nothing awarded", percentage)
            }),
        },
    }
}

pub async fn convert(
    engine: &Engine,
    employee: EmployeeId,
    coins: i64,
    description: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let outcome = engine.convert_coins(employee, coins, description).await?;
    emit(format, &outcome, print_coin_award)
}

pub async fn adjust(
    engine: &Engine,
    employee: EmployeeId,
    points: Option<i64>,
    coins: Option<i64>,
    description: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let ledger = engine.apply_delta(employee, points, coins, description).await?;
    emit(format, &ledger, |l| {
        println!("Adjusted employee {}", l.employee_id);
        print_balances(l);
    })
}

pub(crate) fn print_balances(ledger: &EmployeeLedger) {
    println!(
        "  Points: {}  Coins: {}  Level {} ({})",
        format_number(ledger.points),
        format_number(ledger.coins),
        ledger.level(),
        ledger.rank()
    );
}

fn print_unlocked(unlocked: &[Achievement]) {
    for achievement in unlocked {
        println!(
            "  Unlocked {} {} (+{} points, +{} coins)",
            achievement.icon, achievement.name, achievement.points, achievement.coins
        );
    }
}

fn print_award(outcome: &AwardOutcome) {
    let tx = &outcome.transaction;
    println!(
        "{} points ({}) for employee {}: {}",
        format_delta(tx.amount),
        tx.kind,
        tx.employee_id,
        tx.description
    );
    if tx.amount != tx.requested {
        println!("  Requested {}, clamped at zero", format_delta(tx.requested));
    }
    if outcome.coins_earned > 0 {
        println!("  Bonus coins: {}", format_delta(outcome.coins_earned));
    }
    print_balances(&outcome.ledger);
    print_unlocked(&outcome.unlocked);
}

fn print_coin_award(outcome: &CoinAwardOutcome) {
    let tx = &outcome.transaction;
    println!(
        "{} coins ({}) for employee {}: {}",
        format_delta(tx.amount),
        tx.kind,
        tx.employee_id,
        tx.description
    );
    if tx.amount != tx.requested {
        println!("  Requested {}, clamped at zero", format_delta(tx.requested));
    }
    print_balances(&outcome.ledger);
    print_unlocked(&outcome.unlocked);
}

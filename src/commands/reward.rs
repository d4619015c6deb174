// Reward catalog and redemption commands

use anyhow::anyhow;

use crate::cli::{OutputFormat, RewardCommands};
use crate::engine::Engine;
use crate::models::reward::{NewReward, Reward, RewardCost, RewardUpdate};
use crate::utils::formatters::{format_since, truncate};

use super::award::print_balances;
use super::emit;

/// Price from the mutually exclusive --points / --coins flags
fn cost_from(points: Option<i64>, coins: Option<i64>) -> anyhow::Result<Option<RewardCost>> {
    match (points, coins) {
        (Some(p), None) => Ok(Some(RewardCost::Points(p))),
        (None, Some(c)) => Ok(Some(RewardCost::Coins(c))),
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(anyhow!("a reward costs points or coins, not both")),
    }
}

fn print_reward(reward: &Reward) {
    let stock = match reward.stock {
        Some(n) => format!("{} left", n),
        None => "unlimited".to_string(),
    };
    println!(
        "{:<20} {:<28} {:>12}  {:<10}{}",
        reward.id,
        truncate(&reward.name, 28),
        reward.cost.to_string(),
        stock,
        if reward.is_active { "" } else { "  (inactive)" }
    );
}

pub async fn handle(engine: &Engine, cmd: RewardCommands, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        RewardCommands::List { all } => {
            let rewards = engine.list_rewards(all).await?;
            emit(format, &rewards, |rewards| {
                if rewards.is_empty() {
                    println!("No rewards in the catalog");
                }
                rewards.iter().for_each(print_reward);
            })
        }
        RewardCommands::Create {
            name,
            description,
            points,
            coins,
            stock,
        } => {
            let cost = cost_from(points, coins)?
                .ok_or_else(|| anyhow!("a reward needs a price in points or coins"))?;

            let reward = engine
                .create_reward(NewReward {
                    name,
                    description,
                    cost,
                    stock,
                })
                .await?;
            emit(format, &reward, print_reward)
        }
        RewardCommands::Update {
            id,
            name,
            description,
            points,
            coins,
            stock,
            unlimited,
            active,
        } => {
            let update = RewardUpdate {
                name,
                description,
                cost: cost_from(points, coins)?,
                stock: if unlimited { Some(None) } else { stock.map(Some) },
                is_active: active,
            };

            let reward = engine.update_reward(&id, update).await?;
            emit(format, &reward, print_reward)
        }
        RewardCommands::Delete { id } => {
            engine.delete_reward(&id).await?;
            emit(format, &serde_json::json!({ "deleted": &id }), |_| {
                println!("Deleted reward {}", id)
            })
        }
        RewardCommands::Redeem { employee, reward } => {
            let outcome = engine.redeem(employee, &reward).await?;
            emit(format, &outcome, |o| {
                println!(
                    "Redemption {} of {} for {} is {}",
                    o.redemption.id, o.redemption.reward_name, o.redemption.cost, o.redemption.status
                );
                print_balances(&o.ledger);
            })
        }
        RewardCommands::Status { id, status } => {
            let redemption = engine.update_redemption_status(&id, status).await?;
            emit(format, &redemption, |r| {
                println!("Redemption {} is now {}", r.id, r.status)
            })
        }
        RewardCommands::Redemptions { employee } => {
            let redemptions = engine.list_redemptions(employee).await?;
            emit(format, &redemptions, |rows| {
                if rows.is_empty() {
                    println!("No redemptions for employee {}", employee);
                }
                for r in rows {
                    println!(
                        "{:<20} {:<28} {:>12}  {:<9} {}",
                        r.id,
                        truncate(&r.reward_name, 28),
                        r.cost.to_string(),
                        r.status.as_str(),
                        format_since(r.created_at)
                    );
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_from_flags() {
        assert_eq!(cost_from(Some(10), None).unwrap(), Some(RewardCost::Points(10)));
        assert_eq!(cost_from(None, Some(3)).unwrap(), Some(RewardCost::Coins(3)));
        assert_eq!(cost_from(None, None).unwrap(), None);
        assert!(cost_from(Some(1), Some(1)).is_err());
    }
}

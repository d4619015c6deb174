// Reward catalog and redemption

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{abort, retrying, Engine};
use crate::error::{LedgerError, Result};
use crate::models::ledger::{
    CoinKind, CoinTransaction, EmployeeId, EmployeeLedger, PointKind, PointTransaction,
};
use crate::models::reward::{
    EmployeeReward, NewReward, RedemptionStatus, Reward, RewardCost, RewardUpdate,
};
use crate::store::LedgerWrite;
use crate::utils::ids::new_id;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionOutcome {
    pub redemption: EmployeeReward,
    /// Ledger after the spend
    pub ledger: EmployeeLedger,
}

fn reward_reference(reward_id: &str) -> Option<String> {
    Some(format!("reward:{}", reward_id))
}

impl Engine {
    /// Spend against a reward and queue a pending redemption.
    ///
    /// Balance, stock and the redemption row change together or not at all.
    /// Redemptions do not run an unlock pass.
    pub async fn redeem(&self, employee_id: EmployeeId, reward_id: &str) -> Result<RedemptionOutcome> {
        retrying(employee_id, || self.try_redeem(employee_id, reward_id)).await
    }

    async fn try_redeem(&self, employee_id: EmployeeId, reward_id: &str) -> Result<RedemptionOutcome> {
        let now = Utc::now();
        let mut tx = self.store.begin(employee_id).await?;

        let reward = match tx.reward(reward_id).await {
            Ok(Some(reward)) if reward.is_active => reward,
            Ok(_) => return abort(tx, LedgerError::not_found("reward", reward_id)).await,
            Err(e) => return abort(tx, e).await,
        };

        if !reward.in_stock() {
            return abort(tx, LedgerError::OutOfStock(reward.id.clone())).await;
        }

        let mut ledger = match tx.ledger().await {
            Ok(found) => found.unwrap_or_else(|| EmployeeLedger::new(employee_id, now)),
            Err(e) => return abort(tx, e).await,
        };

        let cost = reward.cost.amount();
        let available = match reward.cost {
            RewardCost::Points(_) => ledger.points,
            RewardCost::Coins(_) => ledger.coins,
        };
        if available < cost {
            let err = LedgerError::InsufficientBalance {
                currency: reward.cost.currency(),
                available,
                required: cost,
            };
            return abort(tx, err).await;
        }

        let description = format!("Redeemed: {}", reward.name);
        let spend = match reward.cost {
            RewardCost::Points(_) => {
                let applied = ledger.apply_points(-cost, PointKind::Spent);
                LedgerWrite::AppendPoints(
                    PointTransaction::new(employee_id, PointKind::Spent, -cost, description, now)
                        .applied(applied)
                        .with_reference(reward_reference(&reward.id)),
                )
            }
            RewardCost::Coins(_) => {
                let applied = ledger.apply_coins(-cost, CoinKind::Spent);
                LedgerWrite::AppendCoins(
                    CoinTransaction::new(employee_id, CoinKind::Spent, -cost, description, now)
                        .applied(applied)
                        .with_reference(reward_reference(&reward.id)),
                )
            }
        };
        ledger.touch(now);

        let redemption = EmployeeReward {
            id: new_id(),
            employee_id,
            reward_id: reward.id.clone(),
            reward_name: reward.name.clone(),
            cost: reward.cost,
            status: RedemptionStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        tx.stage(LedgerWrite::PutLedger(ledger.clone()));
        tx.stage(spend);
        if let Some(expected) = reward.stock {
            tx.stage(LedgerWrite::ReserveStock {
                reward_id: reward.id.clone(),
                expected,
            });
        }
        tx.stage(LedgerWrite::InsertRedemption(redemption.clone()));

        let outcome = tx.commit().await?;

        info!(
            "Employee {} redeemed {} for {}",
            employee_id, reward.name, reward.cost
        );

        Ok(RedemptionOutcome {
            redemption,
            ledger: outcome.ledger.unwrap_or(ledger),
        })
    }

    /// Move a redemption along pending -> approved | rejected, approved -> used
    pub async fn update_redemption_status(
        &self,
        redemption_id: &str,
        status: RedemptionStatus,
    ) -> Result<EmployeeReward> {
        let redemption = self
            .store
            .transition_redemption(redemption_id, status, Utc::now())
            .await?;

        info!("Redemption {} is now {}", redemption_id, redemption.status);
        Ok(redemption)
    }

    /// Redemptions of one employee, newest first
    pub async fn list_redemptions(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeReward>> {
        self.store.redemptions(employee_id).await
    }

    pub async fn create_reward(&self, new: NewReward) -> Result<Reward> {
        let reward = Reward {
            id: new_id(),
            name: new.name.trim().to_string(),
            description: new.description,
            cost: new.cost,
            stock: new.stock,
            is_active: true,
            created_at: Utc::now(),
        };
        reward.validate()?;

        self.store.insert_reward(&reward).await?;
        info!("Created reward {} ({})", reward.id, reward.name);

        Ok(reward)
    }

    pub async fn update_reward(&self, reward_id: &str, update: RewardUpdate) -> Result<Reward> {
        let reward = self.store.update_reward(reward_id, &update).await?;
        info!("Updated reward {}", reward_id);
        Ok(reward)
    }

    pub async fn delete_reward(&self, reward_id: &str) -> Result<()> {
        if !self.store.delete_reward(reward_id).await? {
            return Err(LedgerError::not_found("reward", reward_id));
        }
        info!("Deleted reward {}", reward_id);
        Ok(())
    }

    /// Rewards in creation order; inactive ones only when asked for
    pub async fn list_rewards(&self, include_inactive: bool) -> Result<Vec<Reward>> {
        let rewards = self.store.list_rewards().await?;
        Ok(rewards
            .into_iter()
            .filter(|r| include_inactive || r.is_active)
            .collect())
    }
}

// Point and coin awards

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{abort, retrying, Engine};
use crate::error::{Currency, LedgerError, Result};
use crate::models::achievement::Achievement;
use crate::models::ledger::{
    CoinKind, CoinTransaction, EmployeeId, EmployeeLedger, PointKind, PointTransaction,
};
use crate::store::LedgerWrite;
use crate::utils::points::{coin_bonus, productivity_award, productivity_reference};

/// A signed point adjustment with its reason
#[derive(Debug, Clone, PartialEq)]
pub struct PointAward {
    pub employee_id: EmployeeId,
    pub points: i64,
    pub kind: PointKind,
    pub description: String,
    pub reference: Option<String>,
}

impl PointAward {
    pub fn new(
        employee_id: EmployeeId,
        points: i64,
        kind: PointKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            employee_id,
            points,
            kind,
            description: description.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A signed coin adjustment with its reason
#[derive(Debug, Clone, PartialEq)]
pub struct CoinAward {
    pub employee_id: EmployeeId,
    pub coins: i64,
    pub kind: CoinKind,
    pub description: String,
    pub reference: Option<String>,
}

impl CoinAward {
    pub fn new(
        employee_id: EmployeeId,
        coins: i64,
        kind: CoinKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            employee_id,
            coins,
            kind,
            description: description.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardOutcome {
    /// Ledger after the award and any achievement rewards
    pub ledger: EmployeeLedger,
    pub transaction: PointTransaction,
    /// Bonus coins derived from the points
    pub coins_earned: i64,
    pub unlocked: Vec<Achievement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinAwardOutcome {
    pub ledger: EmployeeLedger,
    pub transaction: CoinTransaction,
    pub unlocked: Vec<Achievement>,
}

fn require_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    Ok(())
}

impl Engine {
    /// Apply a point award, its coin bonus and any unlocks it triggers,
    /// all in one unit of work
    pub async fn award_points(&self, award: PointAward) -> Result<AwardOutcome> {
        require_description(&award.description)?;
        retrying(award.employee_id, || self.try_award_points(&award)).await
    }

    async fn try_award_points(&self, award: &PointAward) -> Result<AwardOutcome> {

        let now = Utc::now();
        let mut tx = self.store.begin(award.employee_id).await?;

        let mut ledger = match tx.ledger().await {
            Ok(found) => found.unwrap_or_else(|| EmployeeLedger::new(award.employee_id, now)),
            Err(e) => return abort(tx, e).await,
        };

        let applied = ledger.apply_points(award.points, award.kind);
        let coins_earned = coin_bonus(award.points, award.kind);
        if coins_earned > 0 {
            ledger.apply_coins(coins_earned, CoinKind::Earned);
        }
        ledger.touch(now);

        let transaction = PointTransaction::new(
            award.employee_id,
            award.kind,
            award.points,
            award.description.trim(),
            now,
        )
        .applied(applied)
        .with_reference(award.reference.clone());

        let mut writes = vec![LedgerWrite::AppendPoints(transaction.clone())];
        if coins_earned > 0 {
            let bonus = CoinTransaction::new(
                award.employee_id,
                CoinKind::Earned,
                coins_earned,
                format!("Bonus coins from {}", award.description.trim()),
                now,
            )
            .with_reference(award.reference.clone());
            writes.push(LedgerWrite::AppendCoins(bonus));
        }

        let (ledger, unlocked) = self.commit_with_unlocks(tx, ledger, writes, now).await?;

        info!(
            "Awarded {} {} points to employee {} (applied {}, +{} coins, {} unlocks)",
            award.points,
            award.kind,
            award.employee_id,
            applied,
            coins_earned,
            unlocked.len()
        );

        Ok(AwardOutcome {
            ledger,
            transaction,
            coins_earned,
            unlocked,
        })
    }

    /// Apply a coin award. Experience and level are untouched.
    pub async fn award_coins(&self, award: CoinAward) -> Result<CoinAwardOutcome> {
        require_description(&award.description)?;
        retrying(award.employee_id, || self.try_award_coins(&award)).await
    }

    async fn try_award_coins(&self, award: &CoinAward) -> Result<CoinAwardOutcome> {

        let now = Utc::now();
        let mut tx = self.store.begin(award.employee_id).await?;

        let mut ledger = match tx.ledger().await {
            Ok(found) => found.unwrap_or_else(|| EmployeeLedger::new(award.employee_id, now)),
            Err(e) => return abort(tx, e).await,
        };

        let applied = ledger.apply_coins(award.coins, award.kind);
        ledger.touch(now);

        let transaction = CoinTransaction::new(
            award.employee_id,
            award.kind,
            award.coins,
            award.description.trim(),
            now,
        )
        .applied(applied)
        .with_reference(award.reference.clone());

        let writes = vec![LedgerWrite::AppendCoins(transaction.clone())];
        let (ledger, unlocked) = self.commit_with_unlocks(tx, ledger, writes, now).await?;

        info!(
            "Awarded {} {} coins to employee {} (applied {})",
            award.coins, award.kind, award.employee_id, applied
        );

        Ok(CoinAwardOutcome {
            ledger,
            transaction,
            unlocked,
        })
    }

    /// Award the productivity tier for a day's percentage.
    /// Returns None when the percentage is below every tier.
    pub async fn award_productivity(
        &self,
        employee_id: EmployeeId,
        percentage: f64,
        record_id: &str,
    ) -> Result<Option<AwardOutcome>> {
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(LedgerError::validation(format!(
                "productivity percentage out of range: {}",
                percentage
            )));
        }

        let Some(points) = productivity_award(percentage) else {
            return Ok(None);
        };

        let award = PointAward::new(
            employee_id,
            points,
            PointKind::Earned,
            format!("Productivity {:.0}%", percentage),
        )
        .with_reference(productivity_reference(record_id));

        self.award_points(award).await.map(Some)
    }

    /// Convert coins out of the economy. Unlike awards this never clamps:
    /// asking for more coins than the balance holds is an error.
    pub async fn convert_coins(
        &self,
        employee_id: EmployeeId,
        coins: i64,
        description: &str,
    ) -> Result<CoinAwardOutcome> {
        require_description(description)?;
        if coins <= 0 {
            return Err(LedgerError::validation("converted coins must be positive"));
        }
        retrying(employee_id, || self.try_convert_coins(employee_id, coins, description)).await
    }

    async fn try_convert_coins(
        &self,
        employee_id: EmployeeId,
        coins: i64,
        description: &str,
    ) -> Result<CoinAwardOutcome> {
        let now = Utc::now();
        let mut tx = self.store.begin(employee_id).await?;

        let mut ledger = match tx.ledger().await {
            Ok(found) => found.unwrap_or_else(|| EmployeeLedger::new(employee_id, now)),
            Err(e) => return abort(tx, e).await,
        };

        if ledger.coins < coins {
            let err = LedgerError::InsufficientBalance {
                currency: Currency::Coins,
                available: ledger.coins,
                required: coins,
            };
            return abort(tx, err).await;
        }

        let applied = ledger.apply_coins(-coins, CoinKind::Converted);
        ledger.touch(now);

        let transaction =
            CoinTransaction::new(employee_id, CoinKind::Converted, -coins, description.trim(), now)
                .applied(applied);

        tx.stage(LedgerWrite::PutLedger(ledger.clone()));
        tx.stage(LedgerWrite::AppendCoins(transaction.clone()));
        let outcome = tx.commit().await?;

        info!("Converted {} coins for employee {}", coins, employee_id);

        Ok(CoinAwardOutcome {
            ledger: outcome.ledger.unwrap_or(ledger),
            transaction,
            unlocked: Vec::new(),
        })
    }

    /// Admin correction: clamp and record each non-empty delta as a single
    /// transaction. No coin bonus and no unlock pass.
    pub async fn apply_delta(
        &self,
        employee_id: EmployeeId,
        points: Option<i64>,
        coins: Option<i64>,
        description: &str,
    ) -> Result<EmployeeLedger> {
        require_description(description)?;

        let points = points.filter(|p| *p != 0);
        let coins = coins.filter(|c| *c != 0);
        if points.is_none() && coins.is_none() {
            return Err(LedgerError::validation("nothing to adjust"));
        }
        retrying(employee_id, || {
            self.try_apply_delta(employee_id, points, coins, description)
        })
        .await
    }

    async fn try_apply_delta(
        &self,
        employee_id: EmployeeId,
        points: Option<i64>,
        coins: Option<i64>,
        description: &str,
    ) -> Result<EmployeeLedger> {
        let now = Utc::now();
        let mut tx = self.store.begin(employee_id).await?;

        let mut ledger = match tx.ledger().await {
            Ok(found) => found.unwrap_or_else(|| EmployeeLedger::new(employee_id, now)),
            Err(e) => return abort(tx, e).await,
        };

        let mut writes = Vec::new();

        if let Some(delta) = points {
            let kind = if delta > 0 { PointKind::Bonus } else { PointKind::Penalty };
            let applied = ledger.apply_points(delta, kind);
            writes.push(LedgerWrite::AppendPoints(
                PointTransaction::new(employee_id, kind, delta, description.trim(), now)
                    .applied(applied),
            ));
        }

        if let Some(delta) = coins {
            let kind = if delta > 0 { CoinKind::Bonus } else { CoinKind::Spent };
            let applied = ledger.apply_coins(delta, kind);
            writes.push(LedgerWrite::AppendCoins(
                CoinTransaction::new(employee_id, kind, delta, description.trim(), now)
                    .applied(applied),
            ));
        }

        ledger.touch(now);
        tx.stage(LedgerWrite::PutLedger(ledger.clone()));
        for write in writes {
            tx.stage(write);
        }
        let outcome = tx.commit().await?;

        info!(
            "Adjusted employee {} by {:?} points, {:?} coins",
            employee_id, points, coins
        );

        Ok(outcome.ledger.unwrap_or(ledger))
    }
}

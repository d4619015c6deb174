// Award, unlock and redemption engine
// Every mutating call runs as one unit of work on the `LedgerStore`:
// read the ledger, compute the new state with pure steps, plan achievement
// grants against that state, then commit everything at once. Grants are
// applied by the store and never feed back into another award, so a grant
// can not trigger further unlocks.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};
use crate::models::achievement::Achievement;
use crate::models::ledger::{CoinTransaction, EmployeeId, EmployeeLedger, PointTransaction};
use crate::store::{
    ActivityHistory, Backends, LedgerStore, LedgerTx, LedgerWrite, UnlockGrant,
};
use crate::utils::config::DaySettings;

pub mod award;
pub mod catalog;
pub mod progress;
pub mod redeem;
pub mod unlock;

pub use award::{AwardOutcome, CoinAward, CoinAwardOutcome, PointAward};
pub use catalog::{AchievementRepository, FirestoreCatalog, MemoryCatalog};
pub use progress::AchievementProgress;
pub use redeem::RedemptionOutcome;

/// Entry point for every ledger operation
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<dyn AchievementRepository>,
    history: Arc<dyn ActivityHistory>,
    day: DaySettings,
}

/// Attempts per unit of work before a lost commit race is reported
const COMMIT_ATTEMPTS: usize = 3;

/// Run a unit of work again when it loses a commit race. Every attempt
/// re-reads the ledger and the unlock set, so a grant the winning writer
/// already made is skipped and the rest of the work still lands.
pub(crate) async fn retrying<T, F, Fut>(employee_id: EmployeeId, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < COMMIT_ATTEMPTS => {
                debug!(
                    "Unit of work for employee {} lost a race (attempt {}): {}",
                    employee_id, attempt, e
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Roll back a unit of work after a failure and hand back the original error
async fn abort<T>(tx: Box<dyn LedgerTx>, err: LedgerError) -> Result<T> {
    let employee_id = tx.employee_id();
    if let Err(rollback) = tx.rollback().await {
        warn!(
            "Rollback failed for employee {} after {}: {}",
            employee_id, err, rollback
        );
    }
    Err(err)
}

impl Engine {
    pub fn new(backends: Backends, day: DaySettings) -> Self {
        Self {
            store: backends.store,
            catalog: backends.catalog,
            history: backends.history,
            day,
        }
    }

    /// Calendar day streaks are anchored to
    pub fn today(&self) -> NaiveDate {
        self.day.today()
    }

    pub fn day_settings(&self) -> DaySettings {
        self.day
    }

    /// Plan unlocks against `ledger`, stage everything and commit.
    /// Returns the committed ledger and the achievements actually granted.
    async fn commit_with_unlocks(
        &self,
        mut tx: Box<dyn LedgerTx>,
        ledger: EmployeeLedger,
        writes: Vec<LedgerWrite>,
        now: DateTime<Utc>,
    ) -> Result<(EmployeeLedger, Vec<Achievement>)> {
        let employee_id = tx.employee_id();
        let candidates = self.plan_unlocks(tx.as_mut(), &ledger).await;

        tx.stage(LedgerWrite::PutLedger(ledger.clone()));
        for write in writes {
            tx.stage(write);
        }
        for achievement in &candidates {
            tx.stage(LedgerWrite::Unlock(UnlockGrant::new(employee_id, achievement, now)));
        }

        let outcome = tx.commit().await?;

        let unlocked: Vec<Achievement> = candidates
            .into_iter()
            .filter(|a| outcome.granted.contains(&a.id))
            .collect();

        for achievement in &unlocked {
            debug!(
                "Employee {} unlocked achievement {} ({})",
                employee_id, achievement.id, achievement.name
            );
        }

        Ok((outcome.ledger.unwrap_or(ledger), unlocked))
    }

    /// Ledger for an employee, created zeroed on first access
    pub async fn get_ledger(&self, employee_id: EmployeeId) -> Result<EmployeeLedger> {
        self.store.get_or_create(employee_id).await
    }

    /// Most recent point transactions, newest first
    pub async fn list_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<PointTransaction>> {
        self.store.point_transactions(employee_id, limit).await
    }

    /// Most recent coin transactions, newest first
    pub async fn list_coin_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<CoinTransaction>> {
        self.store.coin_transactions(employee_id, limit).await
    }

    /// 1-based position by current points; ties share a position
    pub async fn get_leaderboard_rank(&self, employee_id: EmployeeId) -> Result<usize> {
        let ledgers = self.store.list_ledgers().await?;

        let points = ledgers
            .iter()
            .find(|l| l.employee_id == employee_id)
            .map_or(0, |l| l.points);

        Ok(1 + ledgers.iter().filter(|l| l.points > points).count())
    }

    /// Top ledgers by current points
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<EmployeeLedger>> {
        let mut ledgers = self.store.list_ledgers().await?;

        ledgers.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.lifetime_points.cmp(&a.lifetime_points))
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        ledgers.truncate(limit);

        Ok(ledgers)
    }
}

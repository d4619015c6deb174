// In-process ledger store
// Each employee's ledger, logs and unlocks live together in one `Book`, so
// a commit only locks that employee's shard. A per-employee async mutex is
// held for the whole unit of work to serialize read-modify-write cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{ActivityHistory, CommitOutcome, LedgerStore, LedgerTx, LedgerWrite};
use crate::error::{LedgerError, Result};
use crate::models::achievement::{AchievementId, EmployeeAchievement};
use crate::models::activity::{AttendanceRecord, AttendanceStatus, BreakSession, ProductivitySnapshot};
use crate::models::ledger::{CoinTransaction, EmployeeId, EmployeeLedger, PointTransaction};
use crate::models::reward::{EmployeeReward, RedemptionStatus, Reward, RewardId, RewardUpdate};

#[derive(Debug, Default)]
struct Book {
    ledger: Option<EmployeeLedger>,
    points: Vec<PointTransaction>,
    coins: Vec<CoinTransaction>,
    unlocks: HashMap<AchievementId, EmployeeAchievement>,
}

#[derive(Default)]
struct Tables {
    locks: DashMap<EmployeeId, Arc<Mutex<()>>>,
    books: DashMap<EmployeeId, Book>,
    rewards: DashMap<RewardId, Reward>,
    redemptions: DashMap<String, EmployeeReward>,
}

/// Ledger store kept in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx {
    tables: Arc<Tables>,
    employee_id: EmployeeId,
    writes: Vec<LedgerWrite>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    fn employee_id(&self) -> EmployeeId {
        self.employee_id
    }

    async fn ledger(&mut self) -> Result<Option<EmployeeLedger>> {
        Ok(self
            .tables
            .books
            .get(&self.employee_id)
            .and_then(|book| book.ledger.clone()))
    }

    async fn unlocked(&mut self) -> Result<HashSet<AchievementId>> {
        Ok(self
            .tables
            .books
            .get(&self.employee_id)
            .map(|book| book.unlocks.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn reward(&mut self, reward_id: &str) -> Result<Option<Reward>> {
        Ok(self.tables.rewards.get(reward_id).map(|r| r.clone()))
    }

    fn stage(&mut self, write: LedgerWrite) {
        self.writes.push(write);
    }

    async fn commit(self: Box<Self>) -> Result<CommitOutcome> {
        let MemoryTx {
            tables,
            employee_id,
            writes,
            _guard,
        } = *self;

        // Preconditions first; nothing below may fail once writing starts
        let reservations: Vec<(String, i64)> = writes
            .iter()
            .filter_map(|w| match w {
                LedgerWrite::ReserveStock { reward_id, expected } => {
                    Some((reward_id.clone(), *expected))
                }
                _ => None,
            })
            .collect();

        if reservations.len() > 1 {
            return Err(LedgerError::validation(
                "only one stock reservation per unit of work",
            ));
        }

        // Held until the end of the commit so stock checks and the decrement
        // happen under the same lock
        let mut reserved = match reservations.first() {
            Some((reward_id, expected)) => {
                let reward = tables
                    .rewards
                    .get_mut(reward_id.as_str())
                    .ok_or_else(|| LedgerError::not_found("reward", reward_id))?;

                if reward.stock != Some(*expected) {
                    return Err(LedgerError::Conflict(format!(
                        "stock of reward {} changed during redemption",
                        reward_id
                    )));
                }
                Some(reward)
            }
            None => None,
        };

        let mut guard = tables.books.entry(employee_id).or_default();
        let book: &mut Book = &mut guard;

        let puts_ledger = writes.iter().any(|w| matches!(w, LedgerWrite::PutLedger(_)));
        let grants = writes.iter().any(|w| matches!(w, LedgerWrite::Unlock(_)));
        if grants && !puts_ledger && book.ledger.is_none() {
            return Err(LedgerError::not_found("ledger", employee_id));
        }

        let mut granted = Vec::new();

        for write in writes {
            match write {
                LedgerWrite::PutLedger(ledger) => book.ledger = Some(ledger),
                LedgerWrite::AppendPoints(tx) => book.points.push(tx),
                LedgerWrite::AppendCoins(tx) => book.coins.push(tx),
                LedgerWrite::Unlock(grant) => {
                    let achievement_id = grant.achievement_id();
                    if book.unlocks.contains_key(&achievement_id) {
                        debug!(
                            "Employee {} already unlocked achievement {}, skipping grant",
                            employee_id, achievement_id
                        );
                        continue;
                    }

                    if let Some(ledger) = book.ledger.as_mut() {
                        grant.apply(ledger);
                    }
                    book.unlocks.insert(achievement_id, grant.unlock);
                    book.points.push(grant.points);
                    if let Some(coins) = grant.coins {
                        book.coins.push(coins);
                    }
                    granted.push(achievement_id);
                }
                LedgerWrite::ReserveStock { .. } => {
                    if let Some(reward) = reserved.as_mut() {
                        reward.stock = reward.stock.map(|n| n - 1);
                    }
                }
                LedgerWrite::InsertRedemption(redemption) => {
                    tables.redemptions.insert(redemption.id.clone(), redemption);
                }
            }
        }

        Ok(CommitOutcome {
            ledger: book.ledger.clone(),
            granted,
        })
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self, employee_id: EmployeeId) -> Result<Box<dyn LedgerTx>> {
        let lock = Arc::clone(&self.tables.locks.entry(employee_id).or_default());
        let guard = lock.lock_owned().await;

        Ok(Box::new(MemoryTx {
            tables: self.tables.clone(),
            employee_id,
            writes: Vec::new(),
            _guard: guard,
        }))
    }

    async fn find_ledger(&self, employee_id: EmployeeId) -> Result<Option<EmployeeLedger>> {
        Ok(self
            .tables
            .books
            .get(&employee_id)
            .and_then(|book| book.ledger.clone()))
    }

    async fn list_ledgers(&self) -> Result<Vec<EmployeeLedger>> {
        Ok(self
            .tables
            .books
            .iter()
            .filter_map(|book| book.ledger.clone())
            .collect())
    }

    async fn point_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<PointTransaction>> {
        Ok(self
            .tables
            .books
            .get(&employee_id)
            .map(|book| book.points.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn coin_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<CoinTransaction>> {
        Ok(self
            .tables
            .books
            .get(&employee_id)
            .map(|book| book.coins.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn unlocks(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeAchievement>> {
        let mut unlocks: Vec<EmployeeAchievement> = self
            .tables
            .books
            .get(&employee_id)
            .map(|book| book.unlocks.values().cloned().collect())
            .unwrap_or_default();
        unlocks.sort_by_key(|u| (u.unlocked_at, u.achievement_id));
        Ok(unlocks)
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>> {
        Ok(self.tables.rewards.get(reward_id).map(|r| r.clone()))
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>> {
        let mut rewards: Vec<Reward> = self.tables.rewards.iter().map(|r| r.clone()).collect();
        rewards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rewards)
    }

    async fn insert_reward(&self, reward: &Reward) -> Result<()> {
        if self.tables.rewards.contains_key(&reward.id) {
            return Err(LedgerError::Conflict(format!("reward {} already exists", reward.id)));
        }
        self.tables.rewards.insert(reward.id.clone(), reward.clone());
        Ok(())
    }

    async fn update_reward(&self, reward_id: &str, update: &RewardUpdate) -> Result<Reward> {
        let mut entry = self
            .tables
            .rewards
            .get_mut(reward_id)
            .ok_or_else(|| LedgerError::not_found("reward", reward_id))?;

        let mut updated = entry.clone();
        update.apply_to(&mut updated);
        updated.validate()?;

        *entry = updated.clone();
        Ok(updated)
    }

    async fn delete_reward(&self, reward_id: &str) -> Result<bool> {
        Ok(self.tables.rewards.remove(reward_id).is_some())
    }

    async fn redemptions(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeReward>> {
        let mut redemptions: Vec<EmployeeReward> = self
            .tables
            .redemptions
            .iter()
            .filter(|r| r.employee_id == employee_id)
            .map(|r| r.clone())
            .collect();
        redemptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(redemptions)
    }

    async fn transition_redemption(
        &self,
        redemption_id: &str,
        next: RedemptionStatus,
        now: DateTime<Utc>,
    ) -> Result<EmployeeReward> {
        let mut entry = self
            .tables
            .redemptions
            .get_mut(redemption_id)
            .ok_or_else(|| LedgerError::not_found("redemption", redemption_id))?;

        entry.transition(next, now)?;
        Ok(entry.clone())
    }
}

#[derive(Debug, Default)]
struct Trail {
    attendance: Vec<AttendanceRecord>,
    productivity: Vec<ProductivitySnapshot>,
    breaks: Vec<BreakSession>,
    tags_submitted: i64,
}

/// In-process activity history, filled by whoever embeds the engine
#[derive(Clone, Default)]
pub struct MemoryHistory {
    trails: Arc<DashMap<EmployeeId, Trail>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attendance(&self, record: AttendanceRecord) {
        self.trails
            .entry(record.employee_id)
            .or_default()
            .attendance
            .push(record);
    }

    pub fn record_productivity(&self, snapshot: ProductivitySnapshot) {
        self.trails
            .entry(snapshot.employee_id)
            .or_default()
            .productivity
            .push(snapshot);
    }

    pub fn record_break(&self, session: BreakSession) {
        self.trails
            .entry(session.employee_id)
            .or_default()
            .breaks
            .push(session);
    }

    pub fn record_tags(&self, employee_id: EmployeeId, count: i64) {
        self.trails.entry(employee_id).or_default().tags_submitted += count;
    }
}

#[async_trait]
impl ActivityHistory for MemoryHistory {
    async fn present_days(
        &self,
        employee_id: EmployeeId,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let mut rows: Vec<AttendanceRecord> = self
            .trails
            .get(&employee_id)
            .map(|trail| {
                trail
                    .attendance
                    .iter()
                    .filter(|r| r.status == AttendanceStatus::Present && r.date >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn productive_days(
        &self,
        employee_id: EmployeeId,
        since: NaiveDate,
        min_percentage: f64,
    ) -> Result<Vec<ProductivitySnapshot>> {
        let mut rows: Vec<ProductivitySnapshot> = self
            .trails
            .get(&employee_id)
            .map(|trail| {
                trail
                    .productivity
                    .iter()
                    .filter(|s| s.date >= since && s.productivity_percentage >= min_percentage)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn recent_breaks(&self, employee_id: EmployeeId, limit: usize) -> Result<Vec<BreakSession>> {
        let mut rows: Vec<BreakSession> = self
            .trails
            .get(&employee_id)
            .map(|trail| {
                trail
                    .breaks
                    .iter()
                    .filter(|s| s.ended_at.is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn tags_submitted(&self, employee_id: EmployeeId) -> Result<i64> {
        Ok(self
            .trails
            .get(&employee_id)
            .map(|trail| trail.tags_submitted)
            .unwrap_or(0))
    }
}

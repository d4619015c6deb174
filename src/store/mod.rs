// Ledger storage
// Every balance change goes through a `LedgerTx`: a unit of work bound to
// one employee. Reads happen first, the engine stages writes computed from
// them, and `commit` applies all staged writes or none. Units for the same
// employee run one at a time; units for different employees never wait on
// each other.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::api::firebase::FirebaseClient;
use crate::engine::catalog::{AchievementRepository, FirestoreCatalog, MemoryCatalog};
use crate::error::Result;
use crate::models::achievement::{Achievement, AchievementId, EmployeeAchievement};
use crate::models::activity::{AttendanceRecord, BreakSession, ProductivitySnapshot};
use crate::models::ledger::{
    CoinKind, CoinTransaction, EmployeeId, EmployeeLedger, PointKind, PointTransaction,
};
use crate::models::reward::{EmployeeReward, RedemptionStatus, Reward, RewardUpdate};
use crate::utils::config::{Config, StoreKind};

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::{MemoryHistory, MemoryStore};

/// Achievement payout staged alongside an award.
///
/// The store applies it only if the (employee, achievement) unlock row does
/// not exist yet; otherwise the whole grant is skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockGrant {
    pub unlock: EmployeeAchievement,
    pub points: PointTransaction,
    pub coins: Option<CoinTransaction>,
}

impl UnlockGrant {
    pub fn new(employee_id: EmployeeId, achievement: &Achievement, now: DateTime<Utc>) -> Self {
        let reference = Some(achievement.reference());

        let points = PointTransaction::new(
            employee_id,
            PointKind::Bonus,
            achievement.points.max(0),
            format!("Achievement unlocked: {}", achievement.name),
            now,
        )
        .with_reference(reference.clone());

        let coins = (achievement.coins > 0).then(|| {
            CoinTransaction::new(
                employee_id,
                CoinKind::Achievement,
                achievement.coins,
                format!("Achievement reward: {}", achievement.name),
                now,
            )
            .with_reference(reference)
        });

        Self {
            unlock: EmployeeAchievement {
                employee_id,
                achievement_id: achievement.id,
                unlocked_at: now,
                progress: 100,
            },
            points,
            coins,
        }
    }

    pub fn achievement_id(&self) -> AchievementId {
        self.unlock.achievement_id
    }

    /// Credit the payout onto a ledger
    pub fn apply(&self, ledger: &mut EmployeeLedger) {
        let coins = self.coins.as_ref().map_or(0, |c| c.amount);
        ledger.credit_reward(self.points.amount, coins);
        ledger.touch(self.unlock.unlocked_at);
    }
}

/// A write staged inside a unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    /// Replace the employee's ledger row
    PutLedger(EmployeeLedger),
    AppendPoints(PointTransaction),
    AppendCoins(CoinTransaction),
    Unlock(UnlockGrant),
    /// Take one unit of stock, provided it still equals `expected`
    ReserveStock { reward_id: String, expected: i64 },
    InsertRedemption(EmployeeReward),
}

/// Result of a successful commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    /// Ledger after every write, grants included
    pub ledger: Option<EmployeeLedger>,
    /// Achievements actually unlocked by this commit
    pub granted: Vec<AchievementId>,
}

/// A unit of work bound to one employee
#[async_trait]
pub trait LedgerTx: Send {
    fn employee_id(&self) -> EmployeeId;

    async fn ledger(&mut self) -> Result<Option<EmployeeLedger>>;

    /// Achievements this employee already unlocked
    async fn unlocked(&mut self) -> Result<HashSet<AchievementId>>;

    async fn reward(&mut self, reward_id: &str) -> Result<Option<Reward>>;

    fn stage(&mut self, write: LedgerWrite);

    /// Apply every staged write, or none of them
    async fn commit(self: Box<Self>) -> Result<CommitOutcome>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self, employee_id: EmployeeId) -> Result<Box<dyn LedgerTx>>;

    /// Ledger for an employee, creating a zeroed one if absent
    async fn get_or_create(&self, employee_id: EmployeeId) -> Result<EmployeeLedger> {
        let mut tx = self.begin(employee_id).await?;

        if let Some(ledger) = tx.ledger().await? {
            tx.rollback().await?;
            return Ok(ledger);
        }

        let ledger = EmployeeLedger::new(employee_id, Utc::now());
        tx.stage(LedgerWrite::PutLedger(ledger.clone()));
        let outcome = tx.commit().await?;
        info!("Created ledger for employee {}", employee_id);

        Ok(outcome.ledger.unwrap_or(ledger))
    }

    async fn find_ledger(&self, employee_id: EmployeeId) -> Result<Option<EmployeeLedger>>;

    async fn list_ledgers(&self) -> Result<Vec<EmployeeLedger>>;

    /// Newest first
    async fn point_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<PointTransaction>>;

    /// Newest first
    async fn coin_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<CoinTransaction>>;

    async fn unlocks(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeAchievement>>;

    async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>>;

    async fn list_rewards(&self) -> Result<Vec<Reward>>;

    async fn insert_reward(&self, reward: &Reward) -> Result<()>;

    /// Apply a partial update atomically and return the new row
    async fn update_reward(&self, reward_id: &str, update: &RewardUpdate) -> Result<Reward>;

    /// Returns false when no such reward existed
    async fn delete_reward(&self, reward_id: &str) -> Result<bool>;

    async fn redemptions(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeReward>>;

    async fn transition_redemption(
        &self,
        redemption_id: &str,
        next: RedemptionStatus,
        now: DateTime<Utc>,
    ) -> Result<EmployeeReward>;
}

/// Read access to the history kept by attendance, productivity and break
/// tracking. All lists come back newest first.
#[async_trait]
pub trait ActivityHistory: Send + Sync {
    /// PRESENT attendance rows dated `since` or later
    async fn present_days(
        &self,
        employee_id: EmployeeId,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>>;

    /// Snapshots dated `since` or later at or above `min_percentage`
    async fn productive_days(
        &self,
        employee_id: EmployeeId,
        since: NaiveDate,
        min_percentage: f64,
    ) -> Result<Vec<ProductivitySnapshot>>;

    /// Most recent ended break sessions
    async fn recent_breaks(&self, employee_id: EmployeeId, limit: usize) -> Result<Vec<BreakSession>>;

    async fn tags_submitted(&self, employee_id: EmployeeId) -> Result<i64>;
}

/// Everything the engine needs from the outside world
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn LedgerStore>,
    pub catalog: Arc<dyn AchievementRepository>,
    pub history: Arc<dyn ActivityHistory>,
}

/// Initialize storage based on configuration
pub async fn init_backends(config: &Config) -> anyhow::Result<Backends> {
    info!("Storage: {:?}", config.store);

    match config.store {
        StoreKind::Memory => {
            let catalog = match &config.achievements_file {
                Some(path) => MemoryCatalog::from_file(path)?,
                None => MemoryCatalog::builtin(),
            };

            Ok(Backends {
                store: Arc::new(MemoryStore::new()),
                catalog: Arc::new(catalog),
                history: Arc::new(MemoryHistory::new()),
            })
        }
        StoreKind::Firestore => {
            let http_client = reqwest::Client::builder()
                .user_agent("Kudos-Ledger/1.0")
                .build()?;

            let firebase = Arc::new(FirebaseClient::from_file(
                http_client,
                &config.firebase_key_path,
            )?);
            info!("Firebase client initialized");

            let store = Arc::new(FirestoreStore::new(firebase.clone()));

            Ok(Backends {
                store: store.clone(),
                catalog: Arc::new(FirestoreCatalog::new(firebase)),
                history: store,
            })
        }
    }
}

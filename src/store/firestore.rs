// Firestore-backed ledger store
//
// Layout:
//   ledgers/{employeeId}
//   ledgers/{employeeId}/point_transactions/{id}
//   ledgers/{employeeId}/coin_transactions/{id}
//   ledgers/{employeeId}/achievements/{achievementId}
//   rewards/{id}
//   redemptions/{id}
//   employees/{employeeId}                (tagsSubmitted)
//   employees/{employeeId}/attendance/{date}
//   employees/{employeeId}/productivity/{date}
//   employees/{employeeId}/breaks/{id}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ActivityHistory, CommitOutcome, LedgerStore, LedgerTx, LedgerWrite};
use crate::api::firebase::{FirebaseClient, FirestoreConflict, QueryFilter, TransactionWrite};
use crate::error::{LedgerError, Result};
use crate::models::achievement::{AchievementId, EmployeeAchievement};
use crate::models::activity::{AttendanceRecord, BreakSession, ProductivitySnapshot};
use crate::models::ledger::{CoinTransaction, EmployeeId, EmployeeLedger, PointTransaction};
use crate::models::reward::{EmployeeReward, RedemptionStatus, Reward, RewardUpdate};

fn ledger_path(employee_id: EmployeeId) -> String {
    format!("ledgers/{}", employee_id)
}

fn unlock_path(employee_id: EmployeeId, achievement_id: AchievementId) -> String {
    format!("ledgers/{}/achievements/{}", employee_id, achievement_id)
}

fn reward_path(reward_id: &str) -> String {
    format!("rewards/{}", reward_id)
}

fn redemption_path(redemption_id: &str) -> String {
    format!("redemptions/{}", redemption_id)
}

/// Map client failures onto the ledger taxonomy; contention stays retryable
fn storage_error(err: anyhow::Error) -> LedgerError {
    match err.downcast_ref::<FirestoreConflict>() {
        Some(conflict) => LedgerError::Conflict(conflict.to_string()),
        None => LedgerError::Storage(err),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Decode every document, skipping (and logging) rows that do not parse
fn decode_rows<T: DeserializeOwned>(collection: &str, rows: Vec<(String, Value)>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|(id, value)| match serde_json::from_value(value) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("Skipping malformed {} document {}: {}", collection, id, e);
                None
            }
        })
        .collect()
}

/// Ledger store on top of the Firestore REST API
pub struct FirestoreStore {
    firebase: Arc<FirebaseClient>,
}

impl FirestoreStore {
    pub fn new(firebase: Arc<FirebaseClient>) -> Self {
        Self { firebase }
    }

    async fn list_sub<T: DeserializeOwned>(
        &self,
        employee_id: EmployeeId,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<T>> {
        let rows = self
            .firebase
            .run_query(
                Some(&ledger_path(employee_id)),
                collection,
                Vec::new(),
                Some(("createdAt", "DESCENDING")),
                Some(limit),
                None,
            )
            .await
            .map_err(storage_error)?;

        Ok(decode_rows(collection, rows))
    }
}

pub struct FirestoreTx {
    firebase: Arc<FirebaseClient>,
    transaction: String,
    employee_id: EmployeeId,
    writes: Vec<LedgerWrite>,
}

/// Documents a commit depends on, read inside its transaction
#[derive(Debug, Default)]
struct TxReads {
    ledger: Option<EmployeeLedger>,
    /// Staged grants whose unlock document already exists
    unlocked: HashSet<AchievementId>,
    rewards: HashMap<String, Reward>,
}

fn point_tx_path(employee_id: EmployeeId, id: &str) -> String {
    format!("{}/point_transactions/{}", ledger_path(employee_id), id)
}

fn coin_tx_path(employee_id: EmployeeId, id: &str) -> String {
    format!("{}/coin_transactions/{}", ledger_path(employee_id), id)
}

/// Turn staged writes into Firestore writes against what the transaction
/// read. Grants for an existing unlock, or repeated within the batch, are
/// dropped whole.
fn plan_writes(
    employee_id: EmployeeId,
    writes: Vec<LedgerWrite>,
    reads: TxReads,
) -> Result<(Vec<TransactionWrite>, CommitOutcome)> {
    let mut ledger = reads.ledger;
    let mut ledger_dirty = false;
    let mut seen: HashSet<AchievementId> = HashSet::new();
    let mut planned = Vec::new();
    let mut granted = Vec::new();

    for write in writes {
        match write {
            LedgerWrite::PutLedger(next) => {
                ledger = Some(next);
                ledger_dirty = true;
            }
            LedgerWrite::AppendPoints(tx) => planned.push(TransactionWrite::Create {
                document_path: point_tx_path(employee_id, &tx.id),
                fields: encode(&tx)?,
            }),
            LedgerWrite::AppendCoins(tx) => planned.push(TransactionWrite::Create {
                document_path: coin_tx_path(employee_id, &tx.id),
                fields: encode(&tx)?,
            }),
            LedgerWrite::Unlock(grant) => {
                let achievement_id = grant.achievement_id();
                if reads.unlocked.contains(&achievement_id) || !seen.insert(achievement_id) {
                    debug!(
                        "Employee {} already unlocked achievement {}, skipping grant",
                        employee_id, achievement_id
                    );
                    continue;
                }

                let current = ledger
                    .as_mut()
                    .ok_or_else(|| LedgerError::not_found("ledger", employee_id))?;
                grant.apply(current);
                ledger_dirty = true;

                planned.push(TransactionWrite::Create {
                    document_path: unlock_path(employee_id, achievement_id),
                    fields: encode(&grant.unlock)?,
                });
                planned.push(TransactionWrite::Create {
                    document_path: point_tx_path(employee_id, &grant.points.id),
                    fields: encode(&grant.points)?,
                });
                if let Some(coins) = &grant.coins {
                    planned.push(TransactionWrite::Create {
                        document_path: coin_tx_path(employee_id, &coins.id),
                        fields: encode(coins)?,
                    });
                }
                granted.push(achievement_id);
            }
            LedgerWrite::ReserveStock { reward_id, expected } => {
                let reward = reads
                    .rewards
                    .get(&reward_id)
                    .ok_or_else(|| LedgerError::not_found("reward", &reward_id))?;

                if reward.stock != Some(expected) {
                    return Err(LedgerError::Conflict(format!(
                        "stock of reward {} changed during redemption",
                        reward_id
                    )));
                }

                planned.push(TransactionWrite::Update {
                    document_path: reward_path(&reward_id),
                    fields: serde_json::json!({ "stock": expected - 1 }),
                });
            }
            LedgerWrite::InsertRedemption(redemption) => planned.push(TransactionWrite::Create {
                document_path: redemption_path(&redemption.id),
                fields: encode(&redemption)?,
            }),
        }
    }

    if ledger_dirty {
        if let Some(current) = &ledger {
            planned.push(TransactionWrite::Update {
                document_path: ledger_path(employee_id),
                fields: encode(current)?,
            });
        }
    }

    Ok((planned, CommitOutcome { ledger, granted }))
}

impl FirestoreTx {
    async fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.firebase
            .get_document_in_transaction(&self.transaction, path)
            .await
            .map_err(storage_error)?
            .map(decode)
            .transpose()
    }

    /// Read what `plan_writes` needs for `writes`. The stored ledger is
    /// skipped when a staged replacement comes before any grant.
    async fn read_for(&self, writes: &[LedgerWrite]) -> Result<TxReads> {
        let employee_id = self.employee_id;
        let mut reads = TxReads::default();

        let first_ledger_write = writes
            .iter()
            .find(|w| matches!(w, LedgerWrite::PutLedger(_) | LedgerWrite::Unlock(_)));
        if !matches!(first_ledger_write, Some(LedgerWrite::PutLedger(_))) {
            reads.ledger = self.read(&ledger_path(employee_id)).await?;
        }

        for write in writes {
            match write {
                LedgerWrite::Unlock(grant) => {
                    let achievement_id = grant.achievement_id();
                    let existing: Option<Value> =
                        self.read(&unlock_path(employee_id, achievement_id)).await?;
                    if existing.is_some() {
                        reads.unlocked.insert(achievement_id);
                    }
                }
                LedgerWrite::ReserveStock { reward_id, .. } => {
                    if let Some(reward) = self.read::<Reward>(&reward_path(reward_id)).await? {
                        reads.rewards.insert(reward_id.clone(), reward);
                    }
                }
                _ => {}
            }
        }

        Ok(reads)
    }

    async fn plan(&self, writes: Vec<LedgerWrite>) -> Result<(Vec<TransactionWrite>, CommitOutcome)> {
        let reads = self.read_for(&writes).await?;
        plan_writes(self.employee_id, writes, reads)
    }
}

#[async_trait]
impl LedgerTx for FirestoreTx {
    fn employee_id(&self) -> EmployeeId {
        self.employee_id
    }

    async fn ledger(&mut self) -> Result<Option<EmployeeLedger>> {
        self.read(&ledger_path(self.employee_id)).await
    }

    async fn unlocked(&mut self) -> Result<HashSet<AchievementId>> {
        let rows = self
            .firebase
            .run_query(
                Some(&ledger_path(self.employee_id)),
                "achievements",
                Vec::new(),
                None,
                None,
                Some(&self.transaction),
            )
            .await
            .map_err(storage_error)?;

        Ok(rows.iter().filter_map(|(id, _)| id.parse().ok()).collect())
    }

    async fn reward(&mut self, reward_id: &str) -> Result<Option<Reward>> {
        self.read(&reward_path(reward_id)).await
    }

    fn stage(&mut self, write: LedgerWrite) {
        self.writes.push(write);
    }

    async fn commit(self: Box<Self>) -> Result<CommitOutcome> {
        let mut tx = *self;
        let writes = std::mem::take(&mut tx.writes);

        let (planned, outcome) = match tx.plan(writes).await {
            Ok(plan) => plan,
            Err(e) => {
                if let Err(rollback) = tx.firebase.rollback_transaction(&tx.transaction).await {
                    warn!("Failed to roll back transaction: {}", rollback);
                }
                return Err(e);
            }
        };

        tx.firebase
            .commit_transaction(Some(&tx.transaction), planned)
            .await
            .map_err(storage_error)?;

        Ok(outcome)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.firebase
            .rollback_transaction(&self.transaction)
            .await
            .map_err(storage_error)
    }
}

#[async_trait]
impl LedgerStore for FirestoreStore {
    async fn begin(&self, employee_id: EmployeeId) -> Result<Box<dyn LedgerTx>> {
        let transaction = self
            .firebase
            .begin_transaction()
            .await
            .map_err(storage_error)?;

        Ok(Box::new(FirestoreTx {
            firebase: self.firebase.clone(),
            transaction,
            employee_id,
            writes: Vec::new(),
        }))
    }

    async fn find_ledger(&self, employee_id: EmployeeId) -> Result<Option<EmployeeLedger>> {
        self.firebase
            .get_document(&ledger_path(employee_id))
            .await
            .map_err(storage_error)?
            .map(decode)
            .transpose()
    }

    async fn list_ledgers(&self) -> Result<Vec<EmployeeLedger>> {
        let rows = self
            .firebase
            .list_documents("ledgers")
            .await
            .map_err(storage_error)?;
        Ok(decode_rows("ledgers", rows))
    }

    async fn point_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<PointTransaction>> {
        self.list_sub(employee_id, "point_transactions", limit).await
    }

    async fn coin_transactions(
        &self,
        employee_id: EmployeeId,
        limit: usize,
    ) -> Result<Vec<CoinTransaction>> {
        self.list_sub(employee_id, "coin_transactions", limit).await
    }

    async fn unlocks(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeAchievement>> {
        let rows = self
            .firebase
            .list_documents(&format!("{}/achievements", ledger_path(employee_id)))
            .await
            .map_err(storage_error)?;

        let mut unlocks: Vec<EmployeeAchievement> = decode_rows("achievements", rows);
        unlocks.sort_by_key(|u| (u.unlocked_at, u.achievement_id));
        Ok(unlocks)
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>> {
        self.firebase
            .get_document(&reward_path(reward_id))
            .await
            .map_err(storage_error)?
            .map(decode)
            .transpose()
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>> {
        let rows = self
            .firebase
            .list_documents("rewards")
            .await
            .map_err(storage_error)?;

        let mut rewards: Vec<Reward> = decode_rows("rewards", rows);
        rewards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rewards)
    }

    async fn insert_reward(&self, reward: &Reward) -> Result<()> {
        self.firebase
            .commit_transaction(
                None,
                vec![TransactionWrite::Create {
                    document_path: reward_path(&reward.id),
                    fields: encode(reward)?,
                }],
            )
            .await
            .map_err(storage_error)
    }

    async fn update_reward(&self, reward_id: &str, update: &RewardUpdate) -> Result<Reward> {
        let transaction = self
            .firebase
            .begin_transaction()
            .await
            .map_err(storage_error)?;

        let result = async {
            let mut reward: Reward = self
                .firebase
                .get_document_in_transaction(&transaction, &reward_path(reward_id))
                .await
                .map_err(storage_error)?
                .map(decode)
                .transpose()?
                .ok_or_else(|| LedgerError::not_found("reward", reward_id))?;

            update.apply_to(&mut reward);
            reward.validate()?;
            Ok::<_, LedgerError>(reward)
        }
        .await;

        let reward = match result {
            Ok(reward) => reward,
            Err(e) => {
                if let Err(rollback) = self.firebase.rollback_transaction(&transaction).await {
                    warn!("Failed to roll back transaction: {}", rollback);
                }
                return Err(e);
            }
        };

        self.firebase
            .commit_transaction(
                Some(&transaction),
                vec![TransactionWrite::Update {
                    document_path: reward_path(reward_id),
                    fields: encode(&reward)?,
                }],
            )
            .await
            .map_err(storage_error)?;

        Ok(reward)
    }

    async fn delete_reward(&self, reward_id: &str) -> Result<bool> {
        let transaction = self
            .firebase
            .begin_transaction()
            .await
            .map_err(storage_error)?;

        let existing = self
            .firebase
            .get_document_in_transaction(&transaction, &reward_path(reward_id))
            .await
            .map_err(storage_error);

        if !matches!(existing, Ok(Some(_))) {
            if let Err(rollback) = self.firebase.rollback_transaction(&transaction).await {
                warn!("Failed to roll back transaction: {}", rollback);
            }
            return existing.map(|_| false);
        }

        self.firebase
            .commit_transaction(
                Some(&transaction),
                vec![TransactionWrite::Delete {
                    document_path: reward_path(reward_id),
                }],
            )
            .await
            .map_err(storage_error)?;
        Ok(true)
    }

    async fn redemptions(&self, employee_id: EmployeeId) -> Result<Vec<EmployeeReward>> {
        let rows = self
            .firebase
            .run_query(
                None,
                "redemptions",
                vec![QueryFilter::int_eq("employeeId", employee_id)],
                None,
                None,
                None,
            )
            .await
            .map_err(storage_error)?;

        let mut redemptions: Vec<EmployeeReward> = decode_rows("redemptions", rows);
        redemptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(redemptions)
    }

    async fn transition_redemption(
        &self,
        redemption_id: &str,
        next: RedemptionStatus,
        now: DateTime<Utc>,
    ) -> Result<EmployeeReward> {
        let transaction = self
            .firebase
            .begin_transaction()
            .await
            .map_err(storage_error)?;

        let result = async {
            let mut redemption: EmployeeReward = self
                .firebase
                .get_document_in_transaction(&transaction, &redemption_path(redemption_id))
                .await
                .map_err(storage_error)?
                .map(decode)
                .transpose()?
                .ok_or_else(|| LedgerError::not_found("redemption", redemption_id))?;

            redemption.transition(next, now)?;
            Ok::<_, LedgerError>(redemption)
        }
        .await;

        let redemption = match result {
            Ok(redemption) => redemption,
            Err(e) => {
                if let Err(rollback) = self.firebase.rollback_transaction(&transaction).await {
                    warn!("Failed to roll back transaction: {}", rollback);
                }
                return Err(e);
            }
        };

        self.firebase
            .commit_transaction(
                Some(&transaction),
                vec![TransactionWrite::Update {
                    document_path: redemption_path(redemption_id),
                    fields: serde_json::json!({
                        "status": redemption.status,
                        "updatedAt": redemption.updated_at,
                    }),
                }],
            )
            .await
            .map_err(storage_error)?;

        Ok(redemption)
    }
}

#[async_trait]
impl ActivityHistory for FirestoreStore {
    async fn present_days(
        &self,
        employee_id: EmployeeId,
        since: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let rows = self
            .firebase
            .run_query(
                Some(&format!("employees/{}", employee_id)),
                "attendance",
                vec![
                    QueryFilter::string_eq("status", "PRESENT"),
                    QueryFilter::string_gte("date", since.to_string()),
                ],
                Some(("date", "DESCENDING")),
                None,
                None,
            )
            .await
            .map_err(storage_error)?;

        Ok(decode_rows("attendance", rows))
    }

    async fn productive_days(
        &self,
        employee_id: EmployeeId,
        since: NaiveDate,
        min_percentage: f64,
    ) -> Result<Vec<ProductivitySnapshot>> {
        let rows = self
            .firebase
            .run_query(
                Some(&format!("employees/{}", employee_id)),
                "productivity",
                vec![QueryFilter::string_gte("date", since.to_string())],
                Some(("date", "DESCENDING")),
                None,
                None,
            )
            .await
            .map_err(storage_error)?;

        // Integer and double percentages are mixed in stored data, so the
        // threshold is applied here
        let snapshots: Vec<ProductivitySnapshot> = decode_rows("productivity", rows);
        Ok(snapshots
            .into_iter()
            .filter(|s| s.productivity_percentage >= min_percentage)
            .collect())
    }

    async fn recent_breaks(&self, employee_id: EmployeeId, limit: usize) -> Result<Vec<BreakSession>> {
        let rows = self
            .firebase
            .run_query(
                Some(&format!("employees/{}", employee_id)),
                "breaks",
                Vec::new(),
                Some(("endedAt", "DESCENDING")),
                Some(limit),
                None,
            )
            .await
            .map_err(storage_error)?;

        let sessions: Vec<BreakSession> = decode_rows("breaks", rows);
        Ok(sessions.into_iter().filter(|s| s.ended_at.is_some()).collect())
    }

    async fn tags_submitted(&self, employee_id: EmployeeId) -> Result<i64> {
        let employee = self
            .firebase
            .get_document(&format!("employees/{}", employee_id))
            .await
            .map_err(storage_error)?;

        Ok(employee
            .as_ref()
            .and_then(|doc| doc.get("tagsSubmitted"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::achievement;
    use crate::models::achievement::Criteria;
    use crate::models::ledger::PointKind;
    use crate::models::reward::RewardCost;
    use crate::store::UnlockGrant;

    fn ledger_with(points: i64) -> EmployeeLedger {
        let mut ledger = EmployeeLedger::new(1, Utc::now());
        ledger.apply_points(points, PointKind::Earned);
        ledger
    }

    fn paths(planned: &[TransactionWrite]) -> Vec<&str> {
        planned
            .iter()
            .map(|w| match w {
                TransactionWrite::Create { document_path, .. }
                | TransactionWrite::Update { document_path, .. }
                | TransactionWrite::Delete { document_path } => document_path.as_str(),
            })
            .collect()
    }

    fn first_100() -> UnlockGrant {
        let first = achievement(1, "First 100", 50, 5, Criteria::Points { threshold: 100 });
        UnlockGrant::new(1, &first, Utc::now())
    }

    #[test]
    fn test_paths() {
        assert_eq!(ledger_path(42), "ledgers/42");
        assert_eq!(unlock_path(42, 7), "ledgers/42/achievements/7");
        assert_eq!(reward_path("abc"), "rewards/abc");
        assert_eq!(redemption_path("xyz"), "redemptions/xyz");
    }

    #[test]
    fn test_contention_maps_to_conflict() {
        let err = storage_error(anyhow::Error::new(FirestoreConflict("commit returned 409".into())));
        assert!(err.is_retryable());

        let err = storage_error(anyhow::anyhow!("Firebase get error: 500"));
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn test_decode_rows_skips_malformed() {
        let rows = vec![
            (
                "1".to_string(),
                serde_json::json!({
                    "employeeId": 1,
                    "achievementId": 3,
                    "unlockedAt": "2026-03-01T00:00:00Z",
                    "progress": 100
                }),
            ),
            ("2".to_string(), serde_json::json!({ "employeeId": "oops" })),
        ];

        let unlocks: Vec<EmployeeAchievement> = decode_rows("achievements", rows);
        assert_eq!(unlocks.len(), 1);
        assert_eq!(unlocks[0].achievement_id, 3);
    }

    #[test]
    fn test_plan_skips_existing_and_repeated_grants() {
        let veteran = achievement(2, "Veteran", 20, 0, Criteria::Level { threshold: 2 });
        let writes = vec![
            LedgerWrite::PutLedger(ledger_with(150)),
            LedgerWrite::Unlock(first_100()),
            LedgerWrite::Unlock(first_100()),
            LedgerWrite::Unlock(UnlockGrant::new(1, &veteran, Utc::now())),
        ];
        let reads = TxReads {
            unlocked: HashSet::from([2]),
            ..TxReads::default()
        };

        let (planned, outcome) = plan_writes(1, writes, reads).unwrap();

        assert_eq!(outcome.granted, vec![1]);
        let ledger = outcome.ledger.unwrap();
        assert_eq!(ledger.points, 200);
        assert_eq!(ledger.coins, 5);

        let paths = paths(&planned);
        assert_eq!(paths.len(), 4);
        assert_eq!(paths[0], "ledgers/1/achievements/1");
        assert_eq!(paths[3], "ledgers/1");
        assert!(!paths.iter().any(|p| p.ends_with("achievements/2")));
    }

    #[test]
    fn test_plan_after_lost_unlock_race_keeps_award() {
        let award = PointTransaction::new(1, PointKind::Earned, 150, "task", Utc::now());
        let writes = vec![
            LedgerWrite::PutLedger(ledger_with(150)),
            LedgerWrite::AppendPoints(award.clone()),
            LedgerWrite::Unlock(first_100()),
        ];
        // The other writer's unlock is visible to the retry
        let reads = TxReads {
            unlocked: HashSet::from([1]),
            ..TxReads::default()
        };

        let (planned, outcome) = plan_writes(1, writes, reads).unwrap();

        assert!(outcome.granted.is_empty());
        assert_eq!(outcome.ledger.unwrap().points, 150);
        assert_eq!(
            paths(&planned),
            vec![point_tx_path(1, &award.id).as_str(), "ledgers/1"]
        );
    }

    #[test]
    fn test_plan_grant_needs_a_ledger() {
        let err = plan_writes(1, vec![LedgerWrite::Unlock(first_100())], TxReads::default())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { kind: "ledger", .. }));
    }

    #[test]
    fn test_plan_checks_reserved_stock() {
        let reward = Reward {
            id: "r1".to_string(),
            name: "Voucher".to_string(),
            description: String::new(),
            cost: RewardCost::Points(10),
            stock: Some(2),
            is_active: true,
            created_at: Utc::now(),
        };
        let reads = || TxReads {
            rewards: HashMap::from([("r1".to_string(), reward.clone())]),
            ..TxReads::default()
        };
        let reserve = |reward_id: &str, expected| LedgerWrite::ReserveStock {
            reward_id: reward_id.to_string(),
            expected,
        };

        let (planned, outcome) = plan_writes(1, vec![reserve("r1", 2)], reads()).unwrap();
        assert_eq!(paths(&planned), vec!["rewards/r1"]);
        assert!(matches!(
            &planned[0],
            TransactionWrite::Update { fields, .. } if fields["stock"] == 1
        ));
        assert_eq!(outcome.ledger, None);

        let err = plan_writes(1, vec![reserve("r1", 3)], reads()).unwrap_err();
        assert!(err.is_retryable());

        let err = plan_writes(1, vec![reserve("gone", 1)], reads()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { kind: "reward", .. }));
    }
}

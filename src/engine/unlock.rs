// Achievement unlock resolution

use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::{abort, retrying, Engine};
use crate::error::Result;
use crate::models::achievement::{Achievement, Criteria};
use crate::models::activity::AttendanceStatus;
use crate::models::ledger::{EmployeeId, EmployeeLedger};
use crate::store::LedgerTx;
use crate::utils::streak::{compliant_breaks, current_streak};

/// Longest history window a streak criterion may scan, in days
const MAX_LOOKBACK_DAYS: i64 = 3650;

/// History scanned for a streak of `threshold` days
fn lookback(threshold: i64) -> Duration {
    Duration::days(threshold.saturating_mul(2).clamp(1, MAX_LOOKBACK_DAYS))
}

impl Engine {
    /// Current value of the quantity a criterion measures.
    /// `None` for criteria the engine does not understand.
    pub(crate) async fn measure(
        &self,
        ledger: &EmployeeLedger,
        criteria: &Criteria,
    ) -> Result<Option<i64>> {
        let employee_id = ledger.employee_id;
        let today = self.today();

        let value = match criteria {
            Criteria::Points { .. } => ledger.points,
            Criteria::Level { .. } => ledger.level(),
            Criteria::TagsSubmitted { .. } => self.history.tags_submitted(employee_id).await?,
            Criteria::AttendanceStreak { threshold } => {
                let since = today - lookback(*threshold);
                let records = self.history.present_days(employee_id, since).await?;

                current_streak(
                    &records,
                    |r| r.date,
                    |r| r.status == AttendanceStatus::Present,
                    today,
                ) as i64
            }
            Criteria::ProductivityStreak {
                threshold,
                min_productivity,
            } => {
                let since = today - lookback(*threshold);
                let snapshots = self
                    .history
                    .productive_days(employee_id, since, *min_productivity)
                    .await?;

                current_streak(
                    &snapshots,
                    |s| s.date,
                    |s| s.productivity_percentage >= *min_productivity,
                    today,
                ) as i64
            }
            Criteria::BreaksCompliant { threshold } => {
                let window = (*threshold).max(0) as usize;
                let sessions = self.history.recent_breaks(employee_id, window).await?;
                compliant_breaks(&sessions, window) as i64
            }
            Criteria::Unknown => return Ok(None),
        };

        Ok(Some(value))
    }

    /// Whether `ledger` meets `criteria`. Unknown criteria and non-positive
    /// thresholds never do.
    pub(crate) async fn is_satisfied(
        &self,
        ledger: &EmployeeLedger,
        criteria: &Criteria,
    ) -> Result<bool> {
        let Some(threshold) = criteria.threshold().filter(|t| *t > 0) else {
            return Ok(false);
        };

        Ok(self
            .measure(ledger, criteria)
            .await?
            .is_some_and(|current| current >= threshold))
    }

    /// Active achievements not yet unlocked whose criteria `ledger` meets.
    ///
    /// Never fails: a catalog or evaluation error only drops the affected
    /// candidates, so awards go through regardless.
    pub(crate) async fn plan_unlocks(
        &self,
        tx: &mut dyn LedgerTx,
        ledger: &EmployeeLedger,
    ) -> Vec<Achievement> {
        let employee_id = ledger.employee_id;

        let catalog = match self.catalog.list_active().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Skipping unlock pass for employee {}: {}", employee_id, e);
                return Vec::new();
            }
        };

        // The store skips duplicates on commit, so a failed read only costs
        // some wasted evaluation
        let unlocked = tx.unlocked().await.unwrap_or_else(|e| {
            warn!("Failed to read unlocks for employee {}: {}", employee_id, e);
            Default::default()
        });

        let mut candidates = Vec::new();

        for achievement in catalog {
            if unlocked.contains(&achievement.id) {
                continue;
            }

            if achievement.criteria == Criteria::Unknown {
                warn!(
                    "Achievement {} has unrecognized criteria, never unlocking",
                    achievement.id
                );
                continue;
            }

            match self.is_satisfied(ledger, &achievement.criteria).await {
                Ok(true) => candidates.push(achievement),
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to evaluate achievement {} for employee {}: {}",
                    achievement.id, employee_id, e
                ),
            }
        }

        candidates
    }

    /// Standalone unlock pass, e.g. after attendance or break history
    /// changed. Safe to repeat: already unlocked achievements are skipped.
    pub async fn resolve_unlocks(&self, employee_id: EmployeeId) -> Result<Vec<Achievement>> {
        retrying(employee_id, || self.try_resolve_unlocks(employee_id)).await
    }

    async fn try_resolve_unlocks(&self, employee_id: EmployeeId) -> Result<Vec<Achievement>> {
        let now = Utc::now();
        let mut tx = self.store.begin(employee_id).await?;

        let ledger = match tx.ledger().await {
            Ok(found) => found.unwrap_or_else(|| EmployeeLedger::new(employee_id, now)),
            Err(e) => return abort(tx, e).await,
        };

        let (_, unlocked) = self
            .commit_with_unlocks(tx, ledger, Vec::new(), now)
            .await?;

        if !unlocked.is_empty() {
            info!(
                "Resolved {} new achievements for employee {}",
                unlocked.len(),
                employee_id
            );
        }

        Ok(unlocked)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::engine::testing::{achievement, assert_consistent, harness};
    use crate::error::LedgerError;
    use crate::engine::PointAward;
    use crate::models::activity::{AttendanceRecord, BreakSession, ProductivitySnapshot};
    use crate::models::ledger::PointKind;
    use crate::store::LedgerStore;

    fn first_100() -> Achievement {
        achievement(1, "First 100", 50, 5, Criteria::Points { threshold: 100 })
    }

    #[tokio::test]
    async fn test_unlock_once_on_crossing() {
        let h = harness(vec![first_100()]);

        let outcome = h
            .engine
            .award_points(PointAward::new(1, 60, PointKind::Earned, "task"))
            .await
            .unwrap();
        assert!(outcome.unlocked.is_empty());

        let outcome = h
            .engine
            .award_points(PointAward::new(1, 60, PointKind::Earned, "task"))
            .await
            .unwrap();
        assert_eq!(outcome.unlocked.len(), 1);
        // 120 awarded + 50 reward points; reward does not add experience
        assert_eq!(outcome.ledger.points, 170);
        assert_eq!(outcome.ledger.experience(), 120);
        assert_eq!(outcome.ledger.coins, 12 + 5);

        let outcome = h
            .engine
            .award_points(PointAward::new(1, 10, PointKind::Earned, "other"))
            .await
            .unwrap();
        assert!(outcome.unlocked.is_empty());
        assert_eq!(h.store.unlocks(1).await.unwrap().len(), 1);

        let rewards: Vec<_> = h
            .engine
            .list_transactions(1, 10)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.reference.as_deref() == Some("achievement:1"))
            .collect();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].kind, PointKind::Bonus);
        assert_consistent(&h.store, 1).await;
    }

    #[tokio::test]
    async fn test_rewards_do_not_cascade() {
        // The reward from the first would satisfy the second
        let h = harness(vec![
            achievement(1, "Fifty", 100, 10, Criteria::Points { threshold: 50 }),
            achievement(2, "One fifty", 0, 3, Criteria::Points { threshold: 150 }),
        ]);

        let outcome = h
            .engine
            .award_points(PointAward::new(1, 60, PointKind::Earned, "task"))
            .await
            .unwrap();

        let ids: Vec<i64> = outcome.unlocked.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(outcome.ledger.points, 160);
        assert_eq!(outcome.ledger.coins, 6 + 10);
        assert_consistent(&h.store, 1).await;

        // A later pass picks it up
        let resolved = h.engine.resolve_unlocks(1).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, 2);
        assert_eq!(h.engine.get_ledger(1).await.unwrap().coins, 6 + 10 + 3);
        assert_consistent(&h.store, 1).await;
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let h = harness(vec![achievement(
            7,
            "Perfect Week",
            30,
            0,
            Criteria::AttendanceStreak { threshold: 5 },
        )]);
        let today = h.engine.today();

        for offset in 0..5 {
            h.history.record_attendance(AttendanceRecord {
                employee_id: 2,
                date: today - Duration::days(offset),
                status: AttendanceStatus::Present,
            });
        }

        assert_eq!(h.engine.resolve_unlocks(2).await.unwrap().len(), 1);
        assert!(h.engine.resolve_unlocks(2).await.unwrap().is_empty());

        let ledger = h.engine.get_ledger(2).await.unwrap();
        assert_eq!(ledger.points, 30);
        assert_eq!(ledger.lifetime_points, 30);
    }

    #[tokio::test]
    async fn test_attendance_gap_caps_streak() {
        let h = harness(Vec::new());
        let today = h.engine.today();

        let mut offsets: Vec<i64> = (0..5).collect();
        // Two-day gap, then more present days
        offsets.extend([7, 8, 9]);
        for offset in offsets {
            h.history.record_attendance(AttendanceRecord {
                employee_id: 1,
                date: today - Duration::days(offset),
                status: AttendanceStatus::Present,
            });
        }

        let ledger = h.engine.get_ledger(1).await.unwrap();
        let streak = h
            .engine
            .measure(&ledger, &Criteria::AttendanceStreak { threshold: 5 })
            .await
            .unwrap();
        assert_eq!(streak, Some(5));

        assert!(
            !h.engine
                .is_satisfied(&ledger, &Criteria::AttendanceStreak { threshold: 6 })
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_productivity_streak_threshold() {
        let h = harness(Vec::new());
        let today = h.engine.today();

        for (offset, pct) in [(0, 85.0), (1, 90.0), (2, 70.0), (3, 95.0)] {
            h.history.record_productivity(ProductivitySnapshot {
                employee_id: 1,
                date: today - Duration::days(offset),
                productivity_percentage: pct,
            });
        }

        let ledger = h.engine.get_ledger(1).await.unwrap();
        let criteria = Criteria::ProductivityStreak {
            threshold: 3,
            min_productivity: 80.0,
        };
        // Day 2 misses the bar and ends the run
        assert_eq!(h.engine.measure(&ledger, &criteria).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_breaks_compliant_counts_recent_window() {
        let h = harness(Vec::new());
        let start = Utc::now() - Duration::days(10);

        for (i, minutes) in [20, 5, 30, 90, 45].into_iter().enumerate() {
            let started_at = start + Duration::days(i as i64);
            h.history.record_break(BreakSession {
                employee_id: 1,
                started_at,
                ended_at: Some(started_at + Duration::minutes(minutes)),
            });
        }

        let ledger = h.engine.get_ledger(1).await.unwrap();
        let measured = h
            .engine
            .measure(&ledger, &Criteria::BreaksCompliant { threshold: 3 })
            .await
            .unwrap();
        // Most recent three are 30, 90, 45 minutes
        assert_eq!(measured, Some(2));
    }

    #[tokio::test]
    async fn test_unknown_and_zero_threshold_never_unlock() {
        let mut unknown = first_100();
        unknown.id = 2;
        unknown.criteria = Criteria::Unknown;

        let h = harness(vec![
            unknown,
            achievement(3, "Free", 10, 0, Criteria::Points { threshold: 0 }),
        ]);

        let outcome = h
            .engine
            .award_points(PointAward::new(1, 500, PointKind::Earned, "task"))
            .await
            .unwrap();
        assert!(outcome.unlocked.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_achievements_are_ignored() {
        let mut retired = first_100();
        retired.is_active = false;
        let h = harness(vec![retired]);

        let outcome = h
            .engine
            .award_points(PointAward::new(1, 200, PointKind::Earned, "task"))
            .await
            .unwrap();
        assert!(outcome.unlocked.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_awards_unlock_once() {
        let h = harness(vec![first_100()]);
        let award = || PointAward::new(1, 150, PointKind::Earned, "task");

        let (a, b) = tokio::join!(
            h.engine.award_points(award()),
            h.engine.award_points(award())
        );
        let unlocked = a.unwrap().unlocked.len() + b.unwrap().unlocked.len();

        assert_eq!(unlocked, 1);
        assert_eq!(h.store.unlocks(1).await.unwrap().len(), 1);
        let ledger = h.engine.get_ledger(1).await.unwrap();
        assert_eq!(ledger.points, 350);
        // 15 bonus coins per award plus one reward of 5
        assert_eq!(ledger.coins, 35);
        assert_consistent(&h.store, 1).await;
    }

    #[tokio::test]
    async fn test_award_survives_lost_unlock_race() {
        let h = harness(vec![first_100()]);
        let engine = &h.engine;
        let award = || PointAward::new(1, 150, PointKind::Earned, "task");
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        // The first attempt loses to a writer that unlocks the same achievement
        let outcome = retrying(1, || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                engine.award_points(award()).await.unwrap();
                return Err(LedgerError::Conflict("commit returned 409".into()));
            }
            engine.award_points(award()).await
        })
        .await
        .unwrap();

        assert!(outcome.unlocked.is_empty());
        assert_eq!(outcome.ledger.points, 350);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(h.store.unlocks(1).await.unwrap().len(), 1);
        assert_consistent(&h.store, 1).await;
    }
}

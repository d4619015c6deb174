// Achievement progress for display

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::Engine;
use crate::error::Result;
use crate::models::achievement::{Achievement, EmployeeAchievement};
use crate::models::ledger::{EmployeeId, EmployeeLedger};

/// An achievement with the employee's standing toward it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub achievement: Achievement,
    pub unlocked_at: Option<DateTime<Utc>>,
    /// 0..=100
    pub progress: u8,
}

/// Percentage of `threshold` reached, capped at 100
fn percent(current: i64, threshold: i64) -> u8 {
    if threshold <= 0 || current <= 0 {
        return 0;
    }
    let pct = (current as i128 * 100 / threshold as i128).min(100);
    pct as u8
}

impl Engine {
    async fn ledger_or_zero(&self, employee_id: EmployeeId) -> Result<EmployeeLedger> {
        Ok(self
            .store
            .find_ledger(employee_id)
            .await?
            .unwrap_or_else(|| EmployeeLedger::new(employee_id, Utc::now())))
    }

    /// Progress of a locked achievement; reading never creates a ledger
    async fn locked_progress(&self, ledger: &EmployeeLedger, achievement: &Achievement) -> u8 {
        let Some(threshold) = achievement.criteria.threshold() else {
            return 0;
        };

        match self.measure(ledger, &achievement.criteria).await {
            Ok(Some(current)) => percent(current, threshold),
            Ok(None) => 0,
            Err(e) => {
                warn!(
                    "Failed to measure achievement {} for employee {}: {}",
                    achievement.id, ledger.employee_id, e
                );
                0
            }
        }
    }

    /// 0..=100; 100 once unlocked
    pub async fn progress_of(
        &self,
        employee_id: EmployeeId,
        achievement: &Achievement,
    ) -> Result<u8> {
        let unlocks = self.store.unlocks(employee_id).await?;
        if unlocks.iter().any(|u| u.achievement_id == achievement.id) {
            return Ok(100);
        }

        let ledger = self.ledger_or_zero(employee_id).await?;
        Ok(self.locked_progress(&ledger, achievement).await)
    }

    /// Active achievements plus any unlocked ones that were retired since
    pub async fn list_achievements_with_progress(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<AchievementProgress>> {
        let mut achievements = self.catalog.list_active().await?;
        let unlocks: Vec<EmployeeAchievement> = self.store.unlocks(employee_id).await?;

        for unlock in &unlocks {
            if achievements.iter().any(|a| a.id == unlock.achievement_id) {
                continue;
            }
            if let Some(retired) = self.catalog.get(unlock.achievement_id).await? {
                achievements.push(retired);
            }
        }
        achievements.sort_by_key(|a| a.id);

        let ledger = self.ledger_or_zero(employee_id).await?;
        let mut listed = Vec::with_capacity(achievements.len());

        for achievement in achievements {
            let unlocked_at = unlocks
                .iter()
                .find(|u| u.achievement_id == achievement.id)
                .map(|u| u.unlocked_at);

            let progress = match unlocked_at {
                Some(_) => 100,
                None => self.locked_progress(&ledger, &achievement).await,
            };

            listed.push(AchievementProgress {
                achievement,
                unlocked_at,
                progress,
            });
        }

        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::engine::testing::{achievement, harness};
    use crate::engine::{AchievementRepository, PointAward};
    use crate::models::achievement::Criteria;
    use crate::models::activity::{
        AttendanceRecord, AttendanceStatus, BreakSession, ProductivitySnapshot,
    };
    use crate::models::ledger::PointKind;
    use crate::store::LedgerStore;

    #[test]
    fn test_percent() {
        assert_eq!(percent(50, 100), 50);
        assert_eq!(percent(250, 100), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(0, 100), 0);
        assert_eq!(percent(-5, 100), 0);
        assert_eq!(percent(10, 0), 0);
        assert_eq!(percent(i64::MAX, 1), 100);
    }

    #[tokio::test]
    async fn test_progress_tracks_points() {
        let target = achievement(1, "Thousand", 0, 0, Criteria::Points { threshold: 1000 });
        let h = harness(vec![target.clone()]);

        assert_eq!(h.engine.progress_of(1, &target).await.unwrap(), 0);
        // Reading progress does not create a ledger
        assert_eq!(h.store.find_ledger(1).await.unwrap(), None);

        h.engine
            .award_points(PointAward::new(1, 250, PointKind::Earned, "task"))
            .await
            .unwrap();
        assert_eq!(h.engine.progress_of(1, &target).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_unlocked_reads_full_even_after_spending() {
        let target = achievement(1, "First 100", 0, 0, Criteria::Points { threshold: 100 });
        let h = harness(vec![target.clone()]);

        h.engine
            .award_points(PointAward::new(1, 100, PointKind::Earned, "task"))
            .await
            .unwrap();
        h.engine
            .award_points(PointAward::new(1, -100, PointKind::Spent, "shop"))
            .await
            .unwrap();

        assert_eq!(h.engine.progress_of(1, &target).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_list_includes_retired_unlocks() {
        let h = harness(vec![
            achievement(1, "First 100", 0, 0, Criteria::Points { threshold: 100 }),
            achievement(2, "Veteran", 0, 0, Criteria::Level { threshold: 10 }),
            achievement(3, "Mystery", 0, 0, Criteria::Unknown),
        ]);

        h.engine
            .award_points(PointAward::new(1, 150, PointKind::Earned, "task"))
            .await
            .unwrap();

        let mut first = h.catalog.get(1).await.unwrap().unwrap();
        first.is_active = false;
        h.catalog.upsert(first);

        let listed = h.engine.list_achievements_with_progress(1).await.unwrap();
        let summary: Vec<(i64, u8, bool)> = listed
            .iter()
            .map(|p| (p.achievement.id, p.progress, p.unlocked_at.is_some()))
            .collect();

        // Level 2 of 10
        assert_eq!(summary, vec![(1, 100, true), (2, 20, false), (3, 0, false)]);
    }

    #[tokio::test]
    async fn test_attendance_streak_progress() {
        let target = achievement(
            7,
            "Perfect Week",
            0,
            0,
            Criteria::AttendanceStreak { threshold: 5 },
        );
        let h = harness(vec![target.clone()]);

        assert_eq!(h.engine.progress_of(1, &target).await.unwrap(), 0);

        let today = h.engine.today();
        for offset in 0..3 {
            h.history.record_attendance(AttendanceRecord {
                employee_id: 1,
                date: today - Duration::days(offset),
                status: AttendanceStatus::Present,
            });
        }
        // Absent before the run does not count
        h.history.record_attendance(AttendanceRecord {
            employee_id: 1,
            date: today - Duration::days(3),
            status: AttendanceStatus::Absent,
        });

        assert_eq!(h.engine.progress_of(1, &target).await.unwrap(), 60);
        assert_eq!(h.engine.progress_of(2, &target).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_productivity_and_break_progress() {
        let productive = achievement(
            8,
            "Focused",
            0,
            0,
            Criteria::ProductivityStreak {
                threshold: 4,
                min_productivity: 80.0,
            },
        );
        let rested = achievement(9, "Rested", 0, 0, Criteria::BreaksCompliant { threshold: 4 });
        let h = harness(vec![productive.clone(), rested.clone()]);

        assert_eq!(h.engine.progress_of(1, &productive).await.unwrap(), 0);
        assert_eq!(h.engine.progress_of(1, &rested).await.unwrap(), 0);

        let today = h.engine.today();
        for offset in 0..2 {
            h.history.record_productivity(ProductivitySnapshot {
                employee_id: 1,
                date: today - Duration::days(offset),
                productivity_percentage: 92.5,
            });
        }

        let start = Utc::now() - Duration::days(5);
        for (i, minutes) in [20, 30, 45].into_iter().enumerate() {
            let started_at = start + Duration::days(i as i64);
            h.history.record_break(BreakSession {
                employee_id: 1,
                started_at,
                ended_at: Some(started_at + Duration::minutes(minutes)),
            });
        }

        assert_eq!(h.engine.progress_of(1, &productive).await.unwrap(), 50);
        assert_eq!(h.engine.progress_of(1, &rested).await.unwrap(), 75);
    }
}

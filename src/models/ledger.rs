// Employee ledger and its transaction logs
// Matches the `ledgers` collection and its transaction subcollections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;
use crate::utils::ids::new_id;
use crate::utils::progression::{level_of, rank_of, Rank};

pub type EmployeeId = i64;

/// Reason for a point movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Earned,
    Spent,
    Bonus,
    Penalty,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::Earned => "earned",
            PointKind::Spent => "spent",
            PointKind::Bonus => "bonus",
            PointKind::Penalty => "penalty",
        }
    }

    /// Whether awards of this kind grow lifetime points
    pub fn counts_toward_lifetime(&self) -> bool {
        matches!(self, PointKind::Earned | PointKind::Bonus)
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earned" => Ok(PointKind::Earned),
            "spent" => Ok(PointKind::Spent),
            "bonus" => Ok(PointKind::Bonus),
            "penalty" => Ok(PointKind::Penalty),
            _ => Err(LedgerError::validation(format!("unknown point type: {}", s))),
        }
    }
}

/// Reason for a coin movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinKind {
    Earned,
    Spent,
    Converted,
    Bonus,
    Achievement,
}

impl CoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinKind::Earned => "earned",
            CoinKind::Spent => "spent",
            CoinKind::Converted => "converted",
            CoinKind::Bonus => "bonus",
            CoinKind::Achievement => "achievement",
        }
    }

    /// Whether awards of this kind grow lifetime coins.
    /// Conversions move coins out of the economy and never count.
    pub fn counts_toward_lifetime(&self) -> bool {
        matches!(self, CoinKind::Earned | CoinKind::Bonus | CoinKind::Achievement)
    }
}

impl fmt::Display for CoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoinKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earned" => Ok(CoinKind::Earned),
            "spent" => Ok(CoinKind::Spent),
            "converted" => Ok(CoinKind::Converted),
            "bonus" => Ok(CoinKind::Bonus),
            "achievement" => Ok(CoinKind::Achievement),
            _ => Err(LedgerError::validation(format!("unknown coin type: {}", s))),
        }
    }
}

/// Per-employee balances and progression.
///
/// `experience`, `level` and `rank` are only reachable through methods so
/// level and rank can never drift from experience. Deserializing recomputes
/// both from the stored experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "LedgerRecord")]
pub struct EmployeeLedger {
    pub employee_id: EmployeeId,
    pub points: i64,
    pub coins: i64,
    experience: i64,
    level: i64,
    rank: Rank,
    pub lifetime_points: i64,
    pub lifetime_coins: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored shape of a ledger; level and rank are ignored on read
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerRecord {
    employee_id: EmployeeId,
    #[serde(default)]
    points: i64,
    #[serde(default)]
    coins: i64,
    #[serde(default)]
    experience: i64,
    #[serde(default)]
    lifetime_points: i64,
    #[serde(default)]
    lifetime_coins: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LedgerRecord> for EmployeeLedger {
    fn from(record: LedgerRecord) -> Self {
        let mut ledger = Self {
            employee_id: record.employee_id,
            points: record.points.max(0),
            coins: record.coins.max(0),
            experience: record.experience.max(0),
            level: 1,
            rank: Rank::Beginner,
            lifetime_points: record.lifetime_points,
            lifetime_coins: record.lifetime_coins,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        ledger.refresh_progression();
        ledger
    }
}

impl EmployeeLedger {
    /// Zeroed ledger at level 1
    pub fn new(employee_id: EmployeeId, now: DateTime<Utc>) -> Self {
        Self {
            employee_id,
            points: 0,
            coins: 0,
            experience: 0,
            level: 1,
            rank: Rank::Beginner,
            lifetime_points: 0,
            lifetime_coins: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn experience(&self) -> i64 {
        self.experience
    }

    pub fn level(&self) -> i64 {
        self.level
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    fn refresh_progression(&mut self) {
        self.level = level_of(self.experience);
        self.rank = rank_of(self.level);
    }

    fn add_experience(&mut self, amount: i64) {
        self.experience = self.experience.saturating_add(amount.saturating_abs());
        self.refresh_progression();
    }

    /// Apply a point delta. The balance is clamped at zero while experience
    /// grows by the full magnitude. Returns the delta actually applied to
    /// the balance.
    pub fn apply_points(&mut self, delta: i64, kind: PointKind) -> i64 {
        let before = self.points;
        self.points = self.points.saturating_add(delta).max(0);
        self.add_experience(delta);

        if kind.counts_toward_lifetime() {
            self.lifetime_points = self.lifetime_points.saturating_add(delta.saturating_abs());
        }

        self.points - before
    }

    /// Apply a coin delta, clamped at zero. Experience is untouched.
    /// Returns the delta actually applied to the balance.
    pub fn apply_coins(&mut self, delta: i64, kind: CoinKind) -> i64 {
        let before = self.coins;
        self.coins = self.coins.saturating_add(delta).max(0);

        if kind.counts_toward_lifetime() {
            self.lifetime_coins = self.lifetime_coins.saturating_add(delta.saturating_abs());
        }

        self.coins - before
    }

    /// Pay out an achievement reward: balances and lifetime totals grow,
    /// experience does not.
    pub fn credit_reward(&mut self, points: i64, coins: i64) {
        let points = points.max(0);
        let coins = coins.max(0);

        self.points = self.points.saturating_add(points);
        self.lifetime_points = self.lifetime_points.saturating_add(points);
        self.coins = self.coins.saturating_add(coins);
        self.lifetime_coins = self.lifetime_coins.saturating_add(coins);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Append-only point log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    pub id: String,
    pub employee_id: EmployeeId,
    /// Delta applied to the balance (after clamping)
    pub amount: i64,
    /// Delta the caller asked for
    pub requested: i64,
    #[serde(rename = "type")]
    pub kind: PointKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PointTransaction {
    /// New entry whose applied amount equals the requested one
    pub fn new(
        employee_id: EmployeeId,
        kind: PointKind,
        amount: i64,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            employee_id,
            amount,
            requested: amount,
            kind,
            description: description.into(),
            reference: None,
            created_at: now,
        }
    }

    pub fn applied(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }
}

/// Append-only coin log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinTransaction {
    pub id: String,
    pub employee_id: EmployeeId,
    /// Delta applied to the balance (after clamping)
    pub amount: i64,
    /// Delta the caller asked for
    pub requested: i64,
    #[serde(rename = "type")]
    pub kind: CoinKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CoinTransaction {
    /// New entry whose applied amount equals the requested one
    pub fn new(
        employee_id: EmployeeId,
        kind: CoinKind,
        amount: i64,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            employee_id,
            amount,
            requested: amount,
            kind,
            description: description.into(),
            reference: None,
            created_at: now,
        }
    }

    pub fn applied(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }
}

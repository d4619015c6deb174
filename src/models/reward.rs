// Reward catalog and redemption records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ledger::EmployeeId;
use crate::error::{Currency, LedgerError, Result};

pub type RewardId = String;

/// Price of a reward, in exactly one currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "currency", content = "amount", rename_all = "snake_case")]
pub enum RewardCost {
    Points(i64),
    Coins(i64),
}

impl RewardCost {
    pub fn amount(&self) -> i64 {
        match self {
            RewardCost::Points(n) | RewardCost::Coins(n) => *n,
        }
    }

    pub fn currency(&self) -> Currency {
        match self {
            RewardCost::Points(_) => Currency::Points,
            RewardCost::Coins(_) => Currency::Coins,
        }
    }
}

impl fmt::Display for RewardCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount(), self.currency())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cost: RewardCost,
    /// None means unlimited
    #[serde(default)]
    pub stock: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("reward name is required"));
        }
        if self.cost.amount() <= 0 {
            return Err(LedgerError::validation("reward cost must be positive"));
        }
        if matches!(self.stock, Some(n) if n < 0) {
            return Err(LedgerError::validation("reward stock cannot be negative"));
        }
        Ok(())
    }

    pub fn in_stock(&self) -> bool {
        self.stock.map_or(true, |n| n > 0)
    }
}

/// Fields for a new catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewReward {
    pub name: String,
    pub description: String,
    pub cost: RewardCost,
    pub stock: Option<i64>,
}

/// Partial update; `None` leaves a field as it is.
/// `stock: Some(None)` switches a reward to unlimited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cost: Option<RewardCost>,
    pub stock: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

impl RewardUpdate {
    pub fn apply_to(&self, reward: &mut Reward) {
        if let Some(name) = &self.name {
            reward.name = name.clone();
        }
        if let Some(description) = &self.description {
            reward.description = description.clone();
        }
        if let Some(cost) = self.cost {
            reward.cost = cost;
        }
        if let Some(stock) = self.stock {
            reward.stock = stock;
        }
        if let Some(active) = self.is_active {
            reward.is_active = active;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Rejected,
    Used,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Approved => "approved",
            RedemptionStatus::Rejected => "rejected",
            RedemptionStatus::Used => "used",
        }
    }

    /// pending -> approved | rejected, approved -> used
    pub fn can_transition_to(&self, next: RedemptionStatus) -> bool {
        matches!(
            (self, next),
            (RedemptionStatus::Pending, RedemptionStatus::Approved)
                | (RedemptionStatus::Pending, RedemptionStatus::Rejected)
                | (RedemptionStatus::Approved, RedemptionStatus::Used)
        )
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedemptionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RedemptionStatus::Pending),
            "approved" => Ok(RedemptionStatus::Approved),
            "rejected" => Ok(RedemptionStatus::Rejected),
            "used" => Ok(RedemptionStatus::Used),
            _ => Err(LedgerError::validation(format!("unknown redemption status: {}", s))),
        }
    }
}

/// A redemption awaiting or past fulfilment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeReward {
    pub id: String,
    pub employee_id: EmployeeId,
    pub reward_id: RewardId,
    pub reward_name: String,
    pub cost: RewardCost,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmployeeReward {
    /// Move to `next`, rejecting transitions the workflow does not allow
    pub fn transition(&mut self, next: RedemptionStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::validation(format!(
                "cannot move redemption {} from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reward() -> Reward {
        Reward {
            id: "r1".into(),
            name: "Lunch voucher".into(),
            description: String::new(),
            cost: RewardCost::Points(100),
            stock: Some(1),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cost_shape() {
        let value = serde_json::to_value(RewardCost::Coins(25)).unwrap();
        assert_eq!(value, json!({"currency": "coins", "amount": 25}));
        assert_eq!(RewardCost::Coins(25).to_string(), "25 coins");
    }

    #[test]
    fn test_validate() {
        assert!(reward().validate().is_ok());

        let mut r = reward();
        r.cost = RewardCost::Coins(0);
        assert!(r.validate().is_err());

        let mut r = reward();
        r.name = "  ".into();
        assert!(r.validate().is_err());

        let mut r = reward();
        r.stock = Some(-1);
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_in_stock() {
        let mut r = reward();
        assert!(r.in_stock());
        r.stock = Some(0);
        assert!(!r.in_stock());
        r.stock = None;
        assert!(r.in_stock());
    }

    #[test]
    fn test_update_to_unlimited() {
        let mut r = reward();
        RewardUpdate {
            stock: Some(None),
            is_active: Some(false),
            ..Default::default()
        }
        .apply_to(&mut r);

        assert_eq!(r.stock, None);
        assert!(!r.is_active);
        assert_eq!(r.name, "Lunch voucher");
    }

    #[test]
    fn test_status_transitions() {
        use RedemptionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Used));
        assert!(!Pending.can_transition_to(Used));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Used.can_transition_to(Pending));
    }
}

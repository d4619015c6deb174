// Achievement catalog entries and unlock records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use super::ledger::EmployeeId;

pub type AchievementId = i64;

/// What an employee has to reach to unlock an achievement.
///
/// Anything that does not parse into a known variant becomes `Unknown`,
/// which never unlocks; a broken catalog entry must not block awards.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criteria {
    Points {
        threshold: i64,
    },
    Level {
        threshold: i64,
    },
    TagsSubmitted {
        threshold: i64,
    },
    AttendanceStreak {
        threshold: i64,
    },
    ProductivityStreak {
        threshold: i64,
        #[serde(rename = "minProductivity")]
        min_productivity: f64,
    },
    BreaksCompliant {
        threshold: i64,
    },
    #[default]
    Unknown,
}

impl Criteria {
    pub fn type_name(&self) -> &'static str {
        match self {
            Criteria::Points { .. } => "points",
            Criteria::Level { .. } => "level",
            Criteria::TagsSubmitted { .. } => "tags_submitted",
            Criteria::AttendanceStreak { .. } => "attendance_streak",
            Criteria::ProductivityStreak { .. } => "productivity_streak",
            Criteria::BreaksCompliant { .. } => "breaks_compliant",
            Criteria::Unknown => "unknown",
        }
    }

    pub fn threshold(&self) -> Option<i64> {
        match self {
            Criteria::Points { threshold }
            | Criteria::Level { threshold }
            | Criteria::TagsSubmitted { threshold }
            | Criteria::AttendanceStreak { threshold }
            | Criteria::ProductivityStreak { threshold, .. }
            | Criteria::BreaksCompliant { threshold } => Some(*threshold),
            Criteria::Unknown => None,
        }
    }
}

impl From<Value> for Criteria {
    fn from(value: Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str);
        let threshold = value.get("threshold").and_then(lenient_i64);

        let criteria = match (kind, threshold) {
            (Some("points"), Some(threshold)) => Criteria::Points { threshold },
            (Some("level"), Some(threshold)) => Criteria::Level { threshold },
            (Some("tags_submitted"), Some(threshold)) => Criteria::TagsSubmitted { threshold },
            (Some("attendance_streak"), Some(threshold)) => Criteria::AttendanceStreak { threshold },
            (Some("breaks_compliant"), Some(threshold)) => Criteria::BreaksCompliant { threshold },
            (Some("productivity_streak"), Some(threshold)) => {
                match value
                    .get("minProductivity")
                    .or_else(|| value.get("min_productivity"))
                    .and_then(lenient_f64)
                {
                    Some(min_productivity) => Criteria::ProductivityStreak {
                        threshold,
                        min_productivity,
                    },
                    None => Criteria::Unknown,
                }
            }
            _ => Criteria::Unknown,
        };

        if criteria == Criteria::Unknown {
            warn!("Unrecognized achievement criteria: {}", value);
        }

        criteria
    }
}

impl<'de> Deserialize<'de> for Criteria {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Criteria::from(Value::deserialize(deserializer)?))
    }
}

/// Integers may arrive as numbers, whole doubles or numeric strings
fn lenient_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn lenient_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|f: &f64| f.is_finite())
}

fn default_true() -> bool {
    true
}

/// Catalog entry, managed by admins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: AchievementId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    /// Points granted on unlock
    #[serde(default)]
    pub points: i64,
    /// Coins granted on unlock
    #[serde(default)]
    pub coins: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub criteria: Criteria,
}

impl Achievement {
    /// Reference tag stamped on reward transactions
    pub fn reference(&self) -> String {
        format!("achievement:{}", self.id)
    }
}

/// One unlock, unique per (employee, achievement)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeAchievement {
    pub employee_id: EmployeeId,
    pub achievement_id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
    pub progress: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_criteria() {
        let c: Criteria = serde_json::from_value(json!({"type": "points", "threshold": 100})).unwrap();
        assert_eq!(c, Criteria::Points { threshold: 100 });

        let c: Criteria = serde_json::from_value(json!({
            "type": "productivity_streak",
            "threshold": 5,
            "minProductivity": 80
        }))
        .unwrap();
        assert_eq!(
            c,
            Criteria::ProductivityStreak {
                threshold: 5,
                min_productivity: 80.0
            }
        );
    }

    #[test]
    fn test_lenient_numbers() {
        let c: Criteria = serde_json::from_value(json!({"type": "level", "threshold": "5"})).unwrap();
        assert_eq!(c, Criteria::Level { threshold: 5 });

        let c: Criteria = serde_json::from_value(json!({"type": "level", "threshold": 5.0})).unwrap();
        assert_eq!(c, Criteria::Level { threshold: 5 });
    }

    #[test]
    fn test_malformed_criteria_is_unknown() {
        for blob in [
            json!({"type": "karma", "threshold": 1}),
            json!({"type": "points"}),
            json!({"type": "productivity_streak", "threshold": 3}),
            json!("points>=100"),
            json!(null),
        ] {
            let c: Criteria = serde_json::from_value(blob).unwrap();
            assert_eq!(c, Criteria::Unknown);
        }
    }

    #[test]
    fn test_serialize_round_trip_shape() {
        let value = serde_json::to_value(Criteria::BreaksCompliant { threshold: 10 }).unwrap();
        assert_eq!(value, json!({"type": "breaks_compliant", "threshold": 10}));
    }

    #[test]
    fn test_achievement_defaults() {
        let a: Achievement = serde_json::from_value(json!({
            "id": 3,
            "name": "Regular",
            "criteria": {"type": "attendance_streak", "threshold": 5}
        }))
        .unwrap();

        assert!(a.is_active);
        assert_eq!(a.points, 0);
        assert_eq!(a.reference(), "achievement:3");
        assert_eq!(a.criteria.threshold(), Some(5));
    }
}

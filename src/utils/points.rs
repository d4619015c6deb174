// Points and coin calculation rules

use crate::models::ledger::PointKind;

/// Points needed for one bonus coin
pub const POINTS_PER_BONUS_COIN: i64 = 10;

/// Productivity award tiers, highest first: (minimum percentage, points)
pub const PRODUCTIVITY_TIERS: [(f64, i64); 3] = [(90.0, 15), (75.0, 10), (60.0, 5)];

/// Bonus coins that ride along with a point award.
/// Only earned and bonus awards pay out coins.
pub fn coin_bonus(points: i64, kind: PointKind) -> i64 {
    match kind {
        PointKind::Earned | PointKind::Bonus => points.saturating_abs() / POINTS_PER_BONUS_COIN,
        PointKind::Spent | PointKind::Penalty => 0,
    }
}

/// Points for a day's productivity percentage, if it reaches a tier
pub fn productivity_award(percentage: f64) -> Option<i64> {
    if !percentage.is_finite() {
        return None;
    }

    PRODUCTIVITY_TIERS
        .iter()
        .find(|(min, _)| percentage >= *min)
        .map(|(_, points)| *points)
}

/// Reference tag for a productivity record
pub fn productivity_reference(record_id: &str) -> String {
    format!("flowace:{}", record_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_bonus() {
        assert_eq!(coin_bonus(95, PointKind::Earned), 9);
        assert_eq!(coin_bonus(250, PointKind::Bonus), 25);
        assert_eq!(coin_bonus(9, PointKind::Earned), 0);
    }

    #[test]
    fn test_no_coins_for_spend_or_penalty() {
        assert_eq!(coin_bonus(95, PointKind::Spent), 0);
        assert_eq!(coin_bonus(-95, PointKind::Spent), 0);
        assert_eq!(coin_bonus(-200, PointKind::Penalty), 0);
    }

    #[test]
    fn test_coin_bonus_extreme_amounts() {
        assert_eq!(coin_bonus(i64::MIN, PointKind::Earned), i64::MAX / 10);
        assert_eq!(coin_bonus(i64::MAX, PointKind::Bonus), i64::MAX / 10);
    }

    #[test]
    fn test_productivity_tiers() {
        assert_eq!(productivity_award(100.0), Some(15));
        assert_eq!(productivity_award(90.0), Some(15));
        assert_eq!(productivity_award(89.9), Some(10));
        assert_eq!(productivity_award(75.0), Some(10));
        assert_eq!(productivity_award(60.0), Some(5));
        assert_eq!(productivity_award(59.99), None);
        assert_eq!(productivity_award(f64::NAN), None);
    }

    #[test]
    fn test_productivity_reference() {
        assert_eq!(productivity_reference("42"), "flowace:42");
    }
}

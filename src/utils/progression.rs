// Level and rank progression
// Both are pure functions of accumulated experience

use serde::{Deserialize, Serialize};
use std::fmt;

/// Experience needed per level
pub const EXPERIENCE_PER_LEVEL: i64 = 100;

/// Display tier derived from level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Rank {
    #[default]
    Beginner,
    Bronze,
    Silver,
    Gold,
    Diamond,
    Legend,
}

/// Minimum level for each rank, highest first
const RANK_THRESHOLDS: [(i64, Rank); 5] = [
    (20, Rank::Legend),
    (15, Rank::Diamond),
    (10, Rank::Gold),
    (5, Rank::Silver),
    (3, Rank::Bronze),
];

impl Rank {
    pub fn label(&self) -> &'static str {
        match self {
            Rank::Beginner => "Beginner",
            Rank::Bronze => "Bronze",
            Rank::Silver => "Silver",
            Rank::Gold => "Gold",
            Rank::Diamond => "Diamond",
            Rank::Legend => "Legend",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Level for an experience total: floor(experience / 100) + 1
pub fn level_of(experience: i64) -> i64 {
    experience.max(0) / EXPERIENCE_PER_LEVEL + 1
}

/// Rank tier for a level
pub fn rank_of(level: i64) -> Rank {
    RANK_THRESHOLDS
        .iter()
        .find(|(min_level, _)| level >= *min_level)
        .map(|(_, rank)| *rank)
        .unwrap_or(Rank::Beginner)
}

/// Experience still missing before the next level
pub fn experience_to_next_level(experience: i64) -> i64 {
    level_of(experience) * EXPERIENCE_PER_LEVEL - experience.max(0)
}

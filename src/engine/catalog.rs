// Achievement catalog repositories

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::firebase::FirebaseClient;
use crate::error::{LedgerError, Result};
use crate::models::achievement::{Achievement, AchievementId, Criteria};

/// Read access to achievement definitions
#[async_trait]
pub trait AchievementRepository: Send + Sync {
    /// Active achievements, ordered by id
    async fn list_active(&self) -> Result<Vec<Achievement>>;

    async fn get(&self, id: AchievementId) -> Result<Option<Achievement>>;
}

fn achievement(
    id: AchievementId,
    name: &str,
    description: &str,
    icon: &str,
    category: &str,
    points: i64,
    coins: i64,
    criteria: Criteria,
) -> Achievement {
    Achievement {
        id,
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        points,
        coins,
        category: category.to_string(),
        is_active: true,
        criteria,
    }
}

/// Catalog used when no file or remote catalog is configured
static BUILTIN: Lazy<Vec<Achievement>> = Lazy::new(|| {
    vec![
        achievement(1, "First 100", "Reach 100 points", "🌱", "points", 20, 5,
            Criteria::Points { threshold: 100 }),
        achievement(2, "Point Collector", "Reach 1,000 points", "💰", "points", 100, 25,
            Criteria::Points { threshold: 1000 }),
        achievement(3, "Rising Star", "Reach level 5", "⭐", "progression", 50, 10,
            Criteria::Level { threshold: 5 }),
        achievement(4, "Veteran", "Reach level 10", "🏅", "progression", 150, 30,
            Criteria::Level { threshold: 10 }),
        achievement(5, "Task Tagger", "Submit 50 task tags", "🏷️", "tasks", 50, 10,
            Criteria::TagsSubmitted { threshold: 50 }),
        achievement(6, "Perfect Week", "Present 5 days in a row", "📅", "attendance", 30, 5,
            Criteria::AttendanceStreak { threshold: 5 }),
        achievement(7, "Always There", "Present 20 days in a row", "🗓️", "attendance", 120, 30,
            Criteria::AttendanceStreak { threshold: 20 }),
        achievement(8, "In The Zone", "5 days in a row at 80% productivity or better", "🎯",
            "productivity", 60, 15,
            Criteria::ProductivityStreak { threshold: 5, min_productivity: 80.0 }),
        achievement(9, "Well Rested", "10 breaks of healthy length", "☕", "wellbeing", 25, 0,
            Criteria::BreaksCompliant { threshold: 10 }),
    ]
});

/// In-process catalog
#[derive(Default)]
pub struct MemoryCatalog {
    entries: DashMap<AchievementId, Achievement>,
}

impl MemoryCatalog {
    pub fn new(achievements: impl IntoIterator<Item = Achievement>) -> Self {
        let catalog = Self::default();
        for a in achievements {
            catalog.upsert(a);
        }
        catalog
    }

    /// The default set shipped with the binary
    pub fn builtin() -> Self {
        Self::new(BUILTIN.iter().cloned())
    }

    /// Load a JSON array of achievements
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read achievements file {}", path))?;
        let achievements: Vec<Achievement> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse achievements file {}", path))?;

        info!("Loaded {} achievements from {}", achievements.len(), path);
        Ok(Self::new(achievements))
    }

    pub fn upsert(&self, achievement: Achievement) {
        self.entries.insert(achievement.id, achievement);
    }

    pub fn remove(&self, id: AchievementId) -> Option<Achievement> {
        self.entries.remove(&id).map(|(_, a)| a)
    }
}

#[async_trait]
impl AchievementRepository for MemoryCatalog {
    async fn list_active(&self) -> Result<Vec<Achievement>> {
        let mut active: Vec<Achievement> = self
            .entries
            .iter()
            .filter(|a| a.is_active)
            .map(|a| a.clone())
            .collect();
        active.sort_by_key(|a| a.id);
        Ok(active)
    }

    async fn get(&self, id: AchievementId) -> Result<Option<Achievement>> {
        Ok(self.entries.get(&id).map(|a| a.clone()))
    }
}

/// Catalog stored in the `achievements` collection
pub struct FirestoreCatalog {
    firebase: Arc<FirebaseClient>,
}

impl FirestoreCatalog {
    pub fn new(firebase: Arc<FirebaseClient>) -> Self {
        Self { firebase }
    }
}

/// Documents may omit `id`; the document name is used then
fn parse_document(doc_id: &str, mut value: Value) -> Option<Achievement> {
    if value.get("id").is_none() {
        let id = doc_id.parse::<i64>().ok()?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("id".to_string(), json!(id));
        }
    }

    match serde_json::from_value(value) {
        Ok(a) => Some(a),
        Err(e) => {
            warn!("Skipping malformed achievement {}: {}", doc_id, e);
            None
        }
    }
}

#[async_trait]
impl AchievementRepository for FirestoreCatalog {
    async fn list_active(&self) -> Result<Vec<Achievement>> {
        let docs = self.firebase.list_documents("achievements").await?;

        let mut active: Vec<Achievement> = docs
            .into_iter()
            .filter_map(|(id, value)| parse_document(&id, value))
            .filter(|a| a.is_active)
            .collect();
        active.sort_by_key(|a| a.id);
        Ok(active)
    }

    async fn get(&self, id: AchievementId) -> Result<Option<Achievement>> {
        let doc = self
            .firebase
            .get_document(&format!("achievements/{}", id))
            .await
            .map_err(LedgerError::Storage)?;

        Ok(doc.and_then(|value| parse_document(&id.to_string(), value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_is_active_and_sorted() {
        let catalog = MemoryCatalog::builtin();
        let active = catalog.list_active().await.unwrap();

        assert_eq!(active.len(), BUILTIN.len());
        assert!(active.windows(2).all(|w| w[0].id < w[1].id));
        assert!(active.iter().all(|a| a.criteria != Criteria::Unknown));
    }

    #[tokio::test]
    async fn test_inactive_entries_are_hidden() {
        let catalog = MemoryCatalog::builtin();
        let mut first = catalog.get(1).await.unwrap().unwrap();
        first.is_active = false;
        catalog.upsert(first);

        let active = catalog.list_active().await.unwrap();
        assert!(active.iter().all(|a| a.id != 1));
        // Still reachable by id
        assert!(catalog.get(1).await.unwrap().is_some());

        catalog.remove(1);
        assert!(catalog.get(1).await.unwrap().is_none());
    }

    #[test]
    fn test_parse_document_fills_id() {
        let a = parse_document(
            "12",
            json!({ "name": "Night Owl", "criteria": { "type": "level", "threshold": 2 } }),
        )
        .unwrap();
        assert_eq!(a.id, 12);
        assert_eq!(a.criteria, Criteria::Level { threshold: 2 });

        assert!(parse_document("abc", json!({ "name": "No id" })).is_none());
        assert!(parse_document("3", json!({ "id": 3 })).is_none());
    }
}

// Centralized configuration for the kudos ledger

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use std::env;
use std::str::FromStr;

/// Default number of transactions shown by read commands
pub const DEFAULT_TRANSACTION_LIMIT: usize = 20;

/// Backend used when `KUDOS_STORE` is not set
pub const DEFAULT_STORE: StoreKind = StoreKind::Memory;

/// Which ledger backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Process-local, lost on exit
    Memory,
    /// Firestore over REST
    Firestore,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreKind::Memory),
            "firestore" | "firebase" => Ok(StoreKind::Firestore),
            _ => Err(anyhow!("Unknown store kind: {}", s)),
        }
    }
}

/// Calendar-day boundary settings.
///
/// A day ends at `day_end_hour` local time, so activity at 01:30 with a
/// day end of 2 counts toward the previous day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySettings {
    pub utc_offset_hours: i32,
    pub day_end_hour: u32,
}

impl Default for DaySettings {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0,
            day_end_hour: 0,
        }
    }
}

impl DaySettings {
    /// Calendar day a timestamp belongs to, with offset and day end applied
    pub fn calendar_day(&self, at: DateTime<Utc>) -> NaiveDate {
        let local = at + Duration::hours(self.utc_offset_hours as i64);

        if local.hour() < self.day_end_hour {
            local.date_naive() - Duration::days(1)
        } else {
            local.date_naive()
        }
    }

    /// Today's effective date
    pub fn today(&self) -> NaiveDate {
        self.calendar_day(Utc::now())
    }
}

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub firebase_key_path: String,
    pub achievements_file: Option<String>,
    pub day: DaySettings,
    pub transaction_limit: usize,
}

impl Config {
    /// Load from environment variables (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self> {
        let store = store_kind(env::var("KUDOS_STORE").ok().as_deref())?;

        let firebase_key_path =
            env::var("FIREBASE_KEY_PATH").unwrap_or_else(|_| "firebase-key.json".to_string());

        let achievements_file = env::var("KUDOS_ACHIEVEMENTS_FILE").ok();

        let utc_offset_hours = parse_var("KUDOS_UTC_OFFSET_HOURS", 0i32)?;
        if !(-12..=14).contains(&utc_offset_hours) {
            return Err(anyhow!(
                "KUDOS_UTC_OFFSET_HOURS out of range: {}",
                utc_offset_hours
            ));
        }

        let day_end_hour = parse_var("KUDOS_DAY_END_HOUR", 0u32)?;
        if day_end_hour > 23 {
            return Err(anyhow!("KUDOS_DAY_END_HOUR out of range: {}", day_end_hour));
        }

        let transaction_limit = parse_var("KUDOS_TRANSACTION_LIMIT", DEFAULT_TRANSACTION_LIMIT)?;

        Ok(Self {
            store,
            firebase_key_path,
            achievements_file,
            day: DaySettings {
                utc_offset_hours,
                day_end_hour,
            },
            transaction_limit,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: DEFAULT_STORE,
            firebase_key_path: "firebase-key.json".to_string(),
            achievements_file: None,
            day: DaySettings::default(),
            transaction_limit: DEFAULT_TRANSACTION_LIMIT,
        }
    }
}

/// Backend from the raw `KUDOS_STORE` value
fn store_kind(raw: Option<&str>) -> Result<StoreKind> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse(),
        None => Ok(DEFAULT_STORE),
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_store_kind() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("Firestore".parse::<StoreKind>().unwrap(), StoreKind::Firestore);
        assert!("postgres".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_unset_store_matches_default_config() {
        assert_eq!(store_kind(None).unwrap(), Config::default().store);
        assert_eq!(store_kind(Some("  ")).unwrap(), DEFAULT_STORE);
        assert_eq!(store_kind(Some("firestore")).unwrap(), StoreKind::Firestore);
        assert!(store_kind(Some("postgres")).is_err());
    }

    #[test]
    fn test_calendar_day_plain_utc() {
        let day = DaySettings::default();
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 23, 59, 0).unwrap();
        assert_eq!(day.calendar_day(at), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn test_calendar_day_with_offset_and_day_end() {
        // JST with the day ending at 2 AM
        let day = DaySettings {
            utc_offset_hours: 9,
            day_end_hour: 2,
        };

        // 16:30 UTC = 01:30 JST on the 16th, still the 15th
        let late = Utc.with_ymd_and_hms(2026, 1, 15, 16, 30, 0).unwrap();
        assert_eq!(day.calendar_day(late), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());

        // 17:30 UTC = 02:30 JST on the 16th
        let next = Utc.with_ymd_and_hms(2026, 1, 15, 17, 30, 0).unwrap();
        assert_eq!(day.calendar_day(next), NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.transaction_limit, DEFAULT_TRANSACTION_LIMIT);
    }
}

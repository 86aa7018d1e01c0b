// Recently viewed stations, cards and lines, plus the notification dismissal time
//
// Persisted through a small key-value store so the medium (browser storage,
// a JSON file, memory) can change without touching callers.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::{Result, TransitError};

pub const MAX_RECENT_ENTRIES: usize = 10;
pub const NOTIFICATION_RESHOW_HOURS: i64 = 24;
const NOTIFICATION_KEY: &str = "notification_dismissed_at";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| TransitError::StorageError(format!("Failed to lock store: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| TransitError::StorageError(format!("Failed to lock store: {}", e)))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Whole store kept in one pretty-printed JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| TransitError::StorageError(format!("Failed to read history: {}", e)))?;

        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("⚠️  History file {:?} is corrupt ({}), starting fresh", self.path, e);
                Ok(HashMap::new())
            }
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TransitError::StorageError(format!("Failed to create history directory: {}", e))
            })?;
        }
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| TransitError::StorageError(format!("Failed to serialize history: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| TransitError::StorageError(format!("Failed to write history: {}", e)))?;

        debug!("History saved to {:?}", self.path);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Stations,
    Cards,
    Lines,
}

impl HistoryKind {
    fn key(self) -> &'static str {
        match self {
            HistoryKind::Stations => "recent_stations",
            HistoryKind::Cards => "recent_cards",
            HistoryKind::Lines => "recent_lines",
        }
    }

    fn normalize(self, id: &str) -> String {
        let id = id.trim();
        match self {
            HistoryKind::Stations => id.to_string(),
            HistoryKind::Cards | HistoryKind::Lines => id.to_uppercase(),
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HistoryKind::Stations => "stations",
            HistoryKind::Cards => "cards",
            HistoryKind::Lines => "lines",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for HistoryKind {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stations" | "station" => Ok(HistoryKind::Stations),
            "cards" | "card" => Ok(HistoryKind::Cards),
            "lines" | "line" => Ok(HistoryKind::Lines),
            other => Err(TransitError::InvalidParameter {
                name: "kind",
                reason: format!("unknown history list '{}'", other),
            }),
        }
    }
}

/// Most-recent-first list without duplicates, at most `MAX_RECENT_ENTRIES` long.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentList(Vec<String>);

impl RecentList {
    pub fn push(&mut self, id: String) {
        self.0.retain(|existing| *existing != id);
        self.0.insert(0, id);
        self.0.truncate(MAX_RECENT_ENTRIES);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != id);
        before != self.0.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct HistoryRepository<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> HistoryRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn recent(&self, kind: HistoryKind) -> Result<RecentList> {
        let Some(raw) = self.store.get(kind.key())? else {
            return Ok(RecentList::default());
        };
        match serde_json::from_str::<RecentList>(&raw) {
            Ok(mut list) => {
                list.0.truncate(MAX_RECENT_ENTRIES);
                Ok(list)
            }
            Err(e) => {
                warn!("⚠️  Discarding unreadable {} history: {}", kind.key(), e);
                Ok(RecentList::default())
            }
        }
    }

    pub fn record(&self, kind: HistoryKind, id: &str) -> Result<RecentList> {
        let id = kind.normalize(id);
        if id.is_empty() {
            return Err(TransitError::MissingParameter("id"));
        }
        let mut list = self.recent(kind)?;
        list.push(id);
        self.save(kind, &list)?;
        Ok(list)
    }

    pub fn forget(&self, kind: HistoryKind, id: &str) -> Result<RecentList> {
        let mut list = self.recent(kind)?;
        if list.remove(&kind.normalize(id)) {
            self.save(kind, &list)?;
        }
        Ok(list)
    }

    pub fn clear(&self, kind: HistoryKind) -> Result<()> {
        self.save(kind, &RecentList::default())
    }

    fn save(&self, kind: HistoryKind, list: &RecentList) -> Result<()> {
        let raw = serde_json::to_string(list)
            .map_err(|e| TransitError::StorageError(format!("Failed to serialize history: {}", e)))?;
        self.store.set(kind.key(), raw)
    }

    pub fn dismiss_notification(&self, now: DateTime<Utc>) -> Result<()> {
        self.store.set(NOTIFICATION_KEY, now.to_rfc3339())
    }

    /// The notification shows again once 24 hours passed since its dismissal.
    pub fn should_show_notification(&self, now: DateTime<Utc>) -> Result<bool> {
        let dismissed_at = self
            .store
            .get(NOTIFICATION_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(match dismissed_at {
            Some(at) => now - at >= Duration::hours(NOTIFICATION_RESHOW_HOURS),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn repository() -> HistoryRepository<MemoryStore> {
        HistoryRepository::new(MemoryStore::default())
    }

    #[test]
    fn kind_displays_as_typed_on_the_command_line() {
        for kind in [HistoryKind::Stations, HistoryKind::Cards, HistoryKind::Lines] {
            assert_eq!(kind.to_string().parse::<HistoryKind>().unwrap(), kind);
        }
        assert_eq!(HistoryKind::Lines.to_string(), "lines");
    }

    #[test]
    fn re_adding_moves_entry_to_front() {
        let history = repository();
        history.record(HistoryKind::Stations, "14").unwrap();
        history.record(HistoryKind::Stations, "27").unwrap();
        let list = history.record(HistoryKind::Stations, "14").unwrap();

        assert_eq!(list.entries(), ["14", "27"]);
    }

    #[test]
    fn list_never_exceeds_ten_entries() {
        let history = repository();
        for id in 0..15 {
            history.record(HistoryKind::Stations, &id.to_string()).unwrap();
        }
        let list = history.recent(HistoryKind::Stations).unwrap();

        assert_eq!(list.len(), MAX_RECENT_ENTRIES);
        assert_eq!(list.entries()[0], "14");
        assert_eq!(list.entries()[9], "5");
    }

    #[test]
    fn cards_and_lines_are_case_normalized() {
        let history = repository();
        history.record(HistoryKind::Lines, "190a").unwrap();
        let lines = history.record(HistoryKind::Lines, "190A").unwrap();
        assert_eq!(lines.entries(), ["190A"]);

        let cards = history.record(HistoryKind::Cards, " ab12cd ").unwrap();
        assert_eq!(cards.entries(), ["AB12CD"]);

        let forgotten = history.forget(HistoryKind::Cards, "ab12cd").unwrap();
        assert!(forgotten.is_empty());
    }

    #[test]
    fn lists_are_independent() {
        let history = repository();
        history.record(HistoryKind::Stations, "14").unwrap();
        assert!(history.recent(HistoryKind::Lines).unwrap().is_empty());
    }

    #[test]
    fn notification_reappears_after_a_day() {
        let history = repository();
        let dismissed = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();

        assert!(history.should_show_notification(dismissed).unwrap());
        history.dismiss_notification(dismissed).unwrap();

        assert!(!history.should_show_notification(dismissed + Duration::hours(23)).unwrap());
        assert!(history.should_show_notification(dismissed + Duration::hours(24)).unwrap());
    }

    #[test]
    fn json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        HistoryRepository::new(JsonFileStore::new(path.clone()))
            .record(HistoryKind::Lines, "23")
            .unwrap();
        let reopened = HistoryRepository::new(JsonFileStore::new(path));

        assert_eq!(reopened.recent(HistoryKind::Lines).unwrap().entries(), ["23"]);
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();

        let history = HistoryRepository::new(JsonFileStore::new(path));
        assert!(history.recent(HistoryKind::Stations).unwrap().is_empty());
        history.record(HistoryKind::Stations, "14").unwrap();
        assert_eq!(history.recent(HistoryKind::Stations).unwrap().len(), 1);
    }
}

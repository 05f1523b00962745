use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::backend::Session;
use crate::error::{PortalError, Result};

pub mod keys {
    pub const AUTH_TOKEN: &str = "glohe_auth_token";
    pub const USER_DATA: &str = "glohe_user_data";
    pub const THEME: &str = "glohe_theme";
    pub const LAST_VIEW: &str = "glohe_last_view";
    pub const TABLE_FILTERS: &str = "glohe_table_filters";
    pub const CALENDAR_YEAR: &str = "glohe_calendar_year";
    pub const LAST_ACTIVITY: &str = "last_activity";
}

pub const PREFS_FILE: &str = "prefs.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }
}

/// Backing store for the preference map. The whole map is read once and
/// written back on every change.
pub trait KeyValueStore: Send + Sync {
    fn load(&self) -> Result<BTreeMap<String, String>>;
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()>;
}

#[derive(Debug)]
pub struct FileStore {
    pub path: PathBuf,
}

impl FileStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|err| {
            PortalError::Storage(format!("failed to create {}: {err}", data_dir.display()))
        })?;
        Ok(Self {
            path: data_dir.join(PREFS_FILE),
        })
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self), fields(file = %self.path.display()))]
    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!("no preference file yet");
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|err| {
            PortalError::Storage(format!("failed reading {}: {err}", self.path.display()))
        })?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| {
            PortalError::Storage(format!("failed parsing {}: {err}", self.path.display()))
        })
    }

    #[tracing::instrument(skip(self, entries), fields(file = %self.path.display()))]
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        debug!(count = entries.len(), "saving preferences atomically");
        let storage = |err: std::io::Error| {
            PortalError::Storage(format!("failed writing {}: {err}", self.path.display()))
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(storage)?;
        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|err| PortalError::Storage(err.to_string()))?;
        writeln!(temp, "{serialized}").map_err(storage)?;
        temp.flush().map_err(storage)?;
        temp.persist(&self.path).map_err(|err| {
            PortalError::Storage(format!("failed to persist {}: {err}", self.path.display()))
        })?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    flushes: Mutex<usize>,
}

impl MemoryStore {
    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.entries.lock().clone())
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        *self.entries.lock() = entries.clone();
        *self.flushes.lock() += 1;
        Ok(())
    }
}

/// Process-wide preference state: loaded once at start, written through on
/// each change. Last write wins.
pub struct Preferences {
    store: Box<dyn KeyValueStore>,
    entries: RwLock<BTreeMap<String, String>>,
}

impl Preferences {
    pub fn load(store: Box<dyn KeyValueStore>) -> Result<Self> {
        let entries = store.load()?;
        debug!(count = entries.len(), "preferences loaded");
        Ok(Self {
            store,
            entries: RwLock::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemoryStore::default()),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.store.flush(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.store.flush(&entries)?;
        }
        Ok(())
    }

    /// Drops every key, not only the session ones.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        entries.clear();
        self.store.flush(&entries)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn theme(&self) -> Theme {
        match self.get(keys::THEME).as_deref() {
            Some("dark") => Theme::Dark,
            _ => Theme::Light,
        }
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set(keys::THEME, theme.as_str())
    }

    pub fn last_view(&self) -> Option<String> {
        self.get(keys::LAST_VIEW).filter(|v| !v.is_empty())
    }

    pub fn set_last_view(&self, view: &str) -> Result<()> {
        self.set(keys::LAST_VIEW, view)
    }

    pub fn calendar_year(&self) -> Option<i32> {
        self.get(keys::CALENDAR_YEAR).and_then(|y| y.trim().parse().ok())
    }

    pub fn set_calendar_year(&self, year: i32) -> Result<()> {
        self.set(keys::CALENDAR_YEAR, &year.to_string())
    }

    /// Saved filter object for one table, keyed by view name.
    pub fn table_filter(&self, view: &str) -> Option<Value> {
        let raw = self.get(keys::TABLE_FILTERS)?;
        let all: BTreeMap<String, Value> = serde_json::from_str(&raw).ok()?;
        all.get(view).cloned()
    }

    pub fn set_table_filter(&self, view: &str, filter: Value) -> Result<()> {
        let mut all: BTreeMap<String, Value> = self
            .get(keys::TABLE_FILTERS)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        all.insert(view.to_string(), filter);
        let raw = serde_json::to_string(&all).map_err(|err| PortalError::Storage(err.to_string()))?;
        self.set(keys::TABLE_FILTERS, &raw)
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.get(keys::LAST_ACTIVITY)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_last_activity(&self, at: DateTime<Utc>) -> Result<()> {
        self.set(keys::LAST_ACTIVITY, &at.to_rfc3339())
    }

    /// Mirrors the access token and user snapshot.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        let user = serde_json::to_string(&session.user)
            .map_err(|err| PortalError::Storage(err.to_string()))?;
        self.set(keys::AUTH_TOKEN, &session.access_token)?;
        self.set(keys::USER_DATA, &user)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn file_store_round_trips_through_a_fresh_load() {
        let dir = tempdir().expect("tempdir");
        let prefs = Preferences::load(Box::new(FileStore::open(dir.path()).expect("open")))
            .expect("load");
        prefs.set_theme(Theme::Dark).expect("theme");
        prefs.set_last_view("calendar").expect("view");
        prefs.set_calendar_year(2026).expect("year");

        let reloaded = Preferences::load(Box::new(FileStore::open(dir.path()).expect("open")))
            .expect("reload");
        assert_eq!(reloaded.theme(), Theme::Dark);
        assert_eq!(reloaded.last_view().as_deref(), Some("calendar"));
        assert_eq!(reloaded.calendar_year(), Some(2026));
    }

    #[test]
    fn table_filters_are_kept_per_view() {
        let prefs = Preferences::in_memory();
        prefs
            .set_table_filter("reports", json!({"status": "completed"}))
            .expect("reports");
        prefs
            .set_table_filter("pending-tasks", json!({"filter": "overdue"}))
            .expect("pending");
        assert_eq!(
            prefs.table_filter("reports"),
            Some(json!({"status": "completed"}))
        );
        assert_eq!(prefs.table_filter("calendar"), None);
    }

    #[test]
    fn clear_removes_everything() {
        let prefs = Preferences::in_memory();
        let at = Utc
            .with_ymd_and_hms(2025, 3, 15, 7, 0, 0)
            .single()
            .expect("valid time");
        prefs.set_last_activity(at).expect("activity");
        prefs.set_theme(Theme::Dark).expect("theme");
        assert_eq!(prefs.last_activity(), Some(at));

        prefs.clear().expect("clear");
        assert!(prefs.is_empty());
        assert_eq!(prefs.theme(), Theme::Light);
    }
}

//! User preferences and their persistence.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use classhub_core::error::{AppError, ErrorKind};
use classhub_core::result::AppResult;

/// Storage key the preferences are persisted under.
pub const PREFERENCES_KEY: &str = "classhub.notification_preferences";

/// Fallback when neither the type nor `info` has a configured duration.
pub const FALLBACK_DURATION_MS: u64 = 6_000;

/// Notification display preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Play a sound for live notifications.
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    /// Raise desktop notifications for live notifications.
    #[serde(default = "default_true")]
    pub desktop_enabled: bool,
    /// Auto-dismiss delay per type, in ms. 0 means manual dismiss.
    #[serde(default = "default_durations")]
    pub durations: BTreeMap<String, u64>,
    /// Maximum number of simultaneously visible toasts.
    #[serde(default = "default_max_stack")]
    pub max_stack: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            desktop_enabled: true,
            durations: default_durations(),
            max_stack: default_max_stack(),
        }
    }
}

impl Preferences {
    /// Duration for `kind`: its own entry, else `info`, else 6s.
    pub fn duration_for(&self, kind: &str) -> u64 {
        self.durations
            .get(kind)
            .or_else(|| self.durations.get("info"))
            .copied()
            .unwrap_or(FALLBACK_DURATION_MS)
    }

    /// Builder-style duration override.
    pub fn with_duration(mut self, kind: impl Into<String>, ms: u64) -> Self {
        self.durations.insert(kind.into(), ms);
        self
    }

    /// Builder-style stack cap.
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_max_stack() -> usize {
    4
}

fn default_durations() -> BTreeMap<String, u64> {
    BTreeMap::from([
        ("success".to_string(), 5_000),
        ("info".to_string(), 6_000),
        ("warning".to_string(), 8_000),
        ("error".to_string(), 0),
    ])
}

/// Key-value storage for small JSON documents.
#[async_trait]
pub trait PreferenceStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Read the raw value stored under `key`.
    async fn load(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &str) -> AppResult<()>;
}

/// Load preferences, substituting defaults when the value is missing.
///
/// A corrupt value is an error; the caller decides whether to fall back.
pub async fn load_preferences(storage: &dyn PreferenceStorage) -> AppResult<Preferences> {
    match storage.load(PREFERENCES_KEY).await? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Stored preferences are corrupt: {e}"),
                e,
            )
        }),
        None => Ok(Preferences::default()),
    }
}

/// Serialize and persist preferences.
pub async fn save_preferences(storage: &dyn PreferenceStorage, prefs: &Preferences) -> AppResult<()> {
    let raw = serde_json::to_string(prefs)?;
    storage.save(PREFERENCES_KEY, &raw).await
}

/// Preferences kept in a single JSON file mapping keys to string values.
#[derive(Debug)]
pub struct FilePreferenceStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: tokio::sync::Mutex<()>,
}

impl FilePreferenceStorage {
    /// Storage backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> AppResult<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AppError::storage(format!(
                    "Preference file {} is not valid JSON: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PreferenceStorage for FilePreferenceStorage {
    async fn load(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn save(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        // An unreadable file is replaced rather than blocking every save.
        let mut entries = self.read_all().await.unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(&self.path, contents).await?;

        debug!(path = %self.path.display(), key = %key, "Preferences saved");
        Ok(())
    }
}

/// In-process storage, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with one value.
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let storage = Self::new();
        storage
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
        storage
    }
}

#[async_trait]
impl PreferenceStorage for MemoryPreferenceStorage {
    async fn load(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let prefs = Preferences::default();
        assert!(prefs.sound_enabled);
        assert!(prefs.desktop_enabled);
        assert_eq!(prefs.max_stack, 4);
        assert_eq!(prefs.duration_for("success"), 5_000);
        assert_eq!(prefs.duration_for("warning"), 8_000);
        assert_eq!(prefs.duration_for("error"), 0);
        assert_eq!(prefs.duration_for("grade"), 6_000);
    }

    #[test]
    fn test_duration_falls_back_without_info() {
        let mut prefs = Preferences::default();
        prefs.durations.clear();
        assert_eq!(prefs.duration_for("grade"), FALLBACK_DURATION_MS);
    }

    #[test]
    fn test_partial_document_takes_defaults() {
        let prefs: Preferences = serde_json::from_str(r#"{"soundEnabled":false}"#).unwrap();
        assert!(!prefs.sound_enabled);
        assert!(prefs.desktop_enabled);
        assert_eq!(prefs.max_stack, 4);
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let storage = MemoryPreferenceStorage::new();
        assert_eq!(load_preferences(&storage).await.unwrap(), Preferences::default());

        let prefs = Preferences::default().with_max_stack(2).with_duration("grade", 3_000);
        save_preferences(&storage, &prefs).await.unwrap();
        assert_eq!(load_preferences(&storage).await.unwrap(), prefs);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_storage_error() {
        let storage = MemoryPreferenceStorage::with_value(PREFERENCES_KEY, "{nope");
        let err = load_preferences(&storage).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_file_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let storage = FilePreferenceStorage::new(&path);

        assert_eq!(storage.load(PREFERENCES_KEY).await.unwrap(), None);
        storage.save(PREFERENCES_KEY, "{\"maxStack\":3}").await.unwrap();
        storage.save("other", "x").await.unwrap();

        let reopened = FilePreferenceStorage::new(&path);
        let prefs = load_preferences(&reopened).await.unwrap();
        assert_eq!(prefs.max_stack, 3);
        assert_eq!(reopened.load("other").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_file_storage_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let storage = FilePreferenceStorage::new(&path);
        assert!(storage.load(PREFERENCES_KEY).await.is_err());

        storage.save(PREFERENCES_KEY, "{}").await.unwrap();
        assert!(storage.load(PREFERENCES_KEY).await.unwrap().is_some());
    }
}

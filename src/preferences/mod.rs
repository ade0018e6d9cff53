//! The `settings.json` preferences document.
//!
//! Two surfaces write this file independently (the panel publishes note
//! counts, the settings window edits display options), so every save is a
//! read-merge-write: the current on-disk object is loaded, only the fields
//! present in a [`PreferencesPatch`] are overlaid, and the combined object is
//! written back. Keys this crate does not know about are carried through.
//! Racing writers are not serialised; the last completed write wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;
use strum::{Display, EnumString};

use crate::storage::{layout, FileStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(from = "String", into = "String")]
pub enum StorageMode {
    #[default]
    Default,
    Custom,
}

impl From<String> for StorageMode {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "unknown storage mode, using default");
            StorageMode::Default
        })
    }
}

impl From<StorageMode> for String {
    fn from(mode: StorageMode) -> Self {
        mode.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub note_font_size: u32,
    pub editor_font_size: u32,
    pub note_line_height: f64,
    pub auto_save_enabled: bool,
    pub confirm_delete_enabled: bool,
    pub show_timestamp_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            note_font_size: 15,
            editor_font_size: 16,
            note_line_height: 1.6,
            auto_save_enabled: true,
            confirm_delete_enabled: true,
            show_timestamp_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteCounts {
    pub global: usize,
    pub project: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub setup_completed: bool,
    pub storage_mode: StorageMode,
    pub data_folder_path: String,
    pub settings: Settings,
    pub note_counts: NoteCounts,
}

impl Preferences {
    /// The data folder recorded by setup, if setup has been completed.
    pub fn data_folder(&self) -> Option<PathBuf> {
        if self.setup_completed && !self.data_folder_path.trim().is_empty() {
            Some(PathBuf::from(&self.data_folder_path))
        } else {
            None
        }
    }

    /// Builds preferences from an arbitrary on-disk JSON value. Fields that
    /// are missing or carry the wrong JSON type keep their defaults.
    fn from_document(document: Value) -> Self {
        let mut base = match serde_json::to_value(Preferences::default()) {
            Ok(base) => base,
            Err(err) => {
                tracing::error!(?err, "encoding default preferences");
                return Preferences::default();
            }
        };
        overlay_typed(&mut base, "preferences", document);
        serde_json::from_value(base).unwrap_or_else(|err| {
            tracing::warn!(?err, "preferences did not decode, using defaults");
            Preferences::default()
        })
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub note_font_size: Option<u32>,
    pub editor_font_size: Option<u32>,
    pub note_line_height: Option<f64>,
    pub auto_save_enabled: Option<bool>,
    pub confirm_delete_enabled: Option<bool>,
    pub show_timestamp_enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}

impl From<&Settings> for SettingsPatch {
    fn from(settings: &Settings) -> Self {
        Self {
            note_font_size: Some(settings.note_font_size),
            editor_font_size: Some(settings.editor_font_size),
            note_line_height: Some(settings.note_line_height),
            auto_save_enabled: Some(settings.auto_save_enabled),
            confirm_delete_enabled: Some(settings.confirm_delete_enabled),
            show_timestamp_enabled: Some(settings.show_timestamp_enabled),
        }
    }
}

/// The fields a single writer wants to change. `None` means "leave as is".
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub setup_completed: Option<bool>,
    pub storage_mode: Option<StorageMode>,
    pub data_folder_path: Option<String>,
    pub settings: Option<SettingsPatch>,
    pub note_counts: Option<NoteCounts>,
}

impl PreferencesPatch {
    pub fn settings(patch: SettingsPatch) -> Self {
        Self {
            settings: Some(patch),
            ..Self::default()
        }
    }

    pub fn note_counts(counts: NoteCounts) -> Self {
        Self {
            note_counts: Some(counts),
            ..Self::default()
        }
    }

    pub fn storage(mode: StorageMode, folder: &Path) -> Self {
        Self {
            storage_mode: Some(mode),
            data_folder_path: Some(folder.to_string_lossy().into_owned()),
            ..Self::default()
        }
    }
}

/// Where notes live after first-run setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChoice {
    /// Notes sit next to `settings.json` in the preferences home.
    Default,
    Custom(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PreferencesStore {
    store: FileStore,
    folder: PathBuf,
}

impl PreferencesStore {
    pub fn new(store: FileStore, folder: impl Into<PathBuf>) -> Self {
        Self {
            store,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path(&self) -> PathBuf {
        self.folder.join(layout::PREFERENCES_FILE)
    }

    /// Never fails: an absent, unreadable or malformed document yields
    /// defaults and the condition is logged.
    pub fn load(&self) -> Preferences {
        match self
            .store
            .read_json::<Value>(&self.folder, layout::PREFERENCES_FILE)
        {
            Ok(Some(document)) => Preferences::from_document(document),
            Ok(None) => Preferences::default(),
            Err(err) => {
                tracing::warn!(%err, "preferences unreadable, using defaults");
                Preferences::default()
            }
        }
    }

    /// Read-merge-write. Returns the preferences as written.
    pub fn save(&self, patch: &PreferencesPatch) -> Result<Preferences, StoreError> {
        let mut document = self.read_for_merge()?;
        let incoming = serde_json::to_value(patch).map_err(|source| StoreError::Serialize {
            path: self.path(),
            source,
        })?;
        if let Value::Object(incoming) = incoming {
            merge_objects(&mut document, incoming);
        }
        let document = Value::Object(document);
        self.store
            .write_json(&self.folder, layout::PREFERENCES_FILE, &document)?;
        tracing::debug!(path = %self.path().display(), "preferences saved");
        Ok(Preferences::from_document(document))
    }

    /// Marks first-run setup complete and records the storage location.
    pub fn complete_setup(&self, choice: &StorageChoice) -> Result<Preferences, StoreError> {
        let (mode, folder) = match choice {
            StorageChoice::Default => (StorageMode::Default, self.folder.clone()),
            StorageChoice::Custom(folder) => (StorageMode::Custom, folder.clone()),
        };
        let current = self.load();
        let patch = PreferencesPatch {
            setup_completed: Some(true),
            settings: Some(SettingsPatch::from(&current.settings)),
            ..PreferencesPatch::storage(mode, &folder)
        };
        let saved = self.save(&patch)?;
        tracing::info!(%mode, folder = %folder.display(), "setup completed");
        Ok(saved)
    }

    fn read_for_merge(&self) -> Result<Map<String, Value>, StoreError> {
        match self
            .store
            .read_json::<Value>(&self.folder, layout::PREFERENCES_FILE)
        {
            Ok(Some(Value::Object(document))) => Ok(document),
            Ok(Some(_)) => {
                tracing::warn!("preferences root is not an object, starting from empty");
                self.store
                    .quarantine(&self.folder, layout::PREFERENCES_FILE)?;
                Ok(Map::new())
            }
            Ok(None) => Ok(Map::new()),
            Err(err @ (StoreError::Parse { .. } | StoreError::Encoding { .. })) => {
                tracing::warn!(%err, "preferences corrupt, starting from empty");
                self.store
                    .quarantine(&self.folder, layout::PREFERENCES_FILE)?;
                Ok(Map::new())
            }
            Err(err) => Err(err),
        }
    }
}

fn merge_objects(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        if let Value::Object(nested) = value {
            if let Some(Value::Object(existing)) = target.get_mut(&key) {
                merge_objects(existing, nested);
                continue;
            }
            target.insert(key, Value::Object(nested));
        } else {
            target.insert(key, value);
        }
    }
}

fn overlay_typed(slot: &mut Value, key: &str, incoming: Value) {
    match (slot, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (name, value) in incoming {
                if let Some(inner) = base.get_mut(&name) {
                    overlay_typed(inner, &name, value);
                }
            }
        }
        (slot, incoming) => {
            let compatible = match (&*slot, &incoming) {
                (Value::Bool(_), Value::Bool(_)) | (Value::String(_), Value::String(_)) => true,
                (Value::Number(base), Value::Number(value)) => !base.is_u64() || value.is_u64(),
                _ => false,
            };
            if compatible {
                *slot = incoming;
            } else {
                tracing::warn!(field = key, value = %incoming, "ignoring mistyped preference");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> PreferencesStore {
        PreferencesStore::new(FileStore::default(), temp.path().join("MemoNotes"))
    }

    fn on_disk(prefs: &PreferencesStore) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(&fs::read_to_string(prefs.path())?)?)
    }

    fn seed(prefs: &PreferencesStore, document: Value) -> anyhow::Result<()> {
        fs::create_dir_all(prefs.folder())?;
        fs::write(prefs.path(), document.to_string())?;
        Ok(())
    }

    #[test]
    fn absent_document_loads_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp).load();
        assert_eq!(prefs, Preferences::default());
        assert!(!prefs.setup_completed);
        assert_eq!(prefs.settings.note_font_size, 15);
        assert!(prefs.data_folder().is_none());
        Ok(())
    }

    #[test]
    fn corrupt_document_loads_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp);
        fs::create_dir_all(prefs.folder())?;
        fs::write(prefs.path(), "{\"setupCompleted\": tru")?;

        assert_eq!(prefs.load(), Preferences::default());
        Ok(())
    }

    #[test]
    fn mistyped_fields_fall_back_individually() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp);
        seed(
            &prefs,
            json!({
                "setupCompleted": true,
                "storageMode": "sideways",
                "dataFolderPath": "/data/memos",
                "settings": { "noteFontSize": "big", "noteLineHeight": 2, "autoSaveEnabled": false },
                "noteCounts": { "global": -3, "project": 2 }
            }),
        )?;

        let loaded = prefs.load();

        assert!(loaded.setup_completed);
        assert_eq!(loaded.storage_mode, StorageMode::Default);
        assert_eq!(loaded.data_folder(), Some(PathBuf::from("/data/memos")));
        assert_eq!(loaded.settings.note_font_size, 15);
        assert_eq!(loaded.settings.note_line_height, 2.0);
        assert!(!loaded.settings.auto_save_enabled);
        assert!(loaded.settings.confirm_delete_enabled);
        assert_eq!(loaded.note_counts, NoteCounts { global: 0, project: 2 });
        Ok(())
    }

    #[test]
    fn save_overlays_only_present_fields() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp);
        seed(&prefs, json!({ "customPath": "legacy", "storageMode": "default" }))?;

        prefs.save(&PreferencesPatch {
            storage_mode: Some(StorageMode::Custom),
            ..PreferencesPatch::default()
        })?;

        assert_eq!(
            on_disk(&prefs)?,
            json!({ "customPath": "legacy", "storageMode": "custom" })
        );
        Ok(())
    }

    #[test]
    fn settings_window_and_panel_do_not_clobber_each_other() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let panel = store_in(&temp);
        let settings_window = store_in(&temp);
        panel.complete_setup(&StorageChoice::Default)?;

        panel.save(&PreferencesPatch::note_counts(NoteCounts {
            global: 7,
            project: 2,
        }))?;
        settings_window.save(&PreferencesPatch::settings(SettingsPatch {
            editor_font_size: Some(20),
            ..SettingsPatch::default()
        }))?;

        let merged = panel.load();
        assert!(merged.setup_completed);
        assert_eq!(merged.note_counts, NoteCounts { global: 7, project: 2 });
        assert_eq!(merged.settings.editor_font_size, 20);
        assert_eq!(merged.settings.note_font_size, 15);
        assert_eq!(on_disk(&panel)?["settings"]["showTimestampEnabled"], json!(true));
        Ok(())
    }

    #[test]
    fn save_over_corrupt_document_quarantines_it() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp);
        fs::create_dir_all(prefs.folder())?;
        fs::write(prefs.path(), "not json at all")?;

        let saved = prefs.save(&PreferencesPatch {
            setup_completed: Some(true),
            ..PreferencesPatch::default()
        })?;

        assert!(saved.setup_completed);
        assert_eq!(on_disk(&prefs)?, json!({ "setupCompleted": true }));
        let quarantined = fs::read_dir(prefs.folder())?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".corrupt-"))
            .count();
        assert_eq!(quarantined, 1);
        Ok(())
    }

    #[test]
    fn custom_setup_records_mode_and_folder() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp);
        let custom = temp.path().join("Dropbox").join("memos");

        let saved = prefs.complete_setup(&StorageChoice::Custom(custom.clone()))?;

        assert!(saved.setup_completed);
        assert_eq!(saved.storage_mode, StorageMode::Custom);
        assert_eq!(saved.data_folder(), Some(custom));
        assert_eq!(on_disk(&prefs)?["settings"]["noteLineHeight"], json!(1.6));
        Ok(())
    }

    #[test]
    fn default_setup_uses_preferences_home() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let prefs = store_in(&temp);
        let saved = prefs.complete_setup(&StorageChoice::Default)?;
        assert_eq!(saved.storage_mode, StorageMode::Default);
        assert_eq!(saved.data_folder().as_deref(), Some(prefs.folder()));
        Ok(())
    }
}

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::storage::layout;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "MemoPanel";
const APP_NAME: &str = "memo-panel";

pub const CONFIG_ENV: &str = "MEMO_PANEL_CONFIG";
pub const HOME_ENV: &str = "MEMO_PANEL_HOME";

pub const DEFAULT_TAGS: [&str; 4] = ["Lyrics", "Idea", "In Progress", "TODO"];

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    /// Folder holding `settings.json`; also the data folder in default
    /// storage mode.
    pub home_dir: PathBuf,
    pub preferences_file: PathBuf,
    pub state_dir: PathBuf,
    pub journal_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_home = env::var(HOME_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let home_dir = override_home.unwrap_or_else(|| {
            UserDirs::new()
                .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
                .unwrap_or_else(|| project_dirs.data_dir().to_path_buf())
                .join(layout::HOME_FOLDER_NAME)
        });

        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_dirs.data_dir().join("state"));

        Ok(Self {
            config_dir,
            config_file,
            preferences_file: home_dir.join(layout::PREFERENCES_FILE),
            home_dir,
            journal_dir: state_dir.join("drafts"),
            state_dir,
        })
    }

    /// Lays every location out under a single root folder.
    pub fn rooted(root: &Path) -> Self {
        let config_dir = root.join("config");
        let home_dir = root.join(layout::HOME_FOLDER_NAME);
        let state_dir = root.join("state");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            preferences_file: home_dir.join(layout::PREFERENCES_FILE),
            home_dir,
            journal_dir: state_dir.join("drafts"),
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.home_dir,
            &self.state_dir,
            &self.journal_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Characters of note content shown in list previews.
    pub preview_chars: usize,
    /// Tags installed the first time the tag registry is opened.
    pub default_tags: Vec<String>,
    pub auto_save: AutoSaveConfig,
    pub storage: StorageOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preview_chars: 200,
            default_tags: DEFAULT_TAGS.iter().map(|tag| tag.to_string()).collect(),
            auto_save: AutoSaveConfig::default(),
            storage: StorageOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self) {
        let tags: IndexSet<String> = self
            .default_tags
            .iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        if tags.is_empty() && !self.default_tags.is_empty() {
            tracing::warn!("default_tags only held blank names, restoring built-in set");
            self.default_tags = AppConfig::default().default_tags;
        } else {
            self.default_tags = tags.into_iter().collect();
        }
        if self.preview_chars == 0 {
            tracing::warn!("preview_chars of 0 hides every note, falling back to 200");
            self.preview_chars = 200;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub debounce_ms: u64,
    /// Journal editor drafts so an interrupted edit can be recovered.
    pub crash_recovery: bool,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 800,
            crash_recovery: true,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub pretty_json: bool,
}

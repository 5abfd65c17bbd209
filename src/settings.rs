use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_DB_FILE_NAME: &str = "app_icons.db";
pub const DEFAULT_WORKER_NAME: &str = "icon-cache";

/// User-tunable cache settings, persisted as JSON next to the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheSettings {
    pub db_file_name: String,
    pub icon_dpi: u32,
    pub icon_pixel_size: u32,
    pub memory_cache_enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_file_name: DEFAULT_DB_FILE_NAME.into(),
            icon_dpi: 480,
            icon_pixel_size: 192,
            memory_cache_enabled: true,
        }
    }
}

impl CacheSettings {
    /// Missing files yield defaults; unreadable JSON is logged and replaced by defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache settings from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(
                "Ignoring malformed cache settings in {}: {err}",
                path.display()
            );
            Self::default()
        }))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write cache settings to {}", path.display()))
    }

    pub fn cache_config(&self, cache_dir: &Path) -> IconCacheConfig {
        IconCacheConfig {
            db_path: cache_dir.join(&self.db_file_name),
            icon_dpi: self.icon_dpi,
            icon_pixel_size: self.icon_pixel_size,
            memory_cache_enabled: self.memory_cache_enabled,
            worker_name: DEFAULT_WORKER_NAME.into(),
        }
    }
}

/// Everything `IconCache::new` needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconCacheConfig {
    pub db_path: PathBuf,
    pub icon_dpi: u32,
    pub icon_pixel_size: u32,
    pub memory_cache_enabled: bool,
    pub worker_name: String,
}

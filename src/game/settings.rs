use std::path::Path;
use std::sync::RwLock;

use log::info;
use serde::{Deserialize, Serialize};

use crate::storage::file::{Config, FileIoWithBackup};
use crate::storage::files::ROOT;

use super::error::GameError;

pub const MIN_RAM_MB: u32 = 512;
pub const MAX_RAM_MB: u32 = 16384;

const MIN_WIDTH: u32 = 640;
const MIN_HEIGHT: u32 = 480;
const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    pub min_ram_mb: u32,
    pub max_ram_mb: u32,
    pub game_directory: String,
    pub fullscreen: bool,
    pub screen_width: u32,
    pub screen_height: u32,
    pub java_path: String,
    pub additional_args: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            min_ram_mb: 2048,
            max_ram_mb: 4096,
            game_directory: format!("{}/minecraft", ROOT),
            fullscreen: false,
            screen_width: 1280,
            screen_height: 720,
            java_path: String::new(),
            additional_args: String::new(),
        }
    }
}

impl GameSettings {
    /// Syntactic validation only. Path existence is checked lazily at
    /// launch time so users can configure paths before installing.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.min_ram_mb < MIN_RAM_MB || self.max_ram_mb > MAX_RAM_MB {
            return Err(GameError::Validation(format!(
                "ram must be within {}..={} MB",
                MIN_RAM_MB, MAX_RAM_MB
            )));
        }
        if self.min_ram_mb > self.max_ram_mb {
            return Err(GameError::Validation(format!(
                "minRamMb ({}) must not exceed maxRamMb ({})",
                self.min_ram_mb, self.max_ram_mb
            )));
        }
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&self.screen_width)
            || !(MIN_HEIGHT..=MAX_HEIGHT).contains(&self.screen_height)
        {
            return Err(GameError::Validation(format!(
                "resolution {}x{} out of supported range",
                self.screen_width, self.screen_height
            )));
        }
        Self::validate_path("gameDirectory", &self.game_directory)?;
        Self::validate_path("javaPath", &self.java_path)?;
        Ok(())
    }

    fn validate_path(field: &str, value: &str) -> Result<(), GameError> {
        if value.is_empty() {
            return Ok(());
        }
        if value.trim().is_empty() || value.contains('\0') {
            return Err(GameError::Validation(format!("{} is not a valid path", field)));
        }
        Ok(())
    }
}

/// Owner of the persisted launch parameters. All mutation goes through
/// [`SettingsStore::update`], which validates before writing to disk.
pub struct SettingsStore {
    settings: RwLock<GameSettings>,
    path: String,
}

impl FileIoWithBackup for SettingsStore {}

impl Config for SettingsStore {
    type ConfigType = GameSettings;
}

impl SettingsStore {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let settings = Self::load_config_or_default(path, GameSettings::default)?;
        Ok(Self {
            settings: RwLock::new(settings),
            path: path.to_string(),
        })
    }

    /// In-memory store for tests; nothing touches the disk until `update`.
    #[cfg(test)]
    pub fn ephemeral(settings: GameSettings, path: &str) -> Self {
        Self {
            settings: RwLock::new(settings),
            path: path.to_string(),
        }
    }

    pub fn get(&self) -> GameSettings {
        self.settings.read().unwrap().clone()
    }

    pub fn update(&self, new: GameSettings) -> Result<(), GameError> {
        new.validate()?;
        Self::save_config(&self.path, &new)
            .map_err(|e| GameError::Validation(format!("failed to persist settings: {}", e)))?;
        *self.settings.write().unwrap() = new;
        info!("game settings updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        let path = std::env::temp_dir().join(format!(
            "launcher-daemon-settings-{}.json",
            uuid::Uuid::new_v4()
        ));
        SettingsStore::ephemeral(GameSettings::default(), path.to_str().unwrap())
    }

    #[test]
    fn test_defaults_are_valid() {
        GameSettings::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_min_above_max() {
        let mut settings = GameSettings::default();
        settings.min_ram_mb = 8192;
        settings.max_ram_mb = 4096;
        assert!(matches!(
            settings.validate(),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_bounds_ram() {
        let mut settings = GameSettings::default();
        settings.min_ram_mb = 256;
        assert!(settings.validate().is_err());
        let mut settings = GameSettings::default();
        settings.max_ram_mb = 32768;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_bogus_resolution() {
        let mut settings = GameSettings::default();
        settings.screen_width = 100;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_nul_in_path() {
        let mut settings = GameSettings::default();
        settings.java_path = "bad\0path".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_update_persists_and_reads_back() {
        let store = store();
        let mut settings = GameSettings::default();
        settings.max_ram_mb = 8192;
        store.update(settings.clone()).unwrap();
        assert_eq!(store.get(), settings);
        let _ = std::fs::remove_file(&store.path);
    }

    #[test]
    fn test_update_rejects_without_mutating() {
        let store = store();
        let before = store.get();
        let mut bad = before.clone();
        bad.min_ram_mb = 0;
        assert!(store.update(bad).is_err());
        assert_eq!(store.get(), before);
    }

    #[test]
    fn test_settings_wire_names_are_camel_case() {
        let json = serde_json::to_string(&GameSettings::default()).unwrap();
        assert!(json.contains("\"minRamMb\""));
        assert!(json.contains("\"gameDirectory\""));
        assert!(json.contains("\"additionalArgs\""));
    }
}

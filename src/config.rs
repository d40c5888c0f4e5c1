use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::auth::AuthConfig;
use crate::drivers::DriversConfig;
use crate::game::GameConfig;
use crate::storage::file::{Config, FileIoWithBackup};

/// immutable through full lifetime of app, unless restart app.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub drivers: DriversConfig,
    pub auth: AuthConfig,
    pub game: GameConfig,
}

impl FileIoWithBackup for AppConfig {}

impl Config for AppConfig {
    type ConfigType = AppConfig;
}

impl AppConfig {
    fn load() -> AppConfig {
        Self::load_config_or_default("config.json", Self::default).unwrap()
    }
}

static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(AppConfig::load);

impl AppConfig {
    pub fn get() -> &'static AppConfig {
        &APP_CONFIG
    }
}

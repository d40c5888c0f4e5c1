use serde::{Deserialize, Serialize};

/// Static game distribution parameters. Immutable through the daemon's
/// lifetime, part of [`crate::config::AppConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GameConfig {
    /// Target vanilla version the daemon installs and launches.
    pub minecraft_version: String,
    /// Target NeoForge loader version layered on top of the client.
    pub neoforge_version: String,
    /// URL of the version manifest listing every artifact of the target
    /// version pair (path, url, sha1, size).
    pub manifest_url: String,
    /// Grace period before an unresponsive game process is force killed.
    pub stop_grace_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            minecraft_version: "1.21.1".into(),
            neoforge_version: "21.1.77".into(),
            manifest_url: "https://launcher.mcsl.com.cn/dist/1.21.1-neoforge/manifest.json".into(),
            stop_grace_secs: 5,
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::storage::files::get_sha1;

use super::config::GameConfig;
use super::error::GameError;
use super::fetcher::{ArtifactFetcher, BACKOFF_BASE, MAX_ATTEMPTS};
use super::state::{GameState, GameStatus, StatusPublisher};

/// File registering a completed installation inside the game directory.
/// Written atomically as the last step of the pipeline; its presence is
/// what `installed=true` means.
pub const INSTALLED_MANIFEST: &str = "installed.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Path relative to the game directory.
    pub path: String,
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallManifest {
    pub minecraft_version: String,
    pub neoforge_version: String,
    pub artifacts: Vec<Artifact>,
}

/// One install invocation. Holds the cancellation flag shared with the
/// pipeline task; dropped once the pipeline reaches a terminal state.
#[derive(Debug, Clone)]
pub struct InstallJob {
    cancel: Arc<AtomicBool>,
}

impl InstallJob {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn flag(&self) -> &AtomicBool {
        &self.cancel
    }
}

impl Default for InstallJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the check -> download -> install pipeline. Every stage is
/// idempotent: re-running after an interruption re-validates what is
/// already on disk instead of re-downloading it.
pub struct InstallationManager {
    config: GameConfig,
    fetcher: ArtifactFetcher,
}

impl InstallationManager {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            fetcher: ArtifactFetcher::new(),
        }
    }

    /// Cheap presence check used by the info endpoint and launch guard.
    pub fn is_installed(&self, game_dir: &Path) -> bool {
        match Self::load_registered(game_dir) {
            Some(manifest) => {
                manifest.minecraft_version == self.config.minecraft_version
                    && manifest.neoforge_version == self.config.neoforge_version
                    && manifest
                        .artifacts
                        .iter()
                        .all(|artifact| game_dir.join(&artifact.path).is_file())
            }
            None => false,
        }
    }

    /// Runs the full pipeline, publishing progress through `status`.
    /// Terminates by publishing `Ready`, or returns the failure for the
    /// caller to publish as `Error`.
    pub async fn run(
        &self,
        game_dir: &Path,
        status: &StatusPublisher,
        job: &InstallJob,
    ) -> Result<(), GameError> {
        // Stage 1: check
        status.publish(GameStatus::new(
            GameState::Checking,
            0.0,
            "Checking installation...",
        ));
        tokio::fs::create_dir_all(game_dir).await?;

        if let Some(registered) = Self::load_registered(game_dir) {
            if registered.minecraft_version == self.config.minecraft_version
                && registered.neoforge_version == self.config.neoforge_version
                && self.verify_all(game_dir, &registered, job).await?
            {
                info!(
                    "installation of {} / NeoForge {} is current, nothing to do",
                    registered.minecraft_version, registered.neoforge_version
                );
                status.publish(GameStatus::ready());
                return Ok(());
            }
        }
        if job.cancelled() {
            return Err(GameError::Cancelled);
        }

        let manifest = self.fetch_manifest().await?;
        if manifest.minecraft_version != self.config.minecraft_version
            || manifest.neoforge_version != self.config.neoforge_version
        {
            warn!(
                "manifest serves {} / NeoForge {}, configured target is {} / {}",
                manifest.minecraft_version,
                manifest.neoforge_version,
                self.config.minecraft_version,
                self.config.neoforge_version
            );
        }

        // Stage 2: download
        let total_bytes: u64 = manifest.artifacts.iter().map(|a| a.size).sum();
        let mut downloaded_base: u64 = 0;

        for artifact in &manifest.artifacts {
            if job.cancelled() {
                return Err(GameError::Cancelled);
            }
            let dest = game_dir.join(&artifact.path);

            // Resume: bytes already verified on disk are never re-fetched.
            if Self::verify_artifact(&dest, &artifact.sha1).await? {
                downloaded_base += artifact.size;
                Self::publish_download(status, artifact, downloaded_base, total_bytes);
                continue;
            }

            info!("downloading {}", artifact.path);
            let written = self
                .fetcher
                .fetch(&artifact.url, &artifact.sha1, &dest, job.flag(), |done, _| {
                    Self::publish_download(status, artifact, downloaded_base + done, total_bytes);
                })
                .await?;
            downloaded_base += written.max(artifact.size);
        }

        // Stage 3: install. Every artifact is re-hashed in place before the
        // atomic registration, so observers see installed=true only for a
        // fully verified tree.
        status.publish(GameStatus::new(
            GameState::Installing,
            99.0,
            "Verifying installed files...",
        ));
        for artifact in &manifest.artifacts {
            let dest = game_dir.join(&artifact.path);
            if !dest.is_file() {
                return Err(GameError::Other(anyhow::anyhow!(
                    "artifact {} missing after download",
                    artifact.path
                )));
            }
            let actual = get_sha1(&dest.to_string_lossy()).await?;
            if !actual.eq_ignore_ascii_case(&artifact.sha1) {
                return Err(GameError::Integrity {
                    url: artifact.url.clone(),
                    expected: artifact.sha1.to_lowercase(),
                    actual,
                });
            }
        }
        Self::register(game_dir, &manifest).await?;

        info!(
            "installed {} / NeoForge {} ({} artifacts, {} bytes)",
            manifest.minecraft_version,
            manifest.neoforge_version,
            manifest.artifacts.len(),
            total_bytes
        );
        status.publish(GameStatus::ready());
        Ok(())
    }

    /// Fetches the version manifest with the same bounded retry policy as
    /// artifact downloads.
    async fn fetch_manifest(&self) -> Result<InstallManifest, GameError> {
        let url = url::Url::parse(&self.config.manifest_url)
            .map_err(|e| GameError::Validation(format!("invalid manifest url: {}", e)))?;

        let mut attempt = 0;
        let manifest = loop {
            attempt += 1;
            match self.try_fetch_manifest(url.clone(), attempt).await {
                Ok(manifest) => break manifest,
                Err(err @ GameError::Network { .. }) if attempt < MAX_ATTEMPTS => {
                    let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        "manifest fetch attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, MAX_ATTEMPTS, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        };

        if manifest.artifacts.is_empty() {
            return Err(GameError::Other(anyhow::anyhow!(
                "version manifest lists no artifacts"
            )));
        }
        Ok(manifest)
    }

    async fn try_fetch_manifest(
        &self,
        url: url::Url,
        attempt: u32,
    ) -> Result<InstallManifest, GameError> {
        let net = |source: reqwest::Error| GameError::Network {
            attempts: attempt,
            source,
        };
        self.fetcher
            .client()
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(net)?
            .json::<InstallManifest>()
            .await
            .map_err(net)
    }

    async fn verify_all(
        &self,
        game_dir: &Path,
        manifest: &InstallManifest,
        job: &InstallJob,
    ) -> Result<bool, GameError> {
        for artifact in &manifest.artifacts {
            if job.cancelled() {
                return Err(GameError::Cancelled);
            }
            if !Self::verify_artifact(&game_dir.join(&artifact.path), &artifact.sha1).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn verify_artifact(path: &Path, expected_sha1: &str) -> Result<bool, GameError> {
        if !path.is_file() {
            return Ok(false);
        }
        let actual = get_sha1(&path.to_string_lossy()).await?;
        Ok(actual.eq_ignore_ascii_case(expected_sha1))
    }

    fn publish_download(
        status: &StatusPublisher,
        artifact: &Artifact,
        downloaded: u64,
        total: u64,
    ) {
        let progress = if total > 0 {
            (downloaded as f64 / total as f64 * 100.0).min(99.0)
        } else {
            0.0
        };
        status.publish(GameStatus {
            state: GameState::Downloading,
            progress,
            current_step: "Downloading game files...".into(),
            current_file: artifact.path.clone(),
            downloaded_bytes: downloaded,
            total_bytes: total,
            error_message: None,
        });
    }

    fn load_registered(game_dir: &Path) -> Option<InstallManifest> {
        let content = std::fs::read_to_string(game_dir.join(INSTALLED_MANIFEST)).ok()?;
        serde_json::from_str(&content).ok()
    }

    async fn register(game_dir: &Path, manifest: &InstallManifest) -> Result<(), GameError> {
        let target = game_dir.join(INSTALLED_MANIFEST);
        let tmp = Self::tmp_manifest_path(game_dir);
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| GameError::Other(e.into()))?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    fn tmp_manifest_path(game_dir: &Path) -> PathBuf {
        game_dir.join(format!("{}.tmp", INSTALLED_MANIFEST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GameStatus;
    use axum::extract::State;
    use axum::routing::get;
    use axum::{Json, Router};
    use sha1::{Digest, Sha1};
    use std::sync::atomic::AtomicUsize;

    const CLIENT: &[u8] = b"client bytes";
    const LOADER: &[u8] = b"neoforge loader bytes";

    #[derive(Default)]
    struct Hits {
        client: AtomicUsize,
        loader: AtomicUsize,
    }

    fn sha1_hex(data: &[u8]) -> String {
        format!("{:x}", Sha1::digest(data))
    }

    /// Local distribution server: /manifest.json plus two artifacts with
    /// request counters.
    async fn serve_dist(hits: Arc<Hits>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let manifest = InstallManifest {
            minecraft_version: "1.21.1".into(),
            neoforge_version: "21.1.77".into(),
            artifacts: vec![
                Artifact {
                    path: "client.jar".into(),
                    url: format!("{}/client.jar", base),
                    sha1: sha1_hex(CLIENT),
                    size: CLIENT.len() as u64,
                },
                Artifact {
                    path: "libraries/neoforge.jar".into(),
                    url: format!("{}/neoforge.jar", base),
                    sha1: sha1_hex(LOADER),
                    size: LOADER.len() as u64,
                },
            ],
        };

        let app = Router::new()
            .route("/manifest.json", get(move || async move { Json(manifest) }))
            .route(
                "/client.jar",
                get(|State(hits): State<Arc<Hits>>| async move {
                    hits.client.fetch_add(1, Ordering::SeqCst);
                    CLIENT.to_vec()
                }),
            )
            .route(
                "/neoforge.jar",
                get(|State(hits): State<Arc<Hits>>| async move {
                    hits.loader.fetch_add(1, Ordering::SeqCst);
                    LOADER.to_vec()
                }),
            )
            .with_state(hits);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn manager(base: &str) -> InstallationManager {
        InstallationManager::new(GameConfig {
            manifest_url: format!("{}/manifest.json", base),
            ..GameConfig::default()
        })
    }

    fn temp_game_dir() -> PathBuf {
        std::env::temp_dir()
            .join("launcher-daemon-install-tests")
            .join(uuid::Uuid::new_v4().to_string())
    }

    #[tokio::test]
    async fn test_fresh_install_reaches_ready() {
        let hits = Arc::new(Hits::default());
        let base = serve_dist(hits.clone()).await;
        let manager = manager(&base);
        let game_dir = temp_game_dir();
        let status = StatusPublisher::new(GameStatus::not_installed());

        manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap();

        let snap = status.snapshot();
        assert_eq!(snap.state, GameState::Ready);
        assert_eq!(snap.progress, 100.0);
        assert!(snap.error_message.is_none());
        assert!(manager.is_installed(&game_dir));
        assert_eq!(hits.client.load(Ordering::SeqCst), 1);
        assert_eq!(hits.loader.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_run_skips_all_downloads() {
        let hits = Arc::new(Hits::default());
        let base = serve_dist(hits.clone()).await;
        let manager = manager(&base);
        let game_dir = temp_game_dir();
        let status = StatusPublisher::new(GameStatus::not_installed());

        manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap();
        manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap();

        assert_eq!(hits.client.load(Ordering::SeqCst), 1);
        assert_eq!(hits.loader.load(Ordering::SeqCst), 1);
        assert_eq!(status.snapshot().state, GameState::Ready);
    }

    #[tokio::test]
    async fn test_resume_refetches_only_missing_artifacts() {
        let hits = Arc::new(Hits::default());
        let base = serve_dist(hits.clone()).await;
        let manager = manager(&base);
        let game_dir = temp_game_dir();

        // Simulate an interrupted run: client.jar already verified on disk,
        // the loader never arrived and nothing was registered.
        std::fs::create_dir_all(&game_dir).unwrap();
        std::fs::write(game_dir.join("client.jar"), CLIENT).unwrap();

        let status = StatusPublisher::new(GameStatus::not_installed());
        manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap();

        assert_eq!(hits.client.load(Ordering::SeqCst), 0);
        assert_eq!(hits.loader.load(Ordering::SeqCst), 1);
        assert!(manager.is_installed(&game_dir));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_never_registers_install() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let manifest = InstallManifest {
            minecraft_version: "1.21.1".into(),
            neoforge_version: "21.1.77".into(),
            artifacts: vec![Artifact {
                path: "client.jar".into(),
                url: format!("{}/client.jar", base),
                // wrong on purpose
                sha1: "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".into(),
                size: CLIENT.len() as u64,
            }],
        };
        let app = Router::new()
            .route("/manifest.json", get(move || async move { Json(manifest) }))
            .route("/client.jar", get(|| async { CLIENT.to_vec() }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let manager = manager(&base);
        let game_dir = temp_game_dir();
        let status = StatusPublisher::new(GameStatus::not_installed());

        let err = manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GameError::Integrity { .. }));
        assert!(!manager.is_installed(&game_dir));
        assert!(!game_dir.join(INSTALLED_MANIFEST).exists());
    }

    #[tokio::test]
    async fn test_manifest_fetch_retries_transient_errors() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let manifest = InstallManifest {
            minecraft_version: "1.21.1".into(),
            neoforge_version: "21.1.77".into(),
            artifacts: vec![Artifact {
                path: "client.jar".into(),
                url: format!("{}/client.jar", base),
                sha1: sha1_hex(CLIENT),
                size: CLIENT.len() as u64,
            }],
        };
        // first two manifest requests fail, the third succeeds
        let manifest_hits = Arc::new(AtomicUsize::new(0));
        let hits = manifest_hits.clone();
        let app = Router::new()
            .route(
                "/manifest.json",
                get(move || async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(axum::http::StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(manifest))
                    }
                }),
            )
            .route("/client.jar", get(|| async { CLIENT.to_vec() }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let manager = manager(&base);
        let game_dir = temp_game_dir();
        let status = StatusPublisher::new(GameStatus::not_installed());

        manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap();

        assert_eq!(manifest_hits.load(Ordering::SeqCst), 3);
        assert_eq!(status.snapshot().state, GameState::Ready);
        assert!(manager.is_installed(&game_dir));
    }

    #[tokio::test]
    async fn test_artifact_modified_during_install_is_not_registered() {
        let game_dir = temp_game_dir();
        std::fs::create_dir_all(&game_dir).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);

        let manifest = InstallManifest {
            minecraft_version: "1.21.1".into(),
            neoforge_version: "21.1.77".into(),
            artifacts: vec![
                Artifact {
                    path: "client.jar".into(),
                    url: format!("{}/client.jar", base),
                    sha1: sha1_hex(CLIENT),
                    size: CLIENT.len() as u64,
                },
                Artifact {
                    path: "libraries/neoforge.jar".into(),
                    url: format!("{}/neoforge.jar", base),
                    sha1: sha1_hex(LOADER),
                    size: LOADER.len() as u64,
                },
            ],
        };
        // serving the second artifact tampers with the first, after its
        // download-time verification but before registration
        let tampered = game_dir.clone();
        let app = Router::new()
            .route("/manifest.json", get(move || async move { Json(manifest) }))
            .route("/client.jar", get(|| async { CLIENT.to_vec() }))
            .route(
                "/neoforge.jar",
                get(move || async move {
                    std::fs::write(tampered.join("client.jar"), b"tampered").unwrap();
                    LOADER.to_vec()
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let manager = manager(&base);
        let status = StatusPublisher::new(GameStatus::not_installed());
        let err = manager
            .run(&game_dir, &status, &InstallJob::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GameError::Integrity { .. }));
        assert!(!manager.is_installed(&game_dir));
        assert!(!game_dir.join(INSTALLED_MANIFEST).exists());
    }

    #[tokio::test]
    async fn test_cancelled_job_is_not_registered() {
        let hits = Arc::new(Hits::default());
        let base = serve_dist(hits.clone()).await;
        let manager = manager(&base);
        let game_dir = temp_game_dir();
        let status = StatusPublisher::new(GameStatus::not_installed());

        let job = InstallJob::new();
        job.cancel();
        let err = manager.run(&game_dir, &status, &job).await.unwrap_err();

        assert!(matches!(err, GameError::Cancelled));
        assert!(!manager.is_installed(&game_dir));
    }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};

use super::config::GameConfig;
use super::error::GameError;
use super::install::{InstallJob, InstallationManager};
use super::process::ProcessSupervisor;
use super::settings::SettingsStore;
use super::state::{GameState, GameStatus, StatusPublisher};

/// Read-only view computed from on-disk presence and process liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub minecraft_version: String,
    pub neo_forge_version: String,
    pub installed: bool,
    pub running: bool,
}

/// Single source of truth for the current [`GameState`].
///
/// Serializes mutating operations with a try-lock gate: one install or
/// launch in flight per game instance, concurrent requests are rejected
/// rather than queued. Snapshot reads go through the watch channel and
/// never block the active operation.
pub struct GameStateMachine {
    config: GameConfig,
    status: Arc<StatusPublisher>,
    settings: Arc<SettingsStore>,
    installer: Arc<InstallationManager>,
    supervisor: Arc<ProcessSupervisor>,
    op_gate: Arc<tokio::sync::Mutex<()>>,
    active_job: Mutex<Option<InstallJob>>,
}

impl GameStateMachine {
    pub fn new(config: GameConfig, settings: Arc<SettingsStore>) -> Arc<Self> {
        let installer = Arc::new(InstallationManager::new(config.clone()));
        let supervisor = Arc::new(ProcessSupervisor::new(Duration::from_secs(
            config.stop_grace_secs,
        )));

        let game_dir = PathBuf::from(settings.get().game_directory);
        let initial = if installer.is_installed(&game_dir) {
            info!(
                "{} / NeoForge {} already installed",
                config.minecraft_version, config.neoforge_version
            );
            GameStatus::ready()
        } else {
            info!("game not installed yet");
            GameStatus::not_installed()
        };

        Arc::new(Self {
            config,
            status: Arc::new(StatusPublisher::new(initial)),
            settings,
            installer,
            supervisor,
            op_gate: Arc::new(tokio::sync::Mutex::new(())),
            active_job: Mutex::new(None),
        })
    }

    /// Non-blocking read of the latest published status.
    pub fn snapshot(&self) -> GameStatus {
        self.status.snapshot()
    }

    pub fn info(&self) -> GameInfo {
        let game_dir = PathBuf::from(self.settings.get().game_directory);
        GameInfo {
            minecraft_version: self.config.minecraft_version.clone(),
            neo_forge_version: self.config.neoforge_version.clone(),
            installed: self.installer.is_installed(&game_dir),
            running: self.supervisor.is_running(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Begins the install pipeline. Legal from NotInstalled, Ready and
    /// Error; Error recovery re-runs the check stage from scratch.
    pub fn request_install(self: &Arc<Self>) -> Result<(), GameError> {
        let guard = self
            .op_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| GameError::ConcurrencyRejected)?;

        let state = self.status.state();
        if !state.is_idle() {
            return Err(GameError::IllegalState {
                op: "install",
                state,
            });
        }

        let job = InstallJob::new();
        *self.active_job.lock().unwrap() = Some(job.clone());
        self.status.publish(GameStatus::new(
            GameState::Checking,
            0.0,
            "Checking installation...",
        ));

        let machine = self.clone();
        let game_dir = PathBuf::from(self.settings.get().game_directory);
        tokio::spawn(async move {
            let result = machine
                .installer
                .run(&game_dir, &machine.status, &job)
                .await;
            *machine.active_job.lock().unwrap() = None;
            match result {
                Ok(()) => {}
                Err(GameError::Cancelled) => {
                    info!("install cancelled");
                    // On-disk state stays resumable; fall back to whatever
                    // the last registered install says.
                    if machine.installer.is_installed(&game_dir) {
                        machine.status.publish(GameStatus::ready());
                    } else {
                        machine.status.publish(GameStatus::not_installed());
                    }
                }
                Err(err) => {
                    error!("install failed: {}", err);
                    machine.status.publish(GameStatus::error(err.to_string()));
                }
            }
            drop(guard);
        });
        Ok(())
    }

    /// Launches the game process. Legal from Ready only.
    pub fn request_launch(self: &Arc<Self>) -> Result<(), GameError> {
        let guard = self
            .op_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| GameError::ConcurrencyRejected)?;

        let state = self.status.state();
        if state != GameState::Ready {
            return Err(GameError::IllegalState { op: "launch", state });
        }

        self.status.publish(GameStatus::new(
            GameState::Launching,
            0.0,
            "Launching game...",
        ));

        let machine = self.clone();
        tokio::spawn(async move {
            let settings = machine.settings.get();
            match machine
                .supervisor
                .launch(&settings, machine.status.clone())
                .await
            {
                Ok(pid) => {
                    info!("game process started (pid={})", pid);
                }
                Err(err) => {
                    error!("launch failed: {}", err);
                    machine.status.publish(GameStatus::error(err.to_string()));
                }
            }
            drop(guard);
        });
        Ok(())
    }

    /// Stops the running game, or cancels an in-flight install. Any other
    /// state is a rejection.
    pub fn request_stop(&self) -> Result<(), GameError> {
        match self.status.state() {
            GameState::Running => self.supervisor.stop(),
            GameState::Checking | GameState::Downloading | GameState::Installing => {
                let job = self.active_job.lock().unwrap().clone();
                match job {
                    Some(job) => {
                        job.cancel();
                        Ok(())
                    }
                    None => Err(GameError::IllegalState {
                        op: "stop",
                        state: self.status.state(),
                    }),
                }
            }
            state => Err(GameError::IllegalState { op: "stop", state }),
        }
    }

    #[cfg(test)]
    fn force_state(&self, state: GameState) {
        self.status.publish(GameStatus::new(state, 0.0, "forced"));
    }
}

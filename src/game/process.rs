use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::select;
use tokio::sync::Notify;

use super::error::GameError;
use super::java::resolve_java;
use super::settings::GameSettings;
use super::state::{GameState, GameStatus, StatusPublisher};

/// Opaque handle to the running game child process.
pub struct GameProcess {
    pub pid: u32,
    stop_notify: Arc<Notify>,
    exited: Arc<AtomicBool>,
}

impl GameProcess {
    pub fn exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

/// Launches the game as a child process and owns its lifetime. A watch
/// task per process detects exit (requested or crash) and publishes the
/// resulting state transition without any client call.
pub struct ProcessSupervisor {
    grace: Duration,
    current: Mutex<Option<GameProcess>>,
}

impl ProcessSupervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|process| !process.exited())
    }

    /// Spawns the game and wires up the exit watch task. The caller is
    /// responsible for state gating; this only refuses a double launch.
    /// `Running` is published before the watch task starts, so a terminal
    /// publication from the watch task always lands after it.
    pub async fn launch(
        &self,
        settings: &GameSettings,
        status: Arc<StatusPublisher>,
    ) -> Result<u32, GameError> {
        if self.is_running() {
            return Err(GameError::Launch("game is already running".into()));
        }

        let java = resolve_java(&settings.java_path)?;
        let game_dir = Path::new(&settings.game_directory);
        if !game_dir.is_dir() {
            return Err(GameError::Launch(format!(
                "game directory '{}' does not exist, install first",
                settings.game_directory
            )));
        }

        let args = compose_args(settings);
        info!("launching game: {} {}", java.display(), args.join(" "));

        let mut child = Command::new(&java)
            .args(&args)
            .current_dir(game_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GameError::Launch(format!("failed to spawn {}: {}", java.display(), e)))?;

        let pid = child.id().unwrap_or(0);
        let stop_notify = Arc::new(Notify::new());
        let exited = Arc::new(AtomicBool::new(false));
        let stop_requested = Arc::new(AtomicBool::new(false));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        status.publish(GameStatus::new(GameState::Running, 100.0, "Game is running"));
        tokio::spawn({
            let stop_notify = stop_notify.clone();
            let exited = exited.clone();
            let stop_requested = stop_requested.clone();
            let grace = self.grace;

            async move {
                let mut stdout = BufReader::new(stdout.unwrap()).lines();
                let mut stderr = BufReader::new(stderr.unwrap()).lines();
                loop {
                    select! {
                        line = stdout.next_line() => {
                            if let Ok(Some(line)) = line {
                                info!("[game] {}", line);
                            }
                        }
                        line = stderr.next_line() => {
                            if let Ok(Some(line)) = line {
                                warn!("[game] {}", line);
                            }
                        }
                        result = child.wait() => {
                            exited.store(true, Ordering::SeqCst);
                            publish_exit(&status, result.ok(), stop_requested.load(Ordering::SeqCst), pid);
                            break;
                        }
                        _ = stop_notify.notified() => {
                            stop_requested.store(true, Ordering::SeqCst);
                            info!("stopping game process (pid={})", pid);
                            terminate_gracefully(pid);
                            let result = select! {
                                result = child.wait() => result.ok(),
                                _ = tokio::time::sleep(grace) => {
                                    warn!("process {} ignored termination for {:?}, killing", pid, grace);
                                    if let Err(err) = child.kill().await {
                                        warn!("could not kill process (pid={}): {}", pid, err);
                                    }
                                    child.wait().await.ok()
                                }
                            };
                            exited.store(true, Ordering::SeqCst);
                            publish_exit(&status, result, true, pid);
                            break;
                        }
                    }
                }
            }
        });

        *self.current.lock().unwrap() = Some(GameProcess {
            pid,
            stop_notify,
            exited,
        });
        Ok(pid)
    }

    /// Requests graceful termination; the watch task escalates to a kill
    /// after the grace period.
    pub fn stop(&self) -> Result<(), GameError> {
        let current = self.current.lock().unwrap();
        match current.as_ref().filter(|process| !process.exited()) {
            Some(process) => {
                info!("stop requested for game process (pid={})", process.pid);
                process.stop_notify.notify_one();
                Ok(())
            }
            None => Err(GameError::Launch("game is not running".into())),
        }
    }
}

fn publish_exit(
    status: &StatusPublisher,
    result: Option<std::process::ExitStatus>,
    requested: bool,
    pid: u32,
) {
    match result {
        _ if requested => {
            info!("game process {} stopped on request", pid);
            status.publish(GameStatus::new(GameState::Ready, 100.0, "Game stopped"));
        }
        Some(exit) if exit.success() => {
            info!("game process {} exited cleanly", pid);
            status.publish(GameStatus::new(GameState::Ready, 100.0, "Game closed"));
        }
        other => {
            let detail = other
                .map(|exit| exit.to_string())
                .unwrap_or_else(|| "unknown exit status".into());
            warn!("game process {} crashed: {}", pid, detail);
            status.publish(GameStatus::error(format!("Game crashed: {}", detail)));
        }
    }
}

/// Full launch argument vector: JVM memory flags, verbatim extra args,
/// the client jar, then display arguments.
fn compose_args(settings: &GameSettings) -> Vec<String> {
    let mut args = vec![
        format!("-Xms{}M", settings.min_ram_mb),
        format!("-Xmx{}M", settings.max_ram_mb),
    ];
    // additionalArgs are appended verbatim, the caller owns their validity
    args.extend(settings.additional_args.split_whitespace().map(String::from));
    args.push("-jar".into());
    args.push("client.jar".into());
    if settings.fullscreen {
        args.push("--fullscreen".into());
    } else {
        args.push("--width".into());
        args.push(settings.screen_width.to_string());
        args.push("--height".into());
        args.push(settings.screen_height.to_string());
    }
    args
}

#[cfg(unix)]
fn terminate_gracefully(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("could not signal process (pid={}): {}", pid, err);
    }
}

#[cfg(windows)]
fn terminate_gracefully(pid: u32) {
    use winapi::shared::minwindef::FALSE;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
    use winapi::um::winnt::PROCESS_TERMINATE;

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, FALSE, pid);
        if handle.is_null() {
            warn!("could not open process (pid={}) for termination", pid);
            return;
        }
        if TerminateProcess(handle, 1) == 0 {
            warn!("could not terminate process (pid={})", pid);
        }
        CloseHandle(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings_with(game_dir: &Path, java_path: &str) -> GameSettings {
        let mut settings = GameSettings::default();
        settings.game_directory = game_dir.to_string_lossy().to_string();
        settings.java_path = java_path.to_string();
        settings
    }

    #[test]
    fn test_compose_args_memory_and_windowed() {
        let mut settings = GameSettings::default();
        settings.min_ram_mb = 2048;
        settings.max_ram_mb = 4096;
        let args = compose_args(&settings);
        assert_eq!(args[0], "-Xms2048M");
        assert_eq!(args[1], "-Xmx4096M");
        assert!(args.contains(&"--width".to_string()));
        assert!(args.contains(&"1280".to_string()));
        assert!(!args.contains(&"--fullscreen".to_string()));
    }

    #[test]
    fn test_compose_args_fullscreen_and_extra() {
        let mut settings = GameSettings::default();
        settings.fullscreen = true;
        settings.additional_args = "-XX:+UseG1GC -Dfoo=bar".into();
        let args = compose_args(&settings);
        assert!(args.contains(&"-XX:+UseG1GC".to_string()));
        assert!(args.contains(&"-Dfoo=bar".to_string()));
        assert!(args.contains(&"--fullscreen".to_string()));
        assert!(!args.contains(&"--width".to_string()));
    }

    #[cfg(unix)]
    fn stub_game(script: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir()
            .join("launcher-daemon-process-tests")
            .join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let stub = dir.join("fake-java.sh");
        std::fs::write(&stub, script).unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, stub)
    }

    async fn wait_for_state(
        status: &StatusPublisher,
        expected: GameState,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if status.state() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_and_graceful_stop() {
        let (dir, stub) = stub_game("#!/bin/sh\nsleep 30\n");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(5));
        let status = Arc::new(StatusPublisher::new(GameStatus::ready()));

        let settings = settings_with(&dir, stub.to_str().unwrap());
        supervisor.launch(&settings, status.clone()).await.unwrap();
        assert_eq!(status.state(), GameState::Running);
        assert!(supervisor.is_running());

        supervisor.stop().unwrap();
        assert!(wait_for_state(&status, GameState::Ready, Duration::from_secs(3)).await);
        assert!(!supervisor.is_running());
        assert_eq!(status.snapshot().current_step, "Game stopped");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_escalates_when_term_is_ignored() {
        let (dir, stub) = stub_game("#!/bin/sh\ntrap '' TERM\nsleep 30\n");
        let supervisor = ProcessSupervisor::new(Duration::from_millis(300));
        let status = Arc::new(StatusPublisher::new(GameStatus::ready()));

        let settings = settings_with(&dir, stub.to_str().unwrap());
        supervisor.launch(&settings, status.clone()).await.unwrap();

        supervisor.stop().unwrap();
        assert!(wait_for_state(&status, GameState::Ready, Duration::from_secs(3)).await);
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_kill_is_detected_as_crash() {
        let (dir, stub) = stub_game("#!/bin/sh\nsleep 30\n");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(5));
        let status = Arc::new(StatusPublisher::new(GameStatus::ready()));

        let settings = settings_with(&dir, stub.to_str().unwrap());
        let pid = supervisor.launch(&settings, status.clone()).await.unwrap();

        // Kill behind the supervisor's back; no client request involved.
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();

        assert!(wait_for_state(&status, GameState::Error, Duration::from_secs(3)).await);
        assert!(!supervisor.is_running());
        assert!(status.snapshot().error_message.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_returns_to_ready() {
        let (dir, stub) = stub_game("#!/bin/sh\nexit 0\n");
        let supervisor = ProcessSupervisor::new(Duration::from_secs(5));
        let status = Arc::new(StatusPublisher::new(GameStatus::ready()));

        let settings = settings_with(&dir, stub.to_str().unwrap());
        supervisor.launch(&settings, status.clone()).await.unwrap();

        // The stub exits immediately; poll for the watch task's publication.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while status.snapshot().current_step != "Game closed" {
            assert!(tokio::time::Instant::now() < deadline, "no clean-exit status");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status.state(), GameState::Ready);
    }

    #[tokio::test]
    async fn test_stop_without_process_is_an_error() {
        let supervisor = ProcessSupervisor::new(Duration::from_secs(5));
        assert!(matches!(
            supervisor.stop(),
            Err(GameError::Launch(_))
        ));
    }

    #[tokio::test]
    async fn test_launch_requires_existing_game_directory() {
        let supervisor = ProcessSupervisor::new(Duration::from_secs(5));
        let status = Arc::new(StatusPublisher::new(GameStatus::ready()));
        let mut settings = GameSettings::default();
        settings.game_directory = "/definitely/not/installed".into();
        #[cfg(unix)]
        {
            settings.java_path = "/bin/sh".into();
        }

        let err = supervisor.launch(&settings, status).await.unwrap_err();
        assert!(matches!(err, GameError::Launch(_)));
    }
}

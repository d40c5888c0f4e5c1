use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    NotInstalled,
    Checking,
    Downloading,
    Installing,
    Ready,
    Launching,
    Running,
    Error,
}

impl GameState {
    /// States in which no mutating operation is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            GameState::NotInstalled | GameState::Ready | GameState::Error
        )
    }
}

/// Immutable status snapshot consumed by the polling UI. A new value
/// replaces the previous one atomically; readers never observe a
/// half-written update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    pub state: GameState,
    pub progress: f64,
    pub current_step: String,
    pub current_file: String,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl GameStatus {
    pub fn new(state: GameState, progress: f64, step: impl Into<String>) -> Self {
        Self {
            state,
            progress,
            current_step: step.into(),
            current_file: String::new(),
            downloaded_bytes: 0,
            total_bytes: 0,
            error_message: None,
        }
    }

    pub fn not_installed() -> Self {
        Self::new(GameState::NotInstalled, 0.0, "Not installed")
    }

    pub fn ready() -> Self {
        Self::new(GameState::Ready, 100.0, "Game ready to play")
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut status = Self::new(GameState::Error, 0.0, "Operation failed");
        status.error_message = Some(message);
        status
    }
}

/// Copy-on-write publication point for [`GameStatus`]. Writers replace the
/// whole snapshot; concurrent readers clone the latest value without
/// blocking the in-flight operation.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<GameStatus>,
}

impl StatusPublisher {
    pub fn new(initial: GameStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn publish(&self, status: GameStatus) {
        // send_replace keeps working with zero receivers
        self.tx.send_replace(status);
    }

    pub fn snapshot(&self) -> GameStatus {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> GameState {
        self.tx.borrow().state
    }
}

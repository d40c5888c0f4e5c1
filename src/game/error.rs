use thiserror::Error;

use super::state::GameState;

/// Error surface of the game core. Terminal install/launch failures are
/// additionally published as an `Error` status with a readable message.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("invalid settings: {0}")]
    Validation(String),

    #[error("network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("operation '{op}' not allowed while {state:?}")]
    IllegalState { op: &'static str, state: GameState },

    #[error("another operation is already in progress")]
    ConcurrencyRejected,

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl GameError {
    /// A rejection is a no-op refusal of a request, not a failure of the
    /// game itself; it never moves the state machine to `Error`.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GameError::ConcurrencyRejected | GameError::IllegalState { .. }
        )
    }
}

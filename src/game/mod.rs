pub mod config;
pub mod error;
pub mod fetcher;
pub mod install;
pub mod java;
pub mod machine;
pub mod process;
pub mod settings;
pub mod state;

pub use config::GameConfig;
pub use error::GameError;
pub use machine::{GameInfo, GameStateMachine};
pub use settings::{GameSettings, SettingsStore};
pub use state::{GameState, GameStatus};

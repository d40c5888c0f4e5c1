use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::ops::Deref;
use std::sync::{Arc, LazyLock};
use tokio::sync::Notify;

use crate::auth::SessionManager;
use crate::config::AppConfig;
use crate::drivers::GracefulShutdown;
use crate::game::{GameStateMachine, SettingsStore};
use crate::storage::files;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
static START_TIME: LazyLock<DateTime<Utc>> = LazyLock::new(Utc::now);

pub fn get_start_time() -> &'static DateTime<Utc> {
    START_TIME.deref()
}

pub struct ApplicationState {
    pub stop_notify: Arc<Notify>,
    pub machine: Arc<GameStateMachine>,
    pub settings: Arc<SettingsStore>,
    pub sessions: SessionManager,
}
pub type AppState = Arc<ApplicationState>;

fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::get();
    debug!(
        "config loaded: {}",
        serde_json::to_string_pretty(&config).unwrap()
    );

    files::init_dirs().context("failed to initialize data directories")?;
    let settings_path = format!("{}/settings.json", files::ROOT);
    let settings = Arc::new(SettingsStore::load(&settings_path)?);
    let machine = GameStateMachine::new(config.game.clone(), settings.clone());
    let sessions = SessionManager::new(config.auth.clone());

    let resources = ApplicationState {
        stop_notify: Arc::new(Notify::new()),
        machine,
        settings,
        sessions,
    };
    Ok(Arc::new(resources))
}

pub async fn run_app() -> anyhow::Result<()> {
    let _ = get_start_time();
    info!("launcher-daemon v{} starting", VERSION);

    let state = init_app_state()?;
    let mut gs = GracefulShutdown::new();

    AppConfig::get()
        .drivers
        .enabled
        .iter()
        .for_each(|driver_type| gs.add_driver(driver_type.new_driver(state.clone())));

    gs.watch(state.stop_notify.clone()).await;
    info!("Bye.");
    Ok(())
}

mod config;
mod driver;
mod graceful_shutdown;
pub mod http;

use crate::app::AppState;
use crate::drivers::http::HttpDriver;
pub use driver::Driver;
pub use graceful_shutdown::GracefulShutdown;
use serde::{Deserialize, Serialize};

pub use config::{DriversConfig, UniDriverConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Drivers {
    Http,
}

impl Drivers {
    pub fn new_driver(&self, app_state: AppState) -> impl Driver {
        match self {
            Drivers::Http => HttpDriver::new(app_state),
        }
    }
}

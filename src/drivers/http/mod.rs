mod driver;

use serde::{Deserialize, Serialize};

use super::config::UniDriverConfig;
pub use driver::{build_router, HttpDriver};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HttpDriverConfig {
    pub uni_config: UniDriverConfig,
}
